//! Filesystem helpers for lab directories

use std::fs;
use std::io;
use std::path::Path;

use tracing::debug;

/// Create `dir` and any missing parents with a permissive mode so the
/// container user can write into mounted subdirectories.
pub fn create_directory(dir: &Path, mode: u32) -> io::Result<()> {
    fs::create_dir_all(dir)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(dir, fs::Permissions::from_mode(mode))?;
    }
    #[cfg(not(unix))]
    let _ = mode;

    Ok(())
}

/// Copy `src` to `dst`, setting `mode` on the destination.
pub fn copy_file(src: &Path, dst: &Path, mode: u32) -> io::Result<()> {
    fs::copy(src, dst)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(dst, fs::Permissions::from_mode(mode))?;
    }
    #[cfg(not(unix))]
    let _ = mode;

    debug!("Copied {} -> {}", src.display(), dst.display());
    Ok(())
}

/// Whether `path` exists and is a regular file.
pub fn file_exists(path: &Path) -> bool {
    path.is_file()
}
