//! Container runtime collaborator interface
//!
//! Drivers never shell out to a container engine themselves; they go through
//! this trait. Implementations (docker, podman, ignite, ...) live with the
//! orchestrator. The contract drivers rely on: `create_container` snapshots
//! the runtime-shaping fields of the config at call time, and operations
//! against the same container identity are serialized by the implementation.

use async_trait::async_trait;
use thiserror::Error;

use crate::config::NodeConfig;

/// Errors surfaced by a container runtime
#[derive(Error, Debug)]
pub enum RuntimeError {
    #[error("Container create failed: {0}")]
    CreateFailed(String),

    #[error("Exec failed in container {container}: {reason}")]
    ExecFailed { container: String, reason: String },

    #[error("Container delete failed: {0}")]
    DeleteFailed(String),

    #[error("Runtime not available: {0}")]
    NotAvailable(String),
}

/// Captured output of one in-container command.
#[derive(Debug, Clone, Default)]
pub struct ExecOutput {
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

impl ExecOutput {
    /// Lossy stdout for logging and substring checks.
    pub fn stdout_str(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }

    /// Lossy stderr for logging and substring checks.
    pub fn stderr_str(&self) -> String {
        String::from_utf8_lossy(&self.stderr).into_owned()
    }
}

/// Create/exec/delete surface of the container engine.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Create and start a container for `cfg`; returns the container id.
    async fn create_container(&self, cfg: &NodeConfig) -> Result<String, RuntimeError>;

    /// Run `cmd` inside the named container and capture its output.
    ///
    /// A non-zero exit status is not an `Err` by itself; callers inspect
    /// stderr and decide. `Err` means the exec could not be performed.
    async fn exec(&self, container: &str, cmd: &[String]) -> Result<ExecOutput, RuntimeError>;

    /// Remove the named container.
    async fn delete_container(&self, container: &str) -> Result<(), RuntimeError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exec_output_lossy_strings() {
        let out = ExecOutput {
            stdout: b"mgmt_server running".to_vec(),
            stderr: Vec::new(),
        };
        assert_eq!(out.stdout_str(), "mgmt_server running");
        assert!(out.stderr_str().is_empty());
    }
}
