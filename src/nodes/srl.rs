//! Nokia SR Linux node driver
//!
//! Brings up one SR Linux container through the fixed lifecycle. `init`
//! normalizes the config (default chassis type, fixed sysctls, driver-owned
//! binds), `pre_deploy` issues certificates and writes the lab-directory
//! artifacts (chassis topology with a randomized base MAC, rendered startup
//! config, license, agent specs), `deploy` hands the config to the container
//! runtime and `post_deploy` gates on the in-container management plane before
//! applying the default bootstrap configuration.

use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use tokio::time::{sleep, timeout};
use tracing::{debug, info, warn};

use crate::cert::{CertInput, CertProvider};
use crate::config::{merge_string_maps, NodeConfig};
use crate::nodes::{Node, NodeError, NodeMap, IMAGE_KEY};
use crate::runtime::ContainerRuntime;
use crate::template;
use crate::utils;

/// Kind names this driver registers under.
pub const KIND_NAMES: &[&str] = &["srl", "nokia_srlinux"];

const DEFAULT_TYPE: &str = "ixrd2";

/// Max wait for the node control plane to boot.
const READY_TIMEOUT: Duration = Duration::from_secs(120);
const RETRY_INTERVAL: Duration = Duration::from_secs(1);

/// The touch is needed to support non-docker runtimes.
const LAUNCH_CMD: &str = "sudo bash -c 'touch /.dockerenv && /opt/srlinux/bin/sr_linux'";

/// Bootstrap file name under the bind-mounted config dir. The rendered
/// configuration is written host-side and applied from the in-container path,
/// so no rendered text ever passes through a shell command line.
const BOOTSTRAP_FILE: &str = "clab-bootstrap.cfg";
const BOOTSTRAP_CONTAINER_PATH: &str = "/etc/opt/srlinux/clab-bootstrap.cfg";

const MGMT_RUNNING_MARKER: &str = "running";
const COMMIT_COMPLETE_MARKER: &str = "complete";

/// Supported chassis types mapped to their embedded base topology descriptor.
const TYPES: &[(&str, &str)] = &[
    ("ixr6", include_str!("topology/7250IXR6.yml")),
    ("ixr10", include_str!("topology/7250IXR10.yml")),
    ("ixrd1", include_str!("topology/7220IXRD1.yml")),
    ("ixrd2", include_str!("topology/7220IXRD2.yml")),
    ("ixrd3", include_str!("topology/7220IXRD3.yml")),
    ("ixrh2", include_str!("topology/7220IXRH2.yml")),
    ("ixrh3", include_str!("topology/7220IXRH3.yml")),
];

/// Sysctls SR Linux requires; these override any user-supplied values.
const SYSCTLS: &[(&str, &str)] = &[
    ("net.ipv4.ip_forward", "0"),
    ("net.ipv6.conf.all.disable_ipv6", "0"),
    ("net.ipv6.conf.all.accept_dad", "0"),
    ("net.ipv6.conf.default.accept_dad", "0"),
    ("net.ipv6.conf.all.autoconf", "0"),
    ("net.ipv6.conf.default.autoconf", "0"),
];

const ENV: &[(&str, &str)] = &[("SRLINUX", "1")];

fn topology_template(node_type: &str) -> Option<&'static str> {
    TYPES
        .iter()
        .find(|(t, _)| *t == node_type)
        .map(|(_, tpl)| *tpl)
}

fn supported_types() -> String {
    TYPES
        .iter()
        .map(|(t, _)| *t)
        .collect::<Vec<_>>()
        .join(", ")
}

fn save_cmd() -> Vec<String> {
    ["sr_cli", "-d", "tools", "system", "configuration", "save"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn mgmt_ready_cmd() -> Vec<String> {
    [
        "sr_cli",
        "-d",
        "info",
        "from",
        "state",
        "system",
        "app-management",
        "application",
        "mgmt_server",
        "state",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn commit_complete_cmd() -> Vec<String> {
    [
        "sr_cli",
        "-d",
        "info",
        "from",
        "state",
        "system",
        "configuration",
        "commit",
        "1",
        "status",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn apply_bootstrap_cmd() -> Vec<String> {
    vec![
        "bash".to_string(),
        "-c".to_string(),
        format!("sr_cli -ed < {}", BOOTSTRAP_CONTAINER_PATH),
    ]
}

/// Readiness poller states. A failed probe retries from the same state; only
/// the overall deadline terminates the loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BootStage {
    WaitingMgmt,
    WaitingCommit,
}

/// SR Linux driver instance. One per node, constructed through the registry.
pub struct SrlNode {
    cfg: NodeConfig,
    runtime: Option<Arc<dyn ContainerRuntime>>,
    certs: Option<Arc<dyn CertProvider>>,
    ready_timeout: Duration,
}

impl Default for SrlNode {
    fn default() -> Self {
        Self {
            cfg: NodeConfig::default(),
            runtime: None,
            certs: None,
            ready_timeout: READY_TIMEOUT,
        }
    }
}

impl SrlNode {
    /// Override the default two minute readiness ceiling.
    pub fn set_ready_timeout(&mut self, ceiling: Duration) {
        self.ready_timeout = ceiling;
    }

    fn rt(&self) -> Result<&Arc<dyn ContainerRuntime>, NodeError> {
        self.runtime.as_ref().ok_or_else(|| {
            NodeError::InvalidConfig(format!(
                "container runtime not injected for node {}",
                self.cfg.short_name
            ))
        })
    }

    /// One probe of the in-container control plane. Exec failures and stderr
    /// output are treated the same as "condition not yet met": the poller does
    /// not distinguish transient exec failures from not-ready states and
    /// defers all distinction to the overall deadline. The `Err` payload says
    /// why this probe did not pass; the poller keeps the latest one so a
    /// deadline expiry can report it.
    async fn probe(
        &self,
        rt: &Arc<dyn ContainerRuntime>,
        cmd: &[String],
        marker: &str,
    ) -> Result<(), String> {
        match rt.exec(&self.cfg.long_name, cmd).await {
            Ok(out) => {
                if !out.stderr.is_empty() {
                    debug!(
                        "error during checking SR Linux boot status: {}",
                        out.stderr_str()
                    );
                    return Err(format!("remote command wrote to stderr: {}", out.stderr_str()));
                }
                if out.stdout_str().contains(marker) {
                    Ok(())
                } else {
                    Err(format!("waiting for '{}' in command output", marker))
                }
            }
            Err(e) => {
                debug!(
                    "boot probe failed on node {}, treating as not ready: {}",
                    self.cfg.short_name, e
                );
                Err(e.to_string())
            }
        }
    }

    async fn wait_for_boot(&self, rt: &Arc<dyn ContainerRuntime>, last_failure: &mut String) {
        let mut stage = BootStage::WaitingMgmt;
        loop {
            let (cmd, marker) = match stage {
                BootStage::WaitingMgmt => (mgmt_ready_cmd(), MGMT_RUNNING_MARKER),
                BootStage::WaitingCommit => (commit_complete_cmd(), COMMIT_COMPLETE_MARKER),
            };

            match self.probe(rt, &cmd, marker).await {
                Ok(()) => match stage {
                    BootStage::WaitingMgmt => {
                        stage = BootStage::WaitingCommit;
                        continue;
                    }
                    BootStage::WaitingCommit => {
                        debug!("Node {} booted", self.cfg.short_name);
                        return;
                    }
                },
                Err(why) => {
                    if stage == BootStage::WaitingCommit {
                        debug!("node {} not yet ready", self.cfg.short_name);
                    }
                    *last_failure = why;
                }
            }
            sleep(RETRY_INTERVAL).await;
        }
    }

    /// Apply the default bootstrap configuration: TLS server profile from the
    /// issued certificate material, management services bound to it, LLDP,
    /// then a persistent commit. Runs only after the readiness gate passes.
    async fn add_default_config(&self) -> Result<(), NodeError> {
        self.ready().await?;

        let rendered = render_default_config(&self.cfg);
        debug!(
            "Node {:?} additional config:\n{}",
            self.cfg.short_name, rendered
        );

        // The config dir is bind-mounted rw, so the file written here is the
        // same one the apply command reads inside the container.
        let bootstrap = self.cfg.lab_dir.join("config").join(BOOTSTRAP_FILE);
        fs::write(&bootstrap, &rendered).map_err(|e| NodeError::ArtifactGeneration {
            node: self.cfg.short_name.clone(),
            reason: format!("writing bootstrap file {}: {}", bootstrap.display(), e),
        })?;

        let rt = self.rt()?;
        let out = rt
            .exec(&self.cfg.long_name, &apply_bootstrap_cmd())
            .await
            .map_err(|e| NodeError::Runtime {
                node: self.cfg.short_name.clone(),
                source: e,
            })?;

        debug!(
            "node {}. stdout: {}, stderr: {}",
            self.cfg.short_name,
            out.stdout_str(),
            out.stderr_str()
        );

        Ok(())
    }
}

#[async_trait]
impl Node for SrlNode {
    fn init(&mut self, mut cfg: NodeConfig) -> Result<(), NodeError> {
        if cfg.short_name.is_empty() || cfg.long_name.is_empty() {
            return Err(NodeError::InvalidConfig(
                "node name must not be empty".to_string(),
            ));
        }
        if cfg.image.is_empty() {
            return Err(NodeError::InvalidConfig(format!(
                "no image specified for node {}",
                cfg.short_name
            )));
        }
        if cfg.lab_dir.as_os_str().is_empty() {
            return Err(NodeError::InvalidConfig(format!(
                "no lab directory specified for node {}",
                cfg.short_name
            )));
        }

        if cfg.node_type.is_empty() {
            cfg.node_type = DEFAULT_TYPE.to_string();
        }
        if topology_template(&cfg.node_type).is_none() {
            return Err(NodeError::InvalidConfig(format!(
                "wrong node type. '{}' doesn't exist. should be any of {}",
                cfg.node_type,
                supported_types()
            )));
        }

        cfg.cmd = LAUNCH_CMD.to_string();

        let defaults: HashMap<String, String> = ENV
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        cfg.env = merge_string_maps(&defaults, &cfg.env);

        if cfg.user.is_empty() {
            cfg.user = "0:0".to_string();
        }

        // required sysctls win over user-supplied values
        for (k, v) in SYSCTLS {
            cfg.sysctls.insert(k.to_string(), v.to_string());
        }

        if cfg.license.is_some() {
            // the license referenced in the topology is copied to this fixed
            // path during pre_deploy
            cfg.binds.push(format!(
                "{}:/opt/srlinux/etc/license.key:ro",
                cfg.lab_dir.join("license.key").display()
            ));
        }

        cfg.binds.push(format!(
            "{}:/etc/opt/srlinux/:rw",
            cfg.lab_dir.join("config").display()
        ));
        cfg.binds.push(format!(
            "{}:/tmp/topology.yml:ro",
            cfg.lab_dir.join("topology.yml").display()
        ));

        self.cfg = cfg;
        Ok(())
    }

    fn config(&self) -> &NodeConfig {
        &self.cfg
    }

    fn with_runtime(&mut self, runtime: Arc<dyn ContainerRuntime>) {
        self.runtime = Some(runtime);
    }

    fn runtime(&self) -> Option<Arc<dyn ContainerRuntime>> {
        self.runtime.clone()
    }

    fn with_cert_provider(&mut self, certs: Arc<dyn CertProvider>) {
        self.certs = Some(certs);
    }

    fn get_images(&self) -> HashMap<String, String> {
        HashMap::from([(IMAGE_KEY.to_string(), self.cfg.image.clone())])
    }

    async fn pre_deploy(
        &mut self,
        topo_name: &str,
        ca_cert_dir: &Path,
        ca_root_dir: &Path,
    ) -> Result<(), NodeError> {
        utils::create_directory(&self.cfg.lab_dir, 0o777).map_err(|e| {
            NodeError::ArtifactGeneration {
                node: self.cfg.short_name.clone(),
                reason: format!(
                    "creating lab directory {}: {}",
                    self.cfg.lab_dir.display(),
                    e
                ),
            }
        })?;

        let certs = self.certs.as_ref().ok_or_else(|| {
            NodeError::InvalidConfig(format!(
                "certificate provider not injected for node {}",
                self.cfg.short_name
            ))
        })?;

        // retrieve failing only means "not on disk yet"
        let material = match certs.retrieve(&self.cfg, ca_cert_dir).await {
            Ok(m) => Some(m),
            Err(retrieve_err) => {
                debug!(
                    "no certificate material on disk for node {} ({}), generating",
                    self.cfg.short_name, retrieve_err
                );
                let input = CertInput::from_config(&self.cfg, topo_name);
                let generated = certs
                    .generate(
                        &ca_root_dir.join("root-ca.pem"),
                        &ca_root_dir.join("root-ca-key.pem"),
                        &input,
                        &ca_cert_dir.join(&input.name),
                    )
                    .await;
                match generated {
                    Ok(m) => Some(m),
                    Err(e) if self.cfg.strict_cert => return Err(e.into()),
                    Err(e) => {
                        warn!(
                            "failed to generate certificates for node {}: {}",
                            self.cfg.short_name, e
                        );
                        None
                    }
                }
            }
        };

        if let Some(m) = material {
            debug!("{} CSR: {}", self.cfg.short_name, String::from_utf8_lossy(&m.csr));
            self.cfg.tls_cert = Some(String::from_utf8_lossy(&m.cert).into_owned());
            self.cfg.tls_key = Some(String::from_utf8_lossy(&m.key).into_owned());
        }

        // agent specs go into the appmgr subdir of the mounted config dir
        if let Some(extras) = &self.cfg.extras {
            if !extras.agents.is_empty() {
                let appmgr = self.cfg.lab_dir.join("config/appmgr");
                utils::create_directory(&appmgr, 0o777).map_err(|e| {
                    NodeError::ArtifactGeneration {
                        node: self.cfg.short_name.clone(),
                        reason: format!("creating appmgr directory {}: {}", appmgr.display(), e),
                    }
                })?;

                for src in &extras.agents {
                    let basename = src.file_name().ok_or_else(|| NodeError::ArtifactGeneration {
                        node: self.cfg.short_name.clone(),
                        reason: format!("agent spec path has no file name: {}", src.display()),
                    })?;
                    let dst = appmgr.join(basename);
                    utils::copy_file(src, &dst, 0o644).map_err(|e| {
                        NodeError::ArtifactGeneration {
                            node: self.cfg.short_name.clone(),
                            reason: format!(
                                "agent copy {} -> {} failed: {}",
                                src.display(),
                                dst.display(),
                                e
                            ),
                        }
                    })?;
                }
            }
        }

        create_node_files(&self.cfg)
    }

    async fn deploy(&self) -> Result<(), NodeError> {
        let rt = self.rt()?;
        let id = rt
            .create_container(&self.cfg)
            .await
            .map_err(|e| NodeError::Runtime {
                node: self.cfg.short_name.clone(),
                source: e,
            })?;
        debug!("created container {} for node {}", id, self.cfg.short_name);
        Ok(())
    }

    async fn post_deploy(&self, _siblings: &NodeMap) -> Result<(), NodeError> {
        // a node that already has configuration must not be overwritten
        if self.cfg.startup_config.is_some()
            || utils::file_exists(&self.cfg.lab_dir.join("config/config.json"))
        {
            return Ok(());
        }

        info!(
            "Running postdeploy actions for SR Linux node '{}'",
            self.cfg.short_name
        );

        self.add_default_config().await
    }

    async fn ready(&self) -> Result<(), NodeError> {
        let rt = self.rt()?.clone();

        debug!("Waiting for SR Linux node {:?} to boot...", self.cfg.short_name);
        let mut last_failure = String::from("no boot probe completed");
        match timeout(
            self.ready_timeout,
            self.wait_for_boot(&rt, &mut last_failure),
        )
        .await
        {
            Ok(()) => Ok(()),
            Err(_) => Err(NodeError::Timeout {
                node: self.cfg.short_name.clone(),
                reason: last_failure,
            }),
        }
    }

    async fn save_config(&self) -> Result<(), NodeError> {
        let rt = self.rt()?;
        let out = rt
            .exec(&self.cfg.long_name, &save_cmd())
            .await
            .map_err(|e| NodeError::Runtime {
                node: self.cfg.short_name.clone(),
                source: e,
            })?;

        // stderr is authoritative over exit status for this operation
        if !out.stderr.is_empty() {
            return Err(NodeError::RemoteCommandFailed {
                node: self.cfg.short_name.clone(),
                stderr: out.stderr_str(),
            });
        }

        info!(
            "saved SR Linux configuration from {} node. Output:\n{}",
            self.cfg.short_name,
            out.stdout_str()
        );
        Ok(())
    }

    async fn delete(&self) -> Result<(), NodeError> {
        let rt = self.rt()?;
        rt.delete_container(&self.cfg.long_name)
            .await
            .map_err(|e| NodeError::Runtime {
                node: self.cfg.short_name.clone(),
                source: e,
            })
    }
}

// ============================================================================
// Artifact generation (pure where possible, I/O at the edges)
// ============================================================================

/// Random base MAC for a node's interfaces: locally-administered namespace
/// byte, two random bytes, zeroed tail. The random segment keeps concurrently
/// deployed nodes of the same kind from colliding on interface MACs.
pub fn generate_base_mac() -> String {
    let mut rng = rand::thread_rng();
    let b1: u8 = rng.gen();
    let b2: u8 = rng.gen();
    format!("02:{:02x}:{:02x}:00:00:00", b1, b2)
}

/// Render the default bootstrap command sequence from the node's issued
/// certificate material. A present trust anchor toggles client authentication
/// on; otherwise it is explicitly disabled.
pub fn render_default_config(cfg: &NodeConfig) -> String {
    let cert = cfg.tls_cert.clone().unwrap_or_default();
    let key = cfg.tls_key.clone().unwrap_or_default();

    let mut out = String::new();
    out.push_str("set / system tls server-profile clab-profile\n");
    out.push_str(&format!(
        "set / system tls server-profile clab-profile key \"{}\"\n",
        key
    ));
    out.push_str(&format!(
        "set / system tls server-profile clab-profile certificate \"{}\"\n",
        cert
    ));

    match &cfg.tls_anchor {
        Some(anchor) => {
            out.push_str("set / system tls server-profile clab-profile authenticate-client true\n");
            out.push_str(&format!(
                "set / system tls server-profile clab-profile trust-anchor \"{}\"\n",
                anchor
            ));
        }
        None => {
            out.push_str(
                "set / system tls server-profile clab-profile authenticate-client false\n",
            );
        }
    }

    out.push_str("set / system gnmi-server admin-state enable network-instance mgmt admin-state enable tls-profile clab-profile\n");
    out.push_str("set / system json-rpc-server admin-state enable network-instance mgmt http admin-state enable\n");
    out.push_str("set / system json-rpc-server admin-state enable network-instance mgmt https admin-state enable tls-profile clab-profile\n");
    out.push_str("set / system lldp admin-state enable\n");
    out.push_str("set / system aaa authentication idle-timeout 7200\n");
    out.push_str("commit save");

    out
}

/// Variables exposed to user-supplied startup-config templates.
fn startup_config_vars(cfg: &NodeConfig) -> HashMap<&'static str, String> {
    HashMap::from([
        ("name", cfg.short_name.clone()),
        ("long_name", cfg.long_name.clone()),
        ("fqdn", cfg.fqdn.clone()),
        ("mgmt_ipv4", cfg.mgmt_ipv4.clone()),
        ("mgmt_ipv6", cfg.mgmt_ipv6.clone()),
        ("tls_cert", cfg.tls_cert.clone().unwrap_or_default()),
        ("tls_key", cfg.tls_key.clone().unwrap_or_default()),
    ])
}

/// Write the lab-directory artifacts: license copy, chassis topology with a
/// fresh base MAC, config dir, and the rendered startup config if one was
/// supplied. Any failure here is fatal to pre_deploy.
fn create_node_files(cfg: &NodeConfig) -> Result<(), NodeError> {
    debug!(
        "Creating directory structure for SR Linux container: {}",
        cfg.short_name
    );

    if let Some(license) = &cfg.license {
        let dst = cfg.lab_dir.join("license.key");
        utils::copy_file(license, &dst, 0o644).map_err(|e| NodeError::ArtifactGeneration {
            node: cfg.short_name.clone(),
            reason: format!(
                "license copy {} -> {} failed: {}",
                license.display(),
                dst.display(),
                e
            ),
        })?;
    }

    generate_topology_file(&cfg.node_type, &cfg.lab_dir, &cfg.short_name)?;

    let config_dir = cfg.lab_dir.join("config");
    utils::create_directory(&config_dir, 0o777).map_err(|e| NodeError::ArtifactGeneration {
        node: cfg.short_name.clone(),
        reason: format!("creating config directory {}: {}", config_dir.display(), e),
    })?;

    if let Some(startup) = &cfg.startup_config {
        let dst = cfg.lab_dir.join("config/config.json");
        debug!("Reading startup-config {}", startup.display());

        let tpl = fs::read_to_string(startup).map_err(|e| NodeError::ArtifactGeneration {
            node: cfg.short_name.clone(),
            reason: format!("reading startup config {}: {}", startup.display(), e),
        })?;
        let rendered = template::render(&tpl, &startup_config_vars(cfg)).map_err(|e| {
            NodeError::ArtifactGeneration {
                node: cfg.short_name.clone(),
                reason: format!("failed to render startup config: {}", e),
            }
        })?;
        fs::write(&dst, rendered).map_err(|e| NodeError::ArtifactGeneration {
            node: cfg.short_name.clone(),
            reason: format!("writing startup config {}: {}", dst.display(), e),
        })?;
    }

    Ok(())
}

/// Render the chassis base descriptor for `node_type` with a fresh random MAC
/// and write it to `<lab_dir>/topology.yml`.
fn generate_topology_file(node_type: &str, lab_dir: &Path, node: &str) -> Result<(), NodeError> {
    let tpl = topology_template(node_type).ok_or_else(|| {
        NodeError::ArtifactGeneration {
            node: node.to_string(),
            reason: format!("no base topology for node type {}", node_type),
        }
    })?;

    let mac = generate_base_mac();
    let dst = lab_dir.join("topology.yml");
    debug!("topology base MAC for node {}: {}", node, mac);

    let rendered = template::render(tpl, &HashMap::from([("mac", mac)])).map_err(|e| {
        NodeError::ArtifactGeneration {
            node: node.to_string(),
            reason: format!("failed to render topology descriptor: {}", e),
        }
    })?;

    fs::write(&dst, rendered).map_err(|e| NodeError::ArtifactGeneration {
        node: node.to_string(),
        reason: format!("writing topology descriptor {}: {}", dst.display(), e),
    })?;
    Ok(())
}
