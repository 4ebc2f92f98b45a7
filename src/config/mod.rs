//! Per-node configuration model
//!
//! A [`NodeConfig`] is the aggregate that flows through every lifecycle stage
//! of a node driver. The topology front-end deserializes one record per node;
//! the driver's `init` normalizes it in place (default type, merged env and
//! sysctls, additional binds) and `pre_deploy` populates the derived TLS
//! fields. Once `deploy` has run, the runtime-shaping fields (binds, env,
//! sysctls) must not change: the container runtime snapshots them at
//! container-create time.

use std::collections::HashMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Configuration for a single lab node.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Short node name as written in the topology (e.g. "srl1")
    pub short_name: String,

    /// Fully qualified container name (e.g. "clab-mylab-srl1")
    pub long_name: String,

    /// FQDN used in certificate subjects
    pub fqdn: String,

    /// Vendor/OS kind that selects the driver (e.g. "srl")
    pub kind: String,

    /// Hardware variant within the kind; drivers default this if empty
    #[serde(default)]
    pub node_type: String,

    /// Container image reference
    pub image: String,

    /// Per-node working directory for generated artifacts
    pub lab_dir: PathBuf,

    /// Entrypoint command; drivers may force their own launch wrapper
    #[serde(default)]
    pub cmd: String,

    /// Container user override ("uid:gid"); drivers default this if empty
    #[serde(default)]
    pub user: String,

    /// Environment variables passed to the container
    #[serde(default)]
    pub env: HashMap<String, String>,

    /// Kernel sysctls applied to the container namespace
    #[serde(default)]
    pub sysctls: HashMap<String, String>,

    /// Bind mounts as "host:container:mode" triples, in mount order
    #[serde(default)]
    pub binds: Vec<String>,

    /// Optional startup configuration file, used as a render template
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub startup_config: Option<PathBuf>,

    /// Optional license file copied into the lab directory
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub license: Option<PathBuf>,

    /// Vendor-specific extras
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extras: Option<NodeExtras>,

    /// Management-plane IPv4 address, exposed to config templates
    #[serde(default)]
    pub mgmt_ipv4: String,

    /// Management-plane IPv6 address, exposed to config templates
    #[serde(default)]
    pub mgmt_ipv6: String,

    /// Fail `pre_deploy` when certificate generation fails (default).
    /// Set to false to restore the legacy log-and-continue behavior.
    #[serde(default = "default_true")]
    pub strict_cert: bool,

    /// PEM certificate issued during `pre_deploy`
    #[serde(skip)]
    pub tls_cert: Option<String>,

    /// PEM private key issued during `pre_deploy`
    #[serde(skip)]
    pub tls_key: Option<String>,

    /// Optional trust anchor enabling mutual TLS in the bootstrap config
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tls_anchor: Option<String>,
}

fn default_true() -> bool {
    true
}

/// Vendor-specific extra inputs carried alongside the common fields.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NodeExtras {
    /// Agent spec files copied into the node's appmgr directory
    #[serde(default)]
    pub agents: Vec<PathBuf>,
}

/// Management network parameters shared by all nodes of a lab.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MgmtNet {
    /// Container network name
    pub network: String,

    /// IPv4 subnet in CIDR notation
    #[serde(default)]
    pub ipv4_subnet: String,

    /// IPv6 subnet in CIDR notation
    #[serde(default)]
    pub ipv6_subnet: String,
}

// ============================================================================
// Pure helpers (no I/O)
// ============================================================================

/// Merge two string maps, values from `overlay` winning on key conflicts.
pub fn merge_string_maps(
    base: &HashMap<String, String>,
    overlay: &HashMap<String, String>,
) -> HashMap<String, String> {
    let mut merged = base.clone();
    for (k, v) in overlay {
        merged.insert(k.clone(), v.clone());
    }
    merged
}
