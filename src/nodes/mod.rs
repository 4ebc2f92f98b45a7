//! Node capability interface and kind registry
//!
//! Every vendor driver implements [`Node`]; the orchestrator only ever sees
//! that trait. Drivers are constructed exclusively through [`NodeRegistry`]
//! factories, keeping the orchestrator ignorant of vendor-specific logic.
//!
//! Lifecycle order is fixed: `init` -> `pre_deploy` (certs + on-disk
//! artifacts) -> `deploy` (container create) -> `post_deploy` (readiness gate
//! + conditional default bootstrap), with `save_config` / `delete` available
//! afterwards. The orchestrator may drive different node instances
//! concurrently; one instance's methods are called sequentially.

pub mod srl;

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use thiserror::Error;

use crate::cert::{CertError, CertProvider};
use crate::config::{MgmtNet, NodeConfig};
use crate::runtime::{ContainerRuntime, RuntimeError};

/// Key under which a driver reports its container image in `get_images`.
pub const IMAGE_KEY: &str = "image";

/// Errors surfaced by node drivers
#[derive(Error, Debug)]
pub enum NodeError {
    #[error("Invalid node configuration: {0}")]
    InvalidConfig(String),

    #[error("Unknown node kind: {0}")]
    UnknownKind(String),

    #[error("Artifact generation failed for node {node}: {reason}")]
    ArtifactGeneration { node: String, reason: String },

    #[error("Certificate error: {0}")]
    Cert(#[from] CertError),

    #[error("Runtime error on node {node}: {source}")]
    Runtime {
        node: String,
        #[source]
        source: RuntimeError,
    },

    #[error("Remote command on node {node} wrote to stderr: {stderr}")]
    RemoteCommandFailed { node: String, stderr: String },

    #[error("Timed out waiting for node {node} to become ready: {reason}")]
    Timeout { node: String, reason: String },
}

/// Sibling view handed to `post_deploy`; keyed by short node name.
pub type NodeMap = HashMap<String, Box<dyn Node>>;

/// Capability set every vendor driver provides.
#[async_trait]
pub trait Node: Send + Sync {
    /// Validate and normalize the configuration in place: default the node
    /// type, merge the kind's fixed env/sysctls, append driver-owned binds.
    fn init(&mut self, cfg: NodeConfig) -> Result<(), NodeError>;

    /// Read access to the (normalized) configuration.
    fn config(&self) -> &NodeConfig;

    /// Inject the container runtime collaborator.
    fn with_runtime(&mut self, runtime: Arc<dyn ContainerRuntime>);

    /// Access the injected runtime, if any.
    fn runtime(&self) -> Option<Arc<dyn ContainerRuntime>>;

    /// Inject the certificate collaborator.
    fn with_cert_provider(&mut self, certs: Arc<dyn CertProvider>);

    /// Inject management network parameters. Most drivers ignore them.
    fn with_mgmt_net(&mut self, _net: MgmtNet) {}

    /// Images this node needs, keyed by role, for pre-pulling.
    fn get_images(&self) -> HashMap<String, String>;

    /// Idempotent preparation: acquire identity material and write every
    /// on-disk artifact the container will mount. Called once per deploy.
    async fn pre_deploy(
        &mut self,
        topo_name: &str,
        ca_cert_dir: &Path,
        ca_root_dir: &Path,
    ) -> Result<(), NodeError>;

    /// Create the container through the runtime collaborator.
    async fn deploy(&self) -> Result<(), NodeError>;

    /// Run the readiness gate, then apply the default bootstrap configuration
    /// unless the node already has configuration of its own.
    async fn post_deploy(&self, siblings: &NodeMap) -> Result<(), NodeError>;

    /// Block until the node's control plane reports operational, or fail with
    /// [`NodeError::Timeout`] once the driver's ceiling elapses.
    async fn ready(&self) -> Result<(), NodeError>;

    /// Persist the running configuration inside the node.
    async fn save_config(&self) -> Result<(), NodeError>;

    /// Remove the node's container.
    async fn delete(&self) -> Result<(), NodeError>;
}

/// Factory producing a fresh, zero-initialized driver.
pub type NodeFactory = Box<dyn Fn() -> Box<dyn Node> + Send + Sync>;

/// Kind-name to driver-factory dispatch table.
///
/// Constructed once at process start and handed to the orchestrator by
/// reference; reads are concurrent. Registering the same kind twice replaces
/// the earlier factory (last write wins) and is considered a programming
/// error, not a runtime condition to recover from.
#[derive(Default)]
pub struct NodeRegistry {
    factories: DashMap<String, NodeFactory>,
}

impl NodeRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            factories: DashMap::new(),
        }
    }

    /// Store `factory` under `kind`. Last write wins.
    pub fn register(&self, kind: impl Into<String>, factory: NodeFactory) {
        self.factories.insert(kind.into(), factory);
    }

    /// Produce a fresh driver for `kind`.
    pub fn new_node(&self, kind: &str) -> Result<Box<dyn Node>, NodeError> {
        match self.factories.get(kind) {
            Some(factory) => Ok((factory.value())()),
            None => Err(NodeError::UnknownKind(kind.to_string())),
        }
    }

    /// Registered kind names, unordered.
    pub fn kinds(&self) -> Vec<String> {
        self.factories.iter().map(|e| e.key().clone()).collect()
    }
}

/// Registry with all built-in drivers registered.
pub fn default_registry() -> NodeRegistry {
    let registry = NodeRegistry::new();
    for kind in srl::KIND_NAMES {
        registry.register(
            *kind,
            Box::new(|| Box::new(srl::SrlNode::default()) as Box<dyn Node>),
        );
    }
    registry
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_unknown_kind() {
        let registry = NodeRegistry::new();
        let err = registry.new_node("frr").err().unwrap();
        assert!(matches!(err, NodeError::UnknownKind(ref k) if k == "frr"));
    }

    #[test]
    fn test_default_registry_has_srl_kinds() {
        let registry = default_registry();
        for kind in srl::KIND_NAMES {
            assert!(registry.new_node(kind).is_ok(), "kind {kind} missing");
        }
    }

    #[test]
    fn test_registry_produces_fresh_instances() {
        let registry = default_registry();
        let mut a = registry.new_node("srl").unwrap();
        let b = registry.new_node("srl").unwrap();

        let cfg = NodeConfig {
            short_name: "srl1".to_string(),
            long_name: "clab-test-srl1".to_string(),
            kind: "srl".to_string(),
            image: "ghcr.io/nokia/srlinux:latest".to_string(),
            lab_dir: std::env::temp_dir().join("labnet-registry-test"),
            ..Default::default()
        };
        a.init(cfg).unwrap();

        // b is untouched by a's init
        assert!(b.config().short_name.is_empty());
        assert_eq!(a.config().short_name, "srl1");
    }

    #[test]
    fn test_registry_last_write_wins() {
        let registry = NodeRegistry::new();
        let factory = || Box::new(|| Box::new(srl::SrlNode::default()) as Box<dyn Node>);
        registry.register("srl", factory());
        registry.register("srl", factory());
        assert_eq!(registry.kinds().len(), 1);
    }
}
