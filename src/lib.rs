//! labnet: node-lifecycle drivers for container-backed network lab topologies.
//!
//! The crate sits between a topology orchestrator and a container runtime. The
//! orchestrator resolves a vendor "kind" through the [`nodes::NodeRegistry`],
//! obtains a fresh [`nodes::Node`] driver and walks it through a fixed
//! lifecycle: `init` -> `pre_deploy` -> `deploy` -> `post_deploy` and later
//! `save_config` / `delete`. Drivers generate their on-disk artifacts in a
//! per-node lab directory and talk to the running container exclusively
//! through the [`runtime::ContainerRuntime`] collaborator.

pub mod cert;
pub mod config;
pub mod nodes;
pub mod runtime;
pub mod template;
pub mod utils;

pub use config::{MgmtNet, NodeConfig, NodeExtras};
pub use nodes::{Node, NodeError, NodeRegistry};
pub use runtime::{ContainerRuntime, ExecOutput, RuntimeError};
