//! Certificate collaborator interface
//!
//! The certificate authority subsystem lives outside this crate. Drivers only
//! need two operations from it: look up previously issued material for a node,
//! and issue fresh material when none is on disk. The driver keeps a read-only
//! copy of the PEM blobs in its [`crate::config::NodeConfig`] for templating.

use std::path::Path;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::NodeConfig;

/// Errors surfaced by a certificate provider
#[derive(Error, Debug)]
pub enum CertError {
    #[error("No certificate material found for node: {0}")]
    NotFound(String),

    #[error("Certificate generation failed: {0}")]
    GenerationFailed(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Issued identity material for one node.
///
/// The blobs are opaque PEM byte sequences. They are written under the lab
/// directory by the provider and never persisted anywhere else.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CertMaterial {
    pub cert: Vec<u8>,
    pub key: Vec<u8>,
    pub csr: Vec<u8>,
}

/// Subject fields for a node certificate signing request.
#[derive(Debug, Clone, Serialize)]
pub struct CertInput {
    pub name: String,
    pub long_name: String,
    pub fqdn: String,
    /// Lab/topology name prefixed to the certificate subject
    pub prefix: String,
}

/// Retrieve-or-issue interface against the lab certificate authority.
///
/// A `retrieve` failure means "not present on disk, must generate"; it is not
/// fatal by itself. Whether a `generate` failure aborts the deploy is the
/// driver's decision (see `NodeConfig::strict_cert`).
#[async_trait]
pub trait CertProvider: Send + Sync {
    /// Look up previously issued material for `cfg` under the lab CA dir.
    async fn retrieve(&self, cfg: &NodeConfig, ca_dir: &Path) -> Result<CertMaterial, CertError>;

    /// Issue fresh material signed by the lab root CA.
    async fn generate(
        &self,
        ca_cert: &Path,
        ca_key: &Path,
        input: &CertInput,
        output_dir: &Path,
    ) -> Result<CertMaterial, CertError>;
}

impl CertInput {
    /// Build the CSR subject fields from a node config.
    pub fn from_config(cfg: &NodeConfig, prefix: &str) -> Self {
        Self {
            name: cfg.short_name.clone(),
            long_name: cfg.long_name.clone(),
            fqdn: cfg.fqdn.clone(),
            prefix: prefix.to_string(),
        }
    }
}
