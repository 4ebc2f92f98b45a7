//! Full node lifecycle against fake collaborators
//!
//! Drives a registry-constructed SR Linux driver through
//! init -> pre_deploy -> deploy -> post_deploy -> save_config -> delete with
//! an in-memory certificate provider and a scripted container runtime, and
//! checks the on-disk lab directory layout along the way.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::Mutex;

use async_trait::async_trait;

use labnet::cert::{CertError, CertInput, CertMaterial, CertProvider};
use labnet::config::{MgmtNet, NodeConfig, NodeExtras};
use labnet::nodes::{default_registry, NodeError, NodeMap};
use labnet::runtime::{ContainerRuntime, ExecOutput, RuntimeError};

/// Certificate provider fake: nothing on disk, generation scripted to
/// succeed or fail.
struct FakeCa {
    fail_generate: bool,
}

#[async_trait]
impl CertProvider for FakeCa {
    async fn retrieve(&self, cfg: &NodeConfig, _ca_dir: &Path) -> Result<CertMaterial, CertError> {
        Err(CertError::NotFound(cfg.short_name.clone()))
    }

    async fn generate(
        &self,
        _ca_cert: &Path,
        _ca_key: &Path,
        input: &CertInput,
        _output_dir: &Path,
    ) -> Result<CertMaterial, CertError> {
        if self.fail_generate {
            return Err(CertError::GenerationFailed("signer offline".to_string()));
        }
        Ok(CertMaterial {
            cert: format!("CERT-{}", input.name).into_bytes(),
            key: format!("KEY-{}", input.name).into_bytes(),
            csr: format!("CSR-{}", input.name).into_bytes(),
        })
    }
}

/// Runtime fake: records every call, answers readiness probes positively and
/// everything else with empty output.
#[derive(Default)]
struct RecordingRuntime {
    created: Mutex<Vec<String>>,
    execs: Mutex<Vec<Vec<String>>>,
    deleted: Mutex<Vec<String>>,
}

#[async_trait]
impl ContainerRuntime for RecordingRuntime {
    async fn create_container(&self, cfg: &NodeConfig) -> Result<String, RuntimeError> {
        self.created.lock().unwrap().push(cfg.long_name.clone());
        Ok(format!("id-{}", cfg.short_name))
    }

    async fn exec(&self, _container: &str, cmd: &[String]) -> Result<ExecOutput, RuntimeError> {
        self.execs.lock().unwrap().push(cmd.to_vec());
        let joined = cmd.join(" ");
        let stdout = if joined.contains("mgmt_server") {
            "mgmt_server state: running"
        } else if joined.contains("commit") {
            "commit 1 status: complete"
        } else {
            ""
        };
        Ok(ExecOutput {
            stdout: stdout.as_bytes().to_vec(),
            stderr: Vec::new(),
        })
    }

    async fn delete_container(&self, container: &str) -> Result<(), RuntimeError> {
        self.deleted.lock().unwrap().push(container.to_string());
        Ok(())
    }
}

fn node_config(lab_dir: PathBuf) -> NodeConfig {
    NodeConfig {
        short_name: "srl1".to_string(),
        long_name: "clab-demo-srl1".to_string(),
        fqdn: "srl1.demo.io".to_string(),
        kind: "srl".to_string(),
        image: "ghcr.io/nokia/srlinux:latest".to_string(),
        lab_dir,
        ..Default::default()
    }
}

#[tokio::test]
async fn full_lifecycle_produces_lab_artifacts() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let lab_dir = tmp.path().join("srl1");

    let license = tmp.path().join("srl.lic");
    fs::write(&license, "LICENSE-BYTES")?;
    let agent = tmp.path().join("myagent.yml");
    fs::write(&agent, "agent: spec")?;

    let mut cfg = node_config(lab_dir.clone());
    cfg.license = Some(license);
    cfg.extras = Some(NodeExtras {
        agents: vec![agent],
    });

    let registry = default_registry();
    let mut node = registry.new_node("srl")?;
    node.init(cfg)?;

    let runtime = Arc::new(RecordingRuntime::default());
    node.with_runtime(runtime.clone());
    node.with_mgmt_net(MgmtNet {
        network: "clab-mgmt".to_string(),
        ipv4_subnet: "172.20.20.0/24".to_string(),
        ..Default::default()
    });
    node.with_cert_provider(Arc::new(FakeCa {
        fail_generate: false,
    }));
    assert!(node.runtime().is_some());

    node.pre_deploy("demo", &tmp.path().join("ca"), &tmp.path().join("ca/root"))
        .await?;

    // certificate material landed in the config
    assert_eq!(node.config().tls_cert.as_deref(), Some("CERT-srl1"));
    assert_eq!(node.config().tls_key.as_deref(), Some("KEY-srl1"));

    // lab directory layout
    assert!(lab_dir.join("config").is_dir());
    assert!(lab_dir.join("topology.yml").is_file());
    assert_eq!(fs::read_to_string(lab_dir.join("license.key"))?, "LICENSE-BYTES");
    assert_eq!(
        fs::read_to_string(lab_dir.join("config/appmgr/myagent.yml"))?,
        "agent: spec"
    );

    node.deploy().await?;
    assert_eq!(
        runtime.created.lock().unwrap().as_slice(),
        &["clab-demo-srl1".to_string()]
    );

    node.post_deploy(&NodeMap::new()).await?;

    // readiness probes ran before the bootstrap apply
    let execs = runtime.execs.lock().unwrap().clone();
    assert!(execs.len() >= 3);
    assert!(execs[0].join(" ").contains("mgmt_server"));
    assert!(execs[1].join(" ").contains("commit"));
    let apply = execs.last().unwrap().join(" ");
    assert!(apply.contains("sr_cli -ed"));

    // bootstrap file rendered with the issued certificate
    let bootstrap = fs::read_to_string(lab_dir.join("config/clab-bootstrap.cfg"))?;
    assert!(bootstrap.contains("certificate \"CERT-srl1\""));
    assert!(bootstrap.contains("authenticate-client false"));

    node.save_config().await?;
    node.delete().await?;
    assert_eq!(
        runtime.deleted.lock().unwrap().as_slice(),
        &["clab-demo-srl1".to_string()]
    );

    Ok(())
}

#[tokio::test]
async fn pre_deploy_with_startup_config_skips_bootstrap() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let lab_dir = tmp.path().join("srl1");

    let startup = tmp.path().join("startup.json");
    fs::write(&startup, r#"{"hostname":"{{ name }}"}"#)?;

    let mut cfg = node_config(lab_dir.clone());
    cfg.startup_config = Some(startup);

    let registry = default_registry();
    let mut node = registry.new_node("srl")?;
    node.init(cfg)?;

    let runtime = Arc::new(RecordingRuntime::default());
    node.with_runtime(runtime.clone());
    node.with_cert_provider(Arc::new(FakeCa {
        fail_generate: false,
    }));

    node.pre_deploy("demo", &tmp.path().join("ca"), &tmp.path().join("ca/root"))
        .await?;

    // startup config rendered into the mounted config dir
    assert_eq!(
        fs::read_to_string(lab_dir.join("config/config.json"))?,
        r#"{"hostname":"srl1"}"#
    );

    node.deploy().await?;
    node.post_deploy(&NodeMap::new()).await?;

    // default bootstrap path skipped entirely: no execs at all
    assert!(runtime.execs.lock().unwrap().is_empty());

    Ok(())
}

#[tokio::test]
async fn strict_cert_failure_aborts_pre_deploy() {
    let tmp = tempfile::tempdir().unwrap();
    let cfg = node_config(tmp.path().join("srl1"));

    let registry = default_registry();
    let mut node = registry.new_node("srl").unwrap();
    node.init(cfg).unwrap();
    node.with_runtime(Arc::new(RecordingRuntime::default()));
    node.with_cert_provider(Arc::new(FakeCa { fail_generate: true }));

    let err = node
        .pre_deploy("demo", &tmp.path().join("ca"), &tmp.path().join("ca/root"))
        .await
        .unwrap_err();
    assert!(matches!(err, NodeError::Cert(_)));
}

#[tokio::test]
async fn legacy_cert_failure_is_tolerated() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let mut cfg = node_config(tmp.path().join("srl1"));
    cfg.strict_cert = false;

    let registry = default_registry();
    let mut node = registry.new_node("srl")?;
    node.init(cfg)?;
    node.with_runtime(Arc::new(RecordingRuntime::default()));
    node.with_cert_provider(Arc::new(FakeCa { fail_generate: true }));

    node.pre_deploy("demo", &tmp.path().join("ca"), &tmp.path().join("ca/root"))
        .await?;

    // legacy behavior: artifacts still produced, TLS fields stay empty
    assert!(node.config().tls_cert.is_none());
    assert!(tmp.path().join("srl1/topology.yml").is_file());
    Ok(())
}

#[tokio::test]
async fn registry_rejects_unknown_kind() {
    let registry = default_registry();
    let err = registry.new_node("ceos").err().unwrap();
    assert!(matches!(err, NodeError::UnknownKind(ref k) if k == "ceos"));
}

/// Topology descriptors of two nodes deployed in the same process must carry
/// different base MACs.
#[tokio::test]
async fn concurrent_nodes_get_distinct_macs() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let registry = default_registry();
    let mut macs = Vec::new();

    for i in 0..8 {
        let lab_dir = tmp.path().join(format!("srl{i}"));
        let mut cfg = node_config(lab_dir.clone());
        cfg.short_name = format!("srl{i}");
        cfg.long_name = format!("clab-demo-srl{i}");

        let mut node = registry.new_node("srl")?;
        node.init(cfg)?;
        node.with_runtime(Arc::new(RecordingRuntime::default()));
        node.with_cert_provider(Arc::new(FakeCa {
            fail_generate: false,
        }));
        node.pre_deploy("demo", &tmp.path().join("ca"), &tmp.path().join("ca/root"))
            .await?;

        let topo: serde_yaml::Value =
            serde_yaml::from_str(&fs::read_to_string(lab_dir.join("topology.yml"))?)?;
        macs.push(
            topo["chassis_configuration"]["chassis_mac_address"]
                .as_str()
                .unwrap()
                .to_string(),
        );
    }

    let distinct: std::collections::HashSet<_> = macs.iter().collect();
    assert_eq!(distinct.len(), macs.len(), "MAC collision across nodes: {macs:?}");
    Ok(())
}

#[test]
fn node_config_round_trips_through_serde() {
    let cfg = node_config(PathBuf::from("/tmp/lab/srl1"));
    let json = serde_json::to_string(&cfg).unwrap();
    let back: NodeConfig = serde_json::from_str(&json).unwrap();
    assert_eq!(back.short_name, "srl1");
    assert_eq!(back.kind, "srl");
    assert!(back.strict_cert);
}
