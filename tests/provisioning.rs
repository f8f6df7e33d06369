//! End-to-end provisioning against the in-memory runtime
//!
//! Every test drives the public `Provisioner` API the way the CLI does, with
//! failures injected into the runtime where a scenario needs them.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio_test::assert_ok;

use k3d_provider::attributes::{
    parse_attributes, AttributeFormat, ClusterAttributes, KubeconfigAttributes, NodeAttributes,
    RegistryAttributes,
};
use k3d_provider::identity::ResourceKind;
use k3d_provider::kubeconfig::KubeconfigStore;
use k3d_provider::pipeline::{ProvisionError, Provisioner, Severity};
use k3d_provider::runtime::k3d::classify_failure;
use k3d_provider::runtime::{
    ClusterState, DefaultImage, FailPoint, ImageError, InMemoryRuntime, NodeState, PortAllocator,
    RuntimeClient, RuntimeError, VersionSource,
};
use k3d_provider::spec::{ClusterSpec, NodeRequest, RegistrySpec};

const IMAGE: &str = "docker.io/rancher/k3s:v1.31.4-k3s1";

struct Harness {
    runtime: Arc<InMemoryRuntime>,
    provisioner: Provisioner,
    dir: tempfile::TempDir,
}

fn harness() -> Harness {
    let dir = tempfile::tempdir().expect("tempdir");
    let runtime = Arc::new(InMemoryRuntime::new());
    let provisioner = Provisioner::new(
        runtime.clone(),
        Arc::new(DefaultImage::fixed(IMAGE)),
        Arc::new(KubeconfigStore::new(dir.path().join(".kube").join("config"))),
    );
    Harness {
        runtime,
        provisioner,
        dir,
    }
}

fn cluster(yaml: &str) -> ClusterAttributes {
    parse_attributes(yaml, AttributeFormat::Yaml).expect("valid cluster attributes")
}

/// Version source that counts lookups and can be told to fail
#[derive(Default)]
struct CountingSource {
    lookups: AtomicUsize,
    failures_left: AtomicUsize,
}

#[async_trait]
impl VersionSource for CountingSource {
    async fn latest(&self, channel: &str) -> Result<String, ImageError> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        if self.failures_left.load(Ordering::SeqCst) > 0 {
            self.failures_left.fetch_sub(1, Ordering::SeqCst);
            return Err(ImageError::Request {
                url: "http://channels.test".to_string(),
                reason: "connection refused".to_string(),
            });
        }
        assert_eq!(channel, "stable");
        Ok("v1.31.4+k3s1".to_string())
    }
}

#[tokio::test]
async fn test_minimal_cluster_gets_computed_fields() {
    let h = harness();
    let outcome = assert_ok!(h.provisioner.create_cluster(&cluster("name: bar")).await);

    assert_eq!(outcome.id.as_str(), "k3d-bar");
    assert_eq!(outcome.attributes.network.as_deref(), Some("k3d-bar"));
    assert!(outcome.attributes.token.as_deref().is_some_and(|t| !t.is_empty()));
    let credentials = outcome.attributes.credentials.expect("credentials");
    assert!(credentials.host.starts_with("https://"));
    assert!(!credentials.client_certificate.is_empty());
    assert!(outcome.warnings.is_empty());
    assert!(h.runtime.has_cluster("bar"));
}

#[tokio::test]
async fn test_failed_creation_is_rolled_back() {
    let h = harness();
    h.runtime.fail(FailPoint::ClusterRun);

    let err = h
        .provisioner
        .create_cluster(&cluster("name: bar\nagents: 2"))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        ProvisionError::CreationFailed {
            kind: ResourceKind::Cluster,
            ..
        }
    ));
    assert_eq!(err.severity(), Severity::Error);
    assert!(h.runtime.calls().contains(&"cluster_delete:bar".to_string()));
    assert!(!h.runtime.has_cluster("bar"));
}

#[tokio::test]
async fn test_failed_rollback_is_fatal() {
    let h = harness();
    h.runtime.fail(FailPoint::ClusterRun);
    h.runtime.fail(FailPoint::ClusterDelete);

    let err = h
        .provisioner
        .create_cluster(&cluster("name: bar"))
        .await
        .unwrap_err();

    assert!(matches!(err, ProvisionError::CreationFailedRollbackFailed { .. }));
    assert_eq!(err.severity(), Severity::Fatal);
    assert!(err.to_string().contains("also FAILED to roll back"));
    assert!(h.runtime.has_cluster("bar"));
}

/// Runtime whose cluster delete fails without removing anything
struct StuckDelete {
    inner: Arc<InMemoryRuntime>,
    error: RuntimeError,
}

#[async_trait]
impl RuntimeClient for StuckDelete {
    async fn cluster_get(&self, name: &str) -> Result<ClusterState, RuntimeError> {
        self.inner.cluster_get(name).await
    }

    async fn cluster_run(&self, spec: &ClusterSpec) -> Result<(), RuntimeError> {
        self.inner.cluster_run(spec).await
    }

    async fn cluster_delete(&self, _name: &str) -> Result<(), RuntimeError> {
        Err(self.error.clone())
    }

    async fn kubeconfig_get(&self, name: &str) -> Result<String, RuntimeError> {
        self.inner.kubeconfig_get(name).await
    }

    async fn node_add(&self, request: &NodeRequest) -> Result<(), RuntimeError> {
        self.inner.node_add(request).await
    }

    async fn node_get(&self, name: &str) -> Result<NodeState, RuntimeError> {
        self.inner.node_get(name).await
    }

    async fn node_delete(&self, name: &str) -> Result<(), RuntimeError> {
        self.inner.node_delete(name).await
    }

    async fn registry_run(&self, registry: &RegistrySpec) -> Result<(), RuntimeError> {
        self.inner.registry_run(registry).await
    }
}

async fn create_with_stuck_delete(error: RuntimeError) -> (ProvisionError, Arc<InMemoryRuntime>) {
    let dir = tempfile::tempdir().unwrap();
    let inner = Arc::new(InMemoryRuntime::new());
    inner.fail(FailPoint::ClusterRun);
    let provisioner = Provisioner::new(
        Arc::new(StuckDelete {
            inner: inner.clone(),
            error,
        }),
        Arc::new(DefaultImage::fixed(IMAGE)),
        Arc::new(KubeconfigStore::new(dir.path().join("config"))),
    );
    let err = provisioner
        .create_cluster(&cluster("name: bar"))
        .await
        .unwrap_err();
    (err, inner)
}

#[tokio::test]
async fn test_missing_network_during_rollback_is_fatal() {
    let stderr =
        "failed to delete cluster 'bar': Error response from daemon: network k3d-bar not found";
    let (err, runtime) =
        create_with_stuck_delete(classify_failure("cluster delete", "cluster", "bar", stderr))
            .await;

    assert!(matches!(err, ProvisionError::CreationFailedRollbackFailed { .. }));
    assert_eq!(err.severity(), Severity::Fatal);
    assert!(runtime.has_cluster("bar"));
}

#[tokio::test]
async fn test_rollback_not_found_is_confirmed() {
    let (err, runtime) = create_with_stuck_delete(RuntimeError::not_found("cluster", "bar")).await;

    assert!(matches!(err, ProvisionError::CreationFailedRollbackFailed { .. }));
    assert_eq!(err.severity(), Severity::Fatal);
    assert!(runtime.has_cluster("bar"));
}

#[tokio::test]
async fn test_existing_cluster_is_not_touched() {
    let h = harness();
    assert_ok!(h.provisioner.create_cluster(&cluster("name: bar")).await);

    let err = h
        .provisioner
        .create_cluster(&cluster("name: bar\nagents: 3"))
        .await
        .unwrap_err();

    assert!(matches!(err, ProvisionError::AlreadyExists { .. }));
    let runs = h
        .runtime
        .calls()
        .iter()
        .filter(|c| c.as_str() == "cluster_run:bar")
        .count();
    assert_eq!(runs, 1);
    assert!(!h.runtime.calls().contains(&"cluster_delete:bar".to_string()));
}

#[tokio::test]
async fn test_invalid_configuration_never_reaches_runtime() {
    let h = harness();
    let attrs = cluster(
        r#"
name: bar
port:
  - {host_port: 8080, container_port: 80, node_filters: [loadbalancer]}
  - {host_port: 8080, container_port: 443, node_filters: [loadbalancer]}
"#,
    );

    let err = h.provisioner.create_cluster(&attrs).await.unwrap_err();
    assert!(matches!(err, ProvisionError::InvalidConfiguration(_)));
    assert!(h.runtime.calls().is_empty());
}

#[tokio::test]
async fn test_bad_filters_are_reported() {
    let h = harness();
    let err = h
        .provisioner
        .create_cluster(&cluster(
            "name: bar\nenv: [{key: A, value: '1', node_filters: ['server[x]']}]",
        ))
        .await
        .unwrap_err();
    assert!(matches!(err, ProvisionError::InvalidFilterSyntax(_)));

    let err = h
        .provisioner
        .create_cluster(&cluster(
            "name: bar\nenv: [{key: A, value: '1', node_filters: ['master:0']}]",
        ))
        .await
        .unwrap_err();
    assert!(matches!(err, ProvisionError::UnknownRole { .. }));
    assert!(h.runtime.calls().is_empty());
}

#[tokio::test]
async fn test_concurrent_creations_get_distinct_ports() {
    let h = harness();
    let ports = PortAllocator::new();
    let a = h.provisioner.clone().with_ports(ports.clone());
    let b = h.provisioner.clone().with_ports(ports.clone());

    let first = cluster("name: one\nport: [{container_port: 80, node_filters: [loadbalancer]}]");
    let second = cluster("name: two\nport: [{container_port: 80, node_filters: [loadbalancer]}]");
    let (one, two) = tokio::join!(a.plan_cluster(&first), b.plan_cluster(&second));
    let (one, two) = (one.unwrap(), two.unwrap());

    let issued: HashSet<u16> = [
        one.kube_api.host_port,
        one.ports[0].value.host_port,
        two.kube_api.host_port,
        two.ports[0].value.host_port,
    ]
    .into_iter()
    .collect();
    assert_eq!(issued.len(), 4);
    assert_eq!(ports.issued(), 4);
}

#[tokio::test]
async fn test_credentials_merged_into_kubeconfig() {
    let h = harness();
    let mut attrs = cluster("name: bar");
    attrs.kubeconfig = Some(KubeconfigAttributes {
        update_default_kubeconfig: true,
        switch_current_context: true,
    });

    let outcome = assert_ok!(h.provisioner.create_cluster(&attrs).await);
    assert!(outcome.warnings.is_empty());

    let config = assert_ok!(h.provisioner.kubeconfig_store().load().await);
    assert_eq!(config.current_context.as_deref(), Some("k3d-bar"));
    assert!(config.users.iter().any(|u| u.name == "admin@k3d-bar"));
}

#[tokio::test]
async fn test_kubeconfig_failure_is_only_a_warning() {
    let h = harness();
    // A directory cannot be read as a kubeconfig file
    let provisioner = Provisioner::new(
        h.runtime.clone(),
        Arc::new(DefaultImage::fixed(IMAGE)),
        Arc::new(KubeconfigStore::new(h.dir.path())),
    );
    let mut attrs = cluster("name: bar");
    attrs.kubeconfig = Some(KubeconfigAttributes {
        update_default_kubeconfig: true,
        switch_current_context: false,
    });

    let outcome = assert_ok!(provisioner.create_cluster(&attrs).await);
    assert_eq!(outcome.warnings.len(), 1);
    assert!(outcome.warnings[0].contains("kubeconfig"));
    assert!(h.runtime.has_cluster("bar"));
}

#[tokio::test]
async fn test_default_image_resolved_once_and_retried_after_failure() {
    let dir = tempfile::tempdir().unwrap();
    let source = Arc::new(CountingSource::default());
    source.failures_left.store(1, Ordering::SeqCst);
    let runtime = Arc::new(InMemoryRuntime::new());
    let provisioner = Provisioner::new(
        runtime,
        Arc::new(DefaultImage::new(source.clone(), "stable")),
        Arc::new(KubeconfigStore::new(dir.path().join("config"))),
    );

    let err = provisioner
        .plan_cluster(&cluster("name: bar"))
        .await
        .unwrap_err();
    assert!(matches!(err, ProvisionError::DefaultImage(_)));

    let spec = assert_ok!(provisioner.plan_cluster(&cluster("name: bar")).await);
    assert_eq!(spec.image, "docker.io/rancher/k3s:v1.31.4-k3s1");
    assert_ok!(provisioner.plan_cluster(&cluster("name: baz")).await);
    assert_eq!(source.lookups.load(Ordering::SeqCst), 2);

    let explicit = cluster("name: qux\nimage: rancher/k3s:v1.29.0-k3s1");
    let spec = assert_ok!(provisioner.plan_cluster(&explicit).await);
    assert_eq!(spec.image, "rancher/k3s:v1.29.0-k3s1");
    assert_eq!(source.lookups.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_node_and_registry_lifecycle() {
    let h = harness();
    assert_ok!(h.provisioner.create_cluster(&cluster("name: bar")).await);

    let node = NodeAttributes::new("extra", "bar");
    let outcome = assert_ok!(h.provisioner.create_node(&node).await);
    assert_eq!(outcome.id.as_str(), "k3d-extra");
    assert_eq!(outcome.attributes.role, "agent");

    let data = assert_ok!(h.provisioner.get_node("extra").await);
    assert_eq!(data.attributes.cluster.as_deref(), Some("bar"));

    let registry = RegistryAttributes::new("cache");
    let outcome = assert_ok!(h.provisioner.create_registry(&registry).await);
    assert_eq!(outcome.id.as_str(), "k3d-cache");
    assert_ok!(h.provisioner.get_registry("cache").await);

    assert_ok!(h.provisioner.delete_node("extra").await);
    assert_ok!(h.provisioner.delete_registry("cache").await);
    assert_ok!(h.provisioner.delete_cluster("bar").await);
    assert_eq!(h.runtime.cluster_count(), 0);
    assert!(h
        .provisioner
        .get_cluster("bar")
        .await
        .unwrap_err()
        .is_not_found());
}

#[tokio::test]
async fn test_managed_registry_cluster() {
    let h = harness();
    let attrs = cluster(
        r#"
name: bar
registries:
  create: {name: cache}
  use: ["k3d-mirror:5000"]
  config: |
    mirrors:
      docker.io:
        endpoint: ["http://k3d-mirror:5000"]
"#,
    );
    let spec = assert_ok!(h.provisioner.plan_cluster(&attrs).await);
    let managed = spec.registries.mode.managed().expect("managed registry");
    assert_eq!(managed.name, "cache");
    assert_ne!(managed.host_port, 0);
    assert_eq!(spec.registries.mode.existing(), ["k3d-mirror:5000".to_string()]);
}
