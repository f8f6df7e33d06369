//! In-process runtime client
//!
//! Keeps clusters, nodes and registries in memory and can be told to fail at
//! chosen points. A failed cluster run leaves the cluster half-created, like a
//! real runtime that dies midway.

use std::collections::BTreeMap;
use std::sync::Mutex;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use dashmap::{DashMap, DashSet};
use tracing::debug;

use super::{ClusterState, NodeState, RuntimeClient, RuntimeError};
use crate::filter::NodeRole;
use crate::identity::{derive_id, ResourceKind};
use crate::spec::{ClusterSpec, NodeRequest, RegistrySpec, LABEL_CLUSTER, LABEL_ROLE};

/// Operations that can be made to fail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailPoint {
    ClusterRun,
    ClusterDelete,
    KubeconfigGet,
    NodeAdd,
    RegistryRun,
}

#[derive(Debug, Clone)]
struct StoredCluster {
    state: ClusterState,
    api_port: u16,
}

#[derive(Debug, Default)]
pub struct InMemoryRuntime {
    clusters: DashMap<String, StoredCluster>,
    /// Standalone nodes and registries, keyed by container name
    containers: DashMap<String, NodeState>,
    failures: DashSet<FailPoint>,
    calls: Mutex<Vec<String>>,
}

impl InMemoryRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make an operation fail until [`heal`](Self::heal) is called
    pub fn fail(&self, point: FailPoint) {
        self.failures.insert(point);
    }

    pub fn heal(&self, point: FailPoint) {
        self.failures.remove(&point);
    }

    /// Operations called so far, as `operation:name`
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    pub fn has_cluster(&self, name: &str) -> bool {
        self.clusters.contains_key(name)
    }

    pub fn cluster_count(&self) -> usize {
        self.clusters.len()
    }

    /// Role of a standalone node
    pub fn node_role(&self, name: &str) -> Option<NodeRole> {
        self.containers.get(name).and_then(|n| n.role)
    }

    fn record(&self, operation: &str, name: &str) {
        debug!(operation, name, "In-memory runtime call");
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(format!("{}:{}", operation, name));
        }
    }

    fn check(&self, point: FailPoint, name: &str) -> Result<(), RuntimeError> {
        if self.failures.contains(&point) {
            return Err(RuntimeError::Failed(format!(
                "injected {:?} failure for '{}'",
                point, name
            )));
        }
        Ok(())
    }

    fn cluster_state(spec: &ClusterSpec) -> ClusterState {
        let nodes = spec
            .nodes
            .iter()
            .map(|node| {
                let mut labels = node.labels.clone();
                labels.insert(LABEL_ROLE.to_string(), node.node.role.to_string());
                labels.insert(LABEL_CLUSTER.to_string(), spec.name.clone());
                NodeState {
                    name: node.name.clone(),
                    role: Some(node.node.role),
                    labels,
                    image: Some(node.image.clone()),
                }
            })
            .collect();
        ClusterState {
            name: spec.name.clone(),
            network: spec
                .network
                .as_ref()
                .map(|n| n.name.clone())
                .unwrap_or_default(),
            token: spec.token.clone().unwrap_or_default(),
            nodes,
        }
    }

    fn kubeconfig_for(identity: &str, api_port: u16) -> String {
        let user = format!("admin@{}", identity);
        format!(
            r#"apiVersion: v1
kind: Config
clusters:
  - name: {id}
    cluster:
      server: https://0.0.0.0:{port}
      certificate-authority-data: {ca}
users:
  - name: {user}
    user:
      client-certificate-data: {cert}
      client-key-data: {key}
contexts:
  - name: {id}
    context:
      cluster: {id}
      user: {user}
current-context: {id}
"#,
            id = identity,
            port = api_port,
            user = user,
            ca = STANDARD.encode(format!("CA for {}", identity)),
            cert = STANDARD.encode(format!("certificate for {}", user)),
            key = STANDARD.encode(format!("key for {}", user)),
        )
    }
}

#[async_trait]
impl RuntimeClient for InMemoryRuntime {
    async fn cluster_get(&self, name: &str) -> Result<ClusterState, RuntimeError> {
        self.record("cluster_get", name);
        self.clusters
            .get(name)
            .map(|c| c.state.clone())
            .ok_or_else(|| RuntimeError::not_found("cluster", name))
    }

    async fn cluster_run(&self, spec: &ClusterSpec) -> Result<(), RuntimeError> {
        self.record("cluster_run", &spec.name);
        if self.clusters.contains_key(&spec.name) {
            return Err(RuntimeError::AlreadyExists {
                kind: "cluster",
                name: spec.name.clone(),
            });
        }

        let mut state = Self::cluster_state(spec);
        let failed = self.check(FailPoint::ClusterRun, &spec.name);
        if failed.is_err() {
            // The first server came up before the failure
            state.nodes.truncate(1);
        }
        self.clusters.insert(
            spec.name.clone(),
            StoredCluster {
                state,
                api_port: spec.kube_api.host_port,
            },
        );
        failed
    }

    async fn cluster_delete(&self, name: &str) -> Result<(), RuntimeError> {
        self.record("cluster_delete", name);
        self.check(FailPoint::ClusterDelete, name)?;
        self.clusters
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| RuntimeError::not_found("cluster", name))?;
        self.containers
            .retain(|_, node| node.cluster() != Some(name));
        Ok(())
    }

    async fn kubeconfig_get(&self, name: &str) -> Result<String, RuntimeError> {
        self.record("kubeconfig_get", name);
        self.check(FailPoint::KubeconfigGet, name)?;
        let cluster = self
            .clusters
            .get(name)
            .ok_or_else(|| RuntimeError::not_found("cluster", name))?;
        let identity = derive_id(ResourceKind::Cluster, &cluster.state.name);
        Ok(Self::kubeconfig_for(identity.as_str(), cluster.api_port))
    }

    async fn node_add(&self, request: &NodeRequest) -> Result<(), RuntimeError> {
        self.record("node_add", &request.name);
        self.check(FailPoint::NodeAdd, &request.name)?;
        if !self.clusters.contains_key(&request.cluster) {
            return Err(RuntimeError::not_found("cluster", &request.cluster));
        }
        if self.containers.contains_key(&request.name) {
            return Err(RuntimeError::AlreadyExists {
                kind: "node",
                name: request.name.clone(),
            });
        }

        let mut labels = request.k3s_node_labels.clone();
        labels.insert(LABEL_CLUSTER.to_string(), request.cluster.clone());
        self.containers.insert(
            request.name.clone(),
            NodeState {
                name: request.name.clone(),
                role: Some(request.role),
                labels,
                image: Some(request.image.clone()),
            },
        );
        Ok(())
    }

    async fn node_get(&self, name: &str) -> Result<NodeState, RuntimeError> {
        self.record("node_get", name);
        if let Some(node) = self.containers.get(name) {
            return Ok(node.clone());
        }
        self.clusters
            .iter()
            .find_map(|c| c.state.nodes.iter().find(|n| n.name == name).cloned())
            .ok_or_else(|| RuntimeError::not_found("node", name))
    }

    async fn node_delete(&self, name: &str) -> Result<(), RuntimeError> {
        self.record("node_delete", name);
        self.containers
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| RuntimeError::not_found("node", name))
    }

    async fn registry_run(&self, registry: &RegistrySpec) -> Result<(), RuntimeError> {
        self.record("registry_run", &registry.host);
        self.check(FailPoint::RegistryRun, &registry.host)?;
        if self.containers.contains_key(&registry.host) {
            return Err(RuntimeError::AlreadyExists {
                kind: "registry",
                name: registry.host.clone(),
            });
        }

        let mut labels = BTreeMap::new();
        labels.insert(LABEL_ROLE.to_string(), "registry".to_string());
        self.containers.insert(
            registry.host.clone(),
            NodeState {
                name: registry.host.clone(),
                role: None,
                labels,
                image: Some(registry.image.clone()),
            },
        );
        Ok(())
    }
}
