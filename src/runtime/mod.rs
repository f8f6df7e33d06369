//! Cluster runtime collaborator
//!
//! The pipeline never talks to containers directly: it drives a
//! [`RuntimeClient`] handle injected at startup. [`k3d::K3dCli`] drives the
//! `k3d` binary; [`memory::InMemoryRuntime`] keeps everything in process and
//! supports failure injection for tests.

pub mod image;
pub mod k3d;
pub mod memory;
pub mod ports;

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::filter::NodeRole;
use crate::spec::{ClusterSpec, NodeRequest, RegistrySpec, LABEL_CLUSTER};

pub use image::{ChannelServer, DefaultImage, ImageError, VersionSource};
pub use k3d::K3dCli;
pub use memory::{FailPoint, InMemoryRuntime};
pub use ports::{PortAllocator, PortError};

/// Errors reported by a runtime client
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RuntimeError {
    #[error("{kind} '{name}' not found")]
    NotFound { kind: &'static str, name: String },

    #[error("{kind} '{name}' already exists")]
    AlreadyExists { kind: &'static str, name: String },

    #[error("Failed to run k3d: {0}")]
    Spawn(String),

    #[error("k3d {command} failed: {stderr}")]
    Command { command: String, stderr: String },

    #[error("Unexpected k3d output: {0}")]
    Output(String),

    #[error("{0}")]
    Failed(String),
}

impl RuntimeError {
    pub fn not_found(kind: &'static str, name: impl Into<String>) -> Self {
        RuntimeError::NotFound {
            kind,
            name: name.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, RuntimeError::NotFound { .. })
    }
}

/// Observed state of a running cluster
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterState {
    pub name: String,
    /// Network the cluster's nodes are attached to
    pub network: String,
    pub token: String,
    pub nodes: Vec<NodeState>,
}

/// Observed state of a single node or registry container
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeState {
    pub name: String,
    /// `None` for containers k3d does not treat as cluster nodes (registries)
    pub role: Option<NodeRole>,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

impl NodeState {
    /// Cluster the node belongs to, from its runtime labels
    pub fn cluster(&self) -> Option<&str> {
        self.labels.get(LABEL_CLUSTER).map(String::as_str)
    }
}

/// Operations the provisioning pipeline needs from the cluster runtime.
///
/// Clusters are addressed by their plain name, nodes and registries by their
/// identity (the container name).
#[async_trait]
pub trait RuntimeClient: Send + Sync {
    async fn cluster_get(&self, name: &str) -> Result<ClusterState, RuntimeError>;

    async fn cluster_run(&self, spec: &ClusterSpec) -> Result<(), RuntimeError>;

    async fn cluster_delete(&self, name: &str) -> Result<(), RuntimeError>;

    /// Raw kubeconfig document of a cluster
    async fn kubeconfig_get(&self, name: &str) -> Result<String, RuntimeError>;

    async fn node_add(&self, request: &NodeRequest) -> Result<(), RuntimeError>;

    async fn node_get(&self, name: &str) -> Result<NodeState, RuntimeError>;

    async fn node_delete(&self, name: &str) -> Result<(), RuntimeError>;

    async fn registry_run(&self, registry: &RegistrySpec) -> Result<(), RuntimeError>;
}
