//! Domain model
//!
//! Statically typed counterparts of the flat attribute files: the desired
//! state of a cluster (`ClusterIntent`), the fully resolved specification
//! handed to the runtime (`ClusterSpec`), and the node and registry requests.

pub mod cluster;
pub mod port;
pub mod registry;
pub mod volume;

use std::fmt;

use serde::{Deserialize, Serialize};

pub use cluster::{ClusterSpec, NetworkSpec, NodeSpec, Placed};
pub use port::{ExposureSpec, PortMapping, PortParseError, Protocol};
pub use registry::{
    ManagedRegistry, RegistryIntent, RegistryMode, RegistryProxy, RegistrySpec,
};
pub use volume::VolumeMount;

use crate::filter::NodeRole;

/// Cluster a node joins when none is given
pub const DEFAULT_CLUSTER_NAME: &str = "k3s-default";

/// Repository of the k3s node image
pub const K3S_IMAGE_REPO: &str = "docker.io/rancher/k3s";

/// Default image of managed registries
pub const REGISTRY_IMAGE: &str = "docker.io/library/registry:2";

/// Container label carrying the node role
pub const LABEL_ROLE: &str = "k3d.role";

/// Container label carrying the owning cluster name
pub const LABEL_CLUSTER: &str = "k3d.cluster";

/// A value that applies only to the nodes selected by its filters.
///
/// An empty filter list means "every server node".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaggedValue<T> {
    pub value: T,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub node_filters: Vec<String>,
}

impl<T> TaggedValue<T> {
    pub fn new(value: T, node_filters: Vec<String>) -> Self {
        Self {
            value,
            node_filters,
        }
    }

    pub fn untargeted(value: T) -> Self {
        Self::new(value, Vec::new())
    }
}

/// Environment variable, encoded `KEY=VALUE`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvVar {
    pub key: String,
    pub value: String,
}

impl fmt::Display for EnvVar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.key, self.value)
    }
}

/// Container label, encoded `key=value`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Label {
    pub key: String,
    pub value: String,
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.key, self.value)
    }
}

/// k3d behaviour switches
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct EngineOptions {
    pub disable_image_volume: bool,
    pub disable_load_balancer: bool,
}

/// Options passed on to k3s itself
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct K3sOptions {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extra_args: Vec<TaggedValue<String>>,
}

/// What to do with the local kubeconfig after creation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct KubeconfigOptions {
    pub update_default_kubeconfig: bool,
    pub switch_current_context: bool,
}

/// Container runtime resource limits
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RuntimeOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agents_memory: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gpu_request: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub servers_memory: Option<String>,
}

impl RuntimeOptions {
    pub fn memory_for(&self, role: NodeRole) -> Option<&str> {
        match role {
            NodeRole::Server => self.servers_memory.as_deref(),
            NodeRole::Agent => self.agents_memory.as_deref(),
            NodeRole::LoadBalancer => None,
        }
    }
}

/// Desired state of a cluster, built fresh from attributes on every call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterIntent {
    pub name: String,
    pub servers: u32,
    pub agents: u32,
    pub image: String,
    /// Existing network to join; `None` creates one
    pub network: Option<String>,
    /// Cluster join token; `None` generates one
    pub token: Option<String>,
    pub env: Vec<TaggedValue<EnvVar>>,
    pub labels: Vec<TaggedValue<Label>>,
    pub volumes: Vec<TaggedValue<VolumeMount>>,
    pub ports: Vec<TaggedValue<PortMapping>>,
    pub kube_api: ExposureSpec,
    pub registries: RegistryIntent,
    pub engine: EngineOptions,
    pub k3s: K3sOptions,
    pub kubeconfig: KubeconfigOptions,
    pub runtime: RuntimeOptions,
}

/// Request to add a single node to an existing cluster
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeRequest {
    /// Runtime-facing node name (the node identity)
    pub name: String,
    pub cluster: String,
    pub role: NodeRole,
    pub image: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memory: Option<String>,
    /// Kubernetes labels k3s registers the node with
    pub k3s_node_labels: std::collections::BTreeMap<String, String>,
}
