//! Resolved cluster specification handed to the runtime client

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use super::{
    EngineOptions, EnvVar, ExposureSpec, KubeconfigOptions, Label, PortMapping, RegistryIntent,
    RuntimeOptions, VolumeMount,
};
use crate::filter::{NodeRef, NodeRole, Topology};
use crate::identity::ResourceIdentity;

/// A scoped value together with the nodes it resolved to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Placed<T> {
    pub value: T,
    /// Filters as written, kept so nothing from the intent is lost
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub node_filters: Vec<String>,
    /// Filled in when filters are resolved
    #[serde(default)]
    pub targets: BTreeSet<NodeRef>,
}

impl<T> Placed<T> {
    pub fn applies_to(&self, node: &NodeRef) -> bool {
        self.targets.contains(node)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkSpec {
    pub name: String,
    /// The network already exists and is only joined
    pub external: bool,
}

/// Per-node view of a processed cluster
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeSpec {
    pub name: String,
    pub node: NodeRef,
    pub image: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memory: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub env: Vec<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub volumes: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ports: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,
}

/// Fully resolved cluster specification
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterSpec {
    pub identity: ResourceIdentity,
    pub name: String,
    pub image: String,
    pub topology: Topology,
    /// `None` until processed
    pub token: Option<String>,
    /// `None` until processed
    pub network: Option<NetworkSpec>,
    pub kube_api: ExposureSpec,
    pub env: Vec<Placed<EnvVar>>,
    pub labels: Vec<Placed<Label>>,
    pub volumes: Vec<Placed<VolumeMount>>,
    pub ports: Vec<Placed<PortMapping>>,
    pub extra_args: Vec<Placed<String>>,
    pub registries: RegistryIntent,
    pub engine: EngineOptions,
    pub kubeconfig: KubeconfigOptions,
    pub runtime: RuntimeOptions,
    /// Populated when processed
    pub nodes: Vec<NodeSpec>,
}

impl ClusterSpec {
    /// Runtime-facing container name of a node
    pub fn node_name(&self, node: &NodeRef) -> String {
        match node.role {
            NodeRole::LoadBalancer => format!("{}-serverlb", self.identity),
            role => format!("{}-{}-{}", self.identity, role, node.index),
        }
    }

    pub fn node(&self, node: &NodeRef) -> Option<&NodeSpec> {
        self.nodes.iter().find(|n| &n.node == node)
    }
}
