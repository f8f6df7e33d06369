//! Runtime client backed by the `k3d` binary
//!
//! Clusters are created from a generated k3d `Simple` config file (schema
//! `k3d.io/v1alpha5`), everything else through plain subcommands. Lookups use
//! `-o json` output.
//!
//! k3d prefixes the names it is given with `k3d-`, so node and registry
//! identities are passed without the prefix on creation. `k3d node create NAME`
//! names the container `k3d-NAME-0`; lookups and deletes by identity fall back
//! to that name.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::process::Command;
use tracing::{debug, info};

use super::{ClusterState, NodeState, RuntimeClient, RuntimeError};
use crate::filter::{to_filter_strings, NodeRole};
use crate::identity::OBJECT_NAME_PREFIX;
use crate::spec::{ClusterSpec, NodeRequest, Placed, RegistrySpec};

pub const SIMPLE_CONFIG_API_VERSION: &str = "k3d.io/v1alpha5";

/// k3d `Simple` cluster config
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SimpleConfig {
    pub api_version: String,
    pub kind: String,
    pub metadata: SimpleMetadata,
    pub servers: u32,
    pub agents: u32,
    #[serde(rename = "kubeAPI")]
    pub kube_api: SimpleExposure,
    pub image: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub network: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub volumes: Vec<SimpleVolume>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub ports: Vec<SimplePort>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub env: Vec<SimpleEnv>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub registries: Option<SimpleRegistries>,
    pub options: SimpleOptions,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SimpleMetadata {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SimpleExposure {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    #[serde(rename = "hostIP", skip_serializing_if = "Option::is_none")]
    pub host_ip: Option<String>,
    pub host_port: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SimpleVolume {
    pub volume: String,
    pub node_filters: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SimplePort {
    pub port: String,
    pub node_filters: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SimpleEnv {
    pub env_var: String,
    pub node_filters: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SimpleLabel {
    pub label: String,
    pub node_filters: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SimpleArg {
    pub arg: String,
    pub node_filters: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SimpleRegistries {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub create: Option<SimpleRegistryCreate>,
    #[serde(rename = "use", skip_serializing_if = "Vec::is_empty")]
    pub use_existing: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SimpleRegistryCreate {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    pub host_port: String,
    pub image: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SimpleOptions {
    pub k3d: SimpleK3dOptions,
    pub k3s: SimpleK3sOptions,
    pub kubeconfig: SimpleKubeconfigOptions,
    pub runtime: SimpleRuntimeOptions,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SimpleK3dOptions {
    pub wait: bool,
    pub disable_loadbalancer: bool,
    pub disable_image_volume: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SimpleK3sOptions {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub extra_args: Vec<SimpleArg>,
}

/// The pipeline merges kubeconfigs itself, so k3d never touches them
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SimpleKubeconfigOptions {
    pub update_default_kubeconfig: bool,
    pub switch_current_context: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SimpleRuntimeOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gpu_request: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub servers_memory: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agents_memory: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub labels: Vec<SimpleLabel>,
}

#[derive(Debug, Deserialize)]
struct ClusterJson {
    name: String,
    #[serde(default)]
    network: NetworkJson,
    #[serde(default, rename = "clusterToken", alias = "token")]
    token: String,
    #[serde(default)]
    nodes: Vec<NodeJson>,
}

#[derive(Debug, Default, Deserialize)]
struct NetworkJson {
    #[serde(default)]
    name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NodeJson {
    name: String,
    #[serde(default)]
    role: String,
    #[serde(default)]
    image: Option<String>,
    #[serde(default)]
    runtime_labels: BTreeMap<String, String>,
    #[serde(default)]
    k3s_node_labels: BTreeMap<String, String>,
}

impl From<NodeJson> for NodeState {
    fn from(node: NodeJson) -> Self {
        let mut labels = node.runtime_labels;
        labels.extend(node.k3s_node_labels);
        NodeState {
            name: node.name,
            role: node.role.parse::<NodeRole>().ok(),
            labels,
            image: node.image.filter(|i| !i.is_empty()),
        }
    }
}

// ============================================================================
// SBIO: Pure business logic (no I/O)
// ============================================================================

fn filtered<T, U>(
    values: &[Placed<T>],
    spec: &ClusterSpec,
    build: impl Fn(String, Vec<String>) -> U,
) -> Vec<U>
where
    T: std::fmt::Display,
{
    values
        .iter()
        .map(|v| build(v.value.to_string(), to_filter_strings(&v.targets, &spec.topology)))
        .collect()
}

/// Build the k3d config file for a processed cluster specification
pub fn simple_config(spec: &ClusterSpec) -> SimpleConfig {
    let registries = (!spec.registries.is_empty()).then(|| SimpleRegistries {
        create: spec
            .registries
            .mode
            .managed()
            .map(|r| SimpleRegistryCreate {
                name: r.name.clone(),
                host: r.host.clone(),
                host_port: r.host_port.to_string(),
                image: r.image.clone(),
            }),
        use_existing: spec.registries.mode.existing().to_vec(),
        config: spec.registries.config.clone(),
    });

    SimpleConfig {
        api_version: SIMPLE_CONFIG_API_VERSION.to_string(),
        kind: "Simple".to_string(),
        metadata: SimpleMetadata {
            name: spec.name.clone(),
        },
        servers: spec.topology.servers,
        agents: spec.topology.agents,
        kube_api: SimpleExposure {
            host: spec.kube_api.host.clone(),
            host_ip: spec.kube_api.host_ip.clone(),
            host_port: spec.kube_api.host_port.to_string(),
        },
        image: spec.image.clone(),
        network: spec.network.as_ref().map(|n| n.name.clone()),
        token: spec.token.clone(),
        volumes: filtered(&spec.volumes, spec, |volume, node_filters| SimpleVolume {
            volume,
            node_filters,
        }),
        ports: filtered(&spec.ports, spec, |port, node_filters| SimplePort {
            port,
            node_filters,
        }),
        env: filtered(&spec.env, spec, |env_var, node_filters| SimpleEnv {
            env_var,
            node_filters,
        }),
        registries,
        options: SimpleOptions {
            k3d: SimpleK3dOptions {
                wait: true,
                disable_loadbalancer: spec.engine.disable_load_balancer,
                disable_image_volume: spec.engine.disable_image_volume,
            },
            k3s: SimpleK3sOptions {
                extra_args: filtered(&spec.extra_args, spec, |arg, node_filters| SimpleArg {
                    arg,
                    node_filters,
                }),
            },
            kubeconfig: SimpleKubeconfigOptions {
                update_default_kubeconfig: false,
                switch_current_context: false,
            },
            runtime: SimpleRuntimeOptions {
                gpu_request: spec.runtime.gpu_request.clone(),
                servers_memory: spec.runtime.servers_memory.clone(),
                agents_memory: spec.runtime.agents_memory.clone(),
                labels: filtered(&spec.labels, spec, |label, node_filters| SimpleLabel {
                    label,
                    node_filters,
                }),
            },
        },
    }
}

pub fn render_simple_config(config: &SimpleConfig) -> Result<String, RuntimeError> {
    serde_yaml::to_string(config).map_err(|e| RuntimeError::Output(e.to_string()))
}

/// Name k3d expects for an object it will prefix itself
pub fn cli_name(identity: &str) -> &str {
    identity
        .strip_prefix(OBJECT_NAME_PREFIX)
        .and_then(|rest| rest.strip_prefix('-'))
        .unwrap_or(identity)
}

pub fn cluster_create_args(config_path: &Path) -> Vec<String> {
    vec![
        "cluster".to_string(),
        "create".to_string(),
        "--config".to_string(),
        config_path.to_string_lossy().into_owned(),
    ]
}

pub fn cluster_list_args(name: &str) -> Vec<String> {
    vec![
        "cluster".to_string(),
        "list".to_string(),
        name.to_string(),
        "-o".to_string(),
        "json".to_string(),
    ]
}

pub fn cluster_delete_args(name: &str) -> Vec<String> {
    vec!["cluster".to_string(), "delete".to_string(), name.to_string()]
}

pub fn kubeconfig_get_args(name: &str) -> Vec<String> {
    vec!["kubeconfig".to_string(), "get".to_string(), name.to_string()]
}

pub fn node_create_args(request: &NodeRequest) -> Vec<String> {
    let mut args = vec![
        "node".to_string(),
        "create".to_string(),
        cli_name(&request.name).to_string(),
        "--cluster".to_string(),
        request.cluster.clone(),
        "--role".to_string(),
        request.role.to_string(),
        "--image".to_string(),
        request.image.clone(),
    ];
    if let Some(memory) = &request.memory {
        args.push("--memory".to_string());
        args.push(memory.clone());
    }
    for (key, value) in &request.k3s_node_labels {
        args.push("--k3s-node-label".to_string());
        args.push(format!("{}={}", key, value));
    }
    args.push("--wait".to_string());
    args
}

pub fn node_list_args(name: &str) -> Vec<String> {
    vec![
        "node".to_string(),
        "list".to_string(),
        name.to_string(),
        "-o".to_string(),
        "json".to_string(),
    ]
}

pub fn node_delete_args(name: &str) -> Vec<String> {
    vec!["node".to_string(), "delete".to_string(), name.to_string()]
}

pub fn registry_create_args(registry: &RegistrySpec) -> Vec<String> {
    let mut args = vec![
        "registry".to_string(),
        "create".to_string(),
        cli_name(&registry.host).to_string(),
        "--image".to_string(),
        registry.image.clone(),
        "--port".to_string(),
    ];
    let bind = registry
        .exposure
        .host_ip
        .as_ref()
        .or(registry.exposure.host.as_ref());
    args.push(match bind {
        Some(bind) => format!("{}:{}", bind, registry.exposure.host_port),
        None => registry.exposure.host_port.to_string(),
    });
    let proxy = [
        ("--proxy-remote-url", &registry.proxy.remote_url),
        ("--proxy-username", &registry.proxy.username),
        ("--proxy-password", &registry.proxy.password),
    ];
    for (flag, value) in proxy {
        if let Some(value) = value {
            args.push(flag.to_string());
            args.push(value.clone());
        }
    }
    for volume in &registry.volumes {
        args.push("--volume".to_string());
        args.push(volume.to_string());
    }
    args
}

/// What k3d prints when the object a command names does not exist. Any other
/// "not found" (a network, an image) is a plain failure.
const MISSING_OBJECT_MESSAGES: &[&str] = &[
    "no nodes found for given cluster",
    "no cluster(s) found",
    "no node found",
    "no registry found",
    "no registries found",
];

/// Map a failed k3d invocation to a runtime error
pub fn classify_failure(
    command: &str,
    kind: &'static str,
    name: &str,
    stderr: &str,
) -> RuntimeError {
    let lower = stderr.to_lowercase();
    if MISSING_OBJECT_MESSAGES.iter().any(|m| lower.contains(m)) {
        RuntimeError::not_found(kind, name)
    } else if lower.contains("already exists") {
        RuntimeError::AlreadyExists {
            kind,
            name: name.to_string(),
        }
    } else {
        RuntimeError::Command {
            command: command.to_string(),
            stderr: stderr.trim().to_string(),
        }
    }
}

pub fn parse_cluster_list(output: &str, name: &str) -> Result<ClusterState, RuntimeError> {
    let clusters: Vec<ClusterJson> =
        serde_json::from_str(output).map_err(|e| RuntimeError::Output(e.to_string()))?;
    let cluster = clusters
        .into_iter()
        .find(|c| c.name == name)
        .ok_or_else(|| RuntimeError::not_found("cluster", name))?;
    Ok(ClusterState {
        name: cluster.name,
        network: cluster.network.name,
        token: cluster.token,
        nodes: cluster.nodes.into_iter().map(NodeState::from).collect(),
    })
}

pub fn parse_node_list(output: &str, name: &str) -> Result<NodeState, RuntimeError> {
    let nodes: Vec<NodeJson> =
        serde_json::from_str(output).map_err(|e| RuntimeError::Output(e.to_string()))?;
    nodes
        .into_iter()
        .find(|n| n.name == name)
        .map(NodeState::from)
        .ok_or_else(|| RuntimeError::not_found("node", name))
}

// ============================================================================
// I/O boundary
// ============================================================================

/// Runtime client that shells out to k3d
#[derive(Debug, Clone)]
pub struct K3dCli {
    binary: PathBuf,
}

impl K3dCli {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    async fn run(
        &self,
        args: &[String],
        kind: &'static str,
        name: &str,
    ) -> Result<String, RuntimeError> {
        let command = args.iter().take(2).cloned().collect::<Vec<_>>().join(" ");
        debug!(binary = %self.binary.display(), ?args, "Running k3d");

        let output = Command::new(&self.binary)
            .args(args)
            .output()
            .await
            .map_err(|e| RuntimeError::Spawn(format!("{}: {}", self.binary.display(), e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(classify_failure(&command, kind, name, &stderr));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    async fn find_node(&self, name: &str) -> Result<NodeState, RuntimeError> {
        let output = self.run(&node_list_args(name), "node", name).await?;
        parse_node_list(&output, name)
    }

    /// Container name k3d gave a node created from `name`
    fn replica_name(name: &str) -> String {
        format!("{}-0", name)
    }
}

impl Default for K3dCli {
    fn default() -> Self {
        Self::new("k3d")
    }
}

#[async_trait]
impl RuntimeClient for K3dCli {
    async fn cluster_get(&self, name: &str) -> Result<ClusterState, RuntimeError> {
        let output = self.run(&cluster_list_args(name), "cluster", name).await?;
        parse_cluster_list(&output, name)
    }

    async fn cluster_run(&self, spec: &ClusterSpec) -> Result<(), RuntimeError> {
        let content = render_simple_config(&simple_config(spec))?;
        let mut file = tempfile::Builder::new()
            .prefix("k3d-provider-")
            .suffix(".yaml")
            .tempfile()
            .map_err(|e| RuntimeError::Spawn(e.to_string()))?;
        file.write_all(content.as_bytes())
            .map_err(|e| RuntimeError::Spawn(e.to_string()))?;

        info!(cluster = %spec.name, "Creating cluster with k3d");
        self.run(&cluster_create_args(file.path()), "cluster", &spec.name)
            .await?;
        Ok(())
    }

    async fn cluster_delete(&self, name: &str) -> Result<(), RuntimeError> {
        self.run(&cluster_delete_args(name), "cluster", name).await?;
        Ok(())
    }

    async fn kubeconfig_get(&self, name: &str) -> Result<String, RuntimeError> {
        self.run(&kubeconfig_get_args(name), "cluster", name).await
    }

    async fn node_add(&self, request: &NodeRequest) -> Result<(), RuntimeError> {
        self.run(&node_create_args(request), "node", &request.name)
            .await?;
        Ok(())
    }

    async fn node_get(&self, name: &str) -> Result<NodeState, RuntimeError> {
        match self.find_node(name).await {
            Err(e) if e.is_not_found() => self.find_node(&Self::replica_name(name)).await,
            result => result,
        }
    }

    async fn node_delete(&self, name: &str) -> Result<(), RuntimeError> {
        let target = match self.find_node(name).await {
            Ok(node) => node.name,
            Err(e) if e.is_not_found() => Self::replica_name(name),
            Err(e) => return Err(e),
        };
        self.run(&node_delete_args(&target), "node", name).await?;
        Ok(())
    }

    async fn registry_run(&self, registry: &RegistrySpec) -> Result<(), RuntimeError> {
        info!(registry = %registry.host, "Creating registry with k3d");
        self.run(&registry_create_args(registry), "registry", &registry.host)
            .await?;
        Ok(())
    }
}
