//! Cluster provisioning
//!
//! ```text
//! ClusterIntent ─transform─▶ Transformed ─process─▶ Processed ─validate─▶ Validated
//!                                                                            │
//!                                     already exists? ◀───────── submit ─────┘
//!                                                            │
//!                               ok ◀─────────────────────────┴──▶ failed: compensating delete
//!                                │                                  ├─ gone      → CreationFailed
//!                  credential sync (best effort)                    └─ still there → CreationFailedRollbackFailed
//! ```
//!
//! Every stage before submission is pure: a failure there leaves nothing behind.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::{validate_memory, CredentialSyncError, Outcome, ProvisionError, Provisioner};
use crate::attributes::{ClusterAttributes, ResourceAttributes};
use crate::expand::{expand_cluster, flatten_cluster_state};
use crate::filter::{resolve, NodeRef, Topology};
use crate::identity::{derive_id, ResourceIdentity, ResourceKind};
use crate::kubeconfig::{flatten_credentials, parse_kubeconfig, Credentials, MergeOptions};
use crate::runtime::RuntimeError;
use crate::spec::{
    ClusterIntent, ClusterSpec, NetworkSpec, NodeSpec, Placed, Protocol, TaggedValue,
};

/// Cluster specification mapped from an intent, defaults not yet applied
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transformed(ClusterSpec);

/// Cluster specification with computed defaults and resolved node filters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Processed(ClusterSpec);

/// Cluster specification that passed every cross-field check
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Validated(ClusterSpec);

macro_rules! stage {
    ($($stage:ident),*) => {$(
        impl $stage {
            pub fn spec(&self) -> &ClusterSpec {
                &self.0
            }

            pub fn into_spec(self) -> ClusterSpec {
                self.0
            }
        }
    )*};
}

stage!(Transformed, Processed, Validated);

// ============================================================================
// SBIO: Pure stages (no I/O)
// ============================================================================

fn unplaced<T>(values: Vec<TaggedValue<T>>) -> Vec<Placed<T>> {
    values
        .into_iter()
        .map(|v| Placed {
            value: v.value,
            node_filters: v.node_filters,
            targets: BTreeSet::new(),
        })
        .collect()
}

/// Map an intent onto the cluster specification shape.
///
/// Nothing is dropped: every intent field has a place in the specification.
pub fn transform(intent: ClusterIntent) -> Transformed {
    let identity = derive_id(ResourceKind::Cluster, &intent.name);
    let topology = Topology::new(
        intent.servers,
        intent.agents,
        !intent.engine.disable_load_balancer,
    );
    debug!(cluster = %identity, ?topology, "Transformed cluster intent");

    Transformed(ClusterSpec {
        identity,
        name: intent.name,
        image: intent.image,
        topology,
        token: intent.token,
        network: intent.network.map(|name| NetworkSpec {
            name,
            external: true,
        }),
        kube_api: intent.kube_api,
        env: unplaced(intent.env),
        labels: unplaced(intent.labels),
        volumes: unplaced(intent.volumes),
        ports: unplaced(intent.ports),
        extra_args: unplaced(intent.k3s.extra_args),
        registries: intent.registries,
        engine: intent.engine,
        kubeconfig: intent.kubeconfig,
        runtime: intent.runtime,
        nodes: Vec::new(),
    })
}

fn place<T>(
    field: &str,
    values: &mut [Placed<T>],
    topology: &Topology,
) -> Result<(), ProvisionError> {
    for (i, value) in values.iter_mut().enumerate() {
        value.targets = resolve(&value.node_filters, topology)?;
        if value.targets.is_empty() {
            return Err(ProvisionError::InvalidConfiguration(format!(
                "{}[{}]: node filters {:?} match no nodes",
                field, i, value.node_filters
            )));
        }
    }
    Ok(())
}

fn strings_for<T: ToString>(values: &[Placed<T>], node: &NodeRef) -> Vec<String> {
    values
        .iter()
        .filter(|v| v.applies_to(node))
        .map(|v| v.value.to_string())
        .collect()
}

fn node_spec(spec: &ClusterSpec, node: NodeRef) -> NodeSpec {
    let labels: BTreeMap<String, String> = spec
        .labels
        .iter()
        .filter(|l| l.applies_to(&node))
        .map(|l| (l.value.key.clone(), l.value.value.clone()))
        .collect();
    NodeSpec {
        name: spec.node_name(&node),
        node,
        image: spec.image.clone(),
        memory: spec.runtime.memory_for(node.role).map(str::to_string),
        env: strings_for(&spec.env, &node),
        labels,
        volumes: strings_for(&spec.volumes, &node),
        ports: strings_for(&spec.ports, &node),
        args: strings_for(&spec.extra_args, &node),
    }
}

/// Fill computed defaults and resolve node filters against the topology.
///
/// A missing token is generated, a missing network is named after the
/// cluster identity. Values without filters land on every server node.
pub fn process(transformed: Transformed) -> Result<Processed, ProvisionError> {
    let mut spec = transformed.0;

    if spec.token.as_deref().map_or(true, str::is_empty) {
        spec.token = Some(Uuid::new_v4().simple().to_string());
    }
    if spec.network.is_none() {
        spec.network = Some(NetworkSpec {
            name: spec.identity.to_string(),
            external: false,
        });
    }

    let topology = spec.topology;
    place("env", &mut spec.env, &topology)?;
    place("label", &mut spec.labels, &topology)?;
    place("volume", &mut spec.volumes, &topology)?;
    place("port", &mut spec.ports, &topology)?;
    place("k3s.extra_args", &mut spec.extra_args, &topology)?;

    spec.nodes = topology
        .nodes()
        .into_iter()
        .map(|node| node_spec(&spec, node))
        .collect();

    debug!(
        cluster = %spec.identity,
        nodes = spec.nodes.len(),
        "Processed cluster specification"
    );
    Ok(Processed(spec))
}

fn invalid(message: String) -> ProvisionError {
    ProvisionError::InvalidConfiguration(message)
}

fn registry_address_matches(address: &str, names: &[&str]) -> bool {
    let host = match address.rsplit_once(':') {
        Some((host, port)) if port.bytes().all(|b| b.is_ascii_digit()) => host,
        _ => address,
    };
    names.contains(&host)
}

/// Check cross-field invariants of a processed specification
pub fn validate(processed: Processed) -> Result<Validated, ProvisionError> {
    let spec = processed.0;

    if spec.topology.servers < 1 {
        return Err(invalid(format!(
            "a cluster needs at least one server, got {}",
            spec.topology.servers
        )));
    }
    if spec.image.trim().is_empty() {
        return Err(invalid("image must not be empty".to_string()));
    }

    let mut host_ports: HashMap<(u16, Protocol), String> = HashMap::new();
    let mut claim = |port: u16, protocol: Protocol, owner: String| {
        if port == 0 {
            return Err(invalid(format!("{}: host port 0 was never allocated", owner)));
        }
        match host_ports.insert((port, protocol), owner.clone()) {
            Some(previous) => Err(invalid(format!(
                "host port {}/{} is used by both {} and {}",
                port, protocol, previous, owner
            ))),
            None => Ok(()),
        }
    };

    claim(spec.kube_api.host_port, Protocol::Tcp, "kube_api".to_string())?;
    for (i, port) in spec.ports.iter().enumerate() {
        if port.value.container_port == 0 {
            return Err(invalid(format!("port[{}]: container port must be 1-65535", i)));
        }
        claim(port.value.host_port, port.value.protocol, format!("port[{}]", i))?;
    }
    if let Some(managed) = spec.registries.mode.managed() {
        claim(managed.host_port, Protocol::Tcp, "registries.create".to_string())?;

        let prefixed = format!("k3d-{}", managed.name);
        let mut names = vec![managed.name.as_str(), prefixed.as_str()];
        if let Some(host) = &managed.host {
            names.push(host);
        }
        if let Some(address) = spec
            .registries
            .mode
            .existing()
            .iter()
            .find(|a| registry_address_matches(a, &names))
        {
            return Err(invalid(format!(
                "registry '{}' is both created and used as an existing registry ('{}')",
                managed.name, address
            )));
        }
    }
    if let Some(config) = &spec.registries.config {
        serde_yaml::from_str::<serde_yaml::Value>(config)
            .map_err(|e| invalid(format!("registries.config is not valid YAML: {}", e)))?;
    }

    for (i, arg) in spec.extra_args.iter().enumerate() {
        if arg.value.trim().is_empty() {
            return Err(invalid(format!("k3s.extra_args[{}]: arg must not be empty", i)));
        }
    }
    validate_memory("runtime.servers_memory", spec.runtime.servers_memory.as_deref())?;
    validate_memory("runtime.agents_memory", spec.runtime.agents_memory.as_deref())?;

    debug!(cluster = %spec.identity, "Validated cluster specification");
    Ok(Validated(spec))
}

/// Run every pure stage
pub fn plan(intent: ClusterIntent) -> Result<Validated, ProvisionError> {
    validate(process(transform(intent))?)
}

// ============================================================================
// I/O boundary
// ============================================================================

impl Provisioner {
    /// Build the desired state from attributes, resolving the default image if needed
    pub async fn cluster_intent(
        &self,
        attrs: &ClusterAttributes,
    ) -> Result<ClusterIntent, ProvisionError> {
        attrs.validate()?;
        let image = self.image_or_default(attrs.image.as_deref()).await?;
        Ok(expand_cluster(attrs, &image, &self.ports)?)
    }

    /// Resolve and validate a cluster without touching the runtime
    pub async fn plan_cluster(
        &self,
        attrs: &ClusterAttributes,
    ) -> Result<ClusterSpec, ProvisionError> {
        let intent = self.cluster_intent(attrs).await?;
        Ok(plan(intent)?.into_spec())
    }

    pub async fn create_cluster(
        &self,
        attrs: &ClusterAttributes,
    ) -> Result<Outcome<ClusterAttributes>, ProvisionError> {
        let intent = self.cluster_intent(attrs).await?;
        let validated = plan(intent)?;
        let spec = validated.spec();

        match self.runtime.cluster_get(&spec.name).await {
            Ok(_) => {
                return Err(ProvisionError::AlreadyExists {
                    kind: ResourceKind::Cluster,
                    name: spec.name.clone(),
                })
            }
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(ProvisionError::Runtime(e)),
        }

        info!(cluster = %spec.identity, servers = spec.topology.servers, agents = spec.topology.agents, "Creating cluster");
        if let Err(source) = self.runtime.cluster_run(spec).await {
            return Err(self.roll_back(&spec.name, source).await);
        }
        info!(cluster = %spec.identity, "Cluster created");

        let mut warnings = Vec::new();
        if spec.kubeconfig.update_default_kubeconfig {
            let options = MergeOptions {
                switch_current_context: spec.kubeconfig.switch_current_context,
            };
            if let Err(e) = self.sync_kubeconfig(&spec.name, options).await {
                warn!(cluster = %spec.identity, error = %e, "Failed to update the default kubeconfig");
                warnings.push(format!("failed to update the default kubeconfig: {}", e));
            }
        }

        let mut outcome = self.read_cluster(attrs).await?;
        warnings.append(&mut outcome.warnings);
        outcome.warnings = warnings;
        Ok(outcome)
    }

    /// Compensate a failed submission by deleting whatever was created. The
    /// rollback only counts once the cluster is confirmed gone.
    async fn roll_back(&self, name: &str, source: RuntimeError) -> ProvisionError {
        warn!(cluster = name, error = %source, "Cluster creation failed, rolling back");
        let deleted = match self.runtime.cluster_delete(name).await {
            Ok(()) => Ok(()),
            Err(e) if e.is_not_found() => {
                debug!(cluster = name, "Delete found nothing, checking the cluster is gone");
                Err(e)
            }
            Err(rollback) => {
                error!(cluster = name, error = %rollback, "Rollback failed, resources may be left behind");
                return ProvisionError::CreationFailedRollbackFailed {
                    name: name.to_string(),
                    source,
                    rollback,
                };
            }
        };

        match self.runtime.cluster_get(name).await {
            Err(e) if e.is_not_found() => {
                info!(cluster = name, "Rolled back");
                ProvisionError::CreationFailed {
                    kind: ResourceKind::Cluster,
                    name: name.to_string(),
                    source,
                }
            }
            remaining => {
                let rollback = match (deleted, remaining) {
                    (_, Err(e)) => e,
                    (Err(e), Ok(_)) => e,
                    (Ok(()), Ok(_)) => RuntimeError::Failed(format!(
                        "cluster '{}' still exists after delete",
                        name
                    )),
                };
                error!(cluster = name, error = %rollback, "Rollback not confirmed, resources may be left behind");
                ProvisionError::CreationFailedRollbackFailed {
                    name: name.to_string(),
                    source,
                    rollback,
                }
            }
        }
    }

    async fn sync_kubeconfig(
        &self,
        name: &str,
        options: MergeOptions,
    ) -> Result<(), CredentialSyncError> {
        let raw = self.runtime.kubeconfig_get(name).await?;
        let config = parse_kubeconfig(&raw)?;
        self.kubeconfig.merge(&config, options).await?;
        Ok(())
    }

    async fn credentials(
        &self,
        identity: &ResourceIdentity,
        name: &str,
    ) -> Result<Credentials, CredentialSyncError> {
        let raw = self.runtime.kubeconfig_get(name).await?;
        let config = parse_kubeconfig(&raw)?;
        Ok(flatten_credentials(identity, &config)?)
    }

    /// Read back network, token and credentials. Credential failures are warnings.
    pub async fn read_cluster(
        &self,
        attrs: &ClusterAttributes,
    ) -> Result<Outcome<ClusterAttributes>, ProvisionError> {
        let identity = derive_id(ResourceKind::Cluster, &attrs.name);
        let state = self
            .runtime
            .cluster_get(&attrs.name)
            .await
            .map_err(|e| ProvisionError::from_runtime(ResourceKind::Cluster, &attrs.name, e))?;

        let mut warnings = Vec::new();
        let credentials = match self.credentials(&identity, &attrs.name).await {
            Ok(credentials) => Some(credentials),
            Err(e) => {
                warn!(cluster = %identity, error = %e, "Failed to read cluster credentials");
                warnings.push(format!("failed to read credentials: {}", e));
                None
            }
        };

        let mut outcome = Outcome::new(
            identity,
            flatten_cluster_state(attrs, &state, credentials),
        );
        outcome.warnings = warnings;
        Ok(outcome)
    }

    pub async fn delete_cluster(&self, name: &str) -> Result<ResourceIdentity, ProvisionError> {
        let identity = derive_id(ResourceKind::Cluster, name);
        info!(cluster = %identity, "Deleting cluster");
        self.runtime
            .cluster_delete(name)
            .await
            .map_err(|e| ProvisionError::from_runtime(ResourceKind::Cluster, name, e))?;
        Ok(identity)
    }
}
