//! Attribute expansion and flattening
//!
//! `expand_*` turns validated attribute structs into domain values, applying
//! defaults along the way: a volume without a source becomes an anonymous
//! volume, a port without a protocol is TCP, and a missing or zero host port is
//! replaced by a freshly allocated ephemeral port. `flatten_*` goes the other
//! way, for read-back of computed fields and for showing resolved values.
//!
//! Flattening an expanded value and expanding it again yields the same value
//! without allocating new ports.

use thiserror::Error;

use crate::attributes::{
    AttributeError, ClusterAttributes, ClusterDataAttributes, ExposureAttributes,
    ExtraArgAttributes, K3dAttributes, K3sAttributes, KeyValueAttributes, KubeconfigAttributes,
    ManagedRegistryAttributes, NodeAttributes, NodeDataAttributes, PortAttributes,
    RegistriesAttributes, RegistryAttributes, RegistryCreateAttributes, RegistryVolumeAttributes,
    RuntimeAttributes, VolumeAttributes,
};
use crate::identity::{derive_id, ResourceKind};
use crate::kubeconfig::Credentials;
use crate::runtime::{ClusterState, NodeState, PortAllocator, PortError};
use crate::spec::{
    ClusterIntent, EngineOptions, EnvVar, ExposureSpec, K3sOptions, KubeconfigOptions, Label,
    ManagedRegistry, NodeRequest, PortMapping, Protocol, RegistryIntent, RegistryMode,
    RegistryProxy, RegistrySpec, RuntimeOptions, TaggedValue, VolumeMount, LABEL_ROLE,
    REGISTRY_IMAGE,
};

#[derive(Error, Debug)]
pub enum ExpandError {
    #[error("Failed to allocate a host port for '{field}': {source}")]
    PortAllocation {
        field: String,
        #[source]
        source: PortError,
    },

    #[error(transparent)]
    Attribute(#[from] AttributeError),
}

fn host_port(
    field: &str,
    requested: Option<u32>,
    ports: &PortAllocator,
) -> Result<u16, ExpandError> {
    match requested.and_then(|p| u16::try_from(p).ok()).filter(|&p| p != 0) {
        Some(port) => Ok(port),
        None => ports.allocate().map_err(|source| ExpandError::PortAllocation {
            field: field.to_string(),
            source,
        }),
    }
}

fn narrow_port(field: &str, port: u32) -> Result<u16, ExpandError> {
    u16::try_from(port).map_err(|_| {
        ExpandError::Attribute(AttributeError::InvalidValue {
            field: field.to_string(),
            reason: format!("{} is not a valid port number", port),
        })
    })
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value.as_ref().filter(|v| !v.is_empty()).cloned()
}

// ============================================================================
// Expansion
// ============================================================================

pub fn expand_env(env: &[KeyValueAttributes]) -> Vec<TaggedValue<EnvVar>> {
    env.iter()
        .map(|e| {
            TaggedValue::new(
                EnvVar {
                    key: e.key.clone(),
                    value: e.value.clone(),
                },
                e.node_filters.clone(),
            )
        })
        .collect()
}

pub fn expand_labels(labels: &[KeyValueAttributes]) -> Vec<TaggedValue<Label>> {
    labels
        .iter()
        .map(|l| {
            TaggedValue::new(
                Label {
                    key: l.key.clone(),
                    value: l.value.clone(),
                },
                l.node_filters.clone(),
            )
        })
        .collect()
}

pub fn expand_volume(volume: &VolumeAttributes) -> TaggedValue<VolumeMount> {
    let mount = match non_empty(&volume.source) {
        Some(source) => VolumeMount::bind(source, &volume.destination),
        None => VolumeMount::anonymous(&volume.destination),
    };
    TaggedValue::new(mount, volume.node_filters.clone())
}

pub fn expand_port(
    index: usize,
    port: &PortAttributes,
    ports: &PortAllocator,
) -> Result<TaggedValue<PortMapping>, ExpandError> {
    let protocol = match &port.protocol {
        Some(p) => p.parse::<Protocol>().map_err(|e| AttributeError::InvalidValue {
            field: format!("port[{}].protocol", index),
            reason: e.to_string(),
        })?,
        None => Protocol::default(),
    };
    let mapping = PortMapping {
        host: non_empty(&port.host),
        host_port: host_port(&format!("port[{}].host_port", index), port.host_port, ports)?,
        container_port: narrow_port(
            &format!("port[{}].container_port", index),
            port.container_port,
        )?,
        protocol,
    };
    Ok(TaggedValue::new(mapping, port.node_filters.clone()))
}

pub fn expand_exposure(
    field: &str,
    exposure: Option<&ExposureAttributes>,
    ports: &PortAllocator,
) -> Result<ExposureSpec, ExpandError> {
    let requested = exposure.and_then(|e| e.host_port);
    Ok(ExposureSpec {
        host: exposure.and_then(|e| non_empty(&e.host)),
        host_ip: exposure.and_then(|e| non_empty(&e.host_ip)),
        host_port: host_port(&format!("{}.host_port", field), requested, ports)?,
    })
}

fn expand_managed_registry(
    cluster: &str,
    create: &ManagedRegistryAttributes,
    ports: &PortAllocator,
) -> Result<ManagedRegistry, ExpandError> {
    let requested = create
        .host_port
        .as_deref()
        .filter(|p| !p.is_empty())
        .map(|p| {
            p.parse::<u32>().map_err(|_| AttributeError::InvalidValue {
                field: "registries.create.host_port".to_string(),
                reason: format!("'{}' is not a port number", p),
            })
        })
        .transpose()?;
    Ok(ManagedRegistry {
        name: non_empty(&create.name).unwrap_or_else(|| format!("{}-registry", cluster)),
        host: non_empty(&create.host),
        image: non_empty(&create.image).unwrap_or_else(|| REGISTRY_IMAGE.to_string()),
        host_port: host_port("registries.create.host_port", requested, ports)?,
    })
}

/// Expand the registries block into the tagged registry mode.
///
/// The legacy `create: true` flag creates a registry with every default.
pub fn expand_registries(
    cluster: &str,
    registries: Option<&RegistriesAttributes>,
    ports: &PortAllocator,
) -> Result<RegistryIntent, ExpandError> {
    let Some(registries) = registries else {
        return Ok(RegistryIntent::default());
    };

    let create = match &registries.create {
        None | Some(RegistryCreateAttributes::Legacy(false)) => None,
        Some(RegistryCreateAttributes::Legacy(true)) => Some(expand_managed_registry(
            cluster,
            &ManagedRegistryAttributes::default(),
            ports,
        )?),
        Some(RegistryCreateAttributes::Managed(m)) => {
            Some(expand_managed_registry(cluster, m, ports)?)
        }
    };
    let addresses = registries.use_existing.clone();

    let mode = match (create, addresses.is_empty()) {
        (None, true) => RegistryMode::NoRegistry,
        (Some(create), true) => RegistryMode::CreateManaged { create },
        (None, false) => RegistryMode::UseExisting { addresses },
        (Some(create), false) => RegistryMode::CreateAndUse { create, addresses },
    };
    Ok(RegistryIntent {
        mode,
        config: non_empty(&registries.config),
    })
}

pub fn expand_k3d(k3d: Option<&K3dAttributes>) -> EngineOptions {
    k3d.map(|k| EngineOptions {
        disable_image_volume: k.disable_image_volume,
        disable_load_balancer: k.disable_load_balancer,
    })
    .unwrap_or_default()
}

pub fn expand_k3s(k3s: Option<&K3sAttributes>) -> K3sOptions {
    K3sOptions {
        extra_args: k3s
            .map(|k| {
                k.extra_args
                    .iter()
                    .map(|a| TaggedValue::new(a.arg.clone(), a.node_filters.clone()))
                    .collect()
            })
            .unwrap_or_default(),
    }
}

pub fn expand_kubeconfig(kubeconfig: Option<&KubeconfigAttributes>) -> KubeconfigOptions {
    kubeconfig
        .map(|k| KubeconfigOptions {
            update_default_kubeconfig: k.update_default_kubeconfig,
            switch_current_context: k.switch_current_context,
        })
        .unwrap_or_default()
}

pub fn expand_runtime(runtime: Option<&RuntimeAttributes>) -> RuntimeOptions {
    runtime
        .map(|r| RuntimeOptions {
            agents_memory: non_empty(&r.agents_memory),
            gpu_request: non_empty(&r.gpu_request),
            servers_memory: non_empty(&r.servers_memory),
        })
        .unwrap_or_default()
}

/// Build the desired state of a cluster.
///
/// `image` is used when the attributes name none. Only port allocation can fail.
pub fn expand_cluster(
    attrs: &ClusterAttributes,
    image: &str,
    ports: &PortAllocator,
) -> Result<ClusterIntent, ExpandError> {
    let port_mappings = attrs
        .port
        .iter()
        .enumerate()
        .map(|(i, p)| expand_port(i, p, ports))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(ClusterIntent {
        name: attrs.name.clone(),
        servers: attrs.servers,
        agents: attrs.agents,
        image: non_empty(&attrs.image).unwrap_or_else(|| image.to_string()),
        network: non_empty(&attrs.network),
        token: non_empty(&attrs.token),
        env: expand_env(&attrs.env),
        labels: expand_labels(&attrs.label),
        volumes: attrs.volume.iter().map(expand_volume).collect(),
        ports: port_mappings,
        kube_api: expand_exposure("kube_api", attrs.kube_api.as_ref(), ports)?,
        registries: expand_registries(&attrs.name, attrs.registries.as_ref(), ports)?,
        engine: expand_k3d(attrs.k3d.as_ref()),
        k3s: expand_k3s(attrs.k3s.as_ref()),
        kubeconfig: expand_kubeconfig(attrs.kubeconfig.as_ref()),
        runtime: expand_runtime(attrs.runtime.as_ref()),
    })
}

/// Build the request for a standalone node
pub fn expand_node(attrs: &NodeAttributes, image: &str) -> Result<NodeRequest, ExpandError> {
    let role = attrs.node_role()?;
    let mut k3s_node_labels = std::collections::BTreeMap::new();
    k3s_node_labels.insert(LABEL_ROLE.to_string(), role.to_string());

    Ok(NodeRequest {
        name: derive_id(ResourceKind::Node, &attrs.name).to_string(),
        cluster: attrs.cluster.clone(),
        role,
        image: non_empty(&attrs.image).unwrap_or_else(|| image.to_string()),
        memory: non_empty(&attrs.memory),
        k3s_node_labels,
    })
}

pub fn expand_registry_volume(volume: &RegistryVolumeAttributes) -> VolumeMount {
    match non_empty(&volume.source) {
        Some(source) => VolumeMount::bind(source, &volume.destination),
        None => VolumeMount::anonymous(&volume.destination),
    }
}

/// Build the specification of a standalone registry
pub fn expand_registry(
    attrs: &RegistryAttributes,
    ports: &PortAllocator,
) -> Result<RegistrySpec, ExpandError> {
    Ok(RegistrySpec {
        host: derive_id(ResourceKind::Registry, &attrs.name).to_string(),
        image: non_empty(&attrs.image).unwrap_or_else(|| REGISTRY_IMAGE.to_string()),
        exposure: expand_exposure("port", attrs.port.as_ref(), ports)?,
        volumes: attrs.volume.iter().map(expand_registry_volume).collect(),
        proxy: RegistryProxy {
            remote_url: non_empty(&attrs.proxy_remote_url),
            username: non_empty(&attrs.proxy_username),
            password: non_empty(&attrs.proxy_password),
        },
    })
}

// ============================================================================
// Flattening
// ============================================================================

pub fn flatten_env(env: &TaggedValue<EnvVar>) -> KeyValueAttributes {
    KeyValueAttributes {
        key: env.value.key.clone(),
        value: env.value.value.clone(),
        node_filters: env.node_filters.clone(),
    }
}

pub fn flatten_label(label: &TaggedValue<Label>) -> KeyValueAttributes {
    KeyValueAttributes {
        key: label.value.key.clone(),
        value: label.value.value.clone(),
        node_filters: label.node_filters.clone(),
    }
}

pub fn flatten_volume(volume: &TaggedValue<VolumeMount>) -> VolumeAttributes {
    VolumeAttributes {
        source: volume.value.source.clone(),
        destination: volume.value.destination.clone(),
        node_filters: volume.node_filters.clone(),
    }
}

pub fn flatten_port(port: &TaggedValue<PortMapping>) -> PortAttributes {
    PortAttributes {
        host: port.value.host.clone(),
        host_port: Some(u32::from(port.value.host_port)),
        container_port: u32::from(port.value.container_port),
        protocol: Some(port.value.protocol.attribute_name().to_string()),
        node_filters: port.node_filters.clone(),
    }
}

pub fn flatten_exposure(exposure: &ExposureSpec) -> ExposureAttributes {
    ExposureAttributes {
        host: exposure.host.clone(),
        host_ip: exposure.host_ip.clone(),
        host_port: Some(u32::from(exposure.host_port)),
    }
}

pub fn flatten_registries(registries: &RegistryIntent) -> Option<RegistriesAttributes> {
    if registries.is_empty() {
        return None;
    }
    Some(RegistriesAttributes {
        create: registries.mode.managed().map(|r| {
            RegistryCreateAttributes::Managed(ManagedRegistryAttributes {
                name: Some(r.name.clone()),
                host: r.host.clone(),
                image: Some(r.image.clone()),
                host_port: Some(r.host_port.to_string()),
            })
        }),
        use_existing: registries.mode.existing().to_vec(),
        config: registries.config.clone(),
    })
}

/// Attributes that expand back into `intent` without allocating anything
pub fn flatten_intent(intent: &ClusterIntent) -> ClusterAttributes {
    let engine = intent.engine;
    let kubeconfig = intent.kubeconfig;
    ClusterAttributes {
        name: intent.name.clone(),
        servers: intent.servers,
        agents: intent.agents,
        image: Some(intent.image.clone()),
        network: intent.network.clone(),
        token: intent.token.clone(),
        env: intent.env.iter().map(flatten_env).collect(),
        label: intent.labels.iter().map(flatten_label).collect(),
        volume: intent.volumes.iter().map(flatten_volume).collect(),
        port: intent.ports.iter().map(flatten_port).collect(),
        kube_api: Some(flatten_exposure(&intent.kube_api)),
        k3d: (engine != EngineOptions::default()).then_some(K3dAttributes {
            disable_image_volume: engine.disable_image_volume,
            disable_load_balancer: engine.disable_load_balancer,
        }),
        k3s: (!intent.k3s.extra_args.is_empty()).then(|| K3sAttributes {
            extra_args: intent
                .k3s
                .extra_args
                .iter()
                .map(|a| ExtraArgAttributes {
                    arg: a.value.clone(),
                    node_filters: a.node_filters.clone(),
                })
                .collect(),
        }),
        kubeconfig: (kubeconfig != KubeconfigOptions::default()).then_some(
            KubeconfigAttributes {
                update_default_kubeconfig: kubeconfig.update_default_kubeconfig,
                switch_current_context: kubeconfig.switch_current_context,
            },
        ),
        registries: flatten_registries(&intent.registries),
        runtime: (intent.runtime != RuntimeOptions::default()).then(|| RuntimeAttributes {
            agents_memory: intent.runtime.agents_memory.clone(),
            gpu_request: intent.runtime.gpu_request.clone(),
            servers_memory: intent.runtime.servers_memory.clone(),
        }),
        credentials: None,
    }
}

/// Fill the computed cluster fields from observed state
pub fn flatten_cluster_state(
    attrs: &ClusterAttributes,
    state: &ClusterState,
    credentials: Option<Credentials>,
) -> ClusterAttributes {
    ClusterAttributes {
        network: Some(state.network.clone()),
        token: Some(state.token.clone()),
        credentials,
        ..attrs.clone()
    }
}

pub fn flatten_cluster_data(
    name: &str,
    state: &ClusterState,
    kubeconfig_raw: Option<String>,
) -> ClusterDataAttributes {
    ClusterDataAttributes {
        name: name.to_string(),
        network: Some(state.network.clone()),
        token: Some(state.token.clone()),
        kubeconfig_raw,
    }
}

pub fn flatten_node_data(name: &str, node: &NodeState) -> NodeDataAttributes {
    NodeDataAttributes {
        name: name.to_string(),
        cluster: node.cluster().map(str::to_string),
        role: node.role.map(|r| r.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attributes::{parse_attributes, AttributeFormat};
    use crate::filter::NodeRole;
    use crate::spec::LABEL_CLUSTER;
    use std::collections::BTreeMap;

    const IMAGE: &str = "docker.io/rancher/k3s:v1.31.4-k3s1";

    fn port(host_port: Option<u32>, protocol: Option<&str>) -> PortAttributes {
        PortAttributes {
            host: None,
            host_port,
            container_port: 80,
            protocol: protocol.map(str::to_string),
            node_filters: vec!["loadbalancer".to_string()],
        }
    }

    #[test]
    fn test_volume_without_source_is_anonymous() {
        let volume = expand_volume(&VolumeAttributes {
            source: Some(String::new()),
            destination: "/data".to_string(),
            node_filters: vec![],
        });
        assert_eq!(volume.value.to_string(), "/data");

        let volume = expand_volume(&VolumeAttributes {
            source: Some("/tmp".to_string()),
            destination: "/data".to_string(),
            node_filters: vec!["agent:*".to_string()],
        });
        assert_eq!(volume.value.to_string(), "/tmp:/data");
        assert_eq!(volume.node_filters, vec!["agent:*".to_string()]);
    }

    #[test]
    fn test_port_defaults() {
        let ports = PortAllocator::new();
        let mapping = expand_port(0, &port(Some(8080), None), &ports).unwrap();
        assert_eq!(mapping.value.to_string(), ":8080:80/tcp");
        assert_eq!(ports.issued(), 0);

        let mapping = expand_port(0, &port(None, Some("UDP")), &ports).unwrap();
        assert_eq!(mapping.value.protocol, Protocol::Udp);
        assert!(mapping.value.host_port > 0);
        assert_eq!(ports.issued(), 1);
    }

    #[test]
    fn test_zero_host_port_is_ephemeral() {
        let ports = PortAllocator::new();
        let a = expand_port(0, &port(Some(0), None), &ports).unwrap();
        let b = expand_port(1, &port(None, None), &ports).unwrap();
        assert_ne!(a.value.host_port, 0);
        assert_ne!(a.value.host_port, b.value.host_port);
    }

    #[test]
    fn test_kube_api_gets_ephemeral_port() {
        let ports = PortAllocator::new();
        let exposure = expand_exposure("kube_api", None, &ports).unwrap();
        assert!(exposure.host_port >= 1);
        assert_eq!(exposure.host, None);
    }

    #[test]
    fn test_legacy_registry_flag() {
        let ports = PortAllocator::new();
        let registries = RegistriesAttributes {
            create: Some(RegistryCreateAttributes::Legacy(true)),
            ..Default::default()
        };
        let intent = expand_registries("bar", Some(&registries), &ports).unwrap();
        let managed = intent.mode.managed().unwrap();
        assert_eq!(managed.name, "bar-registry");
        assert_eq!(managed.image, REGISTRY_IMAGE);
        assert!(managed.host_port >= 1);

        let disabled = RegistriesAttributes {
            create: Some(RegistryCreateAttributes::Legacy(false)),
            ..Default::default()
        };
        let intent = expand_registries("bar", Some(&disabled), &ports).unwrap();
        assert_eq!(intent.mode, RegistryMode::NoRegistry);
    }

    #[test]
    fn test_registry_create_and_use() {
        let ports = PortAllocator::new();
        let registries = RegistriesAttributes {
            create: Some(RegistryCreateAttributes::Managed(ManagedRegistryAttributes {
                name: Some("cache".to_string()),
                host_port: Some("5001".to_string()),
                ..Default::default()
            })),
            use_existing: vec!["k3d-shared:5000".to_string()],
            config: None,
        };
        let intent = expand_registries("bar", Some(&registries), &ports).unwrap();
        assert!(matches!(intent.mode, RegistryMode::CreateAndUse { .. }));
        assert_eq!(intent.mode.managed().unwrap().host_port, 5001);
        assert_eq!(intent.mode.existing(), ["k3d-shared:5000".to_string()]);
    }

    #[test]
    fn test_minimal_cluster() {
        let ports = PortAllocator::new();
        let intent = expand_cluster(&ClusterAttributes::new("bar"), IMAGE, &ports).unwrap();
        assert_eq!(intent.servers, 1);
        assert_eq!(intent.agents, 0);
        assert_eq!(intent.image, IMAGE);
        assert_eq!(intent.network, None);
        assert_eq!(intent.token, None);
        assert_eq!(intent.registries, RegistryIntent::default());
        assert_eq!(ports.issued(), 1);
    }

    #[test]
    fn test_explicit_image_wins() {
        let mut attrs = ClusterAttributes::new("bar");
        attrs.image = Some("rancher/k3s:v1.29.0-k3s1".to_string());
        let intent = expand_cluster(&attrs, IMAGE, &PortAllocator::new()).unwrap();
        assert_eq!(intent.image, "rancher/k3s:v1.29.0-k3s1");
    }

    #[test]
    fn test_flatten_expand_round_trip() {
        let yaml = r#"
name: demo
agents: 2
volume:
  - source: /tmp/data
    destination: /data
    node_filters: ["agent:*"]
  - destination: /cache
port:
  - host: 0.0.0.0
    host_port: 8080
    container_port: 80
    node_filters: ["loadbalancer"]
  - container_port: 53
    protocol: udp
k3s:
  extra_args:
    - arg: --disable=traefik
registries:
  create: true
"#;
        let attrs: ClusterAttributes = parse_attributes(yaml, AttributeFormat::Yaml).unwrap();
        let ports = PortAllocator::new();
        let intent = expand_cluster(&attrs, IMAGE, &ports).unwrap();
        let allocated = ports.issued();

        let flat = flatten_intent(&intent);
        let again = expand_cluster(&flat, IMAGE, &ports).unwrap();
        assert_eq!(again, intent);
        assert_eq!(ports.issued(), allocated);

        let encoded: Vec<String> = flat.volume.iter().map(|v| expand_volume(v).value.to_string()).collect();
        assert_eq!(encoded, vec!["/tmp/data:/data", "/cache"]);
        assert_eq!(
            intent.ports[0].value.to_string(),
            "0.0.0.0:8080:80/tcp"
        );
        assert_eq!(flat.port[1].protocol.as_deref(), Some("UDP"));
    }

    #[test]
    fn test_expand_node() {
        let mut attrs = NodeAttributes::new("extra", "bar");
        attrs.role = "Server".to_string();
        attrs.memory = Some("2g".to_string());
        let request = expand_node(&attrs, IMAGE).unwrap();
        assert_eq!(request.name, "k3d-extra");
        assert_eq!(request.role, NodeRole::Server);
        assert_eq!(request.image, IMAGE);
        assert_eq!(
            request.k3s_node_labels.get(LABEL_ROLE).map(String::as_str),
            Some("server")
        );
    }

    #[test]
    fn test_expand_registry() {
        let mut attrs = RegistryAttributes::new("cache");
        attrs.port = Some(ExposureAttributes {
            host_port: Some(5005),
            ..Default::default()
        });
        attrs.proxy_remote_url = Some("https://registry-1.docker.io".to_string());
        attrs.volume.push(RegistryVolumeAttributes {
            source: None,
            destination: "/var/lib/registry".to_string(),
        });
        let spec = expand_registry(&attrs, &PortAllocator::new()).unwrap();
        assert_eq!(spec.host, "k3d-cache");
        assert_eq!(spec.image, REGISTRY_IMAGE);
        assert_eq!(spec.exposure.host_port, 5005);
        assert_eq!(spec.volumes[0].to_string(), "/var/lib/registry");
    }

    #[test]
    fn test_flatten_state_is_idempotent() {
        let attrs = ClusterAttributes::new("bar");
        let state = ClusterState {
            name: "bar".to_string(),
            network: "k3d-bar".to_string(),
            token: "secret".to_string(),
            nodes: Vec::new(),
        };
        let once = flatten_cluster_state(&attrs, &state, None);
        let twice = flatten_cluster_state(&once, &state, None);
        assert_eq!(once, twice);
        assert_eq!(once.network.as_deref(), Some("k3d-bar"));
    }

    #[test]
    fn test_flatten_node_data() {
        let mut labels = BTreeMap::new();
        labels.insert(LABEL_CLUSTER.to_string(), "bar".to_string());
        let node = NodeState {
            name: "k3d-extra".to_string(),
            role: Some(NodeRole::Agent),
            labels,
            image: None,
        };
        let data = flatten_node_data("extra", &node);
        assert_eq!(data.cluster.as_deref(), Some("bar"));
        assert_eq!(data.role.as_deref(), Some("agent"));
    }
}
