//! Cluster resource and data source attributes

use serde::{Deserialize, Serialize};

use super::{
    validate_ip, validate_name, validate_not_empty, validate_port, AttributeError,
    ResourceAttributes,
};
use crate::kubeconfig::Credentials;
use crate::spec::Protocol;

/// Attributes of the cluster resource. Every field forces replacement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClusterAttributes {
    pub name: String,

    #[serde(default = "default_servers")]
    pub servers: u32,

    #[serde(default)]
    pub agents: u32,

    /// Node image; the current stable k3s image when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,

    /// Optional and computed: the network actually joined
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network: Option<String>,

    /// Optional and computed (sensitive): the token actually used
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub env: Vec<KeyValueAttributes>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub label: Vec<KeyValueAttributes>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub volume: Vec<VolumeAttributes>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub port: Vec<PortAttributes>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kube_api: Option<ExposureAttributes>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub k3d: Option<K3dAttributes>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub k3s: Option<K3sAttributes>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kubeconfig: Option<KubeconfigAttributes>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub registries: Option<RegistriesAttributes>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runtime: Option<RuntimeAttributes>,

    /// Computed (sensitive): populated after creation only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credentials: Option<Credentials>,
}

fn default_servers() -> u32 {
    1
}

impl ClusterAttributes {
    /// Attributes with every optional field left unset
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            servers: default_servers(),
            agents: 0,
            image: None,
            network: None,
            token: None,
            env: Vec::new(),
            label: Vec::new(),
            volume: Vec::new(),
            port: Vec::new(),
            kube_api: None,
            k3d: None,
            k3s: None,
            kubeconfig: None,
            registries: None,
            runtime: None,
            credentials: None,
        }
    }
}

impl ResourceAttributes for ClusterAttributes {
    fn name(&self) -> &str {
        &self.name
    }

    fn validate(&self) -> Result<(), AttributeError> {
        validate_name("name", &self.name)?;

        if self.credentials.is_some() {
            return Err(AttributeError::ComputedField("credentials".to_string()));
        }

        for (i, env) in self.env.iter().enumerate() {
            validate_not_empty(&format!("env[{}].key", i), &env.key)?;
        }
        for (i, label) in self.label.iter().enumerate() {
            validate_not_empty(&format!("label[{}].key", i), &label.key)?;
        }
        for (i, volume) in self.volume.iter().enumerate() {
            validate_not_empty(&format!("volume[{}].destination", i), &volume.destination)?;
        }
        for (i, port) in self.port.iter().enumerate() {
            port.validate(i)?;
        }
        if let Some(kube_api) = &self.kube_api {
            kube_api.validate("kube_api")?;
        }
        if let Some(registries) = &self.registries {
            registries.validate()?;
        }
        Ok(())
    }
}

/// `key`/`value` pair scoped by node filters (env and label blocks)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct KeyValueAttributes {
    pub key: String,
    #[serde(default)]
    pub value: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub node_filters: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VolumeAttributes {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    pub destination: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub node_filters: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PortAttributes {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    /// Ephemeral when unset or zero
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host_port: Option<u32>,
    pub container_port: u32,
    /// TCP or UDP, TCP when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protocol: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub node_filters: Vec<String>,
}

impl PortAttributes {
    fn validate(&self, i: usize) -> Result<(), AttributeError> {
        if let Some(host_port) = self.host_port {
            validate_port(&format!("port[{}].host_port", i), host_port, true)?;
        }
        validate_port(&format!("port[{}].container_port", i), self.container_port, false)?;
        if let Some(protocol) = &self.protocol {
            protocol.parse::<Protocol>().map_err(|e| AttributeError::InvalidValue {
                field: format!("port[{}].protocol", i),
                reason: e.to_string(),
            })?;
        }
        Ok(())
    }
}

/// Host-side exposure of an internal service
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExposureAttributes {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host_ip: Option<String>,
    /// Ephemeral when unset or zero
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host_port: Option<u32>,
}

impl ExposureAttributes {
    pub(crate) fn validate(&self, field: &str) -> Result<(), AttributeError> {
        if let Some(host_ip) = &self.host_ip {
            validate_ip(&format!("{}.host_ip", field), host_ip)?;
        }
        if let Some(host_port) = self.host_port {
            validate_port(&format!("{}.host_port", field), host_port, true)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct K3dAttributes {
    #[serde(default)]
    pub disable_image_volume: bool,
    #[serde(default)]
    pub disable_load_balancer: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct K3sAttributes {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extra_args: Vec<ExtraArgAttributes>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExtraArgAttributes {
    #[serde(default)]
    pub arg: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub node_filters: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct KubeconfigAttributes {
    #[serde(default)]
    pub update_default_kubeconfig: bool,
    #[serde(default)]
    pub switch_current_context: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegistriesAttributes {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub create: Option<RegistryCreateAttributes>,
    #[serde(default, rename = "use", skip_serializing_if = "Vec::is_empty")]
    pub use_existing: Vec<String>,
    /// Raw registries.yaml content
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<String>,
}

impl RegistriesAttributes {
    fn validate(&self) -> Result<(), AttributeError> {
        if let Some(RegistryCreateAttributes::Managed(create)) = &self.create {
            if let Some(name) = &create.name {
                validate_name("registries.create.name", name)?;
            }
            if let Some(host_port) = create.host_port.as_deref().filter(|p| !p.is_empty()) {
                let port = host_port.parse::<u32>().map_err(|_| AttributeError::InvalidValue {
                    field: "registries.create.host_port".to_string(),
                    reason: format!("'{}' is not a port number", host_port),
                })?;
                validate_port("registries.create.host_port", port, true)?;
            }
        }
        for (i, address) in self.use_existing.iter().enumerate() {
            validate_not_empty(&format!("registries.use[{}]", i), address)?;
        }
        Ok(())
    }
}

/// `registries.create` accepts the legacy boolean flag or a structured block
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RegistryCreateAttributes {
    Legacy(bool),
    Managed(ManagedRegistryAttributes),
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ManagedRegistryAttributes {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host_port: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RuntimeAttributes {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agents_memory: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gpu_request: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub servers_memory: Option<String>,
}

/// Attributes of the read-only cluster data source
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClusterDataAttributes {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kubeconfig_raw: Option<String>,
}

impl ClusterDataAttributes {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            network: None,
            token: None,
            kubeconfig_raw: None,
        }
    }
}

impl ResourceAttributes for ClusterDataAttributes {
    fn name(&self) -> &str {
        &self.name
    }

    fn validate(&self) -> Result<(), AttributeError> {
        validate_name("name", &self.name)
    }
}
