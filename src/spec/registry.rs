//! Registry intent and standalone registry specification

use serde::{Deserialize, Serialize};

use super::{ExposureSpec, VolumeMount};

/// A registry created and owned alongside a cluster
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManagedRegistry {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    pub image: String,
    pub host_port: u16,
}

/// How a cluster obtains its registries
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "mode")]
pub enum RegistryMode {
    #[default]
    NoRegistry,
    CreateManaged {
        create: ManagedRegistry,
    },
    UseExisting {
        addresses: Vec<String>,
    },
    CreateAndUse {
        create: ManagedRegistry,
        addresses: Vec<String>,
    },
}

impl RegistryMode {
    pub fn managed(&self) -> Option<&ManagedRegistry> {
        match self {
            RegistryMode::CreateManaged { create } | RegistryMode::CreateAndUse { create, .. } => {
                Some(create)
            }
            _ => None,
        }
    }

    pub fn existing(&self) -> &[String] {
        match self {
            RegistryMode::UseExisting { addresses } | RegistryMode::CreateAndUse { addresses, .. } => {
                addresses
            }
            _ => &[],
        }
    }
}

/// Registry intent of a cluster
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RegistryIntent {
    pub mode: RegistryMode,
    /// Raw registries.yaml document (mirrors, auth) handed to k3s
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config: Option<String>,
}

impl RegistryIntent {
    pub fn is_empty(&self) -> bool {
        self.mode == RegistryMode::NoRegistry && self.config.is_none()
    }
}

/// Pull-through proxy settings of a standalone registry
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RegistryProxy {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

/// A standalone registry container
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrySpec {
    /// Runtime-facing registry host (the registry identity)
    pub host: String,
    pub image: String,
    pub exposure: ExposureSpec,
    pub volumes: Vec<VolumeMount>,
    pub proxy: RegistryProxy,
}
