//! Node resource and data source attributes

use serde::{Deserialize, Serialize};

use super::{validate_name, AttributeError, ResourceAttributes};
use crate::filter::NodeRole;
use crate::spec::DEFAULT_CLUSTER_NAME;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NodeAttributes {
    pub name: String,

    /// Cluster the node joins
    #[serde(default = "default_cluster")]
    pub cluster: String,

    /// Node image; the current stable k3s image when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,

    /// Memory limit of the node container
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory: Option<String>,

    /// `server` or `agent`
    #[serde(default = "default_role")]
    pub role: String,
}

fn default_cluster() -> String {
    DEFAULT_CLUSTER_NAME.to_string()
}

fn default_role() -> String {
    NodeRole::Agent.as_str().to_string()
}

impl NodeAttributes {
    pub fn new(name: impl Into<String>, cluster: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            cluster: cluster.into(),
            image: None,
            memory: None,
            role: default_role(),
        }
    }

    /// The validated role
    pub fn node_role(&self) -> Result<NodeRole, AttributeError> {
        match self.role.parse::<NodeRole>() {
            Ok(role @ (NodeRole::Server | NodeRole::Agent)) => Ok(role),
            _ => Err(AttributeError::InvalidValue {
                field: "role".to_string(),
                reason: format!("'{}' must be one of server, agent", self.role),
            }),
        }
    }
}

impl ResourceAttributes for NodeAttributes {
    fn name(&self) -> &str {
        &self.name
    }

    fn validate(&self) -> Result<(), AttributeError> {
        validate_name("name", &self.name)?;
        validate_name("cluster", &self.cluster)?;
        self.node_role()?;
        Ok(())
    }
}

/// Attributes of the read-only node data source
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NodeDataAttributes {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cluster: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
}

impl NodeDataAttributes {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            cluster: None,
            role: None,
        }
    }
}

impl ResourceAttributes for NodeDataAttributes {
    fn name(&self) -> &str {
        &self.name
    }

    fn validate(&self) -> Result<(), AttributeError> {
        validate_name("name", &self.name)
    }
}
