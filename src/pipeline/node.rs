//! Standalone node provisioning
//!
//! A node joins an existing cluster. There is nothing to roll back: the
//! runtime either adds the node or it does not.

use tracing::{debug, info};

use super::{validate_memory, Outcome, ProvisionError, Provisioner};
use crate::attributes::{NodeAttributes, ResourceAttributes};
use crate::expand::expand_node;
use crate::identity::{derive_id, ResourceIdentity, ResourceKind};
use crate::runtime::NodeState;

/// Fill the computed node fields from observed state
fn flatten_node(attrs: &NodeAttributes, node: &NodeState) -> NodeAttributes {
    NodeAttributes {
        cluster: node
            .cluster()
            .map(str::to_string)
            .unwrap_or_else(|| attrs.cluster.clone()),
        image: node.image.clone().or_else(|| attrs.image.clone()),
        role: node
            .role
            .map(|r| r.to_string())
            .unwrap_or_else(|| attrs.role.clone()),
        ..attrs.clone()
    }
}

impl Provisioner {
    pub async fn create_node(
        &self,
        attrs: &NodeAttributes,
    ) -> Result<Outcome<NodeAttributes>, ProvisionError> {
        attrs.validate()?;
        validate_memory("memory", attrs.memory.as_deref())?;
        let image = self.image_or_default(attrs.image.as_deref()).await?;
        let request = expand_node(attrs, &image)?;
        let identity = derive_id(ResourceKind::Node, &attrs.name);

        self.runtime
            .cluster_get(&request.cluster)
            .await
            .map_err(|e| ProvisionError::from_runtime(ResourceKind::Cluster, &request.cluster, e))?;

        match self.runtime.node_get(&request.name).await {
            Ok(_) => {
                return Err(ProvisionError::AlreadyExists {
                    kind: ResourceKind::Node,
                    name: attrs.name.clone(),
                })
            }
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(ProvisionError::Runtime(e)),
        }

        info!(node = %identity, cluster = %request.cluster, role = %request.role, "Adding node");
        debug!(?request, "Node request");
        self.runtime
            .node_add(&request)
            .await
            .map_err(|source| ProvisionError::CreationFailed {
                kind: ResourceKind::Node,
                name: attrs.name.clone(),
                source,
            })?;

        self.read_node(attrs).await
    }

    pub async fn read_node(
        &self,
        attrs: &NodeAttributes,
    ) -> Result<Outcome<NodeAttributes>, ProvisionError> {
        let identity = derive_id(ResourceKind::Node, &attrs.name);
        let node = self
            .runtime
            .node_get(identity.as_str())
            .await
            .map_err(|e| ProvisionError::from_runtime(ResourceKind::Node, &attrs.name, e))?;
        Ok(Outcome::new(identity, flatten_node(attrs, &node)))
    }

    pub async fn delete_node(&self, name: &str) -> Result<ResourceIdentity, ProvisionError> {
        let identity = derive_id(ResourceKind::Node, name);
        info!(node = %identity, "Deleting node");
        self.runtime
            .node_delete(identity.as_str())
            .await
            .map_err(|e| ProvisionError::from_runtime(ResourceKind::Node, name, e))?;
        Ok(identity)
    }
}
