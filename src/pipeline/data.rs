//! Read-only data sources

use tracing::warn;

use super::{Outcome, ProvisionError, Provisioner};
use crate::attributes::{ClusterDataAttributes, NodeDataAttributes, RegistryDataAttributes};
use crate::expand::{flatten_cluster_data, flatten_node_data};
use crate::identity::{derive_id, ResourceKind};

impl Provisioner {
    /// Look up a cluster by name. A missing kubeconfig is reported as a warning.
    pub async fn get_cluster(
        &self,
        name: &str,
    ) -> Result<Outcome<ClusterDataAttributes>, ProvisionError> {
        let identity = derive_id(ResourceKind::Cluster, name);
        let state = self
            .runtime
            .cluster_get(name)
            .await
            .map_err(|e| ProvisionError::from_runtime(ResourceKind::Cluster, name, e))?;

        let mut warnings = Vec::new();
        let kubeconfig_raw = match self.runtime.kubeconfig_get(name).await {
            Ok(raw) => Some(raw),
            Err(e) => {
                warn!(cluster = %identity, error = %e, "Failed to fetch kubeconfig");
                warnings.push(format!("failed to fetch kubeconfig: {}", e));
                None
            }
        };

        let mut outcome = Outcome::new(identity, flatten_cluster_data(name, &state, kubeconfig_raw));
        outcome.warnings = warnings;
        Ok(outcome)
    }

    pub async fn get_node(
        &self,
        name: &str,
    ) -> Result<Outcome<NodeDataAttributes>, ProvisionError> {
        let identity = derive_id(ResourceKind::Node, name);
        let node = self
            .runtime
            .node_get(identity.as_str())
            .await
            .map_err(|e| ProvisionError::from_runtime(ResourceKind::Node, name, e))?;
        Ok(Outcome::new(identity, flatten_node_data(name, &node)))
    }

    pub async fn get_registry(
        &self,
        name: &str,
    ) -> Result<Outcome<RegistryDataAttributes>, ProvisionError> {
        let identity = derive_id(ResourceKind::Registry, name);
        self.runtime
            .node_get(identity.as_str())
            .await
            .map_err(|e| ProvisionError::from_runtime(ResourceKind::Registry, name, e))?;
        Ok(Outcome::new(
            identity,
            RegistryDataAttributes {
                name: name.to_string(),
            },
        ))
    }
}
