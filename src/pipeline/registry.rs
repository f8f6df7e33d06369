//! Standalone registry provisioning

use tracing::{debug, info};

use super::{Outcome, ProvisionError, Provisioner};
use crate::attributes::{RegistryAttributes, ResourceAttributes};
use crate::expand::{expand_registry, flatten_exposure};
use crate::identity::{derive_id, ResourceIdentity, ResourceKind};

impl Provisioner {
    /// Start a registry container. The read-back carries the host port
    /// that was allocated when none was requested.
    pub async fn create_registry(
        &self,
        attrs: &RegistryAttributes,
    ) -> Result<Outcome<RegistryAttributes>, ProvisionError> {
        attrs.validate()?;
        let registry = expand_registry(attrs, &self.ports)?;

        match self.runtime.node_get(&registry.host).await {
            Ok(_) => {
                return Err(ProvisionError::AlreadyExists {
                    kind: ResourceKind::Registry,
                    name: attrs.name.clone(),
                })
            }
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(ProvisionError::Runtime(e)),
        }

        info!(registry = %registry.host, port = registry.exposure.host_port, "Creating registry");
        debug!(?registry, "Registry specification");
        self.runtime
            .registry_run(&registry)
            .await
            .map_err(|source| ProvisionError::CreationFailed {
                kind: ResourceKind::Registry,
                name: attrs.name.clone(),
                source,
            })?;

        let observed = RegistryAttributes {
            image: Some(registry.image.clone()),
            port: Some(flatten_exposure(&registry.exposure)),
            ..attrs.clone()
        };
        self.read_registry(&observed).await
    }

    pub async fn read_registry(
        &self,
        attrs: &RegistryAttributes,
    ) -> Result<Outcome<RegistryAttributes>, ProvisionError> {
        let identity = derive_id(ResourceKind::Registry, &attrs.name);
        let container = self
            .runtime
            .node_get(identity.as_str())
            .await
            .map_err(|e| ProvisionError::from_runtime(ResourceKind::Registry, &attrs.name, e))?;

        let attributes = RegistryAttributes {
            image: container.image.or_else(|| attrs.image.clone()),
            ..attrs.clone()
        };
        Ok(Outcome::new(identity, attributes))
    }

    pub async fn delete_registry(&self, name: &str) -> Result<ResourceIdentity, ProvisionError> {
        let identity = derive_id(ResourceKind::Registry, name);
        info!(registry = %identity, "Deleting registry");
        self.runtime
            .node_delete(identity.as_str())
            .await
            .map_err(|e| ProvisionError::from_runtime(ResourceKind::Registry, name, e))?;
        Ok(identity)
    }
}
