//! Resource identities
//!
//! Every managed object is identified as `k3d-<name>`. The identity doubles as
//! the runtime-facing object name (node and registry containers, kubeconfig
//! cluster and context entries) and as the resource ID reported to callers.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Prefix shared by every object k3d creates
pub const OBJECT_NAME_PREFIX: &str = "k3d";

/// Kinds of managed resources
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    Cluster,
    Node,
    Registry,
}

impl ResourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Cluster => "cluster",
            ResourceKind::Node => "node",
            ResourceKind::Registry => "registry",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stable identifier of a managed resource
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceIdentity(String);

impl ResourceIdentity {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Name of the admin user k3d writes into a cluster's kubeconfig
    pub fn kubeconfig_user(&self) -> String {
        format!("admin@{}", self.0)
    }
}

impl fmt::Display for ResourceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ResourceIdentity {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Derive the identity of a resource from its kind and name.
///
/// All kinds currently share the same prefix.
pub fn derive_id(_kind: ResourceKind, name: &str) -> ResourceIdentity {
    ResourceIdentity(format!("{}-{}", OBJECT_NAME_PREFIX, name))
}
