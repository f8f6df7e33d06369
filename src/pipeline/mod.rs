//! Provisioning pipeline
//!
//! Every resource operation is one sequential chain of runtime calls made
//! through the [`Provisioner`]. Clusters go through
//! transform → process → validate → submit, with a compensating delete when
//! submission fails (see [`cluster`]). Nodes, registries and the read-only data
//! sources are single runtime calls.

pub mod cluster;
pub mod data;
pub mod node;
pub mod registry;

use std::sync::{Arc, LazyLock};

use regex::Regex;
use serde::Serialize;
use thiserror::Error;

use crate::attributes::AttributeError;
use crate::expand::ExpandError;
use crate::filter::FilterError;
use crate::identity::{ResourceIdentity, ResourceKind};
use crate::kubeconfig::{KubeconfigError, KubeconfigStore};
use crate::runtime::{DefaultImage, ImageError, PortAllocator, RuntimeClient, RuntimeError};

pub use cluster::{plan, process, transform, validate, Processed, Transformed, Validated};

static MEMORY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[0-9]+(\.[0-9]+)?[kKmMgGtT]?[iI]?[bB]?$").expect("memory regex is valid")
});

/// How bad a failure is for the caller
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum Severity {
    Error,
    /// External state may have been left behind
    Fatal,
}

/// Errors surfaced by resource operations
#[derive(Error, Debug)]
pub enum ProvisionError {
    #[error("Invalid node filter syntax '{0}': expected <role>, <role>:<index> or <role>[<index>]")]
    InvalidFilterSyntax(String),

    #[error("Unknown role '{role}' in node filter '{filter}'")]
    UnknownRole { filter: String, role: String },

    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Failed to create {kind} '{name}': it already exists")]
    AlreadyExists { kind: ResourceKind, name: String },

    #[error("{kind} '{name}' not found")]
    NotFound { kind: ResourceKind, name: String },

    #[error("Creation of {kind} '{name}' failed: {source}")]
    CreationFailed {
        kind: ResourceKind,
        name: String,
        #[source]
        source: RuntimeError,
    },

    #[error(
        "Creation of cluster '{name}' FAILED ({source}), also FAILED to roll back ({rollback}): resources may be left behind"
    )]
    CreationFailedRollbackFailed {
        name: String,
        #[source]
        source: RuntimeError,
        rollback: RuntimeError,
    },

    #[error("Runtime error: {0}")]
    Runtime(#[source] RuntimeError),

    #[error("Failed to resolve the default image: {0}")]
    DefaultImage(#[from] ImageError),

    #[error("Failed to allocate a host port for '{field}': {reason}")]
    PortAllocation { field: String, reason: String },
}

/// Failure to read a new cluster's credentials or publish them to the
/// kubeconfig. Never fails the operation; surfaced as a warning instead.
#[derive(Error, Debug)]
pub enum CredentialSyncError {
    #[error("failed to fetch kubeconfig: {0}")]
    Fetch(#[from] RuntimeError),

    #[error(transparent)]
    Kubeconfig(#[from] KubeconfigError),
}

impl ProvisionError {
    pub fn severity(&self) -> Severity {
        match self {
            ProvisionError::CreationFailedRollbackFailed { .. } => Severity::Fatal,
            _ => Severity::Error,
        }
    }

    /// Classify a runtime error from a read or delete of `name`
    pub fn from_runtime(kind: ResourceKind, name: &str, error: RuntimeError) -> Self {
        if error.is_not_found() {
            ProvisionError::NotFound {
                kind,
                name: name.to_string(),
            }
        } else {
            ProvisionError::Runtime(error)
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, ProvisionError::NotFound { .. })
    }
}

impl From<FilterError> for ProvisionError {
    fn from(e: FilterError) -> Self {
        match e {
            FilterError::InvalidFilterSyntax(filter) => ProvisionError::InvalidFilterSyntax(filter),
            FilterError::UnknownRole { filter, role } => {
                ProvisionError::UnknownRole { filter, role }
            }
            e @ FilterError::NoSuchNode { .. } => {
                ProvisionError::InvalidConfiguration(e.to_string())
            }
        }
    }
}

impl From<AttributeError> for ProvisionError {
    fn from(e: AttributeError) -> Self {
        ProvisionError::InvalidConfiguration(e.to_string())
    }
}

impl From<ExpandError> for ProvisionError {
    fn from(e: ExpandError) -> Self {
        match e {
            ExpandError::PortAllocation { field, source } => ProvisionError::PortAllocation {
                field,
                reason: source.to_string(),
            },
            ExpandError::Attribute(e) => e.into(),
        }
    }
}

/// Result of a resource operation: the identity, the read-back attributes and
/// any non-fatal warnings raised along the way
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Outcome<T> {
    pub id: ResourceIdentity,
    pub attributes: T,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

impl<T> Outcome<T> {
    pub fn new(id: ResourceIdentity, attributes: T) -> Self {
        Self {
            id,
            attributes,
            warnings: Vec::new(),
        }
    }
}

pub(crate) fn validate_memory(field: &str, value: Option<&str>) -> Result<(), ProvisionError> {
    match value {
        Some(memory) if !MEMORY_RE.is_match(memory) => Err(ProvisionError::InvalidConfiguration(
            format!("{} '{}' is not a memory size such as 512m or 2g", field, memory),
        )),
        _ => Ok(()),
    }
}

/// Handle every resource operation runs through
#[derive(Clone)]
pub struct Provisioner {
    runtime: Arc<dyn RuntimeClient>,
    ports: PortAllocator,
    images: Arc<DefaultImage>,
    kubeconfig: Arc<KubeconfigStore>,
}

impl Provisioner {
    pub fn new(
        runtime: Arc<dyn RuntimeClient>,
        images: Arc<DefaultImage>,
        kubeconfig: Arc<KubeconfigStore>,
    ) -> Self {
        Self {
            runtime,
            ports: PortAllocator::new(),
            images,
            kubeconfig,
        }
    }

    /// Share a port allocator with other provisioners
    pub fn with_ports(mut self, ports: PortAllocator) -> Self {
        self.ports = ports;
        self
    }

    pub fn kubeconfig_store(&self) -> &KubeconfigStore {
        &self.kubeconfig
    }

    /// The explicit image, or the lazily resolved default
    async fn image_or_default(&self, explicit: Option<&str>) -> Result<String, ProvisionError> {
        match explicit.filter(|i| !i.is_empty()) {
            Some(image) => Ok(image.to_string()),
            None => Ok(self.images.get().await?),
        }
    }
}
