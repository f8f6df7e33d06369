//! Flat attribute files
//!
//! One statically typed struct per resource, mirroring the attribute schema:
//! repeated blocks are `Vec`s, single nested blocks are `Option`s. Scalar
//! validation (port ranges, IP addresses, protocol names, URLs) happens here,
//! before anything is expanded.

pub mod cluster;
pub mod node;
pub mod registry;

use std::net::IpAddr;
use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;
use serde::de::DeserializeOwned;
use thiserror::Error;

pub use cluster::{
    ClusterAttributes, ClusterDataAttributes, ExposureAttributes, ExtraArgAttributes,
    K3dAttributes, K3sAttributes, KeyValueAttributes, KubeconfigAttributes,
    ManagedRegistryAttributes, PortAttributes, RegistriesAttributes, RegistryCreateAttributes,
    RuntimeAttributes, VolumeAttributes,
};
pub use node::{NodeAttributes, NodeDataAttributes};
pub use registry::{RegistryAttributes, RegistryDataAttributes, RegistryVolumeAttributes};

static NAME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9]([A-Za-z0-9-]*[A-Za-z0-9])?$").expect("name regex is valid")
});

/// Errors raised while loading or validating attributes
#[derive(Error, Debug)]
pub enum AttributeError {
    #[error("Failed to read attribute file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse attributes: {0}")]
    Parse(String),

    #[error("Invalid value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("'{0}' is computed and cannot be set")]
    ComputedField(String),
}

impl AttributeError {
    fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        AttributeError::InvalidValue {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// Serialization format of an attribute file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttributeFormat {
    Yaml,
    Json,
}

impl AttributeFormat {
    /// YAML for `.yaml`/`.yml`, JSON otherwise
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some("yaml") | Some("yml") => AttributeFormat::Yaml,
            _ => AttributeFormat::Json,
        }
    }
}

/// Common surface of every resource's attribute struct
pub trait ResourceAttributes: DeserializeOwned {
    /// User-supplied name the identity derives from
    fn name(&self) -> &str;

    /// Schema-level checks on scalar values
    fn validate(&self) -> Result<(), AttributeError>;
}

// ============================================================================
// SBIO: Pure parsing and validation (no I/O)
// ============================================================================

/// Parse attributes without validating them
pub fn parse_attributes<T: DeserializeOwned>(
    content: &str,
    format: AttributeFormat,
) -> Result<T, AttributeError> {
    match format {
        AttributeFormat::Yaml => {
            serde_yaml::from_str(content).map_err(|e| AttributeError::Parse(e.to_string()))
        }
        AttributeFormat::Json => {
            serde_json::from_str(content).map_err(|e| AttributeError::Parse(e.to_string()))
        }
    }
}

pub(crate) fn validate_name(field: &str, value: &str) -> Result<(), AttributeError> {
    if !NAME_RE.is_match(value) {
        return Err(AttributeError::invalid(
            field,
            format!(
                "'{}' must be non-empty and contain only letters, digits and inner dashes",
                value
            ),
        ));
    }
    Ok(())
}

pub(crate) fn validate_port(field: &str, port: u32, allow_zero: bool) -> Result<(), AttributeError> {
    let lower = if allow_zero { 0 } else { 1 };
    if port < lower || port > u32::from(u16::MAX) {
        return Err(AttributeError::invalid(
            field,
            format!("{} is not a valid port number", port),
        ));
    }
    Ok(())
}

pub(crate) fn validate_ip(field: &str, value: &str) -> Result<(), AttributeError> {
    value
        .parse::<IpAddr>()
        .map(|_| ())
        .map_err(|_| AttributeError::invalid(field, format!("'{}' is not an IP address", value)))
}

pub(crate) fn validate_not_empty(field: &str, value: &str) -> Result<(), AttributeError> {
    if value.trim().is_empty() {
        return Err(AttributeError::invalid(field, "must not be empty"));
    }
    Ok(())
}

pub(crate) fn validate_http_url(field: &str, value: &str) -> Result<(), AttributeError> {
    let url = url::Url::parse(value)
        .map_err(|e| AttributeError::invalid(field, format!("'{}' is not a URL: {}", value, e)))?;
    match url.scheme() {
        "http" | "https" if url.host().is_some() => Ok(()),
        _ => Err(AttributeError::invalid(
            field,
            format!("'{}' must be an http or https URL with a host", value),
        )),
    }
}

// ============================================================================
// I/O boundary
// ============================================================================

/// Load and validate an attribute file, choosing the format from its extension
pub fn load_attributes<T: ResourceAttributes>(path: &Path) -> Result<T, AttributeError> {
    let content = std::fs::read_to_string(path)?;
    let attrs: T = parse_attributes(&content, AttributeFormat::from_path(path))?;
    attrs.validate()?;
    Ok(attrs)
}
