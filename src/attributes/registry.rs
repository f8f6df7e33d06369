//! Registry resource and data source attributes

use serde::{Deserialize, Serialize};

use super::{
    validate_http_url, validate_name, validate_not_empty, AttributeError, ExposureAttributes,
    ResourceAttributes,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegistryAttributes {
    pub name: String,

    /// Registry image, `docker.io/library/registry:2` when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,

    /// Where the registry listens on the host
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<ExposureAttributes>,

    /// Remote registry to mirror
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proxy_remote_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proxy_username: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proxy_password: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub volume: Vec<RegistryVolumeAttributes>,
}

impl RegistryAttributes {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            image: None,
            port: None,
            proxy_remote_url: None,
            proxy_username: None,
            proxy_password: None,
            volume: Vec::new(),
        }
    }
}

impl ResourceAttributes for RegistryAttributes {
    fn name(&self) -> &str {
        &self.name
    }

    fn validate(&self) -> Result<(), AttributeError> {
        validate_name("name", &self.name)?;
        if let Some(port) = &self.port {
            port.validate("port")?;
        }
        if let Some(url) = &self.proxy_remote_url {
            validate_http_url("proxy_remote_url", url)?;
        }
        for (i, volume) in self.volume.iter().enumerate() {
            validate_not_empty(&format!("volume[{}].destination", i), &volume.destination)?;
        }
        Ok(())
    }
}

/// Registry volumes carry no node filters: a registry is a single container
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegistryVolumeAttributes {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    pub destination: String,
}

/// Attributes of the read-only registry data source
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegistryDataAttributes {
    pub name: String,
}

impl ResourceAttributes for RegistryDataAttributes {
    fn name(&self) -> &str {
        &self.name
    }

    fn validate(&self) -> Result<(), AttributeError> {
        validate_name("name", &self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attributes::{parse_attributes, AttributeFormat};

    #[test]
    fn test_registry_with_proxy() {
        let yaml = r#"
name: docker-io
port:
  host_port: 5005
proxy_remote_url: https://registry-1.docker.io
proxy_username: me
volume:
  - source: /var/cache/registry
    destination: /var/lib/registry
"#;
        let attrs: RegistryAttributes = parse_attributes(yaml, AttributeFormat::Yaml).unwrap();
        assert!(attrs.validate().is_ok());
        assert_eq!(attrs.port.unwrap().host_port, Some(5005));
    }

    #[test]
    fn test_proxy_url_must_be_http() {
        let mut attrs = RegistryAttributes::new("cache");
        attrs.proxy_remote_url = Some("s3://bucket".to_string());
        assert!(attrs.validate().is_err());
    }

    #[test]
    fn test_port_out_of_range() {
        let mut attrs = RegistryAttributes::new("cache");
        attrs.port = Some(ExposureAttributes {
            host_port: Some(70000),
            ..Default::default()
        });
        assert!(attrs.validate().is_err());
    }
}
