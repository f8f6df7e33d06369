//! Volume mounts

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// A volume mounted into a node container.
///
/// Without a source the runtime creates an anonymous volume at `destination`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VolumeMount {
    pub source: Option<String>,
    pub destination: String,
}

impl VolumeMount {
    pub fn anonymous(destination: impl Into<String>) -> Self {
        Self {
            source: None,
            destination: destination.into(),
        }
    }

    pub fn bind(source: impl Into<String>, destination: impl Into<String>) -> Self {
        Self {
            source: Some(source.into()),
            destination: destination.into(),
        }
    }
}

impl fmt::Display for VolumeMount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.source.as_deref() {
            Some(source) if !source.is_empty() => write!(f, "{}:{}", source, self.destination),
            _ => f.write_str(&self.destination),
        }
    }
}

impl FromStr for VolumeMount {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.split_once(':') {
            Some((source, destination)) if !source.is_empty() => {
                VolumeMount::bind(source, destination)
            }
            Some((_, destination)) => VolumeMount::anonymous(destination),
            None => VolumeMount::anonymous(s),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bind_encoding() {
        let v = VolumeMount::bind("/tmp/data", "/data");
        assert_eq!(v.to_string(), "/tmp/data:/data");
        assert_eq!("/tmp/data:/data".parse::<VolumeMount>().unwrap(), v);
    }

    #[test]
    fn test_anonymous_encoding() {
        let v = VolumeMount::anonymous("/var/lib/rancher");
        assert_eq!(v.to_string(), "/var/lib/rancher");
        assert_eq!("/var/lib/rancher".parse::<VolumeMount>().unwrap(), v);
    }

    #[test]
    fn test_empty_source_is_anonymous() {
        let v = VolumeMount {
            source: Some(String::new()),
            destination: "/data".to_string(),
        };
        assert_eq!(v.to_string(), "/data");
    }

    #[test]
    fn test_mount_options_stay_with_destination() {
        let v: VolumeMount = "/src:/dst:ro".parse().unwrap();
        assert_eq!(v.source.as_deref(), Some("/src"));
        assert_eq!(v.destination, "/dst:ro");
        assert_eq!(v.to_string(), "/src:/dst:ro");
    }
}
