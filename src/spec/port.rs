//! Port mappings and exposure settings

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PortParseError {
    #[error("Invalid port mapping '{0}': expected host:hostPort:containerPort/protocol")]
    Format(String),

    #[error("Invalid port number '{0}'")]
    Number(String),

    #[error("Unsupported protocol '{0}': expected TCP or UDP")]
    Protocol(String),
}

/// Transport protocol of a port mapping
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    #[default]
    Tcp,
    Udp,
}

impl Protocol {
    /// Spelling used in attribute files
    pub fn attribute_name(&self) -> &'static str {
        match self {
            Protocol::Tcp => "TCP",
            Protocol::Udp => "UDP",
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Protocol::Tcp => f.write_str("tcp"),
            Protocol::Udp => f.write_str("udp"),
        }
    }
}

impl FromStr for Protocol {
    type Err = PortParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "tcp" => Ok(Protocol::Tcp),
            "udp" => Ok(Protocol::Udp),
            _ => Err(PortParseError::Protocol(s.to_string())),
        }
    }
}

/// A host to container port mapping.
///
/// Encoded as `host:hostPort:containerPort/protocol`; `host` may be empty,
/// leaving a leading colon.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PortMapping {
    pub host: Option<String>,
    pub host_port: u16,
    pub container_port: u16,
    pub protocol: Protocol,
}

impl fmt::Display for PortMapping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}/{}",
            self.host.as_deref().unwrap_or(""),
            self.host_port,
            self.container_port,
            self.protocol
        )
    }
}

impl FromStr for PortMapping {
    type Err = PortParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let format = || PortParseError::Format(s.to_string());

        let (ports, protocol) = match s.rsplit_once('/') {
            Some((ports, proto)) => (ports, proto.parse::<Protocol>()?),
            None => (s, Protocol::default()),
        };

        // host may itself contain colons (IPv6), so split from the right
        let mut parts = ports.rsplitn(3, ':');
        let container_port = parts.next().ok_or_else(format)?;
        let host_port = parts.next().ok_or_else(format)?;
        let host = parts.next().ok_or_else(format)?;

        Ok(PortMapping {
            host: (!host.is_empty()).then(|| host.to_string()),
            host_port: parse_port(host_port)?,
            container_port: parse_port(container_port)?,
            protocol,
        })
    }
}

fn parse_port(s: &str) -> Result<u16, PortParseError> {
    s.parse::<u16>()
        .map_err(|_| PortParseError::Number(s.to_string()))
}

/// How an internal service (the Kubernetes API, a registry) is exposed on the host
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ExposureSpec {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host_ip: Option<String>,
    pub host_port: u16,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_port_encoding_with_host() {
        let p = PortMapping {
            host: Some("0.0.0.0".to_string()),
            host_port: 8080,
            container_port: 80,
            protocol: Protocol::Tcp,
        };
        assert_eq!(p.to_string(), "0.0.0.0:8080:80/tcp");
        assert_eq!(p.to_string().parse::<PortMapping>().unwrap(), p);
    }

    #[test]
    fn test_port_encoding_without_host() {
        let p = PortMapping {
            host: None,
            host_port: 5353,
            container_port: 53,
            protocol: Protocol::Udp,
        };
        assert_eq!(p.to_string(), ":5353:53/udp");
        assert_eq!(":5353:53/udp".parse::<PortMapping>().unwrap(), p);
    }

    #[test]
    fn test_parse_ipv6_host_and_default_protocol() {
        let p: PortMapping = "::1:8443:443".parse().unwrap();
        assert_eq!(p.host.as_deref(), Some("::1"));
        assert_eq!(p.host_port, 8443);
        assert_eq!(p.protocol, Protocol::Tcp);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(matches!("80".parse::<PortMapping>(), Err(PortParseError::Format(_))));
        assert!(matches!(":x:80/tcp".parse::<PortMapping>(), Err(PortParseError::Number(_))));
        assert!(matches!(":1:80/sctp".parse::<PortMapping>(), Err(PortParseError::Protocol(_))));
    }

    #[test]
    fn test_protocol_case_insensitive() {
        assert_eq!("TCP".parse::<Protocol>().unwrap(), Protocol::Tcp);
        assert_eq!("Udp".parse::<Protocol>().unwrap(), Protocol::Udp);
        assert_eq!(Protocol::Udp.attribute_name(), "UDP");
    }
}
