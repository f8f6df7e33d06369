//! Ephemeral host port allocation
//!
//! Ports are picked by binding `127.0.0.1:0` and releasing the socket again, so
//! another process may grab the port before the cluster binds it. Within one
//! allocator no port is handed out twice.

use std::net::TcpListener;
use std::sync::Arc;

use dashmap::DashSet;
use thiserror::Error;
use tracing::debug;

const MAX_ATTEMPTS: u32 = 64;

#[derive(Error, Debug)]
pub enum PortError {
    #[error("Failed to bind an ephemeral port: {0}")]
    Bind(#[from] std::io::Error),

    #[error("No unused ephemeral port after {0} attempts")]
    Exhausted(u32),
}

/// Hands out free host ports, never the same one twice. Clones share state.
#[derive(Debug, Clone, Default)]
pub struct PortAllocator {
    issued: Arc<DashSet<u16>>,
}

impl PortAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn allocate(&self) -> Result<u16, PortError> {
        for _ in 0..MAX_ATTEMPTS {
            let port = {
                let listener = TcpListener::bind(("127.0.0.1", 0))?;
                listener.local_addr()?.port()
            };
            if self.issued.insert(port) {
                debug!(port, "Allocated ephemeral port");
                return Ok(port);
            }
        }
        Err(PortError::Exhausted(MAX_ATTEMPTS))
    }

    /// Ports handed out so far
    pub fn issued(&self) -> usize {
        self.issued.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_allocations_are_distinct() {
        let allocator = PortAllocator::new();
        let ports: HashSet<u16> = (0..20).map(|_| allocator.allocate().unwrap()).collect();
        assert_eq!(ports.len(), 20);
        assert!(ports.iter().all(|&p| p > 0));
    }

    #[tokio::test]
    async fn test_clones_share_issued_ports() {
        let allocator = PortAllocator::new();
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let allocator = allocator.clone();
                tokio::task::spawn_blocking(move || allocator.allocate().unwrap())
            })
            .collect();

        let mut ports = HashSet::new();
        for handle in handles {
            ports.insert(handle.await.unwrap());
        }
        assert_eq!(ports.len(), 8);
        assert_eq!(allocator.issued(), 8);
    }
}
