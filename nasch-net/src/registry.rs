use std::net::{SocketAddr, ToSocketAddrs};
use std::str::FromStr;
use std::time::Duration;

use fnv::FnvHashSet;

use nasch_core::distr::{Central, WorkerConnection};

use crate::coord::TcpConnection;
use crate::error::{Error, Result};
use crate::socket::SocketConfig;

/// Mapping of worker identifiers to their addresses.
///
/// Order of entries is the order in which segments are handed out.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Registry {
    entries: Vec<(String, SocketAddr)>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a worker. Identifiers must be unique.
    pub fn add(&mut self, id: &str, addr: SocketAddr) -> Result<()> {
        if self.entries.iter().any(|(existing, _)| existing == id) {
            return Err(Error::Other(format!("duplicate worker id: {}", id)));
        }
        self.entries.push((id.to_string(), addr));
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[(String, SocketAddr)] {
        &self.entries
    }

    /// Connects to every registered worker and builds the master.
    ///
    /// Fails if any worker can't be reached, there is no partial startup.
    pub fn connect(&self, config: SocketConfig, timeout: Option<Duration>) -> Result<Central> {
        let mut connections: Vec<Box<dyn WorkerConnection>> = Vec::with_capacity(self.len());
        for (id, addr) in &self.entries {
            info!("connecting to worker {} at {}", id, addr);
            let connection = TcpConnection::connect(id, *addr, config).map_err(|e| {
                error!("failed connecting to worker {} at {}: {}", id, addr, e);
                e
            })?;
            connections.push(Box::new(connection));
        }
        Ok(Central::new(connections)?.with_timeout(timeout))
    }
}

impl FromStr for Registry {
    type Err = Error;

    /// Parses a comma-separated list of `id=address` or bare `address`
    /// entries. Bare entries are named after their position.
    fn from_str(s: &str) -> Result<Self> {
        let mut registry = Registry::new();
        let mut seen = FnvHashSet::default();
        for (n, entry) in s.split(',').map(str::trim).filter(|e| !e.is_empty()).enumerate() {
            let (id, addr) = match entry.find('=') {
                Some(i) => (entry[..i].trim().to_string(), entry[i + 1..].trim()),
                None => (format!("worker{}", n), entry),
            };
            let addr = addr
                .to_socket_addrs()?
                .next()
                .ok_or_else(|| Error::Other(format!("address resolved to nothing: {}", addr)))?;
            if !seen.insert(addr) {
                warn!("worker address {} registered more than once", addr);
            }
            registry.add(&id, addr)?;
        }
        if registry.is_empty() {
            return Err(Error::Other("worker registry is empty".to_string()));
        }
        Ok(registry)
    }
}
