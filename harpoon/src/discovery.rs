//! Service discovery boundary.
//!
//! Deployment tooling around a server registers its listening address under
//! the service name; clients (or the tooling that configures them) resolve
//! a name to a network location before constructing an
//! [`RpcClient`](crate::RpcClient). The dispatch core itself never consults
//! discovery.
//!
//! [`StaticDiscovery`] is an in-memory implementation for tests and
//! single-process deployments; production backends implement [`Discovery`]
//! against their catalog of choice.

use std::collections::HashMap;
use std::sync::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use thiserror::Error;

/// Discovery failures.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    /// No location registered under the requested service name.
    #[error("service not found: {0}")]
    NotFound(String),

    /// No registration with the given id.
    #[error("unknown registration id: {0}")]
    UnknownId(String),

    /// Backend-specific failure.
    #[error("discovery backend error: {0}")]
    Backend(String),
}

/// A resolvable network location for one service instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceLocation {
    /// Service name, as clients address it.
    pub service: String,
    /// `host:port` of a listening server.
    pub address: String,
}

/// Opaque handle for deregistering a previously registered instance.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ServiceId(
    /// Backend-assigned registration id.
    pub String,
);

/// Maps service names to network locations.
#[async_trait]
pub trait Discovery: Send + Sync {
    /// Register a service instance; the returned id deregisters it.
    async fn register(&self, location: ServiceLocation) -> Result<ServiceId, DiscoveryError>;

    /// Remove a previously registered instance.
    async fn deregister(&self, id: &ServiceId) -> Result<(), DiscoveryError>;

    /// Resolve a service name to one registered location.
    async fn discover(&self, service: &str) -> Result<ServiceLocation, DiscoveryError>;
}

/// In-memory [`Discovery`] backend.
#[derive(Debug, Default)]
pub struct StaticDiscovery {
    entries: RwLock<HashMap<ServiceId, ServiceLocation>>,
    next_id: AtomicU64,
}

impl StaticDiscovery {
    /// Create an empty backend.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Discovery for StaticDiscovery {
    async fn register(&self, location: ServiceLocation) -> Result<ServiceId, DiscoveryError> {
        let id = ServiceId(format!(
            "{}-{}",
            location.service,
            self.next_id.fetch_add(1, Ordering::Relaxed)
        ));
        self.entries
            .write()
            .expect("discovery table lock poisoned")
            .insert(id.clone(), location);
        Ok(id)
    }

    async fn deregister(&self, id: &ServiceId) -> Result<(), DiscoveryError> {
        self.entries
            .write()
            .expect("discovery table lock poisoned")
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| DiscoveryError::UnknownId(id.0.clone()))
    }

    async fn discover(&self, service: &str) -> Result<ServiceLocation, DiscoveryError> {
        self.entries
            .read()
            .expect("discovery table lock poisoned")
            .values()
            .find(|location| location.service == service)
            .cloned()
            .ok_or_else(|| DiscoveryError::NotFound(service.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn register_discover_deregister() {
        let discovery = StaticDiscovery::new();
        let location = ServiceLocation {
            service: "Calc".to_string(),
            address: "127.0.0.1:4500".to_string(),
        };

        let id = discovery.register(location.clone()).await.expect("register");
        assert_eq!(discovery.discover("Calc").await.expect("found"), location);

        discovery.deregister(&id).await.expect("deregister");
        assert!(matches!(
            discovery.discover("Calc").await,
            Err(DiscoveryError::NotFound(_))
        ));
        assert!(matches!(
            discovery.deregister(&id).await,
            Err(DiscoveryError::UnknownId(_))
        ));
    }
}
