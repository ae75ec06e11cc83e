use std::{net::SocketAddr, sync::Arc};

use parking_lot::RwLock;
use rustc_hash::FxHashMap;

/// Maps service names to the address they listen on.
///
/// Cloning is cheap and clones share the same table, so the controller can register a service
/// after a client was built.
#[derive(Debug, Clone, Default)]
pub struct ServiceRegistry {
    services: Arc<RwLock<FxHashMap<String, SocketAddr>>>,
}

impl ServiceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `name` at `addr`, replacing any previous address. Returns the previous one.
    pub fn register(&self, name: impl Into<String>, addr: SocketAddr) -> Option<SocketAddr> {
        let name = name.into();
        tracing::debug!(%name, %addr, "registered service");
        self.services.write().insert(name, addr)
    }

    pub fn unregister(&self, name: &str) -> Option<SocketAddr> {
        self.services.write().remove(name)
    }

    pub fn resolve(&self, name: &str) -> Option<SocketAddr> {
        self.services.read().get(name).copied()
    }
}
