use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::broadcast;

use logship_core::Endpoint;

use crate::errors::Result;
use crate::store::EndpointRegistry;
use crate::watch::{RegistryEvent, RegistryWatchStream};

/// MemoryRegistry is an in-process endpoint registry.
/// SHOULD BE USED ONLY FOR TESTING PURPOSES
#[derive(Debug, Clone)]
pub struct MemoryRegistry {
    inner: Arc<DashMap<String, Endpoint>>,
    watch_tx: broadcast::Sender<RegistryEvent>,
}

impl MemoryRegistry {
    pub fn new() -> Self {
        let (watch_tx, _) = broadcast::channel(64);
        MemoryRegistry {
            inner: Arc::new(DashMap::new()),
            watch_tx,
        }
    }

    /// Announces (or re-announces) an endpoint, keyed by name.
    pub fn insert(&self, endpoint: Endpoint) {
        let key = endpoint.name.clone();
        self.inner.insert(key.clone(), endpoint);
        let _ = self.watch_tx.send(RegistryEvent::Put {
            key: key.into_bytes(),
        });
    }

    /// Withdraws an endpoint announcement.
    pub fn remove(&self, name: &str) {
        if self.inner.remove(name).is_some() {
            let _ = self.watch_tx.send(RegistryEvent::Delete {
                key: name.as_bytes().to_vec(),
            });
        }
    }
}

impl Default for MemoryRegistry {
    fn default() -> Self {
        MemoryRegistry::new()
    }
}

#[async_trait]
impl EndpointRegistry for MemoryRegistry {
    async fn list(&self) -> Result<Vec<Endpoint>> {
        // sorted by name so round-robin order is stable per generation
        let mut endpoints: Vec<Endpoint> =
            self.inner.iter().map(|entry| entry.value().clone()).collect();
        endpoints.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(endpoints)
    }

    async fn watch(&self) -> Result<RegistryWatchStream> {
        Ok(RegistryWatchStream::from_broadcast(self.watch_tx.subscribe()))
    }
}
