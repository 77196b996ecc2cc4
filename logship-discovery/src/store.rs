use async_trait::async_trait;

use logship_core::Endpoint;

use crate::errors::Result;
use crate::providers::{etcd::EtcdRegistry, in_memory::MemoryRegistry};
use crate::watch::RegistryWatchStream;

/// A registry of announced backend endpoints.
#[async_trait]
pub trait EndpointRegistry: Send + Sync {
    /// Full membership snapshot under the registry prefix.
    async fn list(&self) -> Result<Vec<Endpoint>>;

    /// Change notifications for the prefix; consumers re-list on any
    /// event rather than applying deltas.
    async fn watch(&self) -> Result<RegistryWatchStream>;
}

#[derive(Debug, Clone)]
pub enum RegistryStorage {
    Etcd(EtcdRegistry),
    InMemory(MemoryRegistry), // InMemory is used for testing purposes
}

#[async_trait]
impl EndpointRegistry for RegistryStorage {
    async fn list(&self) -> Result<Vec<Endpoint>> {
        match self {
            RegistryStorage::Etcd(registry) => registry.list().await,
            RegistryStorage::InMemory(registry) => registry.list().await,
        }
    }

    async fn watch(&self) -> Result<RegistryWatchStream> {
        match self {
            RegistryStorage::Etcd(registry) => registry.watch().await,
            RegistryStorage::InMemory(registry) => registry.watch().await,
        }
    }
}
