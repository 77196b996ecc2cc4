use std::sync::Arc;

use async_trait::async_trait;
use futures::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use logship_core::Endpoint;

use crate::errors::{DiscoveryError, Result};
use crate::store::{EndpointRegistry, RegistryStorage};

/// Well-known registry prefix under which log backends announce.
pub const BACKEND_REGISTRY_PREFIX: &str = "/logship/backends";

/// Receives backend membership. Every delivery is a full snapshot of
/// the announced endpoint set, never a delta.
#[async_trait]
pub trait EndpointObserver: Send + Sync {
    async fn update_endpoints(&self, endpoints: Vec<Endpoint>);

    /// Watch-side failures are reported here; delivery continues.
    async fn on_error(&self, error: DiscoveryError) {
        warn!(error = %error, "discovery watch error");
    }
}

/// Watches an endpoint registry and feeds membership snapshots to a
/// registered observer until stopped.
#[derive(Debug, Clone)]
pub struct Discovery {
    storage: RegistryStorage,
    cancel: CancellationToken,
}

impl Discovery {
    pub fn new(storage: RegistryStorage) -> Self {
        Discovery {
            storage,
            cancel: CancellationToken::new(),
        }
    }

    /// Connects to an etcd cluster serving the registry prefix.
    pub async fn connect_etcd(endpoints: &[String], prefix: &str) -> Result<Self> {
        let registry = crate::providers::etcd::EtcdRegistry::connect(endpoints, prefix).await?;
        Ok(Discovery::new(RegistryStorage::Etcd(registry)))
    }

    /// Registers `observer` for backend membership: one initial full
    /// snapshot if the registry is non-empty, then a re-fetched
    /// snapshot per observed change.
    pub async fn register(&self, observer: Arc<dyn EndpointObserver>) -> Result<()> {
        let initial = self.storage.list().await?;
        if !initial.is_empty() {
            observer.update_endpoints(initial).await;
        }

        let mut stream = self.storage.watch().await?;
        let storage = self.storage.clone();
        let cancel = self.cancel.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    event = stream.next() => match event {
                        Some(Ok(event)) => {
                            info!("registry change observed: {}", event);
                            match storage.list().await {
                                Ok(endpoints) => observer.update_endpoints(endpoints).await,
                                Err(e) => observer.on_error(e).await,
                            }
                        }
                        Some(Err(e)) => observer.on_error(e).await,
                        None => break,
                    }
                }
            }
        });
        Ok(())
    }

    /// Stops the watch task. Best-effort; nothing to escalate.
    pub fn stop(&self) {
        self.cancel.cancel();
    }
}
