use std::fmt;

use async_trait::async_trait;
use etcd_client::{Client, GetOptions, WatchOptions};
use tracing::warn;

use logship_core::Endpoint;

use crate::errors::Result;
use crate::store::EndpointRegistry;
use crate::watch::RegistryWatchStream;

/// Etcd-backed endpoint registry. Backends announce themselves as JSON
/// `Endpoint` values keyed under the registry prefix.
#[derive(Clone)]
pub struct EtcdRegistry {
    client: Client,
    prefix: String,
}

impl EtcdRegistry {
    pub async fn connect(endpoints: &[String], prefix: impl Into<String>) -> Result<Self> {
        let client = Client::connect(endpoints, None).await?;
        Ok(EtcdRegistry {
            client,
            prefix: prefix.into(),
        })
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }
}

impl fmt::Debug for EtcdRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EtcdRegistry")
            .field("prefix", &self.prefix)
            .finish()
    }
}

#[async_trait]
impl EndpointRegistry for EtcdRegistry {
    async fn list(&self) -> Result<Vec<Endpoint>> {
        let mut client = self.client.clone();
        let response = client
            .get(self.prefix.as_str(), Some(GetOptions::new().with_prefix()))
            .await?;

        let mut endpoints = Vec::with_capacity(response.kvs().len());
        for kv in response.kvs() {
            match serde_json::from_slice::<Endpoint>(kv.value()) {
                Ok(endpoint) => endpoints.push(endpoint),
                Err(e) => warn!(
                    key = %String::from_utf8_lossy(kv.key()),
                    error = %e,
                    "skipping malformed endpoint entry"
                ),
            }
        }
        Ok(endpoints)
    }

    async fn watch(&self) -> Result<RegistryWatchStream> {
        let mut client = self.client.clone();
        let (watcher, stream) = client
            .watch(self.prefix.as_str(), Some(WatchOptions::new().with_prefix()))
            .await?;
        Ok(RegistryWatchStream::from_etcd(watcher, stream))
    }
}
