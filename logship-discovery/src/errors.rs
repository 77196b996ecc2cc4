use thiserror::Error;

pub type Result<T> = std::result::Result<T, DiscoveryError>;

#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("etcd error: {0}")]
    EtcdError(#[from] etcd_client::Error),

    #[error("serialization error: {0}")]
    SerdeError(#[from] serde_json::Error),

    #[error("watch error: {0}")]
    WatchError(String),
}
