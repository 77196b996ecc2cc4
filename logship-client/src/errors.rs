use thiserror::Error;

use logship_discovery::DiscoveryError;

pub type Result<T> = std::result::Result<T, ShipperError>;

#[derive(Debug, Error)]
pub enum ShipperError {
    #[error("discovery unavailable and no static backends configured: {0}")]
    NoBackends(#[source] DiscoveryError),

    #[error("no backends configured and no discovery endpoints provided")]
    EmptyConfiguration,

    #[error("discovery error: {0}")]
    Discovery(#[from] DiscoveryError),
}
