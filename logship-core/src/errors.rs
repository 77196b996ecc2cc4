use thiserror::Error;
use tonic::codegen::http::uri;

pub type Result<T> = std::result::Result<T, TransportError>;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("transport error: {0}")]
    TonicTransportError(#[from] tonic::transport::Error),

    #[error("gRPC error: {0}")]
    FromStatus(#[from] tonic::Status),

    #[error("unable to parse the address: {0}")]
    UrlParseError(#[from] uri::InvalidUri),

    #[error("connection refused by {0}")]
    ConnectionRefused(String),

    #[error("record stream closed: {0}")]
    StreamClosed(String),

    #[error("serialization error: {0}")]
    SerdeError(#[from] serde_json::Error),
}
