//! Logship-Core
//!
//! Logship-Core -- shared types for the logship shipping client: the
//! structured record model, backend endpoints, and the record stream
//! transport seam with its gRPC and in-memory providers.

mod record;
pub use record::{Level, LogRecord};

mod endpoint;
pub use endpoint::{Endpoint, EndpointChange};

pub mod errors;
pub use errors::TransportError;

mod transport;
pub use transport::{
    GrpcTransport, LogTransport, MemoryTransport, RecordStream, StreamTransport,
    TransportConnection,
};

pub mod proto {
    include!("proto/logship.rs");
}
