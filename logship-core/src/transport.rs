use async_trait::async_trait;

use crate::errors::Result;

mod grpc;
mod in_memory;

pub use grpc::GrpcTransport;
pub use in_memory::MemoryTransport;

/// Client transport able to open persistent record streams to backend
/// addresses. No acknowledgement or response is consumed by callers.
#[async_trait]
pub trait LogTransport: Send + Sync {
    /// Establishes the low-level connection to `addr`.
    async fn connect(&self, addr: &str) -> Result<Box<dyn TransportConnection>>;
}

/// An established connection on which one record stream can be opened.
#[async_trait]
pub trait TransportConnection: Send {
    async fn open_stream(&mut self) -> Result<Box<dyn RecordStream>>;
}

/// A live outbound record stream.
#[async_trait]
pub trait RecordStream: Send {
    /// Forwards one serialized record to the backend.
    async fn send(&mut self, payload: Vec<u8>) -> Result<()>;

    /// Half-closes the stream so the backend sees end-of-stream.
    async fn close_send(&mut self);
}

#[derive(Debug, Clone)]
pub enum StreamTransport {
    Grpc(GrpcTransport),
    InMemory(MemoryTransport), // InMemory is used for testing purposes
}

#[async_trait]
impl LogTransport for StreamTransport {
    async fn connect(&self, addr: &str) -> Result<Box<dyn TransportConnection>> {
        match self {
            StreamTransport::Grpc(transport) => transport.connect(addr).await,
            StreamTransport::InMemory(transport) => transport.connect(addr).await,
        }
    }
}
