use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::ReceiverStream;
use tonic::transport::{Channel, Uri};
use tracing::{info, warn};

use crate::errors::{Result, TransportError};
use crate::proto::{log_stream_service_client::LogStreamServiceClient, RecordMessage};

use super::{LogTransport, RecordStream, TransportConnection};

/// In-flight records buffered between the drain loop and the RPC task.
const STREAM_BUFFER: usize = 32;

/// Production transport: a plain tonic channel per backend, records
/// shipped on the client-streaming `StreamRecords` RPC.
#[derive(Debug, Clone, Default)]
pub struct GrpcTransport;

impl GrpcTransport {
    pub fn new() -> Self {
        GrpcTransport
    }
}

#[async_trait]
impl LogTransport for GrpcTransport {
    async fn connect(&self, addr: &str) -> Result<Box<dyn TransportConnection>> {
        let uri: Uri = addr.parse()?;
        info!("establishing record stream connection to {}", uri);
        let channel = Channel::from_shared(uri.to_string())?.connect().await?;
        Ok(Box::new(GrpcConnection { channel }))
    }
}

struct GrpcConnection {
    channel: Channel,
}

#[async_trait]
impl TransportConnection for GrpcConnection {
    async fn open_stream(&mut self) -> Result<Box<dyn RecordStream>> {
        let mut client = LogStreamServiceClient::new(self.channel.clone());
        let (tx, rx) = mpsc::channel::<RecordMessage>(STREAM_BUFFER);
        // The RPC owns the receiving half; it resolves once the stream
        // is half-closed or the server tears it down.
        let rpc = tokio::spawn(async move {
            if let Err(status) = client.stream_records(ReceiverStream::new(rx)).await {
                warn!("record stream terminated by server: {}", status);
            }
        });
        Ok(Box::new(GrpcRecordStream { tx: Some(tx), rpc }))
    }
}

struct GrpcRecordStream {
    tx: Option<mpsc::Sender<RecordMessage>>,
    rpc: JoinHandle<()>,
}

#[async_trait]
impl RecordStream for GrpcRecordStream {
    async fn send(&mut self, payload: Vec<u8>) -> Result<()> {
        if self.rpc.is_finished() {
            return Err(TransportError::StreamClosed(
                "record stream task ended".to_string(),
            ));
        }
        let tx = self.tx.as_ref().ok_or_else(|| {
            TransportError::StreamClosed("send after close_send".to_string())
        })?;
        tx.send(RecordMessage { payload }).await.map_err(|_| {
            TransportError::StreamClosed("server closed the record stream".to_string())
        })
    }

    async fn close_send(&mut self) {
        // Dropping the sender half-closes the RPC; the server then sees
        // end-of-stream and completes the call.
        self.tx.take();
    }
}
