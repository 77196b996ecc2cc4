use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use logship_core::{LogTransport, StreamTransport};

use crate::manager::EventManager;

/// Outbound queue capacity per backend; emits drop records beyond it.
pub(crate) const QUEUE_CAPACITY: usize = 100;

/// Fixed interval between connection attempts to an unreachable backend.
pub(crate) const CONNECT_RETRY_INTERVAL: Duration = Duration::from_secs(3);

/// One backend's outbound queue plus the stop signal for its drain task.
#[derive(Debug, Clone)]
pub(crate) struct BackendHandle {
    pub(crate) queue_tx: mpsc::Sender<Vec<u8>>,
    pub(crate) stop: CancellationToken,
}

impl BackendHandle {
    /// Creates the handle and spawns its drain task, tied to the
    /// manager's root cancellation.
    pub(crate) fn spawn(
        server: String,
        manager: EventManager,
        transport: StreamTransport,
        cancel: CancellationToken,
    ) -> Self {
        let (queue_tx, queue_rx) = mpsc::channel(QUEUE_CAPACITY);
        let stop = CancellationToken::new();
        let handle = BackendHandle {
            queue_tx: queue_tx.clone(),
            stop: stop.clone(),
        };
        tokio::spawn(drain_loop(
            manager, transport, server, queue_tx, queue_rx, cancel, stop,
        ));
        handle
    }
}

/// Drains one backend queue onto a persistent record stream.
///
/// Failure handling is two-tier and deliberately asymmetric:
/// connection establishment is retried forever on a fixed interval,
/// while a stream that fails after the connection stood up is never
/// retried here. The backend is discarded and the task ends; a later
/// selection may rebuild the handle from scratch.
async fn drain_loop(
    manager: EventManager,
    transport: StreamTransport,
    server: String,
    queue_tx: mpsc::Sender<Vec<u8>>,
    mut queue_rx: mpsc::Receiver<Vec<u8>>,
    cancel: CancellationToken,
    stop: CancellationToken,
) {
    let mut connection = loop {
        if cancel.is_cancelled() || stop.is_cancelled() {
            return;
        }
        match transport.connect(&server).await {
            Ok(connection) => break connection,
            Err(e) => {
                warn!(server = %server, error = %e, "backend connect failed, retrying");
                tokio::select! {
                    _ = cancel.cancelled() => return,
                    _ = stop.cancelled() => return,
                    _ = tokio::time::sleep(CONNECT_RETRY_INTERVAL) => {}
                }
            }
        }
    };

    let mut stream = match connection.open_stream().await {
        Ok(stream) => stream,
        Err(e) => {
            warn!(server = %server, error = %e, "record stream open failed, discarding backend");
            manager.discard_queue(&queue_tx);
            manager.remove_handle_if_current(&server, &queue_tx);
            return;
        }
    };
    info!(server = %server, "record stream established");

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                stream.close_send().await;
                break;
            }
            _ = stop.cancelled() => {
                stream.close_send().await;
                break;
            }
            record = queue_rx.recv() => match record {
                Some(payload) => {
                    if let Err(e) = stream.send(payload).await {
                        warn!(server = %server, error = %e, "record send failed, discarding backend");
                        stream.close_send().await;
                        manager.discard_queue(&queue_tx);
                        break;
                    }
                }
                None => {
                    stream.close_send().await;
                    break;
                }
            }
        }
    }
    manager.remove_handle_if_current(&server, &queue_tx);
}
