use std::task::{Context, Poll};
use std::{fmt, pin::Pin};

use etcd_client::{EventType, WatchStream as EtcdWatchStream, Watcher};
use futures::stream::Stream;
use futures::StreamExt;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;

use crate::errors::{DiscoveryError, Result};

/// A change observed under the registry prefix. Carries the affected
/// key only; consumers re-list the full membership on any event.
#[derive(Debug, Clone)]
pub enum RegistryEvent {
    Put { key: Vec<u8> },
    Delete { key: Vec<u8> },
}

pub struct RegistryWatchStream {
    inner: Pin<Box<dyn Stream<Item = Result<RegistryEvent>> + Send>>,
    // keeps the server-side etcd watch alive for the stream's lifetime
    _watcher: Option<Watcher>,
}

impl Stream for RegistryWatchStream {
    type Item = Result<RegistryEvent>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inner.as_mut().poll_next(cx)
    }
}

impl RegistryWatchStream {
    pub(crate) fn from_etcd(watcher: Watcher, stream: EtcdWatchStream) -> Self {
        let stream = stream.flat_map(|result| {
            futures::stream::iter(match result {
                Ok(response) => response
                    .events()
                    .iter()
                    .map(|event| {
                        let key = event.kv().map(|kv| kv.key().to_vec()).unwrap_or_default();
                        match event.event_type() {
                            EventType::Put => Ok(RegistryEvent::Put { key }),
                            EventType::Delete => Ok(RegistryEvent::Delete { key }),
                        }
                    })
                    .collect::<Vec<_>>(),
                Err(e) => vec![Err(DiscoveryError::from(e))],
            })
        });

        Self {
            inner: Box::pin(stream),
            _watcher: Some(watcher),
        }
    }

    pub(crate) fn from_broadcast(rx: broadcast::Receiver<RegistryEvent>) -> Self {
        let stream = BroadcastStream::new(rx)
            .map(|result| result.map_err(|e| DiscoveryError::WatchError(e.to_string())));

        Self {
            inner: Box::pin(stream),
            _watcher: None,
        }
    }
}

impl fmt::Display for RegistryEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegistryEvent::Put { key } => {
                write!(f, "Put(key: {})", String::from_utf8_lossy(key))
            }
            RegistryEvent::Delete { key } => {
                write!(f, "Delete(key: {})", String::from_utf8_lossy(key))
            }
        }
    }
}
