use std::collections::HashMap;
use std::sync::Arc;

use arc_swap::ArcSwapOption;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::trace;

use logship_core::{Level, LogRecord};

/// Per-event emit facade handed out by the manager.
///
/// Emitting never blocks and never fails: the record is serialized and
/// pushed onto the currently assigned backend queue with a non-blocking
/// send, and a full or absent queue drops it. The queue reference is
/// swapped atomically during failover, so a producer never observes a
/// torn update. Clones share the same registration.
#[derive(Debug, Clone)]
pub struct EventLogger {
    inner: Arc<LoggerInner>,
}

#[derive(Debug)]
struct LoggerInner {
    event_id: String,
    queue: ArcSwapOption<mpsc::Sender<Vec<u8>>>,
    created_at: Instant,
}

impl EventLogger {
    pub(crate) fn new(event_id: String, queue: Option<mpsc::Sender<Vec<u8>>>) -> Self {
        EventLogger {
            inner: Arc::new(LoggerInner {
                event_id,
                queue: ArcSwapOption::from(queue.map(Arc::new)),
                created_at: Instant::now(),
            }),
        }
    }

    pub fn info(&self, message: &str, attributes: Option<HashMap<String, String>>) {
        self.emit(Level::Info, message, attributes);
    }

    pub fn error(&self, message: &str, attributes: Option<HashMap<String, String>>) {
        self.emit(Level::Error, message, attributes);
    }

    pub fn debug(&self, message: &str, attributes: Option<HashMap<String, String>>) {
        self.emit(Level::Debug, message, attributes);
    }

    pub fn event_id(&self) -> &str {
        &self.inner.event_id
    }

    pub fn created_at(&self) -> Instant {
        self.inner.created_at
    }

    pub(crate) fn queue(&self) -> Option<Arc<mpsc::Sender<Vec<u8>>>> {
        self.inner.queue.load_full()
    }

    pub(crate) fn swap_queue(&self, queue: Option<mpsc::Sender<Vec<u8>>>) {
        self.inner.queue.store(queue.map(Arc::new));
    }

    pub(crate) fn same_instance(&self, other: &EventLogger) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    fn emit(&self, level: Level, message: &str, attributes: Option<HashMap<String, String>>) {
        let record = LogRecord::build(level, &self.inner.event_id, message, attributes);
        let payload = match record.to_bytes() {
            Ok(payload) => payload,
            Err(_) => return,
        };
        if let Some(queue) = self.inner.queue.load_full() {
            if queue.try_send(payload).is_err() {
                trace!(
                    event_id = %self.inner.event_id,
                    "backend queue full or closed, record dropped"
                );
            }
        }
    }
}
