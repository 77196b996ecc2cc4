use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;

use crate::errors::{Result, TransportError};

use super::{LogTransport, RecordStream, TransportConnection};

/// MemoryTransport is an in-process transport that captures delivered
/// payloads per address and supports scripted failures.
/// SHOULD BE USED ONLY FOR TESTING PURPOSES
#[derive(Debug, Clone, Default)]
pub struct MemoryTransport {
    inner: Arc<MemoryInner>,
}

#[derive(Debug, Default)]
struct MemoryInner {
    delivered: DashMap<String, Vec<Vec<u8>>>,
    connect_attempts: DashMap<String, usize>,
    // remaining scripted refusals; usize::MAX refuses forever
    refuse_connect: DashMap<String, usize>,
    fail_stream_open: DashMap<String, usize>,
    // sends accepted per opened stream before failing; usize::MAX never fails
    fail_sends_after: DashMap<String, usize>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        MemoryTransport::default()
    }

    /// Scripts the next `times` connect calls to `addr` to fail.
    pub fn refuse_connect(&self, addr: &str, times: usize) {
        self.inner.refuse_connect.insert(addr.to_string(), times);
    }

    /// Scripts the next `times` stream opens on `addr` to fail.
    pub fn fail_stream_open(&self, addr: &str, times: usize) {
        self.inner.fail_stream_open.insert(addr.to_string(), times);
    }

    /// Scripts streams to `addr` to accept `ok_sends` records and then
    /// fail every subsequent send.
    pub fn fail_sends_after(&self, addr: &str, ok_sends: usize) {
        self.inner.fail_sends_after.insert(addr.to_string(), ok_sends);
    }

    /// Payloads successfully delivered to `addr`, in arrival order.
    pub fn delivered(&self, addr: &str) -> Vec<Vec<u8>> {
        self.inner
            .delivered
            .get(addr)
            .map(|payloads| payloads.clone())
            .unwrap_or_default()
    }

    pub fn delivered_count(&self, addr: &str) -> usize {
        self.inner
            .delivered
            .get(addr)
            .map(|payloads| payloads.len())
            .unwrap_or(0)
    }

    /// How many connect calls `addr` has seen, including refused ones.
    pub fn connect_attempts(&self, addr: &str) -> usize {
        self.inner
            .connect_attempts
            .get(addr)
            .map(|attempts| *attempts)
            .unwrap_or(0)
    }
}

#[async_trait]
impl LogTransport for MemoryTransport {
    async fn connect(&self, addr: &str) -> Result<Box<dyn TransportConnection>> {
        *self
            .inner
            .connect_attempts
            .entry(addr.to_string())
            .or_insert(0) += 1;

        if let Some(mut remaining) = self.inner.refuse_connect.get_mut(addr) {
            if *remaining > 0 {
                if *remaining != usize::MAX {
                    *remaining -= 1;
                }
                return Err(TransportError::ConnectionRefused(addr.to_string()));
            }
        }

        Ok(Box::new(MemoryConnection {
            addr: addr.to_string(),
            transport: self.clone(),
        }))
    }
}

struct MemoryConnection {
    addr: String,
    transport: MemoryTransport,
}

#[async_trait]
impl TransportConnection for MemoryConnection {
    async fn open_stream(&mut self) -> Result<Box<dyn RecordStream>> {
        if let Some(mut remaining) = self.transport.inner.fail_stream_open.get_mut(&self.addr) {
            if *remaining > 0 {
                if *remaining != usize::MAX {
                    *remaining -= 1;
                }
                return Err(TransportError::StreamClosed(format!(
                    "stream open refused by {}",
                    self.addr
                )));
            }
        }

        let budget = self
            .transport
            .inner
            .fail_sends_after
            .get(&self.addr)
            .map(|ok_sends| *ok_sends)
            .unwrap_or(usize::MAX);

        Ok(Box::new(MemoryRecordStream {
            addr: self.addr.clone(),
            transport: self.transport.clone(),
            remaining_ok: budget,
        }))
    }
}

struct MemoryRecordStream {
    addr: String,
    transport: MemoryTransport,
    remaining_ok: usize,
}

#[async_trait]
impl RecordStream for MemoryRecordStream {
    async fn send(&mut self, payload: Vec<u8>) -> Result<()> {
        if self.remaining_ok == 0 {
            return Err(TransportError::StreamClosed(format!(
                "scripted send failure on {}",
                self.addr
            )));
        }
        if self.remaining_ok != usize::MAX {
            self.remaining_ok -= 1;
        }
        self.transport
            .inner
            .delivered
            .entry(self.addr.clone())
            .or_default()
            .push(payload);
        Ok(())
    }

    async fn close_send(&mut self) {}
}
