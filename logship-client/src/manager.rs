use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use logship_core::{Endpoint, GrpcTransport, StreamTransport};
use logship_discovery::{
    Discovery, DiscoveryError, EndpointObserver, RegistryStorage, BACKEND_REGISTRY_PREFIX,
};

use crate::config::ShipperConfig;
use crate::errors::{Result, ShipperError};
use crate::handle::BackendHandle;
use crate::logger::EventLogger;

/// Reserved event identity for records emitted without an event id.
pub const SYSTEM_EVENT_ID: &str = "system";

/// How often the logger registry is swept for unreleased loggers.
const GC_INTERVAL: Duration = Duration::from_secs(20);

/// Age past which an unreleased logger is reclaimed by the sweep.
const LOGGER_MAX_AGE: Duration = Duration::from_secs(60);

/// Central coordinator of the shipping client: owns the logger and
/// handle registries, the abnormal-server set and the round-robin
/// cursor, reacts to discovery updates, and hands out per-event
/// loggers.
///
/// Cloning is cheap and shares all state; pass clones through the call
/// graph instead of keeping a process-wide singleton. `start` is meant
/// to be called once, and `close` tears every background task down.
#[derive(Debug, Clone)]
pub struct EventManager {
    inner: Arc<Mutex<Inner>>,
    transport: StreamTransport,
    discovery: Option<Discovery>,
    cancel: CancellationToken,
    config: ShipperConfig,
}

#[derive(Debug, Default)]
struct Inner {
    servers: Vec<String>,
    handles: HashMap<String, BackendHandle>,
    abnormal: HashSet<String>,
    loggers: HashMap<String, EventLogger>,
    cursor: u64,
}

impl EventManager {
    pub fn builder() -> EventManagerBuilder {
        EventManagerBuilder::default()
    }

    /// Spawns one drain task per configured backend, subscribes to
    /// discovery updates and starts the logger GC sweep.
    pub async fn start(&self) -> Result<()> {
        {
            let mut inner = self.inner.lock();
            inner.servers = self.config.backends.clone();
            for server in self.config.backends.clone() {
                if !inner.handles.contains_key(&server) {
                    self.spawn_handle_locked(&mut inner, server);
                }
            }
        }
        if let Some(discovery) = &self.discovery {
            discovery.register(Arc::new(self.clone())).await?;
        }
        self.spawn_gc();
        Ok(())
    }

    /// Cancels the root token, which stops every drain task and the GC
    /// sweep, and stops the discovery subscription. Best-effort:
    /// shutdown problems are logged, never escalated.
    pub fn close(&self) {
        self.cancel.cancel();
        if let Some(discovery) = &self.discovery {
            discovery.stop();
        }
    }

    /// Returns the registered logger for `event_id`, creating one
    /// bound to a freshly selected backend queue if none exists. A
    /// blank id maps to the reserved `"system"` event.
    ///
    /// Callers should hand the logger back with [`release_logger`]
    /// once the event completes; unreleased loggers are reclaimed by
    /// the GC sweep after 60 seconds.
    ///
    /// [`release_logger`]: EventManager::release_logger
    pub fn get_logger(&self, event_id: &str) -> EventLogger {
        let event_id = if event_id.trim().is_empty() {
            SYSTEM_EVENT_ID
        } else {
            event_id
        };
        let mut inner = self.inner.lock();
        if let Some(logger) = inner.loggers.get(event_id) {
            return logger.clone();
        }
        let queue = self.pick_queue_locked(&mut inner);
        let logger = EventLogger::new(event_id.to_string(), queue);
        inner.loggers.insert(event_id.to_string(), logger.clone());
        logger
    }

    /// Removes `logger` from the registry if it is still the one on
    /// record for its event id; a stale clone is a no-op.
    pub fn release_logger(&self, logger: &EventLogger) {
        let mut inner = self.inner.lock();
        let current = inner
            .loggers
            .get(logger.event_id())
            .map(|registered| registered.same_instance(logger))
            .unwrap_or(false);
        if current {
            inner.loggers.remove(logger.event_id());
        }
    }

    /// Discovery-driven membership reconciliation. The batch is a full
    /// membership snapshot: handles are created for new addresses,
    /// handles for departed addresses are removed and stopped, and the
    /// abnormal set is cleared since discovery supersedes prior health
    /// beliefs. Empty input is ignored.
    pub fn update_endpoints(&self, endpoints: &[Endpoint]) {
        if endpoints.is_empty() {
            return;
        }
        let mut inner = self.inner.lock();
        info!(count = endpoints.len(), "updating backend endpoints");
        inner.abnormal.clear();

        let mut servers: Vec<String> = Vec::with_capacity(endpoints.len());
        for endpoint in endpoints {
            if servers.contains(&endpoint.url) {
                continue;
            }
            servers.push(endpoint.url.clone());
            if !inner.handles.contains_key(&endpoint.url) {
                self.spawn_handle_locked(&mut inner, endpoint.url.clone());
            }
        }

        let departed: Vec<String> = inner
            .handles
            .keys()
            .filter(|server| !servers.contains(*server))
            .cloned()
            .collect();
        for server in departed {
            if let Some(handle) = inner.handles.remove(&server) {
                handle.stop.cancel();
            }
        }

        inner.servers = servers;
        info!(
            handles = inner.handles.len(),
            servers = inner.servers.len(),
            "backend endpoint update applied"
        );
    }

    /// Failover for a broken backend queue: the owning address is
    /// marked abnormal, every logger bound to the queue is moved onto
    /// a freshly selected one, and the handle leaves the registry.
    pub(crate) fn discard_queue(&self, dead: &mpsc::Sender<Vec<u8>>) {
        let mut inner = self.inner.lock();

        let mut broken: Option<String> = None;
        for (server, handle) in inner.handles.iter() {
            if handle.queue_tx.same_channel(dead) {
                warn!(server = %server, "backend unreachable, excluding from selection");
                broken = Some(server.clone());
            }
        }
        if let Some(server) = broken {
            inner.abnormal.insert(server.clone());
            inner.handles.remove(&server);
        }

        let loggers: Vec<EventLogger> = inner.loggers.values().cloned().collect();
        for logger in loggers {
            let bound_to_dead = logger
                .queue()
                .map(|queue| queue.same_channel(dead))
                .unwrap_or(false);
            if bound_to_dead {
                let queue = self.pick_queue_locked(&mut inner);
                logger.swap_queue(queue);
            }
        }
    }

    /// Drain-task exit path: drops the registry entry only while it
    /// still refers to the exiting task's own queue, so a handle
    /// recreated for the same address is left alone.
    pub(crate) fn remove_handle_if_current(&self, server: &str, queue_tx: &mpsc::Sender<Vec<u8>>) {
        let mut inner = self.inner.lock();
        let current = inner
            .handles
            .get(server)
            .map(|handle| handle.queue_tx.same_channel(queue_tx))
            .unwrap_or(false);
        if current {
            inner.handles.remove(server);
        }
    }

    /// Round-robin selection over the current membership, lazily
    /// creating a handle when the chosen address has none. With every
    /// server abnormal, any registered queue is returned to keep the
    /// system degraded-but-alive; with no handles at all the records
    /// of the caller are dropped.
    fn pick_queue_locked(&self, inner: &mut Inner) -> Option<mpsc::Sender<Vec<u8>>> {
        for _ in 0..inner.servers.len() {
            let index = (inner.cursor % inner.servers.len() as u64) as usize;
            inner.cursor += 1;
            let server = inner.servers[index].clone();
            if inner.abnormal.contains(&server) {
                continue;
            }
            if let Some(handle) = inner.handles.get(&server) {
                return Some(handle.queue_tx.clone());
            }
            return Some(self.spawn_handle_locked(inner, server));
        }
        // every server is abnormal, fall back to whatever is still registered
        if let Some(handle) = inner.handles.values().next() {
            return Some(handle.queue_tx.clone());
        }
        None
    }

    fn spawn_handle_locked(&self, inner: &mut Inner, server: String) -> mpsc::Sender<Vec<u8>> {
        let handle = BackendHandle::spawn(
            server.clone(),
            self.clone(),
            self.transport.clone(),
            self.cancel.clone(),
        );
        let queue_tx = handle.queue_tx.clone();
        inner.handles.insert(server, handle);
        queue_tx
    }

    fn spawn_gc(&self) {
        let manager = self.clone();
        let cancel = self.cancel.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(GC_INTERVAL);
            // the first tick completes immediately
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => manager.sweep_loggers(),
                }
            }
        });
    }

    /// Reclaims loggers whose owners forgot to release them.
    fn sweep_loggers(&self) {
        let mut inner = self.inner.lock();
        let expired: Vec<String> = inner
            .loggers
            .iter()
            .filter(|(_, logger)| logger.created_at().elapsed() > LOGGER_MAX_AGE)
            .map(|(event_id, _)| event_id.clone())
            .collect();
        for event_id in expired {
            info!(event_id = %event_id, "auto releasing unreleased event logger");
            inner.loggers.remove(&event_id);
        }
    }

    #[cfg(test)]
    pub(crate) fn test_servers(&self) -> Vec<String> {
        self.inner.lock().servers.clone()
    }

    #[cfg(test)]
    pub(crate) fn test_handle_servers(&self) -> Vec<String> {
        let mut servers: Vec<String> = self.inner.lock().handles.keys().cloned().collect();
        servers.sort();
        servers
    }

    #[cfg(test)]
    pub(crate) fn test_abnormal(&self) -> Vec<String> {
        let mut servers: Vec<String> = self.inner.lock().abnormal.iter().cloned().collect();
        servers.sort();
        servers
    }

    #[cfg(test)]
    pub(crate) fn test_logger_count(&self) -> usize {
        self.inner.lock().loggers.len()
    }

    #[cfg(test)]
    pub(crate) fn test_mark_abnormal(&self, server: &str) {
        self.inner.lock().abnormal.insert(server.to_string());
    }

    #[cfg(test)]
    pub(crate) fn test_queue_for(&self, server: &str) -> Option<mpsc::Sender<Vec<u8>>> {
        self.inner
            .lock()
            .handles
            .get(server)
            .map(|handle| handle.queue_tx.clone())
    }

    #[cfg(test)]
    pub(crate) fn test_drop_handle(&self, server: &str) {
        self.inner.lock().handles.remove(server);
    }

    #[cfg(test)]
    pub(crate) fn test_pick_server(&self) -> Option<String> {
        let mut inner = self.inner.lock();
        let queue = self.pick_queue_locked(&mut inner)?;
        inner
            .handles
            .iter()
            .find(|(_, handle)| handle.queue_tx.same_channel(&queue))
            .map(|(server, _)| server.clone())
    }
}

#[async_trait]
impl EndpointObserver for EventManager {
    async fn update_endpoints(&self, endpoints: Vec<Endpoint>) {
        EventManager::update_endpoints(self, &endpoints);
    }

    async fn on_error(&self, error: DiscoveryError) {
        warn!(error = %error, "discovery watch error, keeping current membership");
    }
}

/// Builds an [`EventManager`], wiring transport and discovery.
///
/// When discovery endpoints are configured but the discovery client
/// cannot be constructed, construction degrades to the static backend
/// list; with no static list either, it fails.
#[derive(Debug, Clone, Default)]
pub struct EventManagerBuilder {
    config: ShipperConfig,
    transport: Option<StreamTransport>,
    registry: Option<RegistryStorage>,
}

impl EventManagerBuilder {
    /// Sets the static backend address list.
    pub fn backends<I, S>(mut self, backends: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.backends = backends.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the discovery-store endpoints to watch for live membership.
    pub fn discovery_endpoints<I, S>(mut self, endpoints: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.discovery = endpoints.into_iter().map(Into::into).collect();
        self
    }

    /// Replaces the whole configuration at once.
    pub fn config(mut self, config: ShipperConfig) -> Self {
        self.config = config;
        self
    }

    /// Overrides the record transport; defaults to gRPC.
    pub fn with_transport(mut self, transport: StreamTransport) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Injects a registry directly instead of connecting to etcd.
    pub fn with_registry(mut self, registry: RegistryStorage) -> Self {
        self.registry = Some(registry);
        self
    }

    pub async fn build(self) -> Result<EventManager> {
        let transport = self
            .transport
            .unwrap_or_else(|| StreamTransport::Grpc(GrpcTransport::new()));

        let discovery = match self.registry {
            Some(registry) => Some(Discovery::new(registry)),
            None if !self.config.discovery.is_empty() => {
                match Discovery::connect_etcd(&self.config.discovery, BACKEND_REGISTRY_PREFIX)
                    .await
                {
                    Ok(discovery) => Some(discovery),
                    Err(e) => {
                        if self.config.backends.is_empty() {
                            return Err(ShipperError::NoBackends(e));
                        }
                        warn!(
                            error = %e,
                            "discovery unavailable, continuing with static backends only"
                        );
                        None
                    }
                }
            }
            None => {
                if self.config.backends.is_empty() {
                    return Err(ShipperError::EmptyConfiguration);
                }
                None
            }
        };

        Ok(EventManager {
            inner: Arc::new(Mutex::new(Inner::default())),
            transport,
            discovery,
            cancel: CancellationToken::new(),
            config: self.config,
        })
    }
}
