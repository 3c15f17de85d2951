//! Pooled printer connections
//!
//! One slot per `host:port`. A slot is an async mutex held across connect
//! and write, so concurrent users of the same printer queue up behind a
//! single connect attempt and never interleave bytes on the socket.
//!
//! Entry lifecycle: unconnected → connecting → connected → {healthy |
//! unhealthy} → unconnected.

use futures::StreamExt;
use parking_lot::Mutex;
use shared::PrintEvent;
use shared::models::{ConnectionState, PrinterEndpoint, endpoint_address};
use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::{OwnedMutexGuard, broadcast};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use ticket_printer::{PrintError, PrinterLink, STATUS_QUERY, Transport, socket_addr};

use super::backoff::Backoff;
use crate::core::Config;
use crate::error::{HubResult, PrintHubError};

/// Probes running at once during a health pass
const HEALTH_CONCURRENCY: usize = 8;

#[derive(Debug, Clone, Copy)]
pub struct ConnectionConfig {
    pub connect_timeout: Duration,
    /// Read window of the liveness query
    pub probe_timeout: Duration,
    pub health_check_interval: Duration,
    pub idle_timeout: Duration,
    pub backoff: Backoff,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(5),
            probe_timeout: Duration::from_millis(500),
            health_check_interval: Duration::from_secs(30),
            idle_timeout: Duration::from_secs(300),
            backoff: Backoff::default(),
        }
    }
}

impl From<&Config> for ConnectionConfig {
    fn from(config: &Config) -> Self {
        Self {
            connect_timeout: config.connect_timeout(),
            probe_timeout: Duration::from_millis(500),
            health_check_interval: config.health_check_interval(),
            idle_timeout: config.idle_timeout(),
            backoff: Backoff::new(
                Duration::from_millis(config.reconnect_base_ms),
                Duration::from_millis(config.reconnect_max_ms),
                config.reconnect_max_attempts,
            ),
        }
    }
}

/// Pool counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStatistics {
    pub size: usize,
    pub healthy: usize,
    /// Used within the idle window
    pub recently_active: usize,
}

/// Outcome of one health pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HealthReport {
    pub healthy: Vec<String>,
    /// Found dead; a reconnect loop was started in the background
    pub reconnecting: Vec<String>,
    /// Busy, idle, given up or already reconnecting
    pub skipped: Vec<String>,
}

enum HealthOutcome {
    Healthy,
    Reconnecting,
    Skipped,
}

struct PoolEntry {
    host: String,
    port: u16,
    link: Option<Box<dyn PrinterLink>>,
    state: ConnectionState,
    connection_id: u64,
    last_used: Instant,
    last_health_check: Option<Instant>,
    reconnect_attempts: u32,
    /// Cleared once the backoff is exhausted; set again by an explicit use
    auto_reconnect: bool,
    /// Removed from the pool; a waiter holding this slot must look again
    evicted: bool,
}

impl PoolEntry {
    fn new(host: &str, port: u16) -> Self {
        Self {
            host: host.to_string(),
            port,
            link: None,
            state: ConnectionState::Unconnected,
            connection_id: 0,
            last_used: Instant::now(),
            last_health_check: None,
            reconnect_attempts: 0,
            auto_reconnect: true,
            evicted: false,
        }
    }

    fn is_live(&self) -> bool {
        self.link.is_some() && self.state.is_usable()
    }
}

type Slot = Arc<tokio::sync::Mutex<PoolEntry>>;

/// Exclusive use of one pooled connection.
///
/// Other users of the same printer wait until this is dropped.
pub struct PooledConnection {
    key: String,
    entry: OwnedMutexGuard<PoolEntry>,
    events: broadcast::Sender<PrintEvent>,
}

impl std::fmt::Debug for PooledConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PooledConnection")
            .field("address", &self.key)
            .field("connection_id", &self.entry.connection_id)
            .field("state", &self.entry.state)
            .finish()
    }
}

impl PooledConnection {
    pub fn address(&self) -> &str {
        &self.key
    }

    /// Identifier of the underlying socket; changes on every reconnect
    pub fn connection_id(&self) -> u64 {
        self.entry.connection_id
    }

    pub fn state(&self) -> ConnectionState {
        self.entry.state
    }

    /// Write the whole buffer.
    ///
    /// On failure the socket is dropped and the entry marked unhealthy; the
    /// error is returned to the caller, which owns the retry decision.
    pub async fn write_all(&mut self, data: &[u8]) -> HubResult<()> {
        let Some(link) = self.entry.link.as_mut() else {
            return Err(PrintHubError::connection(
                self.key.clone(),
                PrintError::Closed("connection was dropped".into()),
            ));
        };

        match link.write_all(data).await {
            Ok(()) => {
                self.entry.last_used = Instant::now();
                Ok(())
            }
            Err(e) => {
                warn!(addr = %self.key, error = %e, "Write failed, dropping connection");
                mark_unhealthy(&self.key, &mut self.entry, &e.to_string(), &self.events).await;
                Err(PrintHubError::connection(self.key.clone(), e))
            }
        }
    }
}

async fn mark_unhealthy(
    key: &str,
    entry: &mut PoolEntry,
    reason: &str,
    events: &broadcast::Sender<PrintEvent>,
) {
    if let Some(mut link) = entry.link.take() {
        link.shutdown().await;
    }
    entry.state = ConnectionState::Unhealthy;
    let _ = events.send(PrintEvent::PrinterDisconnected {
        address: key.to_string(),
        state: ConnectionState::Unhealthy,
        reason: Some(reason.to_string()),
    });
}

/// Resolve a host (IP literal or name) to a socket address
pub async fn resolve(host: &str, port: u16) -> HubResult<SocketAddr> {
    if let Ok(addr) = socket_addr(host, port) {
        return Ok(addr);
    }
    let target = endpoint_address(host, port);
    let mut addrs = tokio::net::lookup_host(target.as_str())
        .await
        .map_err(|e| PrintHubError::InvalidAddress(format!("{}: {}", target, e)))?;
    addrs
        .next()
        .ok_or_else(|| PrintHubError::InvalidAddress(format!("{} did not resolve", target)))
}

/// Liveness query: DLE EOT 1, then a short read.
///
/// A reply or a silent window both count as alive; only an I/O error or
/// the peer closing the socket count as dead.
pub async fn liveness(link: &mut dyn PrinterLink, timeout: Duration) -> Result<(), PrintError> {
    link.write_all(&STATUS_QUERY).await?;
    let mut buf = [0u8; 16];
    match link.read_timeout(&mut buf, timeout).await? {
        Some(0) => Err(PrintError::Closed("closed during status query".into())),
        _ => Ok(()),
    }
}

pub struct ConnectionManager {
    transport: Arc<dyn Transport>,
    config: ConnectionConfig,
    pool: Mutex<HashMap<String, Slot>>,
    /// Addresses with a reconnect loop in flight
    reconnecting: Mutex<HashSet<String>>,
    events: broadcast::Sender<PrintEvent>,
    suspended: AtomicBool,
    health_enabled: AtomicBool,
    connect_attempts: AtomicU64,
    next_connection_id: AtomicU64,
}

impl ConnectionManager {
    pub fn new(
        transport: Arc<dyn Transport>,
        config: ConnectionConfig,
        events: broadcast::Sender<PrintEvent>,
    ) -> Self {
        info!(transport = %transport.kind(), "Connection manager created");
        Self {
            transport,
            config,
            pool: Mutex::new(HashMap::new()),
            reconnecting: Mutex::new(HashSet::new()),
            events,
            suspended: AtomicBool::new(false),
            health_enabled: AtomicBool::new(true),
            connect_attempts: AtomicU64::new(0),
            next_connection_id: AtomicU64::new(1),
        }
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    /// Total connect attempts made by the pool
    pub fn connect_attempts(&self) -> u64 {
        self.connect_attempts.load(Ordering::SeqCst)
    }

    // ========== Pool access ==========

    /// Pooled connection to an endpoint, opening one if needed
    pub async fn get_connection(&self, endpoint: &PrinterEndpoint) -> HubResult<PooledConnection> {
        self.connect_to(&endpoint.host, endpoint.port).await
    }

    /// Pooled connection to `host:port`.
    ///
    /// Concurrent callers for the same address share one connect attempt.
    /// An explicit use re-arms automatic reconnection.
    #[instrument(skip(self), fields(addr = %endpoint_address(host, port)))]
    pub async fn connect_to(&self, host: &str, port: u16) -> HubResult<PooledConnection> {
        let key = endpoint_address(host, port);
        loop {
            let slot = self.slot(&key, host, port);
            let mut entry = slot.lock_owned().await;
            if entry.evicted {
                continue;
            }

            entry.last_used = Instant::now();
            entry.reconnect_attempts = 0;
            entry.auto_reconnect = true;

            if !entry.is_live() {
                self.open(&key, &mut entry).await?;
            }

            return Ok(PooledConnection {
                key,
                entry,
                events: self.events.clone(),
            });
        }
    }

    /// Write a buffer to an endpoint through its pooled connection
    pub async fn send_bytes(&self, endpoint: &PrinterEndpoint, data: &[u8]) -> HubResult<()> {
        let mut conn = self.get_connection(endpoint).await?;
        conn.write_all(data).await?;
        debug!(addr = %conn.address(), bytes = data.len(), "Bytes sent");
        Ok(())
    }

    /// One-shot connection outside the pool (discovery probes)
    pub async fn probe(&self, addr: SocketAddr, timeout: Duration) -> HubResult<Box<dyn PrinterLink>> {
        self.transport
            .connect(addr, timeout)
            .await
            .map_err(|e| PrintHubError::connection(addr.to_string(), e))
    }

    /// Tear down and rebuild the connection to an endpoint
    #[instrument(skip(self, endpoint), fields(addr = %endpoint.address()))]
    pub async fn force_reconnect(&self, endpoint: &PrinterEndpoint) -> HubResult<()> {
        let key = endpoint.address();
        let slot = self.slot(&key, &endpoint.host, endpoint.port);
        let mut entry = slot.lock_owned().await;
        self.close_entry(&key, &mut entry, "forced reconnect").await;
        entry.reconnect_attempts = 0;
        entry.auto_reconnect = true;
        entry.last_used = Instant::now();
        self.open(&key, &mut entry).await
    }

    /// Close the socket of an endpoint; the next use reconnects
    pub async fn invalidate(&self, host: &str, port: u16) {
        let key = endpoint_address(host, port);
        let slot = self.pool.lock().get(&key).cloned();
        if let Some(slot) = slot {
            let mut entry = slot.lock().await;
            self.close_entry(&key, &mut entry, "invalidated").await;
        }
    }

    /// Close and forget an endpoint (printer removed or readdressed)
    pub async fn remove(&self, host: &str, port: u16) {
        let key = endpoint_address(host, port);
        let slot = self.pool.lock().remove(&key);
        if let Some(slot) = slot {
            let mut entry = slot.lock().await;
            entry.evicted = true;
            self.close_entry(&key, &mut entry, "removed").await;
        }
    }

    pub fn statistics(&self) -> PoolStatistics {
        let pool = self.pool.lock();
        let mut stats = PoolStatistics {
            size: pool.len(),
            ..PoolStatistics::default()
        };
        for slot in pool.values() {
            match slot.try_lock() {
                Ok(entry) => {
                    if entry.is_live() {
                        stats.healthy += 1;
                    }
                    if entry.last_used.elapsed() <= self.config.idle_timeout {
                        stats.recently_active += 1;
                    }
                }
                // in use right now
                Err(_) => {
                    stats.healthy += 1;
                    stats.recently_active += 1;
                }
            }
        }
        stats
    }

    /// Current state of an endpoint's entry, if pooled and not busy
    pub fn state_of(&self, host: &str, port: u16) -> Option<ConnectionState> {
        let key = endpoint_address(host, port);
        let slot = self.pool.lock().get(&key).cloned()?;
        slot.try_lock().ok().map(|entry| entry.state)
    }

    /// Whether a background reconnect loop is running for `host:port`
    pub fn is_reconnecting(&self, host: &str, port: u16) -> bool {
        self.reconnecting.lock().contains(&endpoint_address(host, port))
    }

    // ========== Health ==========

    pub fn set_health_check_enabled(&self, enabled: bool) {
        self.health_enabled.store(enabled, Ordering::SeqCst);
    }

    pub fn is_suspended(&self) -> bool {
        self.suspended.load(Ordering::SeqCst)
    }

    /// App went to background: stop periodic checks
    pub fn suspend(&self) {
        info!("Connection health checks suspended");
        self.suspended.store(true, Ordering::SeqCst);
    }

    /// App came back: restart periodic checks and re-validate every entry now
    pub async fn resume(self: &Arc<Self>) -> HealthReport {
        info!("Connection health checks resumed");
        self.suspended.store(false, Ordering::SeqCst);
        self.evict_idle().await;
        self.check_health().await
    }

    /// Check every recently used entry.
    ///
    /// Dead entries get their own reconnect task, so one printer backing off
    /// never holds up the pass for the others.
    pub async fn check_health(self: &Arc<Self>) -> HealthReport {
        let slots: Vec<(String, Slot)> = self
            .pool
            .lock()
            .iter()
            .map(|(key, slot)| (key.clone(), slot.clone()))
            .collect();

        let outcomes: Vec<(String, HealthOutcome)> = futures::stream::iter(slots)
            .map(|(key, slot)| async move {
                let outcome = self.check_entry(&key, &slot).await;
                (key, outcome)
            })
            .buffer_unordered(HEALTH_CONCURRENCY)
            .collect()
            .await;

        let mut report = HealthReport::default();
        for (key, outcome) in outcomes {
            match outcome {
                HealthOutcome::Healthy => report.healthy.push(key),
                HealthOutcome::Reconnecting => report.reconnecting.push(key),
                HealthOutcome::Skipped => report.skipped.push(key),
            }
        }
        if !report.reconnecting.is_empty() {
            info!(
                healthy = report.healthy.len(),
                reconnecting = report.reconnecting.len(),
                "Health check pass finished"
            );
        }
        report
    }

    async fn check_entry(self: &Arc<Self>, key: &str, slot: &Slot) -> HealthOutcome {
        let Ok(mut entry) = slot.clone().try_lock_owned() else {
            // printing right now, which is proof enough
            return HealthOutcome::Skipped;
        };
        if entry.evicted || entry.last_used.elapsed() > self.config.idle_timeout {
            return HealthOutcome::Skipped;
        }

        if let Some(link) = entry.link.as_mut() {
            match liveness(link.as_mut(), self.config.probe_timeout).await {
                Ok(()) => {
                    entry.state = ConnectionState::Healthy;
                    entry.last_health_check = Some(Instant::now());
                    entry.reconnect_attempts = 0;
                    return HealthOutcome::Healthy;
                }
                Err(e) => {
                    warn!(addr = %key, error = %e, "Health probe failed");
                    mark_unhealthy(key, &mut entry, &e.to_string(), &self.events).await;
                }
            }
        }

        if !entry.auto_reconnect {
            return HealthOutcome::Skipped;
        }
        drop(entry);

        if !self.reconnecting.lock().insert(key.to_string()) {
            return HealthOutcome::Skipped;
        }
        let manager = self.clone();
        let key = key.to_string();
        let slot = slot.clone();
        tokio::spawn(async move {
            let reconnected = manager.reconnect_with_backoff(&key, &slot).await;
            manager.reconnecting.lock().remove(&key);
            debug!(addr = %key, reconnected, "Reconnect loop finished");
        });
        HealthOutcome::Reconnecting
    }

    /// Reconnect attempts spaced by the backoff; the slot is released while
    /// sleeping so prints are not blocked by the wait.
    async fn reconnect_with_backoff(&self, key: &str, slot: &Slot) -> bool {
        loop {
            let attempt = {
                let mut entry = slot.lock().await;
                if entry.evicted || entry.is_live() {
                    return entry.is_live();
                }
                if self.config.backoff.exhausted(entry.reconnect_attempts) {
                    warn!(
                        addr = %key,
                        attempts = entry.reconnect_attempts,
                        "Reconnect attempts exhausted, waiting for next explicit use"
                    );
                    entry.auto_reconnect = false;
                    return false;
                }
                entry.reconnect_attempts
            };

            let delay = self.config.backoff.delay(attempt);
            debug!(addr = %key, attempt, delay_ms = delay.as_millis() as u64, "Reconnect scheduled");
            tokio::time::sleep(delay).await;

            let mut entry = slot.clone().lock_owned().await;
            if entry.evicted || entry.is_live() {
                return entry.is_live();
            }
            if !entry.auto_reconnect {
                return false;
            }
            entry.reconnect_attempts += 1;
            if self.open(key, &mut entry).await.is_ok() {
                entry.state = ConnectionState::Healthy;
                entry.last_health_check = Some(Instant::now());
                return true;
            }
        }
    }

    /// Close and drop entries unused beyond the idle timeout
    pub async fn evict_idle(&self) -> usize {
        let mut evicted = Vec::new();
        {
            let mut pool = self.pool.lock();
            pool.retain(|key, slot| {
                let Ok(mut entry) = slot.try_lock() else {
                    return true;
                };
                if entry.last_used.elapsed() <= self.config.idle_timeout {
                    return true;
                }
                entry.evicted = true;
                // dropping the link closes the socket
                let had_link = entry.link.take().is_some();
                evicted.push((key.clone(), had_link));
                false
            });
        }

        for (key, had_link) in &evicted {
            debug!(addr = %key, "Idle connection evicted");
            if *had_link {
                let _ = self.events.send(PrintEvent::PrinterDisconnected {
                    address: key.clone(),
                    state: ConnectionState::Unconnected,
                    reason: Some("idle".into()),
                });
            }
        }
        evicted.len()
    }

    /// Periodic health checks and idle eviction until shutdown
    pub async fn run_health_loop(self: Arc<Self>, shutdown: CancellationToken) {
        info!(
            interval_secs = self.config.health_check_interval.as_secs(),
            "Connection health loop started"
        );
        let mut ticker = tokio::time::interval(self.config.health_check_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // first tick fires immediately
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Connection health loop received shutdown signal");
                    break;
                }
                _ = ticker.tick() => {
                    if self.is_suspended() || !self.health_enabled.load(Ordering::SeqCst) {
                        continue;
                    }
                    self.evict_idle().await;
                    tokio::select! {
                        _ = shutdown.cancelled() => break,
                        _ = self.check_health() => {}
                    }
                }
            }
        }
    }

    /// Close every connection
    pub async fn shutdown(&self) {
        let slots: Vec<(String, Slot)> = self.pool.lock().drain().collect();
        for (key, slot) in slots {
            let mut entry = slot.lock().await;
            entry.evicted = true;
            self.close_entry(&key, &mut entry, "shutdown").await;
        }
        info!("All printer connections closed");
    }

    // ========== Internals ==========

    fn slot(&self, key: &str, host: &str, port: u16) -> Slot {
        self.pool
            .lock()
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(PoolEntry::new(host, port))))
            .clone()
    }

    async fn open(&self, key: &str, entry: &mut PoolEntry) -> HubResult<()> {
        if let Some(mut link) = entry.link.take() {
            link.shutdown().await;
        }
        entry.state = ConnectionState::Connecting;

        let addr = match resolve(&entry.host, entry.port).await {
            Ok(addr) => addr,
            Err(e) => {
                entry.state = ConnectionState::Unhealthy;
                return Err(e);
            }
        };

        self.connect_attempts.fetch_add(1, Ordering::SeqCst);
        match self.transport.connect(addr, self.config.connect_timeout).await {
            Ok(link) => {
                entry.link = Some(link);
                entry.state = ConnectionState::Connected;
                entry.connection_id = self.next_connection_id.fetch_add(1, Ordering::SeqCst);
                info!(addr = %key, connection_id = entry.connection_id, "Printer connected");
                let _ = self.events.send(PrintEvent::PrinterConnected {
                    address: key.to_string(),
                });
                Ok(())
            }
            Err(e) => {
                warn!(addr = %key, error = %e, "Printer connection failed");
                entry.state = ConnectionState::Unhealthy;
                let _ = self.events.send(PrintEvent::PrinterDisconnected {
                    address: key.to_string(),
                    state: ConnectionState::Unhealthy,
                    reason: Some(e.to_string()),
                });
                Err(PrintHubError::connection(key, e))
            }
        }
    }

    async fn close_entry(&self, key: &str, entry: &mut PoolEntry, reason: &str) {
        if let Some(mut link) = entry.link.take() {
            link.shutdown().await;
            debug!(addr = %key, reason, "Connection closed");
            let _ = self.events.send(PrintEvent::PrinterDisconnected {
                address: key.to_string(),
                state: ConnectionState::Unconnected,
                reason: Some(reason.to_string()),
            });
        }
        entry.state = ConnectionState::Unconnected;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize;
    use ticket_printer::{PrintResult, TransportKind};

    /// Link that records writes and can be told to fail
    #[derive(Debug)]
    struct FakeLink {
        peer: SocketAddr,
        written: Arc<Mutex<Vec<u8>>>,
        fail_writes: Arc<AtomicBool>,
        dead: Arc<Mutex<Vec<SocketAddr>>>,
    }

    #[async_trait]
    impl PrinterLink for FakeLink {
        fn peer(&self) -> SocketAddr {
            self.peer
        }

        async fn write_all(&mut self, data: &[u8]) -> PrintResult<()> {
            if self.fail_writes.load(Ordering::SeqCst) || self.dead.lock().contains(&self.peer) {
                return Err(PrintError::Io(std::io::Error::new(
                    std::io::ErrorKind::BrokenPipe,
                    "broken pipe",
                )));
            }
            self.written.lock().extend_from_slice(data);
            Ok(())
        }

        async fn read_timeout(
            &mut self,
            _buf: &mut [u8],
            _timeout: Duration,
        ) -> PrintResult<Option<usize>> {
            Ok(None)
        }

        async fn shutdown(&mut self) {}
    }

    #[derive(Debug, Default)]
    struct FakeTransport {
        connects: AtomicUsize,
        refuse: AtomicBool,
        connect_delay_ms: u64,
        written: Arc<Mutex<Vec<u8>>>,
        fail_writes: Arc<AtomicBool>,
        /// Peers that refuse connects and break open links
        dead: Arc<Mutex<Vec<SocketAddr>>>,
    }

    #[async_trait]
    impl Transport for FakeTransport {
        fn kind(&self) -> TransportKind {
            TransportKind::Socket
        }

        async fn connect(
            &self,
            addr: SocketAddr,
            _timeout: Duration,
        ) -> PrintResult<Box<dyn PrinterLink>> {
            self.connects.fetch_add(1, Ordering::SeqCst);
            if self.connect_delay_ms > 0 {
                tokio::time::sleep(Duration::from_millis(self.connect_delay_ms)).await;
            }
            if self.refuse.load(Ordering::SeqCst) || self.dead.lock().contains(&addr) {
                return Err(PrintError::Connection("refused".into()));
            }
            Ok(Box::new(FakeLink {
                peer: addr,
                written: self.written.clone(),
                fail_writes: self.fail_writes.clone(),
                dead: self.dead.clone(),
            }))
        }
    }

    fn endpoint() -> PrinterEndpoint {
        PrinterEndpoint::from_input(shared::models::PrinterInput::new(
            "Kitchen",
            "10.0.0.5",
            shared::models::PrinterRole::Kitchen,
        ))
    }

    /// Wait for the background reconnect loop of `host` to end
    async fn settle(mgr: &ConnectionManager, host: &str) {
        for _ in 0..200 {
            if !mgr.is_reconnecting(host, 9100) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("reconnect loop for {} did not finish", host);
    }

    fn manager(transport: Arc<FakeTransport>, config: ConnectionConfig) -> Arc<ConnectionManager> {
        let (tx, _) = broadcast::channel(64);
        Arc::new(ConnectionManager::new(transport, config, tx))
    }

    fn fast_config() -> ConnectionConfig {
        ConnectionConfig {
            backoff: Backoff::new(Duration::from_millis(5), Duration::from_millis(20), 3),
            ..ConnectionConfig::default()
        }
    }

    #[tokio::test]
    async fn test_concurrent_requests_share_one_connect() {
        let transport = Arc::new(FakeTransport {
            connect_delay_ms: 50,
            ..FakeTransport::default()
        });
        let mgr = manager(transport.clone(), ConnectionConfig::default());
        let ep = endpoint();

        let tasks: Vec<_> = (0..10)
            .map(|_| {
                let mgr = mgr.clone();
                let ep = ep.clone();
                tokio::spawn(async move { mgr.get_connection(&ep).await.map(|c| c.connection_id()) })
            })
            .collect();

        let mut ids = Vec::new();
        for task in tasks {
            ids.push(task.await.unwrap().unwrap());
        }
        ids.dedup();
        assert_eq!(ids.len(), 1);
        assert_eq!(transport.connects.load(Ordering::SeqCst), 1);
        assert_eq!(mgr.connect_attempts(), 1);
        assert_eq!(mgr.statistics().size, 1);
    }

    #[tokio::test]
    async fn test_send_bytes_reuses_socket() {
        let transport = Arc::new(FakeTransport::default());
        let mgr = manager(transport.clone(), ConnectionConfig::default());
        let ep = endpoint();

        mgr.send_bytes(&ep, b"one").await.unwrap();
        mgr.send_bytes(&ep, b"two").await.unwrap();

        assert_eq!(transport.written.lock().as_slice(), b"onetwo");
        assert_eq!(transport.connects.load(Ordering::SeqCst), 1);
        let stats = mgr.statistics();
        assert_eq!(stats.healthy, 1);
        assert_eq!(stats.recently_active, 1);
    }

    #[tokio::test]
    async fn test_write_failure_marks_unhealthy_and_propagates() {
        let transport = Arc::new(FakeTransport::default());
        let (tx, mut rx) = broadcast::channel(64);
        let mgr = ConnectionManager::new(transport.clone(), ConnectionConfig::default(), tx);
        let ep = endpoint();

        mgr.send_bytes(&ep, b"ok").await.unwrap();
        transport.fail_writes.store(true, Ordering::SeqCst);

        let err = mgr.send_bytes(&ep, b"boom").await.unwrap_err();
        assert!(err.is_connection());
        assert_eq!(mgr.state_of("10.0.0.5", 9100), Some(ConnectionState::Unhealthy));

        let mut saw_disconnect = false;
        while let Ok(event) = rx.try_recv() {
            if matches!(event, PrintEvent::PrinterDisconnected { .. }) {
                saw_disconnect = true;
            }
        }
        assert!(saw_disconnect);

        // next use reconnects
        transport.fail_writes.store(false, Ordering::SeqCst);
        mgr.send_bytes(&ep, b"again").await.unwrap();
        assert_eq!(transport.connects.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_connect_refused_is_surfaced() {
        let transport = Arc::new(FakeTransport::default());
        transport.refuse.store(true, Ordering::SeqCst);
        let mgr = manager(transport, ConnectionConfig::default());

        let err = mgr.get_connection(&endpoint()).await.unwrap_err();
        assert!(matches!(err, PrintHubError::Connection { .. }));
    }

    #[tokio::test]
    async fn test_force_reconnect_opens_new_socket() {
        let transport = Arc::new(FakeTransport::default());
        let mgr = manager(transport.clone(), ConnectionConfig::default());
        let ep = endpoint();

        let first = mgr.get_connection(&ep).await.unwrap().connection_id();
        mgr.force_reconnect(&ep).await.unwrap();
        let second = mgr.get_connection(&ep).await.unwrap().connection_id();

        assert_ne!(first, second);
        assert_eq!(transport.connects.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_health_check_marks_healthy() {
        let transport = Arc::new(FakeTransport::default());
        let mgr = manager(transport, fast_config());
        let ep = endpoint();
        mgr.send_bytes(&ep, b"x").await.unwrap();

        let report = mgr.check_health().await;
        assert_eq!(report.healthy, vec!["10.0.0.5:9100".to_string()]);
        assert_eq!(mgr.state_of("10.0.0.5", 9100), Some(ConnectionState::Healthy));
    }

    #[tokio::test]
    async fn test_health_check_gives_up_after_backoff() {
        let transport = Arc::new(FakeTransport::default());
        let mgr = manager(transport.clone(), fast_config());
        let ep = endpoint();
        mgr.send_bytes(&ep, b"x").await.unwrap();

        transport.fail_writes.store(true, Ordering::SeqCst);
        transport.refuse.store(true, Ordering::SeqCst);

        let report = mgr.check_health().await;
        assert_eq!(report.reconnecting, vec!["10.0.0.5:9100".to_string()]);
        settle(&mgr, "10.0.0.5").await;
        // initial connect + 3 reconnect attempts
        assert_eq!(transport.connects.load(Ordering::SeqCst), 4);

        // auto-retry is off until the next explicit use
        let report = mgr.check_health().await;
        assert_eq!(report.skipped.len(), 1);
        assert_eq!(transport.connects.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_health_check_reconnects() {
        let transport = Arc::new(FakeTransport::default());
        let mgr = manager(transport.clone(), fast_config());
        let ep = endpoint();
        mgr.send_bytes(&ep, b"x").await.unwrap();

        // status query fails once, the reconnect succeeds
        transport.fail_writes.store(true, Ordering::SeqCst);
        let report = mgr.check_health().await;
        assert_eq!(report.reconnecting.len(), 1);
        transport.fail_writes.store(false, Ordering::SeqCst);
        settle(&mgr, "10.0.0.5").await;

        assert_eq!(transport.connects.load(Ordering::SeqCst), 2);
        assert_eq!(mgr.state_of("10.0.0.5", 9100), Some(ConnectionState::Healthy));
        let report = mgr.check_health().await;
        assert_eq!(report.healthy.len(), 1);
    }

    #[tokio::test]
    async fn test_dead_printer_does_not_hold_up_health_pass() {
        let transport = Arc::new(FakeTransport::default());
        let config = ConnectionConfig {
            backoff: Backoff::new(Duration::from_secs(10), Duration::from_secs(30), 3),
            ..ConnectionConfig::default()
        };
        let mgr = manager(transport.clone(), config);
        let kitchen = endpoint();
        let bar = PrinterEndpoint::from_input(shared::models::PrinterInput::new(
            "Bar",
            "10.0.0.6",
            shared::models::PrinterRole::Bar,
        ));
        mgr.send_bytes(&kitchen, b"x").await.unwrap();
        mgr.send_bytes(&bar, b"x").await.unwrap();
        transport.dead.lock().push(socket_addr("10.0.0.5", 9100).unwrap());

        let report = tokio::time::timeout(Duration::from_secs(1), mgr.check_health())
            .await
            .unwrap();
        assert_eq!(report.healthy, vec!["10.0.0.6:9100".to_string()]);
        assert_eq!(report.reconnecting, vec!["10.0.0.5:9100".to_string()]);
        assert!(mgr.is_reconnecting("10.0.0.5", 9100));

        // the next pass leaves the running loop alone
        let report = tokio::time::timeout(Duration::from_secs(1), mgr.check_health())
            .await
            .unwrap();
        assert_eq!(report.healthy, vec!["10.0.0.6:9100".to_string()]);
        assert_eq!(report.skipped, vec!["10.0.0.5:9100".to_string()]);
        assert_eq!(transport.connects.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_idle_eviction() {
        let transport = Arc::new(FakeTransport::default());
        let config = ConnectionConfig {
            idle_timeout: Duration::from_millis(20),
            ..ConnectionConfig::default()
        };
        let mgr = manager(transport, config);
        mgr.send_bytes(&endpoint(), b"x").await.unwrap();
        assert_eq!(mgr.evict_idle().await, 0);

        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(mgr.evict_idle().await, 1);
        assert_eq!(mgr.statistics().size, 0);
    }

    #[tokio::test]
    async fn test_suspend_and_resume() {
        let transport = Arc::new(FakeTransport::default());
        let mgr = manager(transport, fast_config());
        mgr.send_bytes(&endpoint(), b"x").await.unwrap();

        mgr.suspend();
        assert!(mgr.is_suspended());
        let report = mgr.resume().await;
        assert!(!mgr.is_suspended());
        assert_eq!(report.healthy.len(), 1);
    }

    #[tokio::test]
    async fn test_shutdown_clears_pool() {
        let transport = Arc::new(FakeTransport::default());
        let mgr = manager(transport, ConnectionConfig::default());
        mgr.send_bytes(&endpoint(), b"x").await.unwrap();
        mgr.shutdown().await;
        assert_eq!(mgr.statistics(), PoolStatistics::default());
    }
}
