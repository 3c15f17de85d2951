//! Subnet scanner
//!
//! Probes every usable host of the local subnet on the printer ports, in
//! concurrency-bounded batches. The scan is cancellable: the token is
//! checked between batches and before each probe, and in-flight probes race
//! it, so a stop settles within one probe timeout.

use chrono::Utc;
use parking_lot::Mutex;
use shared::PrintEvent;
use shared::models::DiscoveredEndpoint;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use super::identify::{IDENTIFY_WINDOW, Identification, classify, read_identification};
use super::network::NetworkStatus;
use super::subnet::Subnet;
use crate::connection::ConnectionManager;
use crate::error::{HubResult, PrintHubError};

/// Raw printing ports, then LPD and IPP
pub const QUICK_PORTS: &[u16] = &[9100];
pub const DEEP_PORTS: &[u16] = &[9100, 515, 631, 9101, 9102, 9103];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ScanMode {
    /// Port 9100 only, wide and fast
    #[default]
    Quick,
    /// Every known port, narrower and slower
    Deep,
}

impl ScanMode {
    pub fn ports(self) -> &'static [u16] {
        match self {
            ScanMode::Quick => QUICK_PORTS,
            ScanMode::Deep => DEEP_PORTS,
        }
    }

    pub fn concurrency(self) -> usize {
        match self {
            ScanMode::Quick => 64,
            ScanMode::Deep => 16,
        }
    }

    pub fn probe_timeout(self) -> Duration {
        match self {
            ScanMode::Quick => Duration::from_millis(500),
            ScanMode::Deep => Duration::from_secs(2),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ScanOptions {
    pub mode: ScanMode,
    /// Scan this subnet instead of the local one
    pub subnet: Option<Subnet>,
    /// Override the mode's ports
    pub ports: Option<Vec<u16>>,
    /// Override the mode's connect timeout
    pub probe_timeout: Option<Duration>,
    pub identify_window: Option<Duration>,
}

impl ScanOptions {
    pub fn quick() -> Self {
        Self::default()
    }

    pub fn deep() -> Self {
        Self {
            mode: ScanMode::Deep,
            ..Self::default()
        }
    }

    fn ports(&self) -> Vec<u16> {
        self.ports
            .clone()
            .unwrap_or_else(|| self.mode.ports().to_vec())
    }

    fn probe_timeout(&self) -> Duration {
        self.probe_timeout.unwrap_or(self.mode.probe_timeout())
    }

    fn identify_window(&self) -> Duration {
        self.identify_window.unwrap_or(IDENTIFY_WINDOW)
    }
}

/// Incremental progress, reported after each batch
#[derive(Debug, Clone, PartialEq)]
pub struct ScanProgress {
    pub scanned: usize,
    pub total: usize,
    pub percent: u8,
    pub found: Vec<DiscoveredEndpoint>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScanReport {
    pub subnet: Subnet,
    pub found: Vec<DiscoveredEndpoint>,
    pub scanned: usize,
    pub total: usize,
    pub cancelled: bool,
}

pub type ProgressCallback = dyn Fn(&ScanProgress) + Send + Sync;

fn percent(scanned: usize, total: usize) -> u8 {
    if total == 0 {
        return 100;
    }
    ((scanned * 100) / total).min(100) as u8
}

/// Releases the scanner when the scan ends, however it ends
struct RunningGuard<'a> {
    scanner: &'a DiscoveryScanner,
}

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        *self.scanner.cancel.lock() = None;
    }
}

pub struct DiscoveryScanner {
    connections: Arc<ConnectionManager>,
    network: Arc<dyn NetworkStatus>,
    events: broadcast::Sender<PrintEvent>,
    /// Token of the running scan; `None` when idle
    cancel: Mutex<Option<CancellationToken>>,
}

impl DiscoveryScanner {
    pub fn new(
        connections: Arc<ConnectionManager>,
        network: Arc<dyn NetworkStatus>,
        events: broadcast::Sender<PrintEvent>,
    ) -> Self {
        Self {
            connections,
            network,
            events,
            cancel: Mutex::new(None),
        }
    }

    pub fn is_scanning(&self) -> bool {
        self.cancel.lock().is_some()
    }

    /// Ask the running scan to stop; returns whether one was running
    pub fn stop_scan(&self) -> bool {
        match self.cancel.lock().as_ref() {
            Some(token) => {
                info!("Discovery scan stop requested");
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Subnet a scan would cover
    pub fn target_subnet(&self, options: &ScanOptions) -> HubResult<(Subnet, Option<Ipv4Addr>)> {
        let local = self.network.local_ipv4();
        if let Some(subnet) = options.subnet {
            return Ok((subnet, local.map(|(addr, _)| addr)));
        }
        let (addr, prefix) = local.ok_or_else(|| {
            PrintHubError::NetworkUnavailable("no IPv4 interface is up".into())
        })?;
        Ok((Subnet::around(addr, prefix)?, Some(addr)))
    }

    /// Scan the subnet.
    ///
    /// Fails with `ScanInProgress` while another scan runs on this scanner.
    #[instrument(skip(self, options, on_progress), fields(mode = ?options.mode))]
    pub async fn scan(
        &self,
        options: ScanOptions,
        on_progress: Option<&ProgressCallback>,
    ) -> HubResult<ScanReport> {
        let token = {
            let mut slot = self.cancel.lock();
            if slot.is_some() {
                return Err(PrintHubError::ScanInProgress);
            }
            let token = CancellationToken::new();
            *slot = Some(token.clone());
            token
        };
        let _guard = RunningGuard { scanner: self };

        let (subnet, local) = self.target_subnet(&options)?;
        let ports = options.ports();
        let targets: Vec<SocketAddr> = subnet
            .hosts(local)
            .into_iter()
            .flat_map(|host| {
                ports
                    .iter()
                    .map(move |port| SocketAddr::new(IpAddr::V4(host), *port))
            })
            .collect();
        let total = targets.len();
        let concurrency = options.mode.concurrency().max(1);
        let probe_timeout = options.probe_timeout();
        let window = options.identify_window();

        info!(
            subnet = %subnet,
            targets = total,
            concurrency,
            timeout_ms = probe_timeout.as_millis() as u64,
            "Discovery scan started"
        );

        let mut found: Vec<DiscoveredEndpoint> = Vec::new();
        let mut scanned = 0;

        for batch in targets.chunks(concurrency) {
            if token.is_cancelled() {
                break;
            }

            let probes = batch
                .iter()
                .map(|addr| self.probe_target(*addr, probe_timeout, window, &token));
            let results = futures::future::join_all(probes).await;

            scanned += batch.len();
            let before = found.len();
            for endpoint in results.into_iter().flatten() {
                // one entry per host, first port wins
                if !found.iter().any(|f| f.host == endpoint.host) {
                    info!(
                        addr = %endpoint.address(),
                        manufacturer = %endpoint.manufacturer,
                        "Printer found"
                    );
                    found.push(endpoint);
                }
            }

            if token.is_cancelled() {
                break;
            }
            let progress = ScanProgress {
                scanned,
                total,
                percent: percent(scanned, total),
                found: found.clone(),
            };
            if let Some(callback) = on_progress {
                callback(&progress);
            }
            if found.len() > before || scanned == total || scanned % (concurrency * 4) == 0 {
                let _ = self.events.send(PrintEvent::DiscoveryProgress {
                    scanned: progress.scanned,
                    total: progress.total,
                    percent: progress.percent,
                    found: progress.found,
                });
            }
        }

        let cancelled = token.is_cancelled();
        info!(
            scanned,
            total,
            found = found.len(),
            cancelled,
            "Discovery scan finished"
        );
        let _ = self.events.send(PrintEvent::DiscoveryFinished {
            found: found.clone(),
            cancelled,
        });

        Ok(ScanReport {
            subnet,
            found,
            scanned,
            total,
            cancelled,
        })
    }

    async fn probe_target(
        &self,
        addr: SocketAddr,
        timeout: Duration,
        window: Duration,
        token: &CancellationToken,
    ) -> Option<DiscoveredEndpoint> {
        if token.is_cancelled() {
            return None;
        }
        tokio::select! {
            _ = token.cancelled() => None,
            result = self.probe_host(addr, timeout, window) => result,
        }
    }

    async fn probe_host(
        &self,
        addr: SocketAddr,
        timeout: Duration,
        window: Duration,
    ) -> Option<DiscoveredEndpoint> {
        let mut link = self.connections.probe(addr, timeout).await.ok()?;
        debug!(addr = %addr, "Port open, identifying");

        let identification = match read_identification(link.as_mut(), window).await {
            Ok(reply) => classify(&reply).unwrap_or_else(|e| {
                warn!(addr = %addr, error = %e, "Unrecognized reply, assuming generic printer");
                Identification {
                    responding: true,
                    ..Identification::silent()
                }
            }),
            Err(e) => {
                debug!(addr = %addr, error = %e, "Identification query failed");
                Identification::silent()
            }
        };
        link.shutdown().await;

        Some(DiscoveredEndpoint {
            host: addr.ip().to_string(),
            port: addr.port(),
            responding: identification.responding,
            manufacturer: identification.manufacturer,
            model: identification.model,
            discovered_at: Utc::now(),
        })
    }
}
