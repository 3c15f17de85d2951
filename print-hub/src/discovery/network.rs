//! Local network status

use std::net::{IpAddr, Ipv4Addr};
use sysinfo::Networks;
use tracing::debug;

/// Source of the local IPv4 address and prefix length
pub trait NetworkStatus: Send + Sync {
    fn local_ipv4(&self) -> Option<(Ipv4Addr, u8)>;
}

/// Interfaces as reported by the OS
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemNetworkStatus;

impl NetworkStatus for SystemNetworkStatus {
    /// First private IPv4 address, else any non-loopback, non-link-local one
    fn local_ipv4(&self) -> Option<(Ipv4Addr, u8)> {
        let networks = Networks::new_with_refreshed_list();
        let mut candidates: Vec<(Ipv4Addr, u8)> = Vec::new();

        for (name, data) in &networks {
            for ip in data.ip_networks() {
                let IpAddr::V4(addr) = ip.addr else {
                    continue;
                };
                if addr.is_loopback() || addr.is_link_local() || addr.is_unspecified() {
                    continue;
                }
                debug!(interface = %name, addr = %addr, prefix = ip.prefix, "IPv4 interface");
                candidates.push((addr, ip.prefix));
            }
        }

        candidates
            .iter()
            .find(|(addr, _)| addr.is_private())
            .or_else(|| candidates.first())
            .copied()
    }
}

/// Fixed answer, for tests and manual overrides
#[derive(Debug, Clone, Copy)]
pub struct StaticNetworkStatus(pub Option<(Ipv4Addr, u8)>);

impl NetworkStatus for StaticNetworkStatus {
    fn local_ipv4(&self) -> Option<(Ipv4Addr, u8)> {
        self.0
    }
}
