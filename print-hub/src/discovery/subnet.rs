//! IPv4 subnet arithmetic for scans

use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;

use crate::error::PrintHubError;

/// Widest subnet a scan covers; larger networks are narrowed to the /24
/// around the local address
pub const MIN_SCAN_PREFIX: u8 = 24;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Subnet {
    network: Ipv4Addr,
    prefix: u8,
}

impl Subnet {
    /// Subnet containing `addr`, narrowed to at most a /24
    pub fn around(addr: Ipv4Addr, prefix: u8) -> Result<Self, PrintHubError> {
        if prefix > 32 {
            return Err(PrintHubError::NetworkUnavailable(format!(
                "invalid prefix length /{}",
                prefix
            )));
        }
        let prefix = prefix.max(MIN_SCAN_PREFIX);
        let mask = mask(prefix);
        Ok(Self {
            network: Ipv4Addr::from(u32::from(addr) & mask),
            prefix,
        })
    }

    pub fn network(&self) -> Ipv4Addr {
        self.network
    }

    pub fn prefix(&self) -> u8 {
        self.prefix
    }

    pub fn broadcast(&self) -> Ipv4Addr {
        Ipv4Addr::from(u32::from(self.network) | !mask(self.prefix))
    }

    pub fn contains(&self, addr: Ipv4Addr) -> bool {
        u32::from(addr) & mask(self.prefix) == u32::from(self.network)
    }

    /// Usable hosts (network+1 ..= broadcast-1), minus `exclude`
    pub fn hosts(&self, exclude: Option<Ipv4Addr>) -> Vec<Ipv4Addr> {
        let first = u32::from(self.network).saturating_add(1);
        let last = u32::from(self.broadcast()).saturating_sub(1);
        if self.prefix >= 31 || first > last {
            return Vec::new();
        }
        (first..=last)
            .map(Ipv4Addr::from)
            .filter(|addr| Some(*addr) != exclude)
            .collect()
    }
}

fn mask(prefix: u8) -> u32 {
    match prefix {
        0 => 0,
        p => u32::MAX << (32 - u32::from(p.min(32))),
    }
}

impl fmt::Display for Subnet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.network, self.prefix)
    }
}

/// `192.168.1.0/24`, or a bare address meaning its /24
impl FromStr for Subnet {
    type Err = PrintHubError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || PrintHubError::InvalidAddress(format!("invalid subnet '{}'", s));
        let (addr, prefix) = match s.trim().split_once('/') {
            Some((addr, prefix)) => (addr, prefix.parse::<u8>().map_err(|_| invalid())?),
            None => (s.trim(), MIN_SCAN_PREFIX),
        };
        let addr: Ipv4Addr = addr.parse().map_err(|_| invalid())?;
        Subnet::around(addr, prefix).map_err(|_| invalid())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slash_24_hosts() {
        let subnet = Subnet::around(Ipv4Addr::new(192, 168, 1, 37), 24).unwrap();
        assert_eq!(subnet.to_string(), "192.168.1.0/24");
        assert_eq!(subnet.broadcast(), Ipv4Addr::new(192, 168, 1, 255));

        let hosts = subnet.hosts(Some(Ipv4Addr::new(192, 168, 1, 37)));
        assert_eq!(hosts.len(), 253);
        assert_eq!(hosts[0], Ipv4Addr::new(192, 168, 1, 1));
        assert_eq!(hosts[252], Ipv4Addr::new(192, 168, 1, 254));
        assert!(!hosts.contains(&Ipv4Addr::new(192, 168, 1, 37)));
    }

    #[test]
    fn test_wide_networks_are_narrowed() {
        let subnet = Subnet::around(Ipv4Addr::new(10, 20, 30, 40), 16).unwrap();
        assert_eq!(subnet.prefix(), 24);
        assert_eq!(subnet.network(), Ipv4Addr::new(10, 20, 30, 0));
        assert!(subnet.contains(Ipv4Addr::new(10, 20, 30, 200)));
        assert!(!subnet.contains(Ipv4Addr::new(10, 20, 31, 1)));
    }

    #[test]
    fn test_small_networks() {
        let subnet = Subnet::around(Ipv4Addr::new(192, 168, 1, 9), 29).unwrap();
        let hosts = subnet.hosts(None);
        assert_eq!(hosts.len(), 6);
        assert_eq!(hosts[0], Ipv4Addr::new(192, 168, 1, 9));

        let point_to_point = Subnet::around(Ipv4Addr::new(192, 168, 1, 9), 31).unwrap();
        assert!(point_to_point.hosts(None).is_empty());
    }

    #[test]
    fn test_parse() {
        let subnet: Subnet = "172.16.5.0/24".parse().unwrap();
        assert_eq!(subnet.network(), Ipv4Addr::new(172, 16, 5, 0));
        let bare: Subnet = "172.16.5.77".parse().unwrap();
        assert_eq!(bare, subnet);
        assert!("172.16.5.0/40".parse::<Subnet>().is_err());
        assert!("printer.local/24".parse::<Subnet>().is_err());
    }
}
