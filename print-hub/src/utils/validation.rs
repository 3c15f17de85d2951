//! Input validation helpers
//!
//! Printer addresses are typed by hand on a POS keypad, where the decimal
//! separator key often yields `,` instead of `.`; they are normalized before
//! being validated.

use std::net::{IpAddr, Ipv4Addr};

use crate::error::{HubResult, PrintHubError};

/// Printer display names
pub const MAX_NAME_LEN: usize = 100;

/// DNS hostname limit (RFC 1035)
pub const MAX_HOST_LEN: usize = 253;

/// Clean up a user-typed host: trim, drop inner whitespace, `,` → `.`,
/// strip IPv6 brackets.
pub fn normalize_host(input: &str) -> String {
    let cleaned: String = input
        .trim()
        .chars()
        .filter(|c| !c.is_whitespace())
        .map(|c| if c == ',' { '.' } else { c })
        .collect();
    cleaned
        .strip_prefix('[')
        .and_then(|s| s.strip_suffix(']'))
        .map(str::to_string)
        .unwrap_or(cleaned)
}

/// Validate a normalized host.
///
/// Anything made only of digits and dots must be a dotted-quad IPv4 address;
/// anything with `:` must be IPv6; the rest must be a hostname.
pub fn validate_host(host: &str) -> HubResult<()> {
    if host.is_empty() {
        return Err(PrintHubError::InvalidAddress("host must not be empty".into()));
    }
    if host.len() > MAX_HOST_LEN {
        return Err(PrintHubError::InvalidAddress(format!(
            "host is too long ({} chars, max {MAX_HOST_LEN})",
            host.len()
        )));
    }

    if host.chars().all(|c| c.is_ascii_digit() || c == '.') {
        return host
            .parse::<Ipv4Addr>()
            .map(|_| ())
            .map_err(|_| PrintHubError::InvalidAddress(format!("{host} is not a valid IPv4 address")));
    }

    if host.contains(':') {
        return host
            .parse::<IpAddr>()
            .map(|_| ())
            .map_err(|_| PrintHubError::InvalidAddress(format!("{host} is not a valid IPv6 address")));
    }

    let valid_label = |label: &str| {
        !label.is_empty()
            && label.len() <= 63
            && !label.starts_with('-')
            && !label.ends_with('-')
            && label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
    };
    if host.trim_end_matches('.').split('.').all(valid_label) {
        Ok(())
    } else {
        Err(PrintHubError::InvalidAddress(format!("{host} is not a valid hostname")))
    }
}

pub fn validate_port(port: u16) -> HubResult<()> {
    if port == 0 {
        return Err(PrintHubError::InvalidAddress("port must be between 1 and 65535".into()));
    }
    Ok(())
}

/// Normalize then validate; returns the host to store
pub fn normalize_address(input: &str) -> HubResult<String> {
    let host = normalize_host(input);
    validate_host(&host)?;
    Ok(host)
}

/// Validate that a required name is non-empty and within the length limit.
pub fn validate_name(value: &str) -> HubResult<()> {
    if value.trim().is_empty() {
        return Err(PrintHubError::Configuration("printer name must not be empty".into()));
    }
    if value.chars().count() > MAX_NAME_LEN {
        return Err(PrintHubError::Configuration(format!(
            "printer name is too long (max {MAX_NAME_LEN} chars)"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_comma_is_normalized() {
        assert_eq!(normalize_address("192,168.1.100").unwrap(), "192.168.1.100");
        assert_eq!(normalize_address(" 10.0.0.7 ").unwrap(), "10.0.0.7");
        assert_eq!(normalize_address("192 .168.1.5").unwrap(), "192.168.1.5");
    }

    #[test]
    fn test_out_of_range_octet_fails() {
        let err = normalize_address("192.168.1.999").unwrap_err();
        assert!(matches!(err, PrintHubError::InvalidAddress(_)));
        assert!(normalize_address("192.168.1").is_err());
        assert!(normalize_address("").is_err());
    }

    #[test]
    fn test_ipv6_and_hostnames() {
        assert_eq!(normalize_address("[fe80::1]").unwrap(), "fe80::1");
        assert!(normalize_address("fe80:::zz").is_err());
        assert_eq!(normalize_address("kitchen-printer.local").unwrap(), "kitchen-printer.local");
        assert!(normalize_address("bad_host!").is_err());
        assert!(normalize_address("-lead.local").is_err());
    }

    #[test]
    fn test_port_and_name() {
        assert!(validate_port(0).is_err());
        assert!(validate_port(9100).is_ok());
        assert!(validate_name("  ").is_err());
        assert!(validate_name("Cuisine").is_ok());
    }
}
