//! Printer identification
//!
//! After a port accepts, the scanner sends the real-time status query and
//! the two identification queries, then reads whatever comes back within a
//! short window. The reply bytes decide whether the host looks like an
//! ESC/POS printer and which vendor made it.

use shared::models::Manufacturer;
use std::time::Duration;
use tokio::time::Instant;

use ticket_printer::{MANUFACTURER_QUERY, MODEL_ID_QUERY, PrinterLink, STATUS_QUERY};

use crate::error::PrintHubError;

/// Read window for identification replies
pub const IDENTIFY_WINDOW: Duration = Duration::from_millis(800);

const MAX_REPLY_LEN: usize = 256;
const MAX_MODEL_LEN: usize = 64;

/// Vendor markers found in identification replies, checked in order
const VENDOR_PATTERNS: &[(&str, Manufacturer)] = &[
    ("EPSON", Manufacturer::Epson),
    ("TM-", Manufacturer::Epson),
    ("STAR", Manufacturer::Star),
    ("TSP", Manufacturer::Star),
    ("BIXOLON", Manufacturer::Bixolon),
    ("SRP-", Manufacturer::Bixolon),
    ("CITIZEN", Manufacturer::Citizen),
    ("CT-S", Manufacturer::Citizen),
    ("XPRINTER", Manufacturer::Xprinter),
    ("XP-", Manufacturer::Xprinter),
    ("SUNMI", Manufacturer::Sunmi),
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identification {
    /// Replied to at least one query
    pub responding: bool,
    pub manufacturer: Manufacturer,
    pub model: Option<String>,
}

impl Identification {
    /// Accepted the connection but never answered
    pub fn silent() -> Self {
        Self {
            responding: false,
            manufacturer: Manufacturer::Generic,
            model: None,
        }
    }
}

/// ESC/POS real-time status byte: bits 1 and 4 fixed high, 0 and 7 low
fn is_status_byte(b: u8) -> bool {
    b & 0x93 == 0x12
}

/// Printable runs of the reply, `_` framing removed
fn printable_text(reply: &[u8]) -> String {
    reply
        .split(|b| !(0x20..0x7F).contains(b))
        .map(|run| {
            String::from_utf8_lossy(run)
                .trim()
                .trim_start_matches('_')
                .trim()
                .to_string()
        })
        .filter(|run| run.len() >= 2)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Classify a reply.
///
/// An empty reply is a silent generic printer; an unrecognized non-empty
/// reply is a protocol error the scanner tolerates.
pub fn classify(reply: &[u8]) -> Result<Identification, PrintHubError> {
    if reply.is_empty() {
        return Ok(Identification::silent());
    }

    let text = printable_text(reply);
    let upper = text.to_uppercase();
    let vendor = VENDOR_PATTERNS
        .iter()
        .find(|(pattern, _)| upper.contains(pattern))
        .map(|(_, manufacturer)| *manufacturer);

    let model = if text.is_empty() {
        None
    } else {
        Some(text.chars().take(MAX_MODEL_LEN).collect())
    };

    match vendor {
        Some(manufacturer) => Ok(Identification {
            responding: true,
            manufacturer,
            model,
        }),
        None if reply.iter().any(|b| is_status_byte(*b)) => Ok(Identification {
            responding: true,
            manufacturer: Manufacturer::Generic,
            model,
        }),
        None => Err(PrintHubError::Protocol(format!(
            "unrecognized identification reply ({} bytes)",
            reply.len()
        ))),
    }
}

/// Query the device and collect its replies until the window elapses
pub async fn read_identification(
    link: &mut dyn PrinterLink,
    window: Duration,
) -> Result<Vec<u8>, PrintHubError> {
    let mut query = Vec::with_capacity(9);
    query.extend_from_slice(&STATUS_QUERY);
    query.extend_from_slice(&MODEL_ID_QUERY);
    query.extend_from_slice(&MANUFACTURER_QUERY);
    link.write_all(&query)
        .await
        .map_err(|e| PrintHubError::connection(link.peer().to_string(), e))?;

    let deadline = Instant::now() + window;
    let mut reply = Vec::new();
    let mut buf = [0u8; 64];
    while reply.len() < MAX_REPLY_LEN {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            break;
        }
        match link.read_timeout(&mut buf, remaining).await {
            Ok(Some(0)) | Ok(None) => break,
            Ok(Some(n)) => reply.extend_from_slice(&buf[..n]),
            // whatever arrived before the error still counts
            Err(_) => break,
        }
    }
    Ok(reply)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_silent_host_is_generic() {
        let id = classify(&[]).unwrap();
        assert!(!id.responding);
        assert_eq!(id.manufacturer, Manufacturer::Generic);
    }

    #[test]
    fn test_epson_reply() {
        let mut reply = vec![0x16, 0x20];
        reply.extend_from_slice(b"_EPSON\0_TM-T20II\0");
        let id = classify(&reply).unwrap();
        assert_eq!(id.manufacturer, Manufacturer::Epson);
        assert_eq!(id.model.as_deref(), Some("EPSON TM-T20II"));
    }

    #[test]
    fn test_vendor_patterns() {
        let cases: &[(&[u8], Manufacturer)] = &[
            (b"_Star Micronics\0", Manufacturer::Star),
            (b"_BIXOLON\0", Manufacturer::Bixolon),
            (b"_SRP-350III\0", Manufacturer::Bixolon),
            (b"_CITIZEN\0", Manufacturer::Citizen),
            (b"_XP-80C\0", Manufacturer::Xprinter),
            (b"_SUNMI\0", Manufacturer::Sunmi),
        ];
        for (reply, expected) in cases {
            assert_eq!(classify(reply).unwrap().manufacturer, *expected);
        }
    }

    #[test]
    fn test_bare_status_byte_is_generic() {
        let id = classify(&[0x12]).unwrap();
        assert!(id.responding);
        assert_eq!(id.manufacturer, Manufacturer::Generic);
        assert!(id.model.is_none());
    }

    #[test]
    fn test_garbage_is_protocol_error() {
        let err = classify(&[0xFF, 0x01]).unwrap_err();
        assert!(matches!(err, PrintHubError::Protocol(_)));
    }
}
