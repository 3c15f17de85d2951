//! Discovery results

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Manufacturer guessed from the identification reply
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Manufacturer {
    Epson,
    Star,
    Bixolon,
    Citizen,
    Xprinter,
    Sunmi,
    /// Accepted the connection, replied like an ESC/POS device (or not at all)
    #[default]
    Generic,
}

impl fmt::Display for Manufacturer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Manufacturer::Epson => "Epson",
            Manufacturer::Star => "Star",
            Manufacturer::Bixolon => "Bixolon",
            Manufacturer::Citizen => "Citizen",
            Manufacturer::Xprinter => "Xprinter",
            Manufacturer::Sunmi => "Sunmi",
            Manufacturer::Generic => "Generic ESC/POS",
        })
    }
}

/// Ephemeral scan result, not persisted until promoted to an endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscoveredEndpoint {
    pub host: String,
    pub port: u16,
    /// Whether the host answered the identification queries
    pub responding: bool,
    pub manufacturer: Manufacturer,
    /// Printable summary of the identification reply, if any
    pub model: Option<String>,
    pub discovered_at: DateTime<Utc>,
}

impl DiscoveredEndpoint {
    pub fn address(&self) -> String {
        super::printer::endpoint_address(&self.host, self.port)
    }

    /// Default display name when promoted
    pub fn suggested_name(&self) -> String {
        match &self.model {
            Some(model) if !model.is_empty() => format!("{} ({})", model, self.host),
            _ => format!("{} ({})", self.manufacturer, self.host),
        }
    }
}
