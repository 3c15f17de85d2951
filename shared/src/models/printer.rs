//! Printer Endpoint Model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use ticket_printer::{Charset, DEFAULT_PORT, EncoderConfig, NARROW_COLUMNS, WIDE_COLUMNS};

/// Paper width class
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PaperWidth {
    /// 58mm paper: 32 characters
    #[serde(rename = "58mm")]
    Mm58,
    /// 80mm paper: 48 characters
    #[default]
    #[serde(rename = "80mm")]
    Mm80,
}

impl PaperWidth {
    pub fn columns(self) -> usize {
        match self {
            PaperWidth::Mm58 => NARROW_COLUMNS,
            PaperWidth::Mm80 => WIDE_COLUMNS,
        }
    }
}

/// What a printer is used for
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrinterRole {
    Kitchen,
    Bar,
    Cashier,
    #[default]
    General,
}

impl PrinterRole {
    pub const ALL: [PrinterRole; 4] = [
        PrinterRole::Kitchen,
        PrinterRole::Bar,
        PrinterRole::Cashier,
        PrinterRole::General,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            PrinterRole::Kitchen => "kitchen",
            PrinterRole::Bar => "bar",
            PrinterRole::Cashier => "cashier",
            PrinterRole::General => "general",
        }
    }
}

impl fmt::Display for PrinterRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PrinterRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "kitchen" | "cuisine" => Ok(PrinterRole::Kitchen),
            "bar" => Ok(PrinterRole::Bar),
            "cashier" | "caisse" | "receipt" => Ok(PrinterRole::Cashier),
            "general" => Ok(PrinterRole::General),
            other => Err(format!("Unknown printer role: {}", other)),
        }
    }
}

/// Connection state of a printer as last observed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    #[default]
    Unconnected,
    Connecting,
    Connected,
    Healthy,
    Unhealthy,
}

impl ConnectionState {
    /// Whether a socket is believed usable
    pub fn is_usable(self) -> bool {
        matches!(self, ConnectionState::Connected | ConnectionState::Healthy)
    }
}

/// Printer capabilities
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrinterProfile {
    #[serde(default)]
    pub paper_width: PaperWidth,
    #[serde(default)]
    pub charset: Charset,
    #[serde(default = "default_true")]
    pub cut: bool,
    #[serde(default)]
    pub cash_drawer: bool,
    #[serde(default)]
    pub beep: bool,
}

impl PrinterProfile {
    pub fn encoder_config(&self) -> EncoderConfig {
        EncoderConfig {
            columns: self.paper_width.columns(),
            charset: self.charset,
        }
    }
}

impl Default for PrinterProfile {
    fn default() -> Self {
        Self {
            paper_width: PaperWidth::Mm80,
            charset: Charset::Pc858,
            cut: true,
            cash_drawer: false,
            beep: false,
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

/// Configured network printer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrinterEndpoint {
    pub id: String,
    pub name: String,
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub profile: PrinterProfile,
    #[serde(default)]
    pub role: PrinterRole,
    #[serde(default)]
    pub is_default: bool,
    #[serde(default = "default_true")]
    pub enabled: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_seen_at: Option<DateTime<Utc>>,
    pub last_print_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_state: ConnectionState,
    pub last_error: Option<String>,
}

impl PrinterEndpoint {
    /// Build a new endpoint from an input payload (address already validated)
    pub fn from_input(input: PrinterInput) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: input.name,
            host: input.host,
            port: input.port,
            profile: input.profile,
            role: input.role,
            is_default: input.is_default,
            enabled: input.enabled,
            created_at: now,
            updated_at: now,
            last_seen_at: None,
            last_print_at: None,
            last_state: ConnectionState::Unconnected,
            last_error: None,
        }
    }

    /// `host:port`, the key used by the connection pool
    pub fn address(&self) -> String {
        endpoint_address(&self.host, self.port)
    }
}

/// `host:port` formatting shared by pool keys and events
pub fn endpoint_address(host: &str, port: u16) -> String {
    if host.contains(':') {
        format!("[{}]:{}", host, port)
    } else {
        format!("{}:{}", host, port)
    }
}

/// Create printer payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrinterInput {
    pub name: String,
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub profile: PrinterProfile,
    #[serde(default)]
    pub role: PrinterRole,
    #[serde(default)]
    pub is_default: bool,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl PrinterInput {
    pub fn new(name: impl Into<String>, host: impl Into<String>, role: PrinterRole) -> Self {
        Self {
            name: name.into(),
            host: host.into(),
            port: DEFAULT_PORT,
            profile: PrinterProfile::default(),
            role,
            is_default: false,
            enabled: true,
        }
    }
}

/// Update printer payload
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PrinterUpdate {
    pub name: Option<String>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub profile: Option<PrinterProfile>,
    pub role: Option<PrinterRole>,
    pub is_default: Option<bool>,
    pub enabled: Option<bool>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paper_width_columns() {
        assert_eq!(PaperWidth::Mm58.columns(), 32);
        assert_eq!(PaperWidth::Mm80.columns(), 48);
    }

    #[test]
    fn test_endpoint_json_defaults() {
        let json = r#"{
            "id": "p1",
            "name": "Cuisine",
            "host": "192.168.1.50",
            "created_at": "2026-01-02T10:00:00Z",
            "updated_at": "2026-01-02T10:00:00Z",
            "last_seen_at": null,
            "last_print_at": null,
            "last_error": null
        }"#;
        let endpoint: PrinterEndpoint = serde_json::from_str(json).unwrap();
        assert_eq!(endpoint.port, 9100);
        assert!(endpoint.enabled);
        assert_eq!(endpoint.role, PrinterRole::General);
        assert_eq!(endpoint.profile.paper_width, PaperWidth::Mm80);
        assert_eq!(endpoint.address(), "192.168.1.50:9100");
    }

    #[test]
    fn test_timestamps_serialize_as_sortable_text() {
        let endpoint = PrinterEndpoint::from_input(PrinterInput::new("Bar", "10.0.0.2", PrinterRole::Bar));
        let value = serde_json::to_value(&endpoint).unwrap();
        let created = value["created_at"].as_str().unwrap();
        let parsed: DateTime<Utc> = created.parse().unwrap();
        assert_eq!(parsed, endpoint.created_at);
    }

    #[test]
    fn test_role_from_str() {
        assert_eq!("Cuisine".parse::<PrinterRole>().unwrap(), PrinterRole::Kitchen);
        assert!("garage".parse::<PrinterRole>().is_err());
    }
}
