//! # ticket-printer
//!
//! ESC/POS thermal printer library - low-level printing capabilities only.
//!
//! ## Scope
//!
//! This crate handles HOW to print:
//! - ESC/POS command building
//! - Code page selection and transliteration for restricted charsets
//! - Structured sections encoded for a given paper width
//! - Network transports (TCP port 9100)
//!
//! Business logic (WHAT to print, WHEN, and to WHICH printer) lives in
//! `print-hub`.
//!
//! ## Example
//!
//! ```ignore
//! use ticket_printer::{Charset, EncoderConfig, Finish, Section, TextStyle, encode};
//!
//! let sections = vec![
//!     Section::styled("Table 12", TextStyle::default().center().bold()),
//!     Section::separator('='),
//!     Section::two_column("2 x Café", "5,00 €"),
//! ];
//! let config = EncoderConfig { columns: 32, charset: Charset::Pc858 };
//! let bytes = encode(&sections, &config, Finish::cut())?;
//! ```

mod encoding;
mod error;
mod escpos;
mod section;
mod transport;

// Re-exports
pub use encoding::{Charset, pad_to_width, transliterate, truncate_to_width};
pub use error::{EncodeError, EncodeResult, PrintError, PrintResult};
pub use escpos::{
    Alignment, BarcodeOptions, Emphasis, EncoderConfig, EscPosBuilder, Finish, HriPosition,
    NARROW_COLUMNS, QrErrorCorrection, QrOptions, Scale, Symbology, WIDE_COLUMNS, column_widths,
    two_column_line,
};
pub use section::{Section, TextStyle, encode};
pub use transport::{
    DEFAULT_PORT, NativeTransport, PrinterLink, SocketTransport, Transport, TransportKind,
    socket_addr,
};

/// Real-time status request (DLE EOT 1)
pub const STATUS_QUERY: [u8; 3] = [0x10, 0x04, 0x01];

/// Printer model ID request (GS I 1)
pub const MODEL_ID_QUERY: [u8; 3] = [0x1D, 0x49, 0x01];

/// Manufacturer name request (GS I 66)
pub const MANUFACTURER_QUERY: [u8; 3] = [0x1D, 0x49, 0x42];
