//! Error types for the printer library

use thiserror::Error;

/// Transport error types
#[derive(Debug, Error)]
pub enum PrintError {
    /// Network connection error (refused, unreachable, reset)
    #[error("Connection failed: {0}")]
    Connection(String),

    /// IO error while talking to the printer
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Peer closed the socket
    #[error("Printer closed the connection: {0}")]
    Closed(String),

    /// Timeout waiting for printer
    #[error("Timeout: {0}")]
    Timeout(String),

    /// Invalid printer configuration
    #[error("Invalid config: {0}")]
    InvalidConfig(String),
}

/// Result type for printer operations
pub type PrintResult<T> = Result<T, PrintError>;

/// Encoding errors.
///
/// Encoding never touches I/O, so these only signal invalid input built by
/// the caller.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EncodeError {
    #[error("Unknown barcode symbology: {0}")]
    UnknownSymbology(String),

    #[error("Invalid {symbology} barcode data: {reason}")]
    InvalidBarcode {
        symbology: &'static str,
        reason: String,
    },

    #[error("Table needs at least one column")]
    EmptyTable,

    #[error("Invalid column widths: {0}")]
    InvalidWidths(String),

    #[error("Table row {row} has {cells} cells, expected at most {columns}")]
    TableShape {
        row: usize,
        cells: usize,
        columns: usize,
    },

    #[error("QR payload too large: {0} bytes")]
    QrTooLarge(usize),

    #[error("Unknown charset: {0}")]
    UnknownCharset(String),
}

pub type EncodeResult<T> = Result<T, EncodeError>;
