//! Error taxonomy of the print hub

use shared::models::{JobStatus, PrinterRole};
use thiserror::Error;
use ticket_printer::{EncodeError, PrintError};

use crate::storage::StorageError;

#[derive(Debug, Error)]
pub enum PrintHubError {
    /// Missing or invalid configuration value
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Printer not found: {0}")]
    PrinterNotFound(String),

    #[error("No printer configured for role '{0}'")]
    NoPrinterForRole(PrinterRole),

    #[error("Invalid printer address: {0}")]
    InvalidAddress(String),

    /// Refused, timed out or reset while talking to a printer
    #[error("Connection to {addr} failed: {source}")]
    Connection {
        addr: String,
        #[source]
        source: PrintError,
    },

    /// Malformed reply from a device (tolerated during discovery)
    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Print queue is full ({0} jobs)")]
    QueueFull(usize),

    #[error("Print job not found: {0}")]
    JobNotFound(String),

    #[error("Print job {id} is {status}, only pending jobs can be cancelled")]
    JobNotPending { id: String, status: JobStatus },

    #[error("A discovery scan is already running")]
    ScanInProgress,

    #[error("Network unavailable: {0}")]
    NetworkUnavailable(String),

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("Encode error: {0}")]
    Encode(#[from] EncodeError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

impl PrintHubError {
    pub fn connection(addr: impl Into<String>, source: PrintError) -> Self {
        PrintHubError::Connection {
            addr: addr.into(),
            source,
        }
    }

    /// Whether the failure is on the network path (worth a retry)
    pub fn is_connection(&self) -> bool {
        matches!(
            self,
            PrintHubError::Connection { .. } | PrintHubError::Timeout(_)
        )
    }
}

pub type HubResult<T> = Result<T, PrintHubError>;
