//! Print lifecycle events
//!
//! Closed set of tagged variants broadcast by the hub. Subscribers match
//! exhaustively, so a new variant is a compile error at every consumer.

use serde::{Deserialize, Serialize};

use crate::models::{ConnectionState, DiscoveredEndpoint, JobStatus};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PrintEvent {
    PrinterConnected {
        address: String,
    },
    PrinterDisconnected {
        address: String,
        state: ConnectionState,
        reason: Option<String>,
    },
    PrintStarted {
        job_id: String,
        printer_id: String,
        attempt: u32,
    },
    PrintCompleted {
        job_id: String,
        printer_id: String,
    },
    PrintFailed {
        job_id: String,
        printer_id: String,
        error: String,
        /// False once retries are exhausted or the job was cancelled
        will_retry: bool,
        status: JobStatus,
    },
    QueueUpdated {
        pending: usize,
        failed: usize,
    },
    DiscoveryProgress {
        scanned: usize,
        total: usize,
        percent: u8,
        found: Vec<DiscoveredEndpoint>,
    },
    DiscoveryFinished {
        found: Vec<DiscoveredEndpoint>,
        cancelled: bool,
    },
    PrintersChanged,
}

impl PrintEvent {
    /// Short name used in logs
    pub fn name(&self) -> &'static str {
        match self {
            PrintEvent::PrinterConnected { .. } => "printer_connected",
            PrintEvent::PrinterDisconnected { .. } => "printer_disconnected",
            PrintEvent::PrintStarted { .. } => "print_started",
            PrintEvent::PrintCompleted { .. } => "print_completed",
            PrintEvent::PrintFailed { .. } => "print_failed",
            PrintEvent::QueueUpdated { .. } => "queue_updated",
            PrintEvent::DiscoveryProgress { .. } => "discovery_progress",
            PrintEvent::DiscoveryFinished { .. } => "discovery_finished",
            PrintEvent::PrintersChanged => "printers_changed",
        }
    }
}
