//! Shared types for the print hub
//!
//! Printer endpoints, documents, jobs, discovery results, order data fed
//! to the templates, and the event enum broadcast to subscribers.

pub mod event;
pub mod models;

// Re-exports
pub use event::PrintEvent;
pub use serde::{Deserialize, Serialize};
