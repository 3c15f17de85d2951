//! Print queue and its worker

#[allow(clippy::module_inception)]
pub mod queue;
pub mod worker;

pub use queue::{FailOutcome, PrintQueue, QueueConfig, QueueSnapshot, QueueStats};
pub use worker::{EndpointResolver, PrintLock, PrintWorker};
