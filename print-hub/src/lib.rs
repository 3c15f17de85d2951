//! Print Hub - restaurant ticket printing core
//!
//! # Architecture
//!
//! - **Templates** (`templates`): receipt, kitchen ticket, bill and test page
//!   layouts rendered to ESC/POS through `ticket-printer`
//! - **Connections** (`connection`): one pooled TCP link per printer, health
//!   checks and reconnection with backoff
//! - **Queue** (`queue`): persisted priority queue and its single worker
//! - **Discovery** (`discovery`): subnet scan for raw-print ports
//! - **Registry** (`registry`): configured printers and role defaults
//! - **Hub** (`orchestrator`): the facade the front end talks to
//!
//! ```text
//! print-hub/src/
//! ├── core/          # config, settings, background tasks
//! ├── connection/    # pool, backoff
//! ├── discovery/     # scanner, subnet, identification
//! ├── queue/         # queue, worker
//! ├── templates/     # document layouts
//! └── utils/         # logger, validation
//! ```

pub mod connection;
pub mod core;
pub mod discovery;
pub mod error;
pub mod orchestrator;
pub mod queue;
pub mod registry;
pub mod storage;
pub mod templates;
pub mod utils;

pub use core::{Config, Settings};
pub use error::{HubResult, PrintHubError};
pub use orchestrator::{PrintHub, PrintOptions, PrintSubmission, Subscription};
pub use registry::PrinterRegistry;
pub use storage::{KvStore, MemoryStore, RedbStore};

pub use utils::logger::{init_logger, init_logger_with_file};
