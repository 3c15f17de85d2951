//! Ambient infrastructure: configuration, persisted settings, task registry

pub mod config;
pub mod settings;
pub mod tasks;

pub use config::Config;
pub use settings::Settings;
pub use tasks::{BackgroundTasks, TaskKind};
