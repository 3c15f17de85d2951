//! Printer connection pool

pub mod backoff;
pub mod manager;

pub use backoff::Backoff;
pub use manager::{
    ConnectionConfig, ConnectionManager, HealthReport, PoolStatistics, PooledConnection, liveness,
    resolve,
};
