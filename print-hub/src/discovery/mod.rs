//! Printer discovery on the local subnet

pub mod identify;
pub mod network;
pub mod scanner;
pub mod subnet;

pub use identify::{IDENTIFY_WINDOW, Identification, classify};
pub use network::{NetworkStatus, StaticNetworkStatus, SystemNetworkStatus};
pub use scanner::{
    DiscoveryScanner, ProgressCallback, ScanMode, ScanOptions, ScanProgress, ScanReport,
};
pub use subnet::Subnet;
