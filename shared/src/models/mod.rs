//! Data models shared by the encoder, the hub and its callers

pub mod discovery;
pub mod document;
pub mod job;
pub mod order;
pub mod printer;

pub use discovery::{DiscoveredEndpoint, Manufacturer};
pub use document::{Document, DocumentKind, Priority};
pub use job::{JobStatus, PrintJob};
pub use order::{
    BillData, KitchenItem, KitchenOrderData, LineItem, ReceiptData, StoreInfo, TaxLine, Tender,
    TenderMethod,
};
pub use printer::{
    ConnectionState, PaperWidth, PrinterEndpoint, PrinterInput, PrinterProfile, PrinterRole,
    PrinterUpdate, endpoint_address,
};
