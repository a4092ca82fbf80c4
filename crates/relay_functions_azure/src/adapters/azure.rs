//! REST clients for Azure Blob Storage, Azure Data Explorer and Event Hubs.

pub mod event_hubs;
pub mod kusto;
pub mod signing;
pub mod storage;
