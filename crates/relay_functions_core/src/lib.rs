//! Shared domain primitives for the blob copy and audit relay functions.
//!
//! This crate owns request/response contracts, naming rules, audit record
//! mapping and event batch accounting. It intentionally excludes HTTP clients,
//! Azure REST details and the function host runtime.

pub mod audit;
pub mod batch;
pub mod blob_names;
pub mod connection;
pub mod contract;
