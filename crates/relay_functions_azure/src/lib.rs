//! Azure-facing adapters, handlers and HTTP routing for the relay functions.
//!
//! This crate owns runtime integration details (REST clients for Blob
//! Storage, Kusto and Event Hubs, environment configuration and the custom
//! handler HTTP surface). Domain contracts live in `relay_functions_core`.

pub mod adapters;
pub mod config;
pub mod handlers;
pub mod server;
