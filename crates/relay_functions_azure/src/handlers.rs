pub mod copy_blob;
pub mod publish_audit;

use thiserror::Error;

use crate::adapters::AdapterError;

#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("{step} failed: {source}")]
    Storage {
        step: &'static str,
        #[source]
        source: AdapterError,
    },
    #[error("audit query failed: {0}")]
    Query(#[source] AdapterError),
    #[error("event publishing failed: {0}")]
    Publish(#[source] AdapterError),
    #[error("Event {event} is too large for the batch and cannot be sent.")]
    EventTooLarge { event: String },
    #[error("audit result has an unexpected layout: {0}")]
    UnexpectedColumns(String),
    #[error("audit row {index} is invalid: {message}")]
    InvalidRow { index: usize, message: String },
    #[error("invalid request: {0}")]
    Request(String),
    #[error("container '{container}' has no blob to copy")]
    NoSourceBlob { container: String },
    #[error("copied blob '{destination}' has digest {actual}, source digest was {expected}")]
    DigestMismatch {
        destination: String,
        expected: String,
        actual: String,
    },
    #[error("releasing the lease on '{blob}' failed: {source}")]
    LeaseRelease {
        blob: String,
        #[source]
        source: AdapterError,
    },
    #[error("copy task did not run to completion: {0}")]
    Interrupted(#[source] tokio::task::JoinError),
}

impl HandlerError {
    fn storage(step: &'static str) -> impl FnOnce(AdapterError) -> Self {
        move |source| Self::Storage { step, source }
    }
}
