//! Service seams used by the handlers, plus their Azure REST implementations.

pub mod azure;
pub mod blob_store;
pub mod event_stream;
pub mod query;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("{operation} failed with HTTP {status} ({code}): {message}")]
    Service {
        operation: &'static str,
        status: u16,
        code: String,
        message: String,
    },
    #[error("{operation}: '{target}' was not found")]
    NotFound {
        operation: &'static str,
        target: String,
    },
    #[error("{operation} request failed: {source}")]
    Transport {
        operation: &'static str,
        #[source]
        source: reqwest::Error,
    },
    #[error("{operation} returned an unreadable response: {message}")]
    Decode {
        operation: &'static str,
        message: String,
    },
    #[error("credential error: {0}")]
    Credential(String),
    #[error("{0}")]
    InvalidState(String),
}

impl AdapterError {
    pub fn transport(operation: &'static str) -> impl FnOnce(reqwest::Error) -> Self {
        move |source| Self::Transport { operation, source }
    }

    pub fn decode(operation: &'static str, message: impl std::fmt::Display) -> Self {
        Self::Decode {
            operation,
            message: message.to_string(),
        }
    }

    /// A break or release aimed at a blob that holds no lease.
    pub fn is_lease_not_present(&self) -> bool {
        matches!(
            self,
            Self::Service { status: 409, code, .. } if code == "LeaseNotPresentWithLeaseOperation"
        )
    }
}
