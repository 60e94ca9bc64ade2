use std::time::Duration;

use thiserror::Error;

use crate::protocol::domain::error::{ErrorCode, RemoteError};

/// Why a remote operation did not produce a result.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProxyError {
    /// The worker answered with a failure outcome.
    #[error(transparent)]
    Remote(#[from] RemoteError),
    /// The worker is gone; no response will ever arrive.
    #[error("worker connection closed")]
    Disconnected,
    /// A blocking call was made from an event handler, which runs on the
    /// thread that would have to deliver the response.
    #[error("blocking call from an event handler")]
    CalledFromEventHandler,
    #[error("no response within {0:?}")]
    Timeout(Duration),
    /// The proxy was deleted; the call never left this context.
    #[error("{class_name} has already been deleted")]
    Deleted { class_name: String },
    #[error("unexpected response payload: expected {expected}, got {actual}")]
    UnexpectedPayload {
        expected: &'static str,
        actual: &'static str,
    },
}

impl ProxyError {
    pub fn code(&self) -> Option<ErrorCode> {
        match self {
            ProxyError::Remote(e) => Some(e.code),
            _ => None,
        }
    }
}
