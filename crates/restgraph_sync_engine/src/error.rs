//! Error types for the sync engine.

use restgraph_core::{CoreError, LocalId};
use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Failures reported by a [`Transport`](crate::Transport).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The request never produced a response.
    #[error("connection error: {0}")]
    Connection(String),

    /// The remote service answered with a non-success status.
    #[error("remote returned status {status}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Response body as text, possibly empty.
        body: String,
    },

    /// The response body was not valid JSON.
    #[error("could not decode response: {0}")]
    Decode(String),

    /// The mock transport had no response scripted for the request.
    #[error("no response scripted for {method} {path}")]
    Unscripted {
        /// Request method.
        method: String,
        /// Request path.
        path: String,
    },
}

/// Errors that can occur during sync operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SyncError {
    /// A remote write failed in transport.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// A remote read failed in transport.
    #[error("remote fetch failed: {cause}")]
    RemoteFetchFailed {
        /// Underlying transport failure.
        cause: TransportError,
    },

    /// The object has no resource identifier, so no remote path exists for it.
    #[error("{operation} needs a resource identifier, but {local} has none")]
    Precision {
        /// The object.
        local: LocalId,
        /// The operation that was attempted.
        operation: String,
    },

    /// Graph, catalog or translation error.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// Invalid fetch state transition.
    #[error("invalid state transition from {from} to {to}")]
    InvalidStateTransition {
        /// Current state.
        from: String,
        /// Attempted target state.
        to: String,
    },

    /// The context was torn down; results are no longer merged.
    #[error("sync context was torn down")]
    ContextTornDown,
}

impl SyncError {
    /// Creates a precision error.
    pub fn precision(local: LocalId, operation: impl Into<String>) -> Self {
        Self::Precision {
            local,
            operation: operation.into(),
        }
    }

    /// Returns the transport failure behind this error, if any.
    pub fn transport_cause(&self) -> Option<&TransportError> {
        match self {
            SyncError::Transport(cause) | SyncError::RemoteFetchFailed { cause } => Some(cause),
            _ => None,
        }
    }

    /// Returns true if the remote service was involved in the failure.
    pub fn is_remote(&self) -> bool {
        self.transport_cause().is_some()
    }
}
