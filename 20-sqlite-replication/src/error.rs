use thiserror::Error;

use crate::store::StorageError;

/// Errors surfaced to the client that submitted a request.
///
/// Replication failures never appear here; they are logged by the fan-out and
/// dropped.
#[derive(Debug, Error)]
pub enum NodeError {
    #[error("invalid request: {0}")]
    BadRequest(String),
    #[error("forbidden: {0}")]
    Forbidden(String),
    #[error("execution failed: {0}")]
    Execution(#[from] StorageError),
}
