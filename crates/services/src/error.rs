//! Shared error types for the services crate.

use thiserror::Error;

use storage::StorageError;

/// Errors emitted by the progress engine's write path.
///
/// Remote failures never surface here; they are logged and the local
/// state republished. Only local persistence can fail an operation.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ProgressError {
    #[error(transparent)]
    Storage(#[from] StorageError),
}
