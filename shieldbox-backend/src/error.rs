//! Error types for storage operations.

use thiserror::Error;

/// Error type for storage operations.
///
/// Callers in the shielding layer treat every variant as a storage failure:
/// the cache swallows it, the rate limiter applies its failure policy.
#[derive(Debug, Error)]
pub enum BackendError {
    /// Filesystem or other I/O error.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Internal store error, state or computation error.
    ///
    /// Any error not related to I/O.
    #[error(transparent)]
    InternalError(Box<dyn std::error::Error + Send + Sync>),
}

impl BackendError {
    /// Wraps an arbitrary error as [`BackendError::InternalError`].
    pub fn internal<E>(error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::InternalError(Box::new(error))
    }
}
