use thiserror::Error;

/// Errors that can occur when building a [`FileStore`](crate::FileStore).
#[derive(Debug, Error)]
pub enum FileStoreError {
    /// The storage root could not be created or is not a directory.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The provided configuration is invalid.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}
