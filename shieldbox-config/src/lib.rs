//! Configuration for shieldbox.
//!
//! One immutable [`ShieldConfig`] value replaces process-wide configuration
//! globals: build it at start-up and pass it to every component.

mod config;
mod sections;

use std::path::PathBuf;

use thiserror::Error;

pub use config::ShieldConfig;
pub use sections::{CacheConfig, FailurePolicy, HttpConfig, RateLimitConfig, StorageConfig};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read configuration from {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse configuration: {0}")]
    Parse(String),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}
