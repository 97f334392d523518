//! The configuration value shared by the cache, the rate limiter and the
//! HTTP gateway.
//!
//! A [`ShieldConfig`] is built once at start-up, usually from YAML, and then
//! handed to each component behind an `Arc`. It is never mutated afterwards.
//!
//! ```
//! use std::time::Duration;
//! use shieldbox_config::ShieldConfig;
//!
//! let config = ShieldConfig::from_yaml_str(r#"
//! debug: true
//! rate_limit:
//!   default_limit: 60
//!   endpoints:
//!     news: 30
//! cache:
//!   default_ttl: 5m
//!   ttls:
//!     cve: 6h
//! "#)?;
//!
//! assert!(config.is_debug());
//! assert_eq!(config.rate_limit("news"), 30);
//! assert_eq!(config.rate_limit("ping"), 60);
//! assert_eq!(config.cache_ttl("cve"), Duration::from_secs(6 * 3600));
//! assert_eq!(config.cache_ttl("unknown"), Duration::from_secs(300));
//! # Ok::<(), shieldbox_config::ConfigError>(())
//! ```

use std::path::Path;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{CacheConfig, ConfigError, HttpConfig, RateLimitConfig, StorageConfig};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct ShieldConfig {
    /// Development mode: verbose logs and error details in responses.
    pub debug: bool,
    pub rate_limit: RateLimitConfig,
    pub cache: CacheConfig,
    pub http: HttpConfig,
    pub storage: StorageConfig,
    /// Free-form application settings, read through [`ShieldConfig::get`].
    pub settings: Value,
}

impl ShieldConfig {
    /// Parses and validates a YAML document.
    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        let config: Self =
            serde_saphyr::from_str(yaml).map_err(|err| ConfigError::Parse(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a YAML file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let yaml = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_yaml_str(&yaml)?;
        tracing::info!(path = %path.display(), debug = config.debug, "configuration loaded");
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let probability = self.storage.sweep_probability;
        if !(0.0..=1.0).contains(&probability) {
            return Err(ConfigError::Invalid(format!(
                "storage.sweep_probability must be within 0.0..=1.0, got {probability}"
            )));
        }
        if self.cache.default_ttl.is_zero() {
            return Err(ConfigError::Invalid(
                "cache.default_ttl must be greater than zero".to_owned(),
            ));
        }
        if let Some((resource, _)) = self.cache.ttls.iter().find(|(_, ttl)| ttl.is_zero()) {
            return Err(ConfigError::Invalid(format!(
                "cache.ttls.{resource} must be greater than zero"
            )));
        }
        if self.http.timeout.is_zero() || self.http.connect_timeout.is_zero() {
            return Err(ConfigError::Invalid(
                "http timeouts must be greater than zero".to_owned(),
            ));
        }
        if self.rate_limit.trusted_header.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "rate_limit.trusted_header must not be empty".to_owned(),
            ));
        }
        Ok(())
    }

    /// Looks up a free-form setting by dotted path (`"news.feed_url"`).
    ///
    /// Returns `default` when the path is missing or the value doesn't
    /// deserialize into `T`.
    pub fn get<T>(&self, key: &str, default: T) -> T
    where
        T: DeserializeOwned,
    {
        key.split('.')
            .try_fold(&self.settings, |value, segment| value.get(segment))
            .and_then(|value| serde_json::from_value(value.clone()).ok())
            .unwrap_or(default)
    }

    /// Requests per window allowed on `endpoint`.
    pub fn rate_limit(&self, endpoint: &str) -> u32 {
        self.rate_limit
            .endpoints
            .get(endpoint)
            .copied()
            .unwrap_or(self.rate_limit.default_limit)
    }

    /// Cache TTL for a resource type, falling back to the default TTL.
    pub fn cache_ttl(&self, resource_type: &str) -> Duration {
        self.cache
            .ttls
            .get(resource_type)
            .map(|ttl| **ttl)
            .unwrap_or(self.cache.default_ttl)
    }

    pub fn is_debug(&self) -> bool {
        self.debug
    }
}
