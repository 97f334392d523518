use std::path::PathBuf;
use std::time::Duration;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// What the rate limiter does when its store can't be read or written.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Default)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Admit the request and log the failure.
    ///
    /// Keeps the site up when storage is broken, at the cost of letting a
    /// client that can break storage bypass the limiter.
    #[default]
    Open,
    /// Deny the request.
    Closed,
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Requests per window for endpoints without an explicit limit.
    pub default_limit: u32,
    /// Per-endpoint limits, keyed by endpoint name.
    pub endpoints: IndexMap<String, u32>,
    /// Header set exclusively by the edge proxy/CDN.
    ///
    /// Only trustworthy if the edge strips any client-supplied value.
    pub trusted_header: String,
    pub failure_policy: FailurePolicy,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            default_limit: 60,
            endpoints: IndexMap::new(),
            trusted_header: "cf-connecting-ip".to_owned(),
            failure_policy: FailurePolicy::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
#[serde(default)]
pub struct CacheConfig {
    /// TTL used when a caller doesn't pass one (e.g. "5m", "1h").
    #[serde(with = "humantime_serde")]
    pub default_ttl: Duration,
    /// TTLs per resource type (e.g. `news: 15m`, `cve: 6h`).
    pub ttls: IndexMap<String, humantime_serde::Serde<Duration>>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            default_ttl: Duration::from_secs(300),
            ttls: IndexMap::new(),
        }
    }
}

/// Outbound HTTP client policy.
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
#[serde(default)]
pub struct HttpConfig {
    /// Total time budget of a request, including the body.
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
    #[serde(with = "humantime_serde")]
    pub connect_timeout: Duration,
    /// Verify upstream TLS certificates.
    ///
    /// Deployments behind an edge TLS terminator may turn this off; it is
    /// never assumed.
    pub verify_tls: bool,
    pub max_redirects: usize,
    pub user_agent: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
            verify_tls: true,
            max_redirects: 10,
            user_agent: concat!("shieldbox/", env!("CARGO_PKG_VERSION")).to_owned(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StorageConfig {
    /// Root of the cache store. In-memory when unset.
    pub cache_dir: Option<PathBuf>,
    /// Root of the rate-limit store. In-memory when unset.
    pub rate_limit_dir: Option<PathBuf>,
    /// Fraction of writes that trigger an opportunistic sweep (0.0..=1.0).
    pub sweep_probability: f64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            cache_dir: None,
            rate_limit_dir: None,
            sweep_probability: 0.01,
        }
    }
}
