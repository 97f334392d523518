#![doc = include_str!("../README.md")]
#![cfg_attr(docsrs, feature(doc_cfg))]

/// TTL cache over a [`Store`](shieldbox_backend::Store).
///
/// Provides [`TtlCache`](cache::TtlCache) with typed and raw access,
/// single-flight [`remember`](cache::TtlCache::remember) and opportunistic
/// sweeping of expired entries.
pub mod cache;

/// Sliding-window rate limiting.
///
/// This module provides:
/// - [`RateLimiter`](rate_limit::RateLimiter): per endpoint and client counting
/// - [`ClientIdentity`](rate_limit::ClientIdentity): who a request is counted against
/// - [`RateLimitRejection`](rate_limit::RateLimitRejection): the `429` response
pub mod rate_limit;

/// Request-scoped context resolved from the request and the configuration.
pub mod context;

pub mod validation;

mod layer;
mod service;
mod sweep;

pub use cache::TtlCache;
pub use context::RequestContext;
pub use layer::RateLimitLayer;
pub use rate_limit::{
    ClientIdentity, RateLimitDecision, RateLimitRejection, RateLimitStatus, RateLimiter,
};
pub use service::RateLimitService;

pub use shieldbox_backend as backend;
pub use shieldbox_config as config;

/// The `shieldbox` prelude.
///
/// ```rust
/// use shieldbox::prelude::*;
/// ```
pub mod prelude {
    pub use crate::backend::{Clock, MemoryStore, Store, SystemClock};
    pub use crate::config::ShieldConfig;
    pub use crate::{ClientIdentity, RateLimitLayer, RateLimiter, RequestContext, TtlCache};
}
