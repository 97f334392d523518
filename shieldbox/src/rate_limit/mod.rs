//! Sliding-window rate limiting per endpoint and client.
//!
//! Each `(endpoint, client)` pair owns a [`RateWindow`] of admission
//! timestamps. A check prunes the window, admits the request if fewer than
//! `limit` timestamps remain and persists the result, all inside one
//! [`Store::update`] so concurrent requests never see the same window.

mod identity;
mod rejection;
mod window;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use shieldbox_backend::{Clock, StorageKey, Store, SystemClock};
use shieldbox_config::{FailurePolicy, ShieldConfig};
use tracing::{debug, info, trace, warn};

pub use identity::ClientIdentity;
pub use rejection::{
    RateLimitRejection, RateLimitStatus, X_RATELIMIT_LIMIT, X_RATELIMIT_REMAINING,
    X_RATELIMIT_RESET,
};
pub use window::RateWindow;

use crate::sweep::should_sweep;

/// Length of the sliding window.
pub const WINDOW: Duration = Duration::from_secs(60);

const WINDOW_MS: i64 = 60_000;

/// Windows idle for this long are garbage.
const IDLE_MS: i64 = 2 * WINDOW_MS;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitDecision {
    Allowed(RateLimitStatus),
    Denied(RateLimitStatus),
}

impl RateLimitDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed(_))
    }

    pub fn status(&self) -> &RateLimitStatus {
        match self {
            Self::Allowed(status) | Self::Denied(status) => status,
        }
    }
}

pub struct RateLimiter<S> {
    store: Arc<S>,
    clock: Arc<dyn Clock>,
    config: Arc<ShieldConfig>,
}

impl<S> Clone for RateLimiter<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            clock: Arc::clone(&self.clock),
            config: Arc::clone(&self.config),
        }
    }
}

impl<S> fmt::Debug for RateLimiter<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RateLimiter")
            .field("clock", &self.clock)
            .field("failure_policy", &self.config.rate_limit.failure_policy)
            .finish_non_exhaustive()
    }
}

impl<S> RateLimiter<S>
where
    S: Store,
{
    pub fn new(store: S, config: Arc<ShieldConfig>) -> Self {
        Self::with_clock(store, config, Arc::new(SystemClock))
    }

    pub fn with_clock(store: S, config: Arc<ShieldConfig>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store: Arc::new(store),
            clock,
            config,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &ShieldConfig {
        &self.config
    }

    /// Counts a request from `client` on `endpoint` against its limit.
    pub async fn check(&self, endpoint: &str, client: &ClientIdentity) -> RateLimitDecision {
        let limit = self.config.rate_limit(endpoint);
        let key = window_key(endpoint, client);
        let now = self.clock.now();
        let now_ms = now.timestamp_millis();

        let mut outcome = None;
        let result = self
            .store
            .update(
                &key,
                Box::new(|current: Option<Bytes>| {
                    let mut window = RateWindow::decode(current.as_deref());
                    window.prune(now_ms, WINDOW_MS);
                    let admitted = window.try_admit(now_ms, limit);
                    outcome = Some((admitted, window.count()));
                    if window.is_empty() {
                        None
                    } else {
                        window.encode().or(current)
                    }
                }),
            )
            .await;

        let status = |count: u32| RateLimitStatus {
            limit,
            remaining: limit.saturating_sub(count),
            reset: now + chrono::Duration::milliseconds(WINDOW_MS),
            retry_after: WINDOW,
        };

        let decision = match (result, outcome) {
            (Ok(()), Some((true, count))) => {
                debug!(endpoint, %client, count, limit, "request admitted");
                RateLimitDecision::Allowed(status(count))
            }
            (Ok(()), Some((false, count))) => {
                info!(endpoint, %client, limit, "rate limit exceeded");
                RateLimitDecision::Denied(status(count))
            }
            (result, _) => {
                let error = result.err().map(|error| error.to_string());
                match self.config.rate_limit.failure_policy {
                    FailurePolicy::Open => {
                        warn!(endpoint, %client, ?error, "rate limit store failed, admitting");
                        return RateLimitDecision::Allowed(status(0));
                    }
                    FailurePolicy::Closed => {
                        warn!(endpoint, %client, ?error, "rate limit store failed, denying");
                        return RateLimitDecision::Denied(status(limit));
                    }
                }
            }
        };

        if should_sweep(self.config.storage.sweep_probability) {
            self.sweep(endpoint).await;
        }
        decision
    }

    /// Collects idle windows of `endpoint` and of every endpoint with a
    /// configured limit. Endpoints running on the default limit are only
    /// swept by their own requests.
    async fn sweep(&self, endpoint: &str) {
        let configured = self.config.rate_limit.endpoints.keys();
        let mut removed = self.collect_garbage(endpoint).await;
        for other in configured.filter(|other| other.as_str() != endpoint) {
            removed += self.collect_garbage(other).await;
        }
        trace!(endpoint, removed, "rate window sweep");
    }

    /// Like [`RateLimiter::check`], but a denial is an error that renders
    /// as a `429` response.
    pub async fn enforce(
        &self,
        endpoint: &str,
        client: &ClientIdentity,
    ) -> Result<RateLimitStatus, RateLimitRejection> {
        match self.check(endpoint, client).await {
            RateLimitDecision::Allowed(status) => Ok(status),
            RateLimitDecision::Denied(status) => Err(RateLimitRejection::new(endpoint, status)),
        }
    }

    /// Forgets every request `client` made on `endpoint`.
    pub async fn reset(&self, endpoint: &str, client: &ClientIdentity) {
        let key = window_key(endpoint, client);
        if let Err(error) = self.store.remove(&key).await {
            warn!(endpoint, %client, %error, "failed to reset rate window");
        }
    }

    /// Removes windows of `endpoint` with no request in the last two
    /// windows. Returns how many were removed.
    pub async fn collect_garbage(&self, endpoint: &str) -> u64 {
        let keys = match self.store.keys(endpoint).await {
            Ok(keys) => keys,
            Err(error) => {
                warn!(endpoint, %error, "rate window sweep failed to list keys");
                return 0;
            }
        };

        let cutoff = self.clock.now().timestamp_millis() - IDLE_MS;
        let mut removed = 0;
        for key in keys {
            let mut idle = false;
            let result = self
                .store
                .update(
                    &key,
                    Box::new(|current: Option<Bytes>| {
                        let window = RateWindow::decode(current.as_deref());
                        if window.newest().is_none_or(|newest| newest < cutoff) {
                            idle = current.is_some();
                            None
                        } else {
                            current
                        }
                    }),
                )
                .await;
            match result {
                Ok(()) if idle => removed += 1,
                Ok(()) => {}
                Err(error) => warn!(%key, %error, "rate window sweep failed"),
            }
        }
        debug!(endpoint, removed, "rate window sweep finished");
        removed
    }
}

fn window_key(endpoint: &str, client: &ClientIdentity) -> StorageKey {
    StorageKey::hashed(endpoint, &format!("{endpoint}|{client}"))
}
