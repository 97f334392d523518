use std::sync::Arc;

use tower::Layer;

use crate::rate_limit::RateLimiter;
use crate::service::RateLimitService;

/// Tower layer enforcing a [`RateLimiter`] in front of a service.
///
/// ```ignore
/// let app = Router::new()
///     .route("/api/news", get(news))
///     .layer(RateLimitLayer::new(limiter.clone(), "news"));
/// ```
pub struct RateLimitLayer<S> {
    limiter: RateLimiter<S>,
    endpoint: Arc<str>,
}

impl<S> RateLimitLayer<S> {
    /// Limits requests under the budget configured for `endpoint`.
    pub fn new(limiter: RateLimiter<S>, endpoint: impl Into<Arc<str>>) -> Self {
        Self {
            limiter,
            endpoint: endpoint.into(),
        }
    }
}

impl<S> Clone for RateLimitLayer<S> {
    fn clone(&self) -> Self {
        Self {
            limiter: self.limiter.clone(),
            endpoint: Arc::clone(&self.endpoint),
        }
    }
}

impl<Inner, S> Layer<Inner> for RateLimitLayer<S> {
    type Service = RateLimitService<Inner, S>;

    fn layer(&self, inner: Inner) -> Self::Service {
        RateLimitService::new(inner, self.limiter.clone(), Arc::clone(&self.endpoint))
    }
}
