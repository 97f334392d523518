use std::sync::Arc;
use std::task::{Context, Poll};

use axum::body::Body;
use axum::response::IntoResponse;
use futures::future::BoxFuture;
use http::{Request, Response};
use shieldbox_backend::Store;
use tower::Service;

use crate::context::RequestContext;
use crate::rate_limit::RateLimiter;

/// Service produced by [`RateLimitLayer`](crate::RateLimitLayer).
///
/// Denied requests never reach `inner`; they get the `429` response of
/// [`RateLimitRejection`](crate::rate_limit::RateLimitRejection). Admitted
/// responses carry the quota headers.
pub struct RateLimitService<Inner, S> {
    inner: Inner,
    limiter: RateLimiter<S>,
    endpoint: Arc<str>,
}

impl<Inner, S> RateLimitService<Inner, S> {
    pub fn new(inner: Inner, limiter: RateLimiter<S>, endpoint: Arc<str>) -> Self {
        Self {
            inner,
            limiter,
            endpoint,
        }
    }
}

impl<Inner, S> Clone for RateLimitService<Inner, S>
where
    Inner: Clone,
{
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            limiter: self.limiter.clone(),
            endpoint: Arc::clone(&self.endpoint),
        }
    }
}

impl<Inner, S, ReqBody> Service<Request<ReqBody>> for RateLimitService<Inner, S>
where
    Inner: Service<Request<ReqBody>, Response = Response<Body>> + Clone + Send + 'static,
    Inner::Future: Send,
    S: Store + 'static,
    ReqBody: Send + 'static,
{
    type Response = Response<Body>;
    type Error = Inner::Error;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut request: Request<ReqBody>) -> Self::Future {
        // The clone isn't guaranteed to be ready, keep the one that was polled.
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);
        let limiter = self.limiter.clone();
        let endpoint = Arc::clone(&self.endpoint);

        Box::pin(async move {
            let context = RequestContext::from_request(&request, limiter.config());
            let status = match limiter.enforce(&endpoint, &context.client).await {
                Ok(status) => status,
                Err(rejection) => return Ok(rejection.into_response()),
            };

            request.extensions_mut().insert(context);
            let mut response = inner.call(request).await?;
            status.apply_headers(response.headers_mut());
            Ok(response)
        })
    }
}
