use std::time::Duration;

use axum::Json;
use axum::response::{IntoResponse, Response};
use chrono::{DateTime, Utc};
use http::{HeaderMap, HeaderName, HeaderValue, StatusCode, header::RETRY_AFTER};
use serde::Serialize;
use thiserror::Error;

pub const X_RATELIMIT_LIMIT: HeaderName = HeaderName::from_static("x-ratelimit-limit");
pub const X_RATELIMIT_REMAINING: HeaderName = HeaderName::from_static("x-ratelimit-remaining");
pub const X_RATELIMIT_RESET: HeaderName = HeaderName::from_static("x-ratelimit-reset");

/// Quota state reported to the client after a check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitStatus {
    pub limit: u32,
    /// `limit - count`, never negative.
    pub remaining: u32,
    /// `now + window`.
    pub reset: DateTime<Utc>,
    pub retry_after: Duration,
}

impl RateLimitStatus {
    /// Writes the `X-RateLimit-Limit` and `X-RateLimit-Remaining` headers.
    pub fn apply_headers(&self, headers: &mut HeaderMap) {
        headers.insert(X_RATELIMIT_LIMIT, HeaderValue::from(self.limit));
        headers.insert(X_RATELIMIT_REMAINING, HeaderValue::from(self.remaining));
    }
}

#[derive(Debug, Serialize)]
struct RejectionBody<'a> {
    error: &'static str,
    message: &'a str,
    retry_after: u64,
}

/// A request denied by the rate limiter.
///
/// Renders as `429 Too Many Requests`.
#[derive(Debug, Clone, Error)]
#[error("rate limit exceeded on {endpoint}")]
pub struct RateLimitRejection {
    pub endpoint: String,
    pub status: RateLimitStatus,
    message: String,
}

impl RateLimitRejection {
    pub(crate) fn new(endpoint: &str, status: RateLimitStatus) -> Self {
        let message = format!(
            "Too many requests. Please try again in {} seconds.",
            status.retry_after.as_secs()
        );
        Self {
            endpoint: endpoint.to_owned(),
            status,
            message,
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn status_code(&self) -> StatusCode {
        StatusCode::TOO_MANY_REQUESTS
    }
}

impl IntoResponse for RateLimitRejection {
    fn into_response(self) -> Response {
        let retry_after = self.status.retry_after.as_secs();
        let body = RejectionBody {
            error: "rate_limit_exceeded",
            message: &self.message,
            retry_after,
        };
        let mut response = (self.status_code(), Json(body)).into_response();

        let headers = response.headers_mut();
        self.status.apply_headers(headers);
        headers.insert(
            X_RATELIMIT_RESET,
            HeaderValue::from(self.status.reset.timestamp()),
        );
        headers.insert(RETRY_AFTER, HeaderValue::from(retry_after));
        response
    }
}
