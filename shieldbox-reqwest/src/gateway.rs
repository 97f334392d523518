use std::collections::BTreeMap;
use std::time::Duration;

use bytes::Bytes;
use http::header::{ACCEPT, CONTENT_TYPE};
use http::{HeaderMap, HeaderValue, Method};
use reqwest::redirect::Policy;
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use serde::Serialize;
use shieldbox::TtlCache;
use shieldbox::backend::Store;
use shieldbox::config::HttpConfig;
use thiserror::Error;
use tracing::{Instrument, debug, debug_span, trace, warn};

use crate::middleware::DispatchLog;
use crate::result::{HttpFailureKind, HttpResult};

/// Cache namespace holding gateway results.
pub const NAMESPACE: &str = "http";

const APPLICATION_JSON: HeaderValue = HeaderValue::from_static("application/json");

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),
}

/// Outbound HTTP with result caching.
///
/// A GET with a cache TTL is answered from the cache while the stored result
/// is fresh. Only successful results are stored, and POST is never cached.
/// No call retries.
pub struct HttpGateway<S> {
    client: ClientWithMiddleware,
    cache: TtlCache<S>,
}

impl<S> HttpGateway<S>
where
    S: Store,
{
    /// Builds a client from the cache's `http` configuration.
    pub fn new(cache: TtlCache<S>) -> Result<Self, GatewayError> {
        let client = build_client(&cache.config().http)?;
        let client = ClientBuilder::new(client).with(DispatchLog).build();
        Ok(Self::with_client(cache, client))
    }

    /// Uses a caller-built client, e.g. one with extra middleware.
    pub fn with_client(cache: TtlCache<S>, client: ClientWithMiddleware) -> Self {
        Self { client, cache }
    }

    pub fn cache(&self) -> &TtlCache<S> {
        &self.cache
    }

    pub async fn get(&self, url: &str, headers: &HeaderMap, cache_ttl: Option<Duration>) -> HttpResult {
        self.fetch(Method::GET, url, headers.clone(), None, cache_ttl, false)
            .await
    }

    /// Sends `body` as is. Never cached.
    pub async fn post(&self, url: &str, body: impl Into<Bytes>, headers: &HeaderMap) -> HttpResult {
        self.fetch(Method::POST, url, headers.clone(), Some(body.into()), None, false)
            .await
    }

    /// JSON call: encodes `data` as the request body and decodes the
    /// response body into [`HttpResult::data`].
    ///
    /// Only GET results are cached.
    pub async fn json<T>(
        &self,
        method: Method,
        url: &str,
        data: Option<&T>,
        headers: &HeaderMap,
        cache_ttl: Option<Duration>,
    ) -> HttpResult
    where
        T: Serialize + ?Sized,
    {
        let mut headers = headers.clone();
        headers.insert(ACCEPT, APPLICATION_JSON);

        let body = match data.map(serde_json::to_vec).transpose() {
            Ok(body) => body.map(Bytes::from),
            Err(error) => {
                warn!(%method, url, %error, "failed to encode JSON request");
                return HttpResult::failure(HttpFailureKind::Encode, error.to_string());
            }
        };
        if body.is_some() {
            headers.insert(CONTENT_TYPE, APPLICATION_JSON);
        }

        self.fetch(method, url, headers, body, cache_ttl, true).await
    }

    async fn fetch(
        &self,
        method: Method,
        url: &str,
        headers: HeaderMap,
        body: Option<Bytes>,
        cache_ttl: Option<Duration>,
        decode_json: bool,
    ) -> HttpResult {
        let span = debug_span!("shieldbox.gateway", %method, url);
        async move {
            let cached = cache_ttl
                .filter(|ttl| method == Method::GET && !ttl.is_zero())
                .map(|ttl| (cache_key(url, &headers, decode_json), ttl));

            if let Some((key, _)) = &cached {
                if let Some(result) = self.cache.get::<HttpResult>(NAMESPACE, key).await {
                    debug!(status = result.status, "served from cache");
                    return result;
                }
                trace!("cache miss, dispatching");
            }

            let mut result = self.dispatch(method, url, headers, body).await;
            if decode_json {
                result = result.decode_json();
            }

            match cached {
                Some((key, ttl)) if result.success => {
                    if self.cache.set(NAMESPACE, &key, &result, Some(ttl)).await {
                        debug!(?ttl, "result cached");
                    }
                }
                Some(_) => debug!(kind = ?result.failure_kind(), "failure not cached"),
                None => {}
            }
            result
        }
        .instrument(span)
        .await
    }

    async fn dispatch(
        &self,
        method: Method,
        url: &str,
        headers: HeaderMap,
        body: Option<Bytes>,
    ) -> HttpResult {
        let mut request = self.client.request(method, url).headers(headers);
        if let Some(body) = body {
            request = request.body(body);
        }

        let response = match request.send().await {
            Ok(response) => response,
            Err(error) => {
                debug!(%error, "transport failure");
                return HttpResult::failure(HttpFailureKind::Transport, error.to_string());
            }
        };

        let status = response.status();
        let headers = response.headers().clone();
        match response.bytes().await {
            Ok(body) => HttpResult::from_response(status, headers, body),
            Err(error) => {
                debug!(%error, status = status.as_u16(), "failed to read response body");
                let mut result = HttpResult::failure(
                    HttpFailureKind::Transport,
                    format!("failed to read response body: {error}"),
                );
                result.status = status.as_u16();
                result.headers = headers;
                result
            }
        }
    }
}

/// Builds the reqwest client for a gateway.
pub fn build_client(config: &HttpConfig) -> Result<reqwest::Client, GatewayError> {
    if !config.verify_tls {
        warn!("TLS certificate verification is disabled for outbound requests");
    }
    let client = reqwest::Client::builder()
        .timeout(config.timeout)
        .connect_timeout(config.connect_timeout)
        .redirect(Policy::limited(config.max_redirects))
        .danger_accept_invalid_certs(!config.verify_tls)
        .user_agent(config.user_agent.as_str())
        .build()?;
    Ok(client)
}

/// Cache key of a GET: the decode mode, the URL and its headers sorted by
/// name. Raw and JSON results of the same request are stored apart.
fn cache_key(url: &str, headers: &HeaderMap, decode_json: bool) -> String {
    let mut canonical: BTreeMap<&str, Vec<String>> = BTreeMap::new();
    for (name, value) in headers {
        canonical
            .entry(name.as_str())
            .or_default()
            .push(String::from_utf8_lossy(value.as_bytes()).into_owned());
    }
    let headers = serde_json::to_string(&canonical).unwrap_or_default();
    let mode = if decode_json { "json" } else { "raw" };
    format!("{mode}|{url}|{headers}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_key_ignores_header_order() {
        let mut first = HeaderMap::new();
        first.insert("x-api-key", HeaderValue::from_static("secret"));
        first.insert(ACCEPT, APPLICATION_JSON);

        let mut second = HeaderMap::new();
        second.insert(ACCEPT, APPLICATION_JSON);
        second.insert("x-api-key", HeaderValue::from_static("secret"));

        let url = "https://example.com/feed";
        assert_eq!(cache_key(url, &first, false), cache_key(url, &second, false));
        assert_ne!(
            cache_key(url, &first, false),
            cache_key(url, &HeaderMap::new(), false)
        );
        assert_ne!(
            cache_key(url, &first, false),
            cache_key("https://example.com/other", &first, false)
        );
    }

    #[test]
    fn test_cache_key_separates_raw_and_json() {
        let url = "https://example.com/feed";
        let headers = HeaderMap::new();
        assert_ne!(cache_key(url, &headers, false), cache_key(url, &headers, true));
    }
}
