use std::net::SocketAddr;

use axum::extract::ConnectInfo;
use http::{HeaderMap, Request, request::Parts};
use shieldbox_config::ShieldConfig;

use crate::rate_limit::ClientIdentity;

/// Per-request facts handlers and components need, resolved once.
///
/// Built from the request and the configuration, then passed along
/// explicitly. [`RateLimitLayer`](crate::RateLimitLayer) inserts one into
/// the request extensions, so axum handlers can take
/// `Extension<RequestContext>`.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub client: ClientIdentity,
    pub headers: HeaderMap,
    pub debug: bool,
}

impl RequestContext {
    pub fn new(client: ClientIdentity, headers: HeaderMap, debug: bool) -> Self {
        Self {
            client,
            headers,
            debug,
        }
    }

    pub fn from_parts(parts: &Parts, config: &ShieldConfig) -> Self {
        Self::resolve(&parts.headers, &parts.extensions, config)
    }

    pub fn from_request<B>(request: &Request<B>, config: &ShieldConfig) -> Self {
        Self::resolve(request.headers(), request.extensions(), config)
    }

    fn resolve(headers: &HeaderMap, extensions: &http::Extensions, config: &ShieldConfig) -> Self {
        let peer = extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| *addr);
        let client = ClientIdentity::resolve(headers, &config.rate_limit.trusted_header, peer);
        Self::new(client, headers.clone(), config.is_debug())
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|value| value.to_str().ok())
    }
}
