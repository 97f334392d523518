//! Dispatch logging for reqwest-middleware.

use std::time::Instant;

use async_trait::async_trait;
use http::Extensions;
use reqwest::{Request, Response};
use reqwest_middleware::{Middleware, Next, Result};
use tracing::{debug, warn};

/// Logs every outbound request with its status and latency.
///
/// Installed by [`HttpGateway::new`](crate::HttpGateway::new). Callers
/// building their own client with
/// [`HttpGateway::with_client`](crate::HttpGateway::with_client) can add it
/// next to their own layers.
#[derive(Debug, Clone, Copy, Default)]
pub struct DispatchLog;

#[async_trait]
impl Middleware for DispatchLog {
    async fn handle(
        &self,
        req: Request,
        extensions: &mut Extensions,
        next: Next<'_>,
    ) -> Result<Response> {
        let method = req.method().clone();
        let url = req.url().clone();
        let start = Instant::now();

        let result = next.run(req, extensions).await;
        let elapsed_ms = start.elapsed().as_millis();
        match &result {
            Ok(response) => debug!(
                %method,
                %url,
                status = response.status().as_u16(),
                elapsed_ms,
                "upstream responded"
            ),
            Err(error) => warn!(%method, %url, %error, elapsed_ms, "upstream request failed"),
        }
        result
    }
}
