//! Portfolio Site Example
//!
//! A small axum server with the endpoints a personal site typically proxies:
//! a cached news feed and a rate-limited DNS diagnostic.
//!
//! Run:
//!   cargo run -p shieldbox-demos --example portfolio
//!   SHIELDBOX_CONFIG=shield.yaml cargo run -p shieldbox-demos --example portfolio
//!
//! Endpoints:
//!   - http://localhost:3000/api/news             - Upstream feed (cached, limited by the layer)
//!   - http://localhost:3000/api/lookup?host=...  - DNS lookup (validated, limited in the handler)
//!   - http://localhost:3000/health               - Health check
//!
//! Try it:
//!   curl -v http://localhost:3000/api/news                      # X-RateLimit-* headers
//!   for i in $(seq 1 40); do curl -s -o /dev/null -w '%{http_code}\n' http://localhost:3000/api/news; done
//!   curl -v 'http://localhost:3000/api/lookup?host=example.com'
//!   curl -v 'http://localhost:3000/api/lookup?host=not_a_host'  # 422

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::request::Parts;
use axum::http::{HeaderMap, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{Value, json};
use shieldbox::validation::{Rule, validate};
use shieldbox::{RateLimitLayer, RateLimiter, RequestContext, TtlCache};
use shieldbox_backend::{MemoryStore, Store};
use shieldbox_config::ShieldConfig;
use shieldbox_fs::FileStore;
use shieldbox_reqwest::HttpGateway;
use tracing_subscriber::EnvFilter;

type DynStore = Arc<dyn Store>;

const DEFAULT_CONFIG: &str = r#"
debug: true
rate_limit:
  default_limit: 60
  endpoints:
    news: 30
    lookup: 10
cache:
  default_ttl: 5m
  ttls:
    news: 15m
    lookup: 1h
settings:
  server:
    bind: 0.0.0.0:3000
  news:
    feed_url: https://hacker-news.firebaseio.com/v0/topstories.json
"#;

#[derive(Clone)]
struct AppState {
    config: Arc<ShieldConfig>,
    gateway: Arc<HttpGateway<DynStore>>,
    cache: TtlCache<DynStore>,
    limiter: RateLimiter<DynStore>,
}

fn open_store(dir: Option<&Path>, label: &str) -> DynStore {
    match dir {
        Some(dir) => {
            let store = FileStore::builder()
                .path(dir)
                .label(label)
                .build()
                .expect("Failed to open file store");
            tracing::info!(root = %dir.display(), label, "using file store");
            Arc::new(store)
        }
        None => {
            tracing::info!(label, "using in-memory store");
            Arc::new(MemoryStore::new())
        }
    }
}

async fn news(State(state): State<AppState>) -> Response {
    let feed_url: String = state.config.get("news.feed_url", String::new());
    let ttl = state.cache.ttl_for("news");

    let result = state
        .gateway
        .json::<()>(Method::GET, &feed_url, None, &HeaderMap::new(), Some(ttl))
        .await;

    match result.data {
        Some(data) if result.success => Json(json!({ "items": data })).into_response(),
        _ => {
            let detail = result
                .error
                .filter(|_| state.config.is_debug())
                .map(|error| error.message);
            (
                StatusCode::BAD_GATEWAY,
                Json(json!({ "error": "upstream_unavailable", "detail": detail })),
            )
                .into_response()
        }
    }
}

#[derive(Debug, Deserialize)]
struct LookupParams {
    #[serde(default)]
    host: String,
}

async fn lookup(
    State(state): State<AppState>,
    Query(params): Query<LookupParams>,
    parts: Parts,
) -> Result<Json<Value>, Response> {
    let context = RequestContext::from_parts(&parts, &state.config);

    let rules = [Rule::Required, Rule::MaxLength(253), Rule::Hostname];
    validate("host", &params.host, &rules).map_err(|error| {
        (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(json!({ "error": "validation_failed", "message": error.to_string() })),
        )
            .into_response()
    })?;

    let status = state
        .limiter
        .enforce("lookup", &context.client)
        .await
        .map_err(IntoResponse::into_response)?;

    let host = params.host.to_ascii_lowercase();
    let target = host.as_str();
    let ttl = state.cache.ttl_for("lookup");
    let addresses: Vec<String> = state
        .cache
        .try_remember("lookup", target, Some(ttl), move || async move {
            let addrs = tokio::net::lookup_host((target, 0)).await?;
            Ok::<_, std::io::Error>(addrs.map(|addr| addr.ip().to_string()).collect())
        })
        .await
        .map_err(|error| {
            tracing::warn!(host = target, %error, "lookup failed");
            let detail = state.config.is_debug().then(|| error.to_string());
            (
                StatusCode::BAD_GATEWAY,
                Json(json!({ "error": "lookup_failed", "detail": detail })),
            )
                .into_response()
        })?;

    Ok(Json(json!({
        "host": host,
        "addresses": addresses,
        "remaining": status.remaining,
    })))
}

async fn health() -> &'static str {
    "ok"
}

#[tokio::main]
async fn main() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,shieldbox=debug,shieldbox_reqwest=debug"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = match std::env::var("SHIELDBOX_CONFIG") {
        Ok(path) => ShieldConfig::from_path(path),
        Err(_) => ShieldConfig::from_yaml_str(DEFAULT_CONFIG),
    }
    .expect("Failed to load configuration");
    let config = Arc::new(config);

    let cache = TtlCache::new(
        open_store(config.storage.cache_dir.as_deref(), "cache"),
        Arc::clone(&config),
    );
    let limiter = RateLimiter::new(
        open_store(config.storage.rate_limit_dir.as_deref(), "rate-limit"),
        Arc::clone(&config),
    );
    let gateway = HttpGateway::new(cache.clone()).expect("Failed to build HTTP client");

    let state = AppState {
        config: Arc::clone(&config),
        gateway: Arc::new(gateway),
        cache,
        limiter: limiter.clone(),
    };

    let app = Router::new()
        .route(
            "/api/news",
            get(news).layer(RateLimitLayer::new(limiter, "news")),
        )
        .route("/api/lookup", get(lookup))
        .route("/health", get(health))
        .with_state(state);

    let bind: String = config.get("server.bind", "127.0.0.1:3000".to_owned());
    let listener = tokio::net::TcpListener::bind(&bind)
        .await
        .expect("Failed to bind listener");
    tracing::info!("Listening on http://{}", bind);
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .expect("Server error");
}
