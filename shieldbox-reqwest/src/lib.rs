#![doc = include_str!("../README.md")]

mod gateway;
mod middleware;
mod result;

pub use gateway::{GatewayError, HttpGateway, NAMESPACE, build_client};
pub use middleware::DispatchLog;
pub use result::{HttpFailure, HttpFailureKind, HttpResult};

/// Re-exported so callers can build clients for [`HttpGateway::with_client`].
pub use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
