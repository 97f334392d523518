use std::fmt;
use std::net::{IpAddr, SocketAddr};

use http::HeaderMap;
use smol_str::SmolStr;

/// Key the rate limiter counts requests under.
///
/// Usually an IP address, `"unknown"` when nothing identifies the client.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClientIdentity(SmolStr);

impl ClientIdentity {
    pub const UNKNOWN: &'static str = "unknown";

    pub fn new(identity: impl Into<SmolStr>) -> Self {
        Self(identity.into())
    }

    pub fn unknown() -> Self {
        Self(SmolStr::new_static(Self::UNKNOWN))
    }

    /// Resolves the client behind a request.
    ///
    /// Order: `trusted_header`, then the first hop of `x-forwarded-for`,
    /// then the socket peer address. `trusted_header` must be one the edge
    /// proxy overwrites, otherwise clients pick their own identity.
    pub fn resolve(headers: &HeaderMap, trusted_header: &str, peer: Option<SocketAddr>) -> Self {
        header_value(headers, trusted_header)
            .or_else(|| {
                header_value(headers, "x-forwarded-for")
                    .and_then(|value| value.split(',').next().map(str::trim))
                    .filter(|hop| !hop.is_empty())
            })
            .map(Self::new)
            .or_else(|| peer.map(|peer| Self::from(peer.ip())))
            .unwrap_or_else(Self::unknown)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_unknown(&self) -> bool {
        self.0 == Self::UNKNOWN
    }
}

fn header_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

impl From<IpAddr> for ClientIdentity {
    fn from(ip: IpAddr) -> Self {
        Self(SmolStr::new(ip.to_string()))
    }
}

impl fmt::Display for ClientIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
