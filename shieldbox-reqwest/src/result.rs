use bytes::Bytes;
use http::{HeaderMap, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Why a call didn't produce a usable result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HttpFailureKind {
    /// No response: DNS, connect, TLS or timeout failure.
    Transport,
    /// The upstream answered with a non-2xx status.
    Status,
    /// A 2xx body that isn't valid JSON.
    Decode,
    /// The request payload couldn't be encoded.
    Encode,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpFailure {
    pub kind: HttpFailureKind,
    pub message: String,
}

/// Outcome of one outbound call, live or replayed from the cache.
///
/// Failures are values: `success` is false and `error` says why. `status`
/// is 0 when no response was received.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HttpResult {
    pub success: bool,
    pub status: u16,
    #[serde(with = "http_serde::header_map")]
    pub headers: HeaderMap,
    #[serde(with = "stored_body")]
    pub body: Bytes,
    pub error: Option<HttpFailure>,
    pub data: Option<serde_json::Value>,
}

impl HttpResult {
    pub(crate) fn from_response(status: StatusCode, headers: HeaderMap, body: Bytes) -> Self {
        let error = (!status.is_success()).then(|| HttpFailure {
            kind: HttpFailureKind::Status,
            message: format!("upstream responded with {status}"),
        });
        Self {
            success: error.is_none(),
            status: status.as_u16(),
            headers,
            body,
            error,
            data: None,
        }
    }

    pub(crate) fn failure(kind: HttpFailureKind, message: impl Into<String>) -> Self {
        Self {
            success: false,
            status: 0,
            headers: HeaderMap::new(),
            body: Bytes::new(),
            error: Some(HttpFailure {
                kind,
                message: message.into(),
            }),
            data: None,
        }
    }

    /// Decodes the body into `data`.
    ///
    /// A 2xx body that doesn't decode turns the result into a `Decode`
    /// failure. Non-2xx results keep their `Status` error and only get
    /// `data` when the error body happens to be JSON.
    pub(crate) fn decode_json(mut self) -> Self {
        if self.body.is_empty() && !self.success {
            return self;
        }
        match serde_json::from_slice(&self.body) {
            Ok(data) => self.data = Some(data),
            Err(error) if self.success => {
                self.success = false;
                self.error = Some(HttpFailure {
                    kind: HttpFailureKind::Decode,
                    message: format!("invalid JSON response: {error}"),
                });
            }
            Err(_) => {}
        }
        self
    }

    pub fn is_success(&self) -> bool {
        self.success
    }

    pub fn failure_kind(&self) -> Option<HttpFailureKind> {
        self.error.as_ref().map(|error| error.kind)
    }

    /// The body as UTF-8 text, if it is.
    pub fn text(&self) -> Option<&str> {
        std::str::from_utf8(&self.body).ok()
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|value| value.to_str().ok())
    }

    /// Deserializes the body into `T`.
    pub fn json<T>(&self) -> Result<T, serde_json::Error>
    where
        T: DeserializeOwned,
    {
        serde_json::from_slice(&self.body)
    }
}

/// Bodies are stored as text when they are UTF-8, bytes otherwise.
mod stored_body {
    use bytes::Bytes;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    #[derive(Serialize, Deserialize)]
    #[serde(untagged)]
    enum StoredBody {
        Text(String),
        Binary(Vec<u8>),
    }

    pub fn serialize<S>(body: &Bytes, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match std::str::from_utf8(body) {
            Ok(text) => serializer.serialize_str(text),
            Err(_) => serializer.collect_seq(body.iter()),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Bytes, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(match StoredBody::deserialize(deserializer)? {
            StoredBody::Text(text) => Bytes::from(text),
            StoredBody::Binary(bytes) => Bytes::from(bytes),
        })
    }
}
