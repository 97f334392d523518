use std::time::Duration;

use bincode::config::standard as bincode_config;
use bincode::serde::{decode_from_slice, encode_to_vec};
use bytes::Bytes;
use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};

/// Persisted form of a cached value.
///
/// `expires_at == created_at + ttl` holds for every entry written by
/// [`CacheEntry::new`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    #[serde(with = "serde_bytes")]
    value: Vec<u8>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    created_at: DateTime<Utc>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    expires_at: DateTime<Utc>,
}

impl CacheEntry {
    /// Returns `None` if `ttl` doesn't fit into a chrono duration.
    ///
    /// Timestamps are kept with millisecond precision, like their stored form.
    pub fn new(value: impl Into<Vec<u8>>, now: DateTime<Utc>, ttl: Duration) -> Option<Self> {
        let now = now.trunc_subsecs(3);
        let ttl = chrono::Duration::from_std(ttl).ok()?;
        let expires_at = now.checked_add_signed(ttl)?;
        Some(Self {
            value: value.into(),
            created_at: now,
            expires_at,
        })
    }

    pub fn value(&self) -> &[u8] {
        &self.value
    }

    pub fn into_value(self) -> Bytes {
        Bytes::from(self.value)
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at < now
    }

    pub fn encode(&self) -> Option<Bytes> {
        encode_to_vec(self, bincode_config()).ok().map(Bytes::from)
    }

    /// Decodes a stored payload. Trailing garbage counts as corruption.
    pub fn decode(payload: &[u8]) -> Option<Self> {
        let (entry, read): (Self, usize) = decode_from_slice(payload, bincode_config()).ok()?;
        (read == payload.len() && entry.expires_at >= entry.created_at).then_some(entry)
    }
}
