use std::collections::VecDeque;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Admission timestamps of one client on one endpoint, oldest first.
///
/// Persisted as a JSON array of epoch milliseconds.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RateWindow {
    timestamps: VecDeque<i64>,
}

impl RateWindow {
    /// Decodes a stored window. Garbage decodes to an empty window.
    pub fn decode(payload: Option<&[u8]>) -> Self {
        let Some(payload) = payload else {
            return Self::default();
        };
        match serde_json::from_slice::<Self>(payload) {
            Ok(mut window) => {
                window.timestamps.make_contiguous().sort_unstable();
                window
            }
            Err(error) => {
                tracing::warn!(%error, "corrupted rate window, starting over");
                Self::default()
            }
        }
    }

    pub fn encode(&self) -> Option<Bytes> {
        serde_json::to_vec(self).ok().map(Bytes::from)
    }

    /// Drops timestamps older than `now_ms - window_ms`.
    ///
    /// The boundary itself is kept.
    pub fn prune(&mut self, now_ms: i64, window_ms: i64) {
        let cutoff = now_ms.saturating_sub(window_ms);
        while self.timestamps.front().is_some_and(|&ts| ts < cutoff) {
            self.timestamps.pop_front();
        }
    }

    /// Records a request at `now_ms` if fewer than `limit` are retained.
    pub fn try_admit(&mut self, now_ms: i64, limit: u32) -> bool {
        if self.count() >= limit {
            return false;
        }
        self.timestamps.push_back(now_ms);
        true
    }

    pub fn count(&self) -> u32 {
        u32::try_from(self.timestamps.len()).unwrap_or(u32::MAX)
    }

    pub fn newest(&self) -> Option<i64> {
        self.timestamps.back().copied()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }
}
