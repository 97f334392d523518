//! Storage key hashing.
//!
//! Every record lives under a `(namespace, digest)` pair. The digest is the
//! lowercase hex SHA-256 of the caller's logical key, so storage keys have a
//! fixed length no matter what the logical key contains.
//!
//! ```
//! use shieldbox_backend::StorageKey;
//!
//! let key = StorageKey::hashed("news", "https://example.com/feed.xml");
//! assert_eq!(key.namespace(), "news");
//! assert_eq!(key.digest().len(), 64);
//! ```

use std::fmt;

use sha2::{Digest, Sha256};
use smol_str::SmolStr;

/// Length of a hex encoded digest.
pub const DIGEST_LEN: usize = 64;

/// Fixed-length key of a stored record.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StorageKey {
    namespace: SmolStr,
    digest: SmolStr,
}

impl StorageKey {
    /// Hashes `logical` into a key inside `namespace`.
    ///
    /// The namespace is sanitized to `[A-Za-z0-9_-]` so it can be used as a
    /// directory name by file based stores.
    pub fn hashed(namespace: &str, logical: &str) -> Self {
        let digest = hex::encode(Sha256::digest(logical.as_bytes()));
        Self {
            namespace: sanitize_namespace(namespace),
            digest: SmolStr::new(digest),
        }
    }

    /// Rebuilds a key from a digest previously produced by [`StorageKey::hashed`].
    ///
    /// Returns `None` if `digest` is not a 64 character lowercase hex string.
    pub fn from_digest(namespace: &str, digest: &str) -> Option<Self> {
        let valid = digest.len() == DIGEST_LEN
            && digest
                .bytes()
                .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b));
        valid.then(|| Self {
            namespace: sanitize_namespace(namespace),
            digest: SmolStr::new(digest),
        })
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn digest(&self) -> &str {
        &self.digest
    }
}

impl fmt::Display for StorageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.namespace, self.digest)
    }
}

/// Replaces every character outside `[A-Za-z0-9_-]` with `_`.
///
/// An empty namespace becomes `default`.
pub fn sanitize_namespace(namespace: &str) -> SmolStr {
    if namespace.is_empty() {
        return SmolStr::new_static("default");
    }
    namespace
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect()
}
