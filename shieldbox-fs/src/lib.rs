//! Persistent file system store for shieldbox.
//!
//! [`FileStore`] keeps each cache entry or rate window in its own file under
//! a namespace directory, and serializes read-modify-write cycles per key.
#![warn(missing_docs)]

mod error;
mod store;

pub use error::FileStoreError;
pub use store::{FileStore, FileStoreBuilder};
