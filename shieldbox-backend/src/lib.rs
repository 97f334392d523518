//! Storage trait and shared primitives for shieldbox.
//!
//! If you want to implement your own store, you are in the right place.
//! The cache and the rate limiter only talk to storage through [`Store`],
//! and only reason about time through [`Clock`].
mod clock;
mod error;
pub mod key;
mod lock;
mod memory;
mod store;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::BackendError;
pub use key::StorageKey;
pub use lock::{KeyLockGuard, KeyLocks};
pub use memory::MemoryStore;
pub use store::{BackendResult, Store, UpdateFn};

/// Status of deleting result.
#[derive(Debug, PartialEq, Eq)]
pub enum DeleteStatus {
    /// Record successfully deleted.
    Deleted(u32),
    /// Record already missing.
    Missing,
}
