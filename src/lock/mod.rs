//! Distributed lock manager: leased mutual exclusion shared across workers.
//!
//! [`LockManager::get_lock`] hands out per-key [`DistributedLock`]s with
//! stable identity, backed by a bounded access-ordered [`LruCache`]. Lease
//! rows live in a shared [`LeaseStore`] with its own clock, so correctness
//! never depends on wall-clock agreement between workers. While held, a
//! lock renews its lease in the background; a failed renewal flips the lock
//! invalid and notifies subscribers — the engine's only cancellation
//! mechanism.
//!
//! ```rust
//! use std::sync::Arc;
//! use flowmesh::config::LockConfig;
//! use flowmesh::events::EventEmitter;
//! use flowmesh::lock::{InMemoryLeaseStore, LockManager};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let store = Arc::new(InMemoryLeaseStore::new());
//! let manager = LockManager::new(store, LockConfig::default(), "worker-a", EventEmitter::disconnected());
//!
//! let lock = manager.get_lock("ctx-1");
//! assert!(lock.try_acquire().await);
//! assert!(lock.is_held());
//! lock.release().await;
//! # }
//! ```

mod lease;
mod lock;
mod lru;
mod manager;

pub use lease::{InMemoryLeaseStore, LeaseError, LeaseStatus, LeaseStore};
pub use lock::DistributedLock;
pub use lru::LruCache;
pub use manager::LockManager;
