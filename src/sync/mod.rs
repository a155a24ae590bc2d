//! Synchronization primitives shared by the caches.

pub mod keyed_lock;

pub use keyed_lock::{KeyGuard, KeyedLock, KeyedLockConfig, LockMode};
