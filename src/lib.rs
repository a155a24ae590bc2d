//! entitycache: concurrent multi-index caches with per-key load coordination.
//!
//! - [`sync::KeyedLock`]: read/write locks addressed by string key, created on
//!   demand and reclaimed when idle.
//! - [`cache::EntityCache`]: values reachable through several named indices,
//!   loaded at most once per key under concurrency.
//! - [`cache::SliceCache`]: whole result lists cached by key.

pub mod builder;
pub mod cache;
pub mod ds;
pub mod error;
pub mod index;
pub mod metrics;
pub mod prelude;
pub mod sync;
pub mod traits;
