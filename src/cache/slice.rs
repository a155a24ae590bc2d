//! Keyed cache of whole result lists.
//!
//! A [`SliceCache`] maps a string key to a complete `Vec<T>` such as the
//! ordered IDs of a timeline or the members of a list. Values are handed out
//! as copies, so a caller mutating its result never affects the cache.
//!
//! Loads follow the same load-once protocol as
//! [`EntityCache`](super::EntityCache): concurrent misses on one key queue on
//! a per-key lock and share one loader outcome.
//!
//! ## Example Usage
//!
//! ```
//! use entitycache::cache::SliceCache;
//! use entitycache::error::LoadError;
//!
//! let cache: SliceCache<String> = SliceCache::new(500);
//!
//! let ids = cache
//!     .load("list-1", || Ok::<_, LoadError>(vec!["a".to_string(), "b".to_string()]))
//!     .unwrap();
//! assert_eq!(ids.len(), 2);
//! assert_eq!(cache.get("list-1"), Some(ids));
//!
//! cache.invalidate(["list-1"]);
//! assert!(cache.get("list-1").is_none());
//! ```

use std::fmt;

use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use tracing::debug;

use crate::builder::SliceCacheBuilder;
use crate::cache::flight::LoadCoordinator;
use crate::ds::recency::{self, Clock, Stamp};
use crate::error::LoadError;
use crate::metrics::{CacheMetrics, Counters};
use crate::sync::KeyedLock;

struct SliceEntry<T> {
    items: Vec<T>,
    stamp: Stamp,
}

/// Bounded map from key to a cloned-out `Vec<T>`.
pub struct SliceCache<T> {
    map: RwLock<FxHashMap<String, SliceEntry<T>>>,
    capacity: usize,
    initial_len: usize,
    evict_fraction: f64,
    clock: Clock,
    coordinator: LoadCoordinator<Vec<T>>,
    counters: Counters,
}

impl<T: Clone> SliceCache<T> {
    /// Creates a cache with default settings.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    pub fn new(capacity: usize) -> Self {
        SliceCacheBuilder::new(capacity).build()
    }

    pub fn builder(capacity: usize) -> SliceCacheBuilder<T> {
        SliceCacheBuilder::new(capacity)
    }

    pub(crate) fn from_parts(
        capacity: usize,
        initial_len: usize,
        evict_fraction: f64,
        locks: KeyedLock,
    ) -> Self {
        Self {
            map: RwLock::new(FxHashMap::with_capacity_and_hasher(
                initial_len,
                Default::default(),
            )),
            capacity,
            initial_len,
            evict_fraction,
            clock: Clock::default(),
            coordinator: LoadCoordinator::new(locks),
            counters: Counters::default(),
        }
    }

    /// Returns a copy of the list under `key`, if cached.
    pub fn get(&self, key: &str) -> Option<Vec<T>> {
        let found = self.peek(key);
        self.counters.lookup(found.is_some());
        found
    }

    /// Returns a copy of the list under `key`, running `load` on a miss.
    ///
    /// Concurrent callers missing on the same key share one `load` run and
    /// its outcome. Errors are returned to every waiting caller and nothing
    /// is cached.
    pub fn load<F>(&self, key: &str, load: F) -> Result<Vec<T>, LoadError>
    where
        F: FnOnce() -> Result<Vec<T>, LoadError>,
    {
        if let Some(items) = self.peek(key) {
            self.counters.lookup(true);
            return Ok(items);
        }
        self.counters.lookup(false);

        self.coordinator.load_once(
            key,
            &self.counters,
            || self.peek(key),
            load,
            |items| self.insert(key, items.clone()),
        )
    }

    fn insert(&self, key: &str, items: Vec<T>) {
        let mut map = self.map.write();
        map.insert(
            key.to_owned(),
            SliceEntry {
                items,
                stamp: Stamp::new(&self.clock),
            },
        );
        self.counters.inserted(1);

        if map.len() > self.capacity {
            let slack = (self.capacity as f64 * self.evict_fraction) as usize;
            // The newest entry always survives.
            let target = self.capacity.saturating_sub(slack).max(1);
            let excess = map.len() - target;
            let evicted = evict_oldest(&mut map, excess);
            self.counters.evicted(evicted);
            debug!(
                evicted,
                capacity = self.capacity,
                "slice cache over capacity"
            );
        }
    }

    /// Removes the lists under every key in `keys`.
    pub fn invalidate<I>(&self, keys: I)
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        let mut map = self.map.write();
        let removed = keys
            .into_iter()
            .filter(|key| map.remove(key.as_ref()).is_some())
            .count();
        self.counters.invalidated(removed);
    }

    /// Evicts roughly `fraction` of the current entries, least recently
    /// used first. `fraction` is clamped to `[0, 1]`.
    pub fn trim(&self, fraction: f64) {
        let mut map = self.map.write();
        let count = recency::trim_count(map.len(), fraction);
        if count == 0 {
            return;
        }
        let evicted = evict_oldest(&mut map, count);
        self.counters.evicted(evicted);
        debug!(evicted, remaining = map.len(), "trimmed slice cache");
    }

    pub fn clear(&self) {
        let mut map = self.map.write();
        map.clear();
        map.shrink_to(self.initial_len);
    }

    pub fn len(&self) -> usize {
        self.map.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn cap(&self) -> usize {
        self.capacity
    }

    pub fn metrics(&self) -> CacheMetrics {
        self.counters.snapshot()
    }

    fn peek(&self, key: &str) -> Option<Vec<T>> {
        let map = self.map.read();
        let entry = map.get(key)?;
        entry.stamp.touch(&self.clock);
        Some(entry.items.clone())
    }
}

fn evict_oldest<T>(map: &mut FxHashMap<String, SliceEntry<T>>, count: usize) -> usize {
    let candidates: Vec<(u64, String)> = map
        .iter()
        .map(|(key, entry)| (entry.stamp.get(), key.clone()))
        .collect();
    recency::oldest(candidates, count)
        .into_iter()
        .filter(|key| map.remove(key).is_some())
        .count()
}

impl<T> fmt::Debug for SliceCache<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SliceCache")
            .field("len", &self.map.read().len())
            .field("capacity", &self.capacity)
            .finish_non_exhaustive()
    }
}
