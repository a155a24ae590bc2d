//! Multi-index entity cache with stampede protection.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────────┐
//! │                           EntityCache<T>                                 │
//! │                                                                          │
//! │   indices: [Index "ID", Index "Username", Index "AccountID" (multiple)]  │
//! │                                                                          │
//! │   store: RwLock<Store<T>>                                                │
//! │   ┌──────────────────────────────────────────────────────────────────┐   │
//! │   │ entries: Arena<Entry<T>>                                         │   │
//! │   │   #0 { value: A, keys: [(0,"1"), (1,"alice"), (2,"x")], stamp }  │   │
//! │   │   #1 { value: B, keys: [(0,"2"), (1,"bob"),   (2,"x")], stamp }  │   │
//! │   │                                                                  │   │
//! │   │ lookups[0] "ID":        "1" ─► [#0]     "2" ─► [#1]              │   │
//! │   │ lookups[1] "Username":  "alice" ─► [#0] "bob" ─► [#1]            │   │
//! │   │ lookups[2] "AccountID": "x" ─► [#0, #1]                          │   │
//! │   └──────────────────────────────────────────────────────────────────┘   │
//! │                                                                          │
//! │   coordinator: KeyedLock + in-flight loads   (one loader per key)        │
//! └──────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every entry records the keys it occupies, and all index maps are updated
//! inside one write critical section, so an entry is visible under all of
//! its keys or none of them.
//!
//! ## Core Operations
//!
//! | Operation            | Locks                         | Notes                          |
//! |----------------------|-------------------------------|--------------------------------|
//! | `get_one` / `get`    | store read                    | never loads                    |
//! | `load_one`           | key lock, then store write    | single loader run per key      |
//! | `load_ids`           | store read, then store write  | one batch call, misses only    |
//! | `put` / `store`      | store write                   | replaces per unique key        |
//! | `invalidate*`        | store write                   | removes from every index       |
//! | `trim` / `clear`     | store write                   | approximate LRU                |
//!
//! Looking up an index name that was not configured panics: the index set is
//! fixed when the cache is built, so an unknown name is a programming error.
//!
//! ## Example Usage
//!
//! ```
//! use entitycache::cache::EntityCache;
//! use entitycache::error::LoadError;
//! use entitycache::index::{Fields, KeyPart};
//!
//! #[derive(Debug, Clone, PartialEq)]
//! struct Account {
//!     id: String,
//!     username: String,
//! }
//!
//! impl Fields for Account {
//!     fn field(&self, name: &str) -> Option<KeyPart> {
//!         match name {
//!             "ID" => Some(self.id.as_str().into()),
//!             "Username" => Some(self.username.as_str().into()),
//!             _ => None,
//!         }
//!     }
//! }
//!
//! let cache: EntityCache<Account> = EntityCache::builder(1000)
//!     .index("ID")
//!     .index("Username")
//!     .build();
//!
//! let alice = cache
//!     .load_one("ID", "1", || {
//!         Ok::<_, LoadError>(Account { id: "1".into(), username: "alice".into() })
//!     })
//!     .unwrap();
//!
//! assert_eq!(cache.get_one("Username", "alice"), Some(alice));
//! cache.invalidate("ID", "1");
//! assert_eq!(cache.get_one("Username", "alice"), None);
//! ```

use std::fmt;

use parking_lot::RwLock;
use rustc_hash::{FxHashMap, FxHashSet};
use tracing::debug;

use crate::cache::flight::LoadCoordinator;
use crate::ds::recency::{self, Clock, Stamp};
use crate::ds::{Arena, EntryId};
use crate::error::LoadError;
use crate::index::{Fields, Index, Key};
use crate::metrics::{CacheMetrics, Counters};
use crate::sync::KeyedLock;

pub(crate) type InvalidateHook<T> = Box<dyn Fn(&T) + Send + Sync>;

struct Entry<T> {
    value: T,
    keys: Vec<(usize, Key)>,
    stamp: Stamp,
}

/// Entry storage plus one key → entries map per index.
struct Store<T> {
    entries: Arena<Entry<T>>,
    lookups: Vec<FxHashMap<Key, Vec<EntryId>>>,
}

impl<T: Fields> Store<T> {
    fn new(index_count: usize, initial_len: usize) -> Self {
        Self {
            entries: Arena::with_capacity(initial_len),
            lookups: (0..index_count)
                .map(|_| FxHashMap::with_capacity_and_hasher(initial_len, Default::default()))
                .collect(),
        }
    }

    fn lookup(&self, index: usize, key: &Key) -> &[EntryId] {
        self.lookups[index].get(key).map_or(&[], Vec::as_slice)
    }

    /// Inserts `value` under every index key it produces. Entries holding
    /// any of the same unique keys are displaced first.
    ///
    /// Returns `false` if the value produces no key at all.
    fn insert(&mut self, indices: &[Index], value: T, clock: &Clock) -> bool {
        let keys: Vec<(usize, Key)> = indices
            .iter()
            .enumerate()
            .filter_map(|(i, index)| index.key_of(&value).map(|key| (i, key)))
            .collect();
        if keys.is_empty() {
            return false;
        }

        for (i, key) in &keys {
            if indices[*i].is_unique() {
                let displaced = self.lookup(*i, key).to_vec();
                for id in displaced {
                    self.remove(id);
                }
            }
        }

        let id = self.entries.insert(Entry {
            value,
            keys: keys.clone(),
            stamp: Stamp::new(clock),
        });
        for (i, key) in keys {
            self.lookups[i].entry(key).or_default().push(id);
        }
        true
    }

    /// Removes an entry from the arena and from every index it occupies.
    fn remove(&mut self, id: EntryId) -> Option<Entry<T>> {
        let entry = self.entries.remove(id)?;
        for (i, key) in &entry.keys {
            if let Some(ids) = self.lookups[*i].get_mut(key) {
                ids.retain(|other| *other != id);
                if ids.is_empty() {
                    self.lookups[*i].remove(key);
                }
            }
        }
        Some(entry)
    }

    fn evict_oldest(&mut self, count: usize) -> usize {
        let candidates: Vec<(u64, EntryId)> = self
            .entries
            .iter()
            .map(|(id, entry)| (entry.stamp.get(), id))
            .collect();
        let mut evicted = 0;
        for id in recency::oldest(candidates, count) {
            if self.remove(id).is_some() {
                evicted += 1;
            }
        }
        evicted
    }

    fn clear(&mut self, initial_len: usize) {
        self.entries.clear(initial_len);
        for lookup in &mut self.lookups {
            lookup.clear();
            lookup.shrink_to(initial_len);
        }
    }
}

/// Generic value cache addressed by one or more named indices.
///
/// Build with [`EntityCache::builder`]. Values are returned as clones; wrap
/// large values in `Arc` to make that cheap.
pub struct EntityCache<T> {
    indices: Box<[Index]>,
    by_name: FxHashMap<String, usize>,
    store: RwLock<Store<T>>,
    capacity: usize,
    initial_len: usize,
    evict_fraction: f64,
    clock: Clock,
    coordinator: LoadCoordinator<T>,
    counters: Counters,
    on_invalidate: Option<InvalidateHook<T>>,
}

impl<T> EntityCache<T>
where
    T: Fields + Clone,
{
    pub(crate) fn from_parts(
        indices: Vec<Index>,
        capacity: usize,
        initial_len: usize,
        evict_fraction: f64,
        locks: KeyedLock,
        on_invalidate: Option<InvalidateHook<T>>,
    ) -> Self {
        let by_name = indices
            .iter()
            .enumerate()
            .map(|(i, index)| (index.name().to_owned(), i))
            .collect();
        Self {
            store: RwLock::new(Store::new(indices.len(), initial_len)),
            indices: indices.into_boxed_slice(),
            by_name,
            capacity,
            initial_len,
            evict_fraction,
            clock: Clock::default(),
            coordinator: LoadCoordinator::new(locks),
            counters: Counters::default(),
            on_invalidate,
        }
    }

    /// Resolves an index name.
    ///
    /// # Panics
    ///
    /// Panics if no index with that name was configured.
    fn index(&self, name: &str) -> (usize, &Index) {
        match self.by_name.get(name) {
            Some(&i) => (i, &self.indices[i]),
            None => panic!("missing index {name:?} for cache type"),
        }
    }

    /// Returns the configured indices, in configuration order.
    pub fn indices(&self) -> &[Index] {
        &self.indices
    }

    /// Looks up the first value stored under `key`, without loading.
    pub fn get_one(&self, index: &str, key: impl Into<Key>) -> Option<T> {
        let (i, index) = self.index(index);
        let key = index.key(key);
        let found = if index.admits(&key) {
            self.peek(i, &key)
        } else {
            None
        };
        self.counters.lookup(found.is_some());
        found
    }

    /// Looks up many keys at once, returning the values found in key order.
    /// For a `multiple` index every value under each key is returned.
    pub fn get<K>(&self, index: &str, keys: impl IntoIterator<Item = K>) -> Vec<T>
    where
        K: Into<Key>,
    {
        let (i, index) = self.index(index);
        let store = self.store.read();
        let mut values = Vec::new();
        for key in keys {
            let key = index.key(key);
            let ids = store.lookup(i, &key);
            self.counters.lookup(!ids.is_empty());
            values.extend(ids.iter().filter_map(|id| self.read_entry(&store, *id)));
        }
        values
    }

    /// Returns the value under `key`, running `load` on a miss.
    ///
    /// Concurrent callers missing on the same key queue on a per-key lock;
    /// `load` runs once and all of them receive its value or its error.
    /// A failed load caches nothing.
    pub fn load_one<F>(&self, index: &str, key: impl Into<Key>, load: F) -> Result<T, LoadError>
    where
        F: FnOnce() -> Result<T, LoadError>,
    {
        let (i, index) = self.index(index);
        let key = index.key(key);
        if let Some(value) = self.peek(i, &key) {
            self.counters.lookup(true);
            return Ok(value);
        }
        self.counters.lookup(false);

        let name = index.lock_name(&key);
        self.coordinator.load_once(
            &name,
            &self.counters,
            || self.peek(i, &key),
            load,
            |value| self.put([value.clone()]),
        )
    }

    /// Returns the values for `ids` under a single-field index, calling
    /// `load` once with only the ids not already cached.
    ///
    /// Cached values come first, followed by the loaded ones. A repeated id
    /// contributes its values once.
    ///
    /// # Panics
    ///
    /// Panics if the index does not have exactly one field.
    pub fn load_ids<I, F>(&self, index: &str, ids: I, load: F) -> Result<Vec<T>, LoadError>
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
        F: FnOnce(Vec<String>) -> Result<Vec<T>, LoadError>,
    {
        let (i, index) = self.index(index);
        let keys = ids
            .into_iter()
            .map(|id| {
                let id = id.as_ref();
                (index.key(id), id.to_owned())
            })
            .collect();
        self.load_keys(i, keys, load)
    }

    /// Like [`load_ids`](Self::load_ids) for a two-field index whose first
    /// field is shared: keys are `(id1, id2)` for each `id2` in `id2s`.
    /// `load` receives `id1` and the uncached `id2`s.
    ///
    /// # Panics
    ///
    /// Panics if the index does not have exactly two fields.
    pub fn load_ids_two_part<I, F>(
        &self,
        index: &str,
        id1: &str,
        id2s: I,
        load: F,
    ) -> Result<Vec<T>, LoadError>
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
        F: FnOnce(&str, Vec<String>) -> Result<Vec<T>, LoadError>,
    {
        let (i, index) = self.index(index);
        let keys = id2s
            .into_iter()
            .map(|id2| {
                let id2 = id2.as_ref();
                (index.key((id1, id2)), id2.to_owned())
            })
            .collect();
        self.load_keys(i, keys, |missing| load(id1, missing))
    }

    fn load_keys<F>(&self, i: usize, keys: Vec<(Key, String)>, load: F) -> Result<Vec<T>, LoadError>
    where
        F: FnOnce(Vec<String>) -> Result<Vec<T>, LoadError>,
    {
        let mut values = Vec::with_capacity(keys.len());
        let mut missing = Vec::new();
        {
            let store = self.store.read();
            let mut seen = FxHashSet::default();
            for (key, id) in keys {
                let ids = store.lookup(i, &key);
                if !seen.insert(key) {
                    continue;
                }
                self.counters.lookup(!ids.is_empty());
                if ids.is_empty() {
                    missing.push(id);
                    continue;
                }
                values.extend(ids.iter().filter_map(|id| self.read_entry(&store, *id)));
            }
        }

        if missing.is_empty() {
            return Ok(values);
        }

        let requested = missing.len();
        let outcome = load(missing);
        self.counters.load(outcome.is_ok());
        let loaded = outcome.inspect_err(|err| {
            debug!(
                index = self.indices[i].name(),
                requested,
                error = %err,
                "batch loader failed"
            );
        })?;

        self.put(loaded.iter().cloned());
        values.extend(loaded);
        Ok(values)
    }

    /// Inserts or replaces values under every configured index.
    ///
    /// All values are inserted in one critical section. A value displaces any
    /// entry occupying one of its keys in a unique index. Values whose keys
    /// are all zero (and not allowed) are not cached.
    pub fn put(&self, values: impl IntoIterator<Item = T>) {
        let mut store = self.store.write();
        let mut inserted = 0;
        for value in values {
            if store.insert(&self.indices, value, &self.clock) {
                inserted += 1;
            }
        }
        self.counters.inserted(inserted);

        if store.entries.len() > self.capacity {
            let slack = (self.capacity as f64 * self.evict_fraction) as usize;
            // The newest entry always survives.
            let target = self.capacity.saturating_sub(slack).max(1);
            let excess = store.entries.len() - target;
            let evicted = store.evict_oldest(excess);
            self.counters.evicted(evicted);
            debug!(
                evicted,
                capacity = self.capacity,
                "entity cache over capacity"
            );
        }
    }

    /// Runs `store` (e.g. a database write) and caches `value` only if it
    /// succeeds. On failure the cache is untouched and the error returned.
    pub fn store<E, F>(&self, value: T, store: F) -> Result<(), E>
    where
        F: FnOnce() -> Result<(), E>,
    {
        store()?;
        self.put([value]);
        Ok(())
    }

    /// Removes every value under `key` from all indices.
    pub fn invalidate(&self, index: &str, key: impl Into<Key>) {
        let (i, index) = self.index(index);
        let key = index.key(key);
        self.invalidate_keys(i, std::iter::once(key));
    }

    /// Removes the values for `ids` under a single-field index.
    pub fn invalidate_ids<I>(&self, index: &str, ids: I)
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        let (i, index) = self.index(index);
        let keys: Vec<Key> = ids.into_iter().map(|id| index.key(id.as_ref())).collect();
        self.invalidate_keys(i, keys);
    }

    fn invalidate_keys(&self, i: usize, keys: impl IntoIterator<Item = Key>) {
        let removed: Vec<T> = {
            let mut store = self.store.write();
            let mut removed = Vec::new();
            for key in keys {
                let ids = store.lookup(i, &key).to_vec();
                for id in ids {
                    if let Some(entry) = store.remove(id) {
                        removed.push(entry.value);
                    }
                }
            }
            removed
        };
        self.counters.invalidated(removed.len());

        // Outside the lock, so the hook may call back into the cache.
        if let Some(hook) = &self.on_invalidate {
            for value in &removed {
                hook(value);
            }
        }
    }

    /// Evicts roughly `fraction` of the current entries, least recently
    /// used first. `fraction` is clamped to `[0, 1]`.
    pub fn trim(&self, fraction: f64) {
        let mut store = self.store.write();
        let count = recency::trim_count(store.entries.len(), fraction);
        if count == 0 {
            return;
        }
        let evicted = store.evict_oldest(count);
        self.counters.evicted(evicted);
        debug!(evicted, remaining = store.entries.len(), "trimmed entity cache");
    }

    /// Removes every entry.
    pub fn clear(&self) {
        self.store.write().clear(self.initial_len);
    }

    /// Number of cached values.
    pub fn len(&self) -> usize {
        self.store.read().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Maximum number of cached values.
    pub fn cap(&self) -> usize {
        self.capacity
    }

    /// Snapshot of hit/miss/load counters.
    pub fn metrics(&self) -> CacheMetrics {
        self.counters.snapshot()
    }

    /// Number of loads currently running.
    pub fn loads_in_flight(&self) -> usize {
        self.coordinator.in_flight()
    }

    fn peek(&self, i: usize, key: &Key) -> Option<T> {
        let store = self.store.read();
        let id = *store.lookup(i, key).first()?;
        self.read_entry(&store, id)
    }

    fn read_entry(&self, store: &Store<T>, id: EntryId) -> Option<T> {
        let entry = store.entries.get(id)?;
        entry.stamp.touch(&self.clock);
        Some(entry.value.clone())
    }

    /// Verifies that every entry is visible under exactly the keys it
    /// produces and that no index refers to a dead entry.
    #[cfg(any(test, debug_assertions))]
    pub fn check_invariants(&self) -> Result<(), crate::error::InvariantError> {
        use crate::error::InvariantError;

        let store = self.store.read();

        for (id, entry) in store.entries.iter() {
            let expected: Vec<(usize, Key)> = self
                .indices
                .iter()
                .enumerate()
                .filter_map(|(i, index)| index.key_of(&entry.value).map(|key| (i, key)))
                .collect();
            if expected != entry.keys {
                return Err(InvariantError::KeyMismatch {
                    entry: id.index(),
                    recorded: entry.keys.clone(),
                    produced: expected,
                });
            }
            for (i, key) in &entry.keys {
                if !store.lookup(*i, key).contains(&id) {
                    return Err(InvariantError::Unindexed {
                        entry: id.index(),
                        index: self.indices[*i].name().to_owned(),
                        key: key.clone(),
                    });
                }
            }
        }

        for (i, lookup) in store.lookups.iter().enumerate() {
            let index = &self.indices[i];
            for (key, ids) in lookup {
                if ids.is_empty() {
                    return Err(InvariantError::EmptyKey {
                        index: index.name().to_owned(),
                        key: key.clone(),
                    });
                }
                if index.is_unique() && ids.len() > 1 {
                    return Err(InvariantError::UniqueCollision {
                        index: index.name().to_owned(),
                        key: key.clone(),
                        count: ids.len(),
                    });
                }
                for id in ids {
                    let live = store
                        .entries
                        .get(*id)
                        .is_some_and(|entry| entry.keys.iter().any(|(j, k)| *j == i && k == key));
                    if !live {
                        return Err(InvariantError::StaleEntry {
                            index: index.name().to_owned(),
                            key: key.clone(),
                            entry: id.index(),
                        });
                    }
                }
            }
        }

        if store.entries.len() > self.capacity {
            return Err(InvariantError::OverCapacity {
                len: store.entries.len(),
                capacity: self.capacity,
            });
        }
        Ok(())
    }
}

impl<T> fmt::Debug for EntityCache<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.indices.iter().map(Index::name).collect();
        f.debug_struct("EntityCache")
            .field("indices", &names)
            .field("len", &self.store.read().entries.len())
            .field("capacity", &self.capacity)
            .finish_non_exhaustive()
    }
}
