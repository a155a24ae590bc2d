//! Per-key read/write locking over an open-ended set of string keys.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────┐
//! │                             KeyedLock                                │
//! │                                                                      │
//! │   table: Mutex<Table>          (coordinating lock, O(1) hold time)   │
//! │   ┌──────────────────────────────────────────────────────────────┐   │
//! │   │  map:  FxHashMap<String, LockEntry>                          │   │
//! │   │        "user:1" ─► { Write, holders: 1, waiters: 2, cond }   │   │
//! │   │        "user:7" ─► { Read,  holders: 3, waiters: 0, cond }   │   │
//! │   │                                                              │   │
//! │   │  pool: Vec<LockEntry>   (released entries, bounded)          │   │
//! │   └──────────────────────────────────────────────────────────────┘   │
//! └──────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Algorithm
//!
//! ```text
//! ACQUIRE(key, mode):
//!   lock table
//!   loop:
//!     entry = map[key] or pool.pop() or new
//!     if entry admits mode: holders += 1, unlock table, return guard
//!     waiters += 1
//!     entry.cond.wait(table)          // releases table while asleep
//!     waiters -= 1                    // retry from scratch
//!
//! RELEASE(key):
//!   lock table
//!   holders -= 1; if holders > 0: return
//!   mode = unlocked; entry.cond.notify_all()
//!   if waiters == 0: map.remove(key) -> pool; maybe shrink map
//! ```
//!
//! An entry with registered waiters is never evicted, so a woken waiter
//! always finds the entry it slept on. Waking is a broadcast: every pending
//! reader proceeds together once a writer leaves.
//!
//! ## Guarantees
//!
//! - Locks on distinct keys never block each other; the table mutex is only
//!   held for bookkeeping, never across a wait.
//! - Resident state is bounded by the number of keys currently held or
//!   awaited plus `pool_limit`; the map is shrunk once occupancy falls under
//!   `low_water` of its capacity.
//! - No fairness between readers and writers. Locking a key twice from the
//!   same thread deadlocks.
//!
//! ## Example Usage
//!
//! ```
//! use entitycache::sync::KeyedLock;
//!
//! let locks = KeyedLock::new();
//!
//! let a = locks.rlock("account:1");
//! let b = locks.rlock("account:1");
//! assert!(locks.try_lock("account:1").is_none());
//! assert!(locks.try_lock("account:2").is_some());
//!
//! drop(a);
//! b.unlock();
//! assert!(locks.try_lock("account:1").is_some());
//! assert_eq!(locks.len(), 0);
//! ```

use std::fmt;
use std::sync::Arc;

use parking_lot::{Condvar, Mutex};
use rustc_hash::FxHashMap;
use tracing::trace;

use crate::error::ConfigError;

/// Mode a key is held in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockMode {
    /// Shared; any number of readers at once.
    Read,
    /// Exclusive; a single writer.
    Write,
}

/// Tuning parameters for [`KeyedLock`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KeyedLockConfig {
    /// Maximum number of released entries kept for reuse.
    pub pool_limit: usize,
    /// Shrink the map once `len < capacity * low_water`. Must be in `(0, 1)`.
    pub low_water: f64,
    /// The map is never shrunk below this capacity.
    pub min_capacity: usize,
}

impl KeyedLockConfig {
    pub const DEFAULT_POOL_LIMIT: usize = 256;
    pub const DEFAULT_LOW_WATER: f64 = 0.25;
    pub const DEFAULT_MIN_CAPACITY: usize = 64;

    /// Checks parameter ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.low_water > 0.0 && self.low_water < 1.0) {
            return Err(ConfigError::OutOfRange {
                name: "low_water",
                range: "(0, 1)",
                value: self.low_water,
            });
        }
        Ok(())
    }
}

impl Default for KeyedLockConfig {
    fn default() -> Self {
        Self {
            pool_limit: Self::DEFAULT_POOL_LIMIT,
            low_water: Self::DEFAULT_LOW_WATER,
            min_capacity: Self::DEFAULT_MIN_CAPACITY,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum State {
    #[default]
    Unlocked,
    Read,
    Write,
}

/// Per-key lock state. Only touched while the table mutex is held.
#[derive(Debug, Default)]
struct LockEntry {
    state: State,
    holders: u32,
    waiters: u32,
    cond: Arc<Condvar>,
}

impl LockEntry {
    fn try_acquire(&mut self, mode: LockMode) -> bool {
        match (self.state, mode) {
            (State::Unlocked, LockMode::Read) => self.state = State::Read,
            (State::Unlocked, LockMode::Write) => self.state = State::Write,
            (State::Read, LockMode::Read) => {},
            _ => return false,
        }
        self.holders += 1;
        true
    }

    /// Drops one holder; returns `true` once no holders remain.
    fn release(&mut self) -> bool {
        debug_assert!(self.holders > 0, "released a key that is not held");
        debug_assert!(
            self.state != State::Write || self.holders == 1,
            "multiple writers on one key"
        );
        self.holders = self.holders.saturating_sub(1);
        if self.holders > 0 {
            return false;
        }
        self.state = State::Unlocked;
        true
    }
}

#[derive(Debug, Default)]
struct Table {
    map: FxHashMap<String, LockEntry>,
    pool: Vec<LockEntry>,
}

/// Map of read/write locks keyed by string, with self-eviction and pooling.
///
/// See the [module docs](self) for the algorithm.
pub struct KeyedLock {
    table: Mutex<Table>,
    config: KeyedLockConfig,
}

impl KeyedLock {
    /// Creates a lock map with the default [`KeyedLockConfig`].
    pub fn new() -> Self {
        Self::build(KeyedLockConfig::default())
    }

    /// Creates a lock map with custom tuning.
    pub fn with_config(config: KeyedLockConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self::build(config))
    }

    pub(crate) fn build(config: KeyedLockConfig) -> Self {
        Self {
            table: Mutex::new(Table::default()),
            config,
        }
    }

    /// Acquires `key` exclusively, blocking while anyone else holds it.
    pub fn lock(&self, key: &str) -> KeyGuard<'_> {
        self.acquire(key, LockMode::Write)
    }

    /// Acquires `key` shared, blocking while a writer holds it.
    pub fn rlock(&self, key: &str) -> KeyGuard<'_> {
        self.acquire(key, LockMode::Read)
    }

    /// Acquires `key` exclusively if that is possible without waiting.
    pub fn try_lock(&self, key: &str) -> Option<KeyGuard<'_>> {
        self.try_acquire(key, LockMode::Write)
    }

    /// Acquires `key` shared if that is possible without waiting.
    pub fn try_rlock(&self, key: &str) -> Option<KeyGuard<'_>> {
        self.try_acquire(key, LockMode::Read)
    }

    /// Number of keys currently held or awaited.
    pub fn len(&self) -> usize {
        self.table.lock().map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of released entries waiting for reuse.
    pub fn pooled(&self) -> usize {
        self.table.lock().pool.len()
    }

    /// Allocated capacity of the key map.
    pub fn map_capacity(&self) -> usize {
        self.table.lock().map.capacity()
    }

    /// Returns the mode `key` is currently held in, if any.
    pub fn mode(&self, key: &str) -> Option<LockMode> {
        match self.table.lock().map.get(key)?.state {
            State::Unlocked => None,
            State::Read => Some(LockMode::Read),
            State::Write => Some(LockMode::Write),
        }
    }

    pub fn config(&self) -> &KeyedLockConfig {
        &self.config
    }

    fn acquire(&self, key: &str, mode: LockMode) -> KeyGuard<'_> {
        let mut table = self.table.lock();
        loop {
            let entry = Self::entry(&mut table, key);
            if entry.try_acquire(mode) {
                return self.guard(key, mode);
            }

            entry.waiters += 1;
            let cond = Arc::clone(&entry.cond);
            cond.wait(&mut table);

            // Entries with waiters are never evicted, so ours is still here.
            match table.map.get_mut(key) {
                Some(entry) => entry.waiters -= 1,
                None => debug_assert!(false, "lock entry evicted while awaited"),
            }
        }
    }

    fn try_acquire(&self, key: &str, mode: LockMode) -> Option<KeyGuard<'_>> {
        let mut table = self.table.lock();
        // A conflict implies a current holder, so the entry is never left idle.
        Self::entry(&mut table, key)
            .try_acquire(mode)
            .then(|| self.guard(key, mode))
    }

    fn guard(&self, key: &str, mode: LockMode) -> KeyGuard<'_> {
        KeyGuard {
            lock: self,
            key: key.to_owned(),
            mode,
        }
    }

    fn entry<'t>(table: &'t mut Table, key: &str) -> &'t mut LockEntry {
        let Table { map, pool } = table;
        map.entry(key.to_owned())
            .or_insert_with(|| pool.pop().unwrap_or_default())
    }

    fn release(&self, key: &str) {
        let mut table = self.table.lock();
        let Some(entry) = table.map.get_mut(key) else {
            debug_assert!(false, "released key {key:?} has no lock entry");
            return;
        };
        if !entry.release() {
            return;
        }
        entry.cond.notify_all();
        self.evict_if_idle(&mut table, key);
    }

    /// Returns an unheld, unawaited entry to the pool.
    fn evict_if_idle(&self, table: &mut Table, key: &str) {
        let idle = table
            .map
            .get(key)
            .is_some_and(|e| e.state == State::Unlocked && e.waiters == 0);
        if !idle {
            return;
        }
        if let Some(entry) = table.map.remove(key) {
            if table.pool.len() < self.config.pool_limit {
                table.pool.push(entry);
            }
        }
        self.maybe_shrink(table);
    }

    fn maybe_shrink(&self, table: &mut Table) {
        let capacity = table.map.capacity();
        if capacity <= self.config.min_capacity {
            return;
        }
        let len = table.map.len();
        if (len as f64) < (capacity as f64) * self.config.low_water {
            table.map.shrink_to(len.max(self.config.min_capacity));
            trace!(
                live = len,
                from = capacity,
                to = table.map.capacity(),
                "rebuilt keyed lock map"
            );
        }
    }
}

impl Default for KeyedLock {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for KeyedLock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let table = self.table.lock();
        f.debug_struct("KeyedLock")
            .field("live", &table.map.len())
            .field("pooled", &table.pool.len())
            .field("capacity", &table.map.capacity())
            .finish_non_exhaustive()
    }
}

/// Holds one key of a [`KeyedLock`]; releases it on drop.
#[must_use = "the key is released as soon as the guard is dropped"]
pub struct KeyGuard<'a> {
    lock: &'a KeyedLock,
    key: String,
    mode: LockMode,
}

impl KeyGuard<'_> {
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn mode(&self) -> LockMode {
        self.mode
    }

    /// Releases the key. Equivalent to dropping the guard.
    pub fn unlock(self) {}
}

impl Drop for KeyGuard<'_> {
    fn drop(&mut self) {
        self.lock.release(&self.key);
    }
}

impl fmt::Debug for KeyGuard<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyGuard")
            .field("key", &self.key)
            .field("mode", &self.mode)
            .finish()
    }
}
