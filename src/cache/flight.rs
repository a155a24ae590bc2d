//! Load-once coordination shared by the caches.
//!
//! A *flight* is one in-progress load for one key. Callers that miss on the
//! same key join the same flight before queueing on the key's exclusive lock;
//! the first to get the lock runs the loader and records the outcome on the
//! flight, and every caller queued behind it returns that outcome instead of
//! loading again. The flight is landed (removed from the table) *before* the
//! key is unlocked, so a caller arriving after a failed load starts afresh.
//!
//! ```text
//!  caller A ─┐                       ┌─ lock ─ loader() ─ set outcome ─ land ─ unlock
//!  caller B ─┼─ join flight("K") ────┤
//!  caller C ─┘                       └─ lock (after A) ─ outcome set? ─► return shared
//! ```

use std::sync::{Arc, OnceLock};

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use tracing::{debug, trace};

use crate::error::LoadError;
use crate::metrics::Counters;
use crate::sync::KeyedLock;

struct Flight<T> {
    outcome: OnceLock<Result<T, LoadError>>,
}

impl<T> Default for Flight<T> {
    fn default() -> Self {
        Self {
            outcome: OnceLock::new(),
        }
    }
}

/// Removes a flight from the table when dropped, including on unwind.
struct Landing<'a, T> {
    flights: &'a Mutex<FxHashMap<String, Arc<Flight<T>>>>,
    name: &'a str,
    flight: &'a Arc<Flight<T>>,
}

impl<T> Drop for Landing<'_, T> {
    fn drop(&mut self) {
        let mut flights = self.flights.lock();
        if flights
            .get(self.name)
            .is_some_and(|current| Arc::ptr_eq(current, self.flight))
        {
            flights.remove(self.name);
        }
    }
}

/// Per-key locks plus the table of in-progress loads.
pub(crate) struct LoadCoordinator<T> {
    locks: KeyedLock,
    flights: Mutex<FxHashMap<String, Arc<Flight<T>>>>,
}

impl<T: Clone> LoadCoordinator<T> {
    pub(crate) fn new(locks: KeyedLock) -> Self {
        Self {
            locks,
            flights: Mutex::new(FxHashMap::default()),
        }
    }

    #[cfg(test)]
    pub(crate) fn locks(&self) -> &KeyedLock {
        &self.locks
    }

    /// Number of loads currently in progress.
    pub(crate) fn in_flight(&self) -> usize {
        self.flights.lock().len()
    }

    /// Loads the value for lock name `name` at most once across concurrent
    /// callers.
    ///
    /// `cached` re-checks the cache once the key lock is held; `store` is
    /// called with a successfully loaded value while the lock is still held.
    pub(crate) fn load_once<C, L, S>(
        &self,
        name: &str,
        counters: &Counters,
        cached: C,
        load: L,
        store: S,
    ) -> Result<T, LoadError>
    where
        C: FnOnce() -> Option<T>,
        L: FnOnce() -> Result<T, LoadError>,
        S: FnOnce(&T),
    {
        let flight = self.join(name);
        let _guard = self.locks.lock(name);
        // Declared after the guard so the flight lands before the unlock.
        let _landing = Landing {
            flights: &self.flights,
            name,
            flight: &flight,
        };

        if let Some(outcome) = flight.outcome.get() {
            counters.shared_load();
            return outcome.clone();
        }

        if let Some(value) = cached() {
            let _ = flight.outcome.set(Ok(value.clone()));
            return Ok(value);
        }

        trace!(key = name, "running loader");
        let outcome = load();
        counters.load(outcome.is_ok());
        match &outcome {
            Ok(value) => store(value),
            Err(err) => debug!(key = name, error = %err, "loader failed"),
        }
        let _ = flight.outcome.set(outcome.clone());
        outcome
    }

    fn join(&self, name: &str) -> Arc<Flight<T>> {
        let mut flights = self.flights.lock();
        if let Some(flight) = flights.get(name) {
            return Arc::clone(flight);
        }
        let flight = Arc::new(Flight::default());
        flights.insert(name.to_owned(), Arc::clone(&flight));
        flight
    }
}
