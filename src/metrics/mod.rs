//! Cache-level counters.
//!
//! Each cache owns a [`Counters`] block of relaxed atomics, updated on the hot
//! path without taking any lock, and exposes it as a [`CacheMetrics`]
//! snapshot through `metrics()`.

use std::sync::atomic::{AtomicU64, Ordering};

/// Point-in-time copy of a cache's counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheMetrics {
    /// Lookups that found a value.
    pub hits: u64,
    /// Lookups that found nothing.
    pub misses: u64,
    /// Loader or batch-loader invocations.
    pub loads: u64,
    /// Loader invocations that returned an error.
    pub load_errors: u64,
    /// Callers served by a load another caller performed.
    pub shared_loads: u64,
    /// Values inserted or replaced.
    pub inserts: u64,
    /// Entries removed by trim or capacity pressure.
    pub evictions: u64,
    /// Entries removed by invalidation.
    pub invalidations: u64,
}

impl CacheMetrics {
    /// Fraction of lookups that hit, or `0.0` before any lookup.
    pub fn hit_ratio(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

#[derive(Debug, Default)]
pub(crate) struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    loads: AtomicU64,
    load_errors: AtomicU64,
    shared_loads: AtomicU64,
    inserts: AtomicU64,
    evictions: AtomicU64,
    invalidations: AtomicU64,
}

impl Counters {
    pub(crate) fn snapshot(&self) -> CacheMetrics {
        CacheMetrics {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            loads: self.loads.load(Ordering::Relaxed),
            load_errors: self.load_errors.load(Ordering::Relaxed),
            shared_loads: self.shared_loads.load(Ordering::Relaxed),
            inserts: self.inserts.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            invalidations: self.invalidations.load(Ordering::Relaxed),
        }
    }

    /// Records a lookup outcome.
    pub(crate) fn lookup(&self, hit: bool) {
        if hit {
            self.hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub(crate) fn load(&self, ok: bool) {
        self.loads.fetch_add(1, Ordering::Relaxed);
        if !ok {
            self.load_errors.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub(crate) fn shared_load(&self) {
        self.shared_loads.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn inserted(&self, n: usize) {
        self.inserts.fetch_add(n as u64, Ordering::Relaxed);
    }

    pub(crate) fn evicted(&self, n: usize) {
        self.evictions.fetch_add(n as u64, Ordering::Relaxed);
    }

    pub(crate) fn invalidated(&self, n: usize) {
        self.invalidations.fetch_add(n as u64, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_reflects_counters() {
        let counters = Counters::default();
        assert_eq!(counters.snapshot(), CacheMetrics::default());

        counters.lookup(true);
        counters.lookup(false);
        counters.lookup(false);
        counters.load(true);
        counters.load(false);
        counters.shared_load();
        counters.inserted(3);
        counters.evicted(2);
        counters.invalidated(1);

        let m = counters.snapshot();
        assert_eq!(m.hits, 1);
        assert_eq!(m.misses, 2);
        assert_eq!(m.loads, 2);
        assert_eq!(m.load_errors, 1);
        assert_eq!(m.shared_loads, 1);
        assert_eq!(m.inserts, 3);
        assert_eq!(m.evictions, 2);
        assert_eq!(m.invalidations, 1);
    }

    #[test]
    fn hit_ratio() {
        assert_eq!(CacheMetrics::default().hit_ratio(), 0.0);
        let m = CacheMetrics {
            hits: 3,
            misses: 1,
            ..CacheMetrics::default()
        };
        assert!((m.hit_ratio() - 0.75).abs() < f64::EPSILON);
    }
}
