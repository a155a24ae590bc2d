//! Approximate recency tracking for trim and capacity eviction.
//!
//! Every entry carries a [`Stamp`] refreshed from a shared [`Clock`] on insert
//! and on each hit. Eviction selects the entries with the smallest stamps.
//! Stamps are updated with relaxed atomics under a *read* lock, so two
//! concurrent hits may race and the resulting order is only approximately
//! LRU; in exchange lookups never need exclusive access.
//!
//! ```text
//!   clock ──tick──► 41  42  43  44  45
//!                    │       │       │
//!   entries:        [B]     [A]     [C]      trim(n = 2) ─► evicts B, A
//! ```

use std::sync::atomic::{AtomicU64, Ordering};

/// Monotonic tick source shared by all entries of one cache.
#[derive(Debug, Default)]
pub struct Clock(AtomicU64);

impl Clock {
    /// Returns the next tick.
    #[inline]
    pub fn tick(&self) -> u64 {
        self.0.fetch_add(1, Ordering::Relaxed)
    }
}

/// Last-access stamp of a single entry.
#[derive(Debug, Default)]
pub struct Stamp(AtomicU64);

impl Stamp {
    pub fn new(clock: &Clock) -> Self {
        Self(AtomicU64::new(clock.tick()))
    }

    /// Marks the entry as accessed now.
    #[inline]
    pub fn touch(&self, clock: &Clock) {
        self.0.store(clock.tick(), Ordering::Relaxed);
    }

    #[inline]
    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

/// Returns the `count` candidates with the oldest stamps.
///
/// Runs in O(n) via `select_nth_unstable`; the returned victims are in no
/// particular order.
pub fn oldest<K>(mut candidates: Vec<(u64, K)>, count: usize) -> Vec<K> {
    if count == 0 {
        return Vec::new();
    }
    if count < candidates.len() {
        candidates.select_nth_unstable_by_key(count - 1, |(stamp, _)| *stamp);
        candidates.truncate(count);
    }
    candidates.into_iter().map(|(_, key)| key).collect()
}

/// Number of entries a trim of `fraction` removes from `len` entries.
///
/// `fraction` is clamped to `[0, 1]`; non-finite values trim nothing.
pub fn trim_count(len: usize, fraction: f64) -> usize {
    if !fraction.is_finite() {
        return 0;
    }
    let fraction = fraction.clamp(0.0, 1.0);
    ((len as f64) * fraction).round() as usize
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stamps_follow_clock() {
        let clock = Clock::default();
        let a = Stamp::new(&clock);
        let b = Stamp::new(&clock);
        assert!(a.get() < b.get());
        a.touch(&clock);
        assert!(a.get() > b.get());
    }

    #[test]
    fn oldest_picks_smallest_stamps() {
        let candidates = vec![(5, "e"), (1, "a"), (4, "d"), (2, "b"), (3, "c")];
        let mut victims = oldest(candidates, 2);
        victims.sort();
        assert_eq!(victims, vec!["a", "b"]);
    }

    #[test]
    fn oldest_handles_edges() {
        assert!(oldest(vec![(1, 'a')], 0).is_empty());
        assert_eq!(oldest(vec![(1, 'a'), (0, 'b')], 5).len(), 2);
        assert!(oldest::<char>(Vec::new(), 3).is_empty());
    }

    #[test]
    fn trim_count_clamps() {
        assert_eq!(trim_count(100, 0.5), 50);
        assert_eq!(trim_count(3, 0.5), 2);
        assert_eq!(trim_count(10, 2.0), 10);
        assert_eq!(trim_count(10, -1.0), 0);
        assert_eq!(trim_count(10, f64::NAN), 0);
        assert_eq!(trim_count(0, 0.5), 0);
    }
}
