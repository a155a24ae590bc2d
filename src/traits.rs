//! # Cache Maintenance Trait
//!
//! [`CacheControl`] is the object-safe subset of operations every cache
//! supports regardless of its value type. It lets a process hold a registry of
//! heterogeneous caches and sweep them together, e.g. on a periodic timer or
//! under memory pressure.
//!
//! ```text
//!   ┌──────────────────────────┐     ┌──────────────────────────┐
//!   │   EntityCache<Account>   │     │   SliceCache<String>     │
//!   └────────────┬─────────────┘     └────────────┬─────────────┘
//!                │       &dyn CacheControl        │
//!                └───────────────┬────────────────┘
//!                                ▼
//!                    sweep(&caches, fraction)
//! ```
//!
//! ## Example Usage
//!
//! ```
//! use entitycache::cache::SliceCache;
//! use entitycache::error::LoadError;
//! use entitycache::traits::{CacheControl, sweep};
//!
//! let lists: SliceCache<u64> = SliceCache::new(100);
//! let timelines: SliceCache<String> = SliceCache::new(100);
//! for i in 0..10 {
//!     lists.load(&i.to_string(), || Ok::<_, LoadError>(vec![i])).unwrap();
//! }
//!
//! let caches: [&dyn CacheControl; 2] = [&lists, &timelines];
//! assert_eq!(sweep(&caches, 0.5), 5);
//! assert_eq!(lists.len(), 5);
//! ```

use crate::cache::{EntityCache, SliceCache};
use crate::index::Fields;

/// Size management shared by all caches.
pub trait CacheControl {
    /// Evicts roughly `fraction` of the current entries, oldest first.
    fn trim(&self, fraction: f64);

    fn clear(&self);

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Maximum number of entries.
    fn cap(&self) -> usize;
}

impl<T: Fields + Clone> CacheControl for EntityCache<T> {
    fn trim(&self, fraction: f64) {
        EntityCache::trim(self, fraction);
    }

    fn clear(&self) {
        EntityCache::clear(self);
    }

    fn len(&self) -> usize {
        EntityCache::len(self)
    }

    fn cap(&self) -> usize {
        EntityCache::cap(self)
    }
}

impl<T: Clone> CacheControl for SliceCache<T> {
    fn trim(&self, fraction: f64) {
        SliceCache::trim(self, fraction);
    }

    fn clear(&self) {
        SliceCache::clear(self);
    }

    fn len(&self) -> usize {
        SliceCache::len(self)
    }

    fn cap(&self) -> usize {
        SliceCache::cap(self)
    }
}

/// Trims every cache in `caches` by `fraction` and returns the total number
/// of entries removed.
pub fn sweep(caches: &[&dyn CacheControl], fraction: f64) -> usize {
    caches
        .iter()
        .map(|cache| {
            let before = cache.len();
            cache.trim(fraction);
            before.saturating_sub(cache.len())
        })
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::KeyPart;

    #[derive(Clone)]
    struct Tag(u64);

    impl Fields for Tag {
        fn field(&self, name: &str) -> Option<KeyPart> {
            (name == "ID").then(|| self.0.into())
        }
    }

    #[test]
    fn sweep_trims_every_cache() {
        let tags: EntityCache<Tag> = EntityCache::builder(100).index("ID").build();
        tags.put((1..=20).map(Tag));
        let lists: SliceCache<u8> = SliceCache::new(100);
        for key in ["a", "b", "c", "d"] {
            lists.load(key, || Ok(vec![1])).unwrap();
        }

        let caches: [&dyn CacheControl; 2] = [&tags, &lists];
        let removed = sweep(&caches, 0.25);

        assert_eq!(removed, 6);
        assert_eq!(CacheControl::len(&tags), 15);
        assert_eq!(CacheControl::len(&lists), 3);
        assert_eq!(CacheControl::cap(&lists), 100);
    }

    #[test]
    fn clear_through_trait_object() {
        let lists: SliceCache<u8> = SliceCache::new(10);
        lists.load("k", || Ok(vec![1])).unwrap();
        let control: &dyn CacheControl = &lists;
        control.clear();
        assert!(control.is_empty());
    }
}
