//! Validated construction of the caches.
//!
//! Both caches are configured through a builder that checks every setting
//! before anything is allocated. `try_build` reports a bad configuration as a
//! [`ConfigError`]; `build` panics on one, which suits caches created once at
//! startup from constants.
//!
//! ## Example
//!
//! ```rust
//! use entitycache::builder::EntityCacheBuilder;
//! use entitycache::index::{Fields, IndexConfig, KeyPart};
//!
//! #[derive(Clone)]
//! struct Follow {
//!     id: String,
//!     account_id: String,
//!     target_account_id: String,
//! }
//!
//! impl Fields for Follow {
//!     fn field(&self, name: &str) -> Option<KeyPart> {
//!         match name {
//!             "ID" => Some(self.id.as_str().into()),
//!             "AccountID" => Some(self.account_id.as_str().into()),
//!             "TargetAccountID" => Some(self.target_account_id.as_str().into()),
//!             _ => None,
//!         }
//!     }
//! }
//!
//! let cache = EntityCacheBuilder::<Follow>::new(2000)
//!     .index("ID")
//!     .index("AccountID,TargetAccountID")
//!     .index(IndexConfig::new("AccountID").multiple())
//!     .initial_len(64)
//!     .try_build()
//!     .unwrap();
//! assert_eq!(cache.indices().len(), 3);
//!
//! // An empty index set is rejected.
//! assert!(EntityCacheBuilder::<Follow>::new(10).try_build().is_err());
//! ```

use std::marker::PhantomData;

use rustc_hash::FxHashSet;

use crate::cache::entity::InvalidateHook;
use crate::cache::{EntityCache, SliceCache};
use crate::error::ConfigError;
use crate::index::{Fields, Index, IndexConfig};
use crate::sync::{KeyedLock, KeyedLockConfig};

/// Default fraction of capacity freed when an insert overflows the cache.
pub const DEFAULT_EVICT_FRACTION: f64 = 0.1;

fn validate_sizing(capacity: usize, evict_fraction: f64) -> Result<(), ConfigError> {
    if capacity == 0 {
        return Err(ConfigError::ZeroCapacity);
    }
    if !(0.0..1.0).contains(&evict_fraction) {
        return Err(ConfigError::OutOfRange {
            name: "evict_fraction",
            range: "[0, 1)",
            value: evict_fraction,
        });
    }
    Ok(())
}

/// Builder for [`EntityCache`].
pub struct EntityCacheBuilder<T> {
    capacity: usize,
    indices: Vec<IndexConfig>,
    initial_len: usize,
    evict_fraction: f64,
    lock_config: KeyedLockConfig,
    on_invalidate: Option<InvalidateHook<T>>,
}

impl<T> EntityCacheBuilder<T>
where
    T: Fields + Clone,
{
    /// Starts a builder for a cache holding at most `capacity` values.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            indices: Vec::new(),
            initial_len: 0,
            evict_fraction: DEFAULT_EVICT_FRACTION,
            lock_config: KeyedLockConfig::default(),
            on_invalidate: None,
        }
    }

    /// Adds an index. A plain string is a unique index over those fields.
    pub fn index(mut self, config: impl Into<IndexConfig>) -> Self {
        self.indices.push(config.into());
        self
    }

    /// Pre-allocated room, also the size storage shrinks back to on `clear`.
    pub fn initial_len(mut self, initial_len: usize) -> Self {
        self.initial_len = initial_len;
        self
    }

    /// Extra fraction of capacity freed when an insert overflows. Must be in
    /// `[0, 1)`.
    pub fn evict_fraction(mut self, fraction: f64) -> Self {
        self.evict_fraction = fraction;
        self
    }

    pub fn keyed_lock(mut self, config: KeyedLockConfig) -> Self {
        self.lock_config = config;
        self
    }

    /// Called with each value removed by `invalidate` or `invalidate_ids`,
    /// after the cache lock is released.
    pub fn on_invalidate<F>(mut self, hook: F) -> Self
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        self.on_invalidate = Some(Box::new(hook));
        self
    }

    pub fn try_build(self) -> Result<EntityCache<T>, ConfigError> {
        validate_sizing(self.capacity, self.evict_fraction)?;
        if self.indices.is_empty() {
            return Err(ConfigError::NoIndices);
        }

        let mut names = FxHashSet::default();
        let mut indices = Vec::with_capacity(self.indices.len());
        for config in &self.indices {
            let index = Index::new(config)?;
            if !names.insert(index.name().to_owned()) {
                return Err(ConfigError::DuplicateIndex(index.name().to_owned()));
            }
            indices.push(index);
        }

        let locks = KeyedLock::with_config(self.lock_config)?;
        Ok(EntityCache::from_parts(
            indices,
            self.capacity,
            self.initial_len.min(self.capacity),
            self.evict_fraction,
            locks,
            self.on_invalidate,
        ))
    }

    /// Like [`try_build`](Self::try_build).
    ///
    /// # Panics
    ///
    /// Panics if the configuration is invalid.
    pub fn build(self) -> EntityCache<T> {
        match self.try_build() {
            Ok(cache) => cache,
            Err(err) => panic!("invalid entity cache configuration: {err}"),
        }
    }
}

impl<T> EntityCache<T>
where
    T: Fields + Clone,
{
    pub fn builder(capacity: usize) -> EntityCacheBuilder<T> {
        EntityCacheBuilder::new(capacity)
    }
}

/// Builder for [`SliceCache`].
pub struct SliceCacheBuilder<T> {
    capacity: usize,
    initial_len: usize,
    evict_fraction: f64,
    lock_config: KeyedLockConfig,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Clone> SliceCacheBuilder<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            initial_len: 0,
            evict_fraction: DEFAULT_EVICT_FRACTION,
            lock_config: KeyedLockConfig::default(),
            _marker: PhantomData,
        }
    }

    pub fn initial_len(mut self, initial_len: usize) -> Self {
        self.initial_len = initial_len;
        self
    }

    pub fn evict_fraction(mut self, fraction: f64) -> Self {
        self.evict_fraction = fraction;
        self
    }

    pub fn keyed_lock(mut self, config: KeyedLockConfig) -> Self {
        self.lock_config = config;
        self
    }

    pub fn try_build(self) -> Result<SliceCache<T>, ConfigError> {
        validate_sizing(self.capacity, self.evict_fraction)?;
        let locks = KeyedLock::with_config(self.lock_config)?;
        Ok(SliceCache::from_parts(
            self.capacity,
            self.initial_len.min(self.capacity),
            self.evict_fraction,
            locks,
        ))
    }

    /// # Panics
    ///
    /// Panics if the configuration is invalid.
    pub fn build(self) -> SliceCache<T> {
        match self.try_build() {
            Ok(cache) => cache,
            Err(err) => panic!("invalid slice cache configuration: {err}"),
        }
    }
}
