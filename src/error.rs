//! Error types for the entitycache library.
//!
//! ## Key Components
//!
//! - [`LoadError`]: A loader or batch-loader failure. Cheap to clone, so a
//!   single failure can be handed to every caller that joined the same load.
//! - [`ConfigError`]: A builder or keyed-lock setting was rejected, naming
//!   the offending index or fraction.
//! - [`InvariantError`]: An entry and the index maps disagree. Only the
//!   debug-only `EntityCache::check_invariants` produces it.
//!
//! ## Example Usage
//!
//! ```
//! use entitycache::error::{ConfigError, LoadError};
//! use entitycache::cache::SliceCache;
//!
//! // Fallible constructor for user-configurable parameters
//! let cache: Result<SliceCache<u64>, ConfigError> = SliceCache::builder(100).try_build();
//! assert!(cache.is_ok());
//!
//! // A fraction of one would let an overflowing insert evict everything
//! let bad = SliceCache::<u64>::builder(10).evict_fraction(1.0).try_build();
//! assert!(matches!(bad, Err(ConfigError::OutOfRange { name: "evict_fraction", .. })));
//!
//! // Loader failures are wrapped once and shared verbatim
//! let err = LoadError::msg("database unavailable");
//! assert_eq!(err.to_string(), "database unavailable");
//! ```

use std::error::Error as StdError;
use std::fmt;
use std::sync::Arc;

use crate::index::Key;

// ---------------------------------------------------------------------------
// LoadError
// ---------------------------------------------------------------------------

/// Error returned by a loader callback.
///
/// Wraps the loader's own error in an [`Arc`], so every caller blocked on the
/// same key receives the *same* error instance rather than a re-run of the
/// loader. Use [`LoadError::downcast_ref`] to recover the concrete type.
///
/// # Example
///
/// ```
/// use std::io;
///
/// use entitycache::error::LoadError;
///
/// let err = LoadError::new(io::Error::new(io::ErrorKind::NotFound, "no rows"));
/// let shared = err.clone();
///
/// assert!(err.ptr_eq(&shared));
/// assert_eq!(
///     shared.downcast_ref::<io::Error>().map(io::Error::kind),
///     Some(io::ErrorKind::NotFound)
/// );
/// ```
#[derive(Clone, thiserror::Error)]
#[error(transparent)]
pub struct LoadError(Arc<dyn StdError + Send + Sync + 'static>);

impl LoadError {
    /// Wraps a concrete loader error.
    pub fn new<E>(err: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        Self(Arc::new(err))
    }

    /// Creates an error from a plain message.
    pub fn msg(msg: impl Into<String>) -> Self {
        Self(Arc::new(Message(msg.into())))
    }

    /// Returns the wrapped error if it is of type `E`.
    pub fn downcast_ref<E>(&self) -> Option<&E>
    where
        E: StdError + 'static,
    {
        self.0.downcast_ref::<E>()
    }

    /// Returns `true` if both errors originate from the same loader failure.
    pub fn ptr_eq(&self, other: &LoadError) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for LoadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("LoadError").field(&self.0).finish()
    }
}

#[derive(Debug, thiserror::Error)]
#[error("{0}")]
struct Message(String);

// ---------------------------------------------------------------------------
// ConfigError
// ---------------------------------------------------------------------------

/// A rejected cache or keyed-lock configuration.
///
/// Returned by the builders' `try_build` and by
/// [`KeyedLock::with_config`](crate::sync::KeyedLock::with_config). Nothing is
/// allocated before validation passes.
///
/// # Example
///
/// ```
/// use entitycache::cache::EntityCache;
/// use entitycache::error::ConfigError;
/// use entitycache::index::{Fields, KeyPart};
///
/// #[derive(Clone)]
/// struct Tag(String);
///
/// impl Fields for Tag {
///     fn field(&self, name: &str) -> Option<KeyPart> {
///         (name == "Name").then(|| self.0.as_str().into())
///     }
/// }
///
/// let err = EntityCache::<Tag>::builder(16)
///     .index("Name")
///     .index(" Name ")
///     .try_build()
///     .unwrap_err();
/// assert_eq!(err, ConfigError::DuplicateIndex("Name".into()));
/// ```
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("capacity must be greater than zero")]
    ZeroCapacity,

    #[error("at least one index is required")]
    NoIndices,

    /// Two index configurations normalize to the same field list.
    #[error("duplicate index {0:?}")]
    DuplicateIndex(String),

    /// An index field list such as `"AccountID,"` names an empty field.
    #[error("index {0:?} has an empty field name")]
    EmptyField(String),

    /// A fraction setting fell outside its range. NaN always lands here.
    #[error("{name} must be within {range}, got {value}")]
    OutOfRange {
        name: &'static str,
        range: &'static str,
        value: f64,
    },
}

// ---------------------------------------------------------------------------
// InvariantError
// ---------------------------------------------------------------------------

/// An inconsistency between an [`EntityCache`](crate::cache::EntityCache)'s
/// entries and its index maps, as found by the debug-only
/// [`check_invariants`](crate::cache::EntityCache::check_invariants).
///
/// Entry ids are arena slot numbers.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InvariantError {
    /// The keys recorded for an entry differ from the keys its value yields.
    #[error("entry {entry} records keys {recorded:?}, value produces {produced:?}")]
    KeyMismatch {
        entry: usize,
        recorded: Vec<(usize, Key)>,
        produced: Vec<(usize, Key)>,
    },

    #[error("entry {entry} missing from index {index:?} under key {key}")]
    Unindexed { entry: usize, index: String, key: Key },

    #[error("index {index:?} keeps empty key {key}")]
    EmptyKey { index: String, key: Key },

    #[error("unique index {index:?} holds {count} entries under key {key}")]
    UniqueCollision { index: String, key: Key, count: usize },

    /// An index key refers to a freed slot, or to an entry that no longer
    /// produces that key.
    #[error("index {index:?} key {key} points at stale entry {entry}")]
    StaleEntry { index: String, key: Key, entry: usize },

    #[error("len {len} exceeds capacity {capacity}")]
    OverCapacity { len: usize, capacity: usize },
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::io;

    use super::*;

    // -- LoadError --------------------------------------------------------

    #[test]
    fn load_display_is_transparent() {
        let err = LoadError::new(io::Error::other("connection reset"));
        assert_eq!(err.to_string(), "connection reset");
    }

    #[test]
    fn load_msg_display() {
        let err = LoadError::msg("not found");
        assert_eq!(err.to_string(), "not found");
        assert!(format!("{:?}", err).contains("not found"));
    }

    #[test]
    fn load_clone_shares_origin() {
        let a = LoadError::msg("x");
        let b = a.clone();
        let c = LoadError::msg("x");
        assert!(a.ptr_eq(&b));
        assert!(!a.ptr_eq(&c));
    }

    #[test]
    fn load_downcast() {
        let err = LoadError::new(io::Error::new(io::ErrorKind::TimedOut, "deadline"));
        assert_eq!(
            err.downcast_ref::<io::Error>().map(|e| e.kind()),
            Some(io::ErrorKind::TimedOut)
        );
        assert!(err.downcast_ref::<std::fmt::Error>().is_none());
    }

    #[test]
    fn load_implements_std_error() {
        fn assert_error<T: std::error::Error + Send + Sync + Clone>() {}
        assert_error::<LoadError>();
    }

    // -- ConfigError ------------------------------------------------------

    #[test]
    fn config_names_the_offending_index() {
        let err = ConfigError::DuplicateIndex("AccountID,TargetAccountID".into());
        assert_eq!(
            err.to_string(),
            "duplicate index \"AccountID,TargetAccountID\""
        );
        let err = ConfigError::EmptyField("AccountID,".into());
        assert_eq!(err.to_string(), "index \"AccountID,\" has an empty field name");
    }

    #[test]
    fn config_out_of_range_reports_value() {
        let err = ConfigError::OutOfRange {
            name: "low_water",
            range: "(0, 1)",
            value: 1.5,
        };
        assert_eq!(err.to_string(), "low_water must be within (0, 1), got 1.5");
    }

    // -- InvariantError ---------------------------------------------------

    #[test]
    fn invariant_display_names_index_and_key() {
        let err = InvariantError::StaleEntry {
            index: "URI".into(),
            key: Key::from("https://example.org/1"),
            entry: 3,
        };
        assert_eq!(
            err.to_string(),
            "index \"URI\" key https://example.org/1 points at stale entry 3"
        );
        let err = InvariantError::OverCapacity { len: 11, capacity: 10 };
        assert_eq!(err.to_string(), "len 11 exceeds capacity 10");
    }
}
