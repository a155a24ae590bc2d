pub use crate::builder::{EntityCacheBuilder, SliceCacheBuilder};
pub use crate::cache::{EntityCache, SliceCache};
pub use crate::error::{ConfigError, InvariantError, LoadError};
pub use crate::index::{Fields, Index, IndexConfig, Key, KeyPart};
pub use crate::metrics::CacheMetrics;
pub use crate::sync::{KeyGuard, KeyedLock, KeyedLockConfig, LockMode};
pub use crate::traits::{CacheControl, sweep};
