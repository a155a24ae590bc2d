//! The two cache types and the load coordination they share.
//!
//! - [`EntityCache`]: values addressed through several named indices.
//! - [`SliceCache`]: whole `Vec<T>` results addressed by a string key.

pub mod entity;
mod flight;
pub mod slice;

pub use entity::EntityCache;
pub use slice::SliceCache;
