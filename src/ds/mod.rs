pub mod arena;
pub mod recency;

pub use arena::{Arena, EntryId};
pub use recency::{Clock, Stamp};
