//! Background Tasks Module
//!
//! Contains background tasks that run periodically alongside the cache.
//!
//! # Tasks
//! - Expiry sweep: Removes expired entries from a [`MemoryStore`](crate::store::MemoryStore)

mod sweeper;

pub use sweeper::spawn_sweeper;
