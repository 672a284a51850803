//! Store Module
//!
//! The key-value store collaborator the cache client talks to, plus the
//! backends shipped with the crate.

mod entry;
mod memory;
#[cfg(feature = "redis-backend")]
mod redis_store;

use thiserror::Error;

pub use entry::StoreEntry;
pub use memory::MemoryStore;
#[cfg(feature = "redis-backend")]
pub use redis_store::RedisStore;

// == Store Error ==
/// Failures surfaced by a store backend. Never retried by the client.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Health check failed or the connection is gone
    #[error("store unreachable: {0}")]
    Unreachable(String),

    /// A command was rejected or failed mid-flight
    #[error("store command failed: {0}")]
    Command(String),
}

// == Store Trait ==
/// Primitive operations of a remote key-value store.
///
/// Each call is one logical request on a sequential connection, hence `&mut self`.
/// `ttl_seconds` of `None` means "store without expiry"; implementations must
/// never receive `Some(0)` from the client.
pub trait Store {
    /// Health check.
    fn ping(&mut self) -> Result<(), StoreError>;

    /// Fetches raw bytes, `None` on miss.
    fn get(&mut self, key: &str) -> Result<Option<Vec<u8>>, StoreError>;

    /// Stores raw bytes with an optional expiry.
    fn set(&mut self, key: &str, value: &[u8], ttl_seconds: Option<u64>)
        -> Result<bool, StoreError>;

    /// Removes one key, returning how many entries were removed.
    fn delete(&mut self, key: &str) -> Result<u64, StoreError>;

    /// Removes many keys in one command, returning how many entries were removed.
    fn delete_many(&mut self, keys: &[String]) -> Result<u64, StoreError>;

    /// Reports whether a live entry exists.
    fn exists(&mut self, key: &str) -> Result<bool, StoreError>;

    /// Lists keys matching a glob pattern (`*`, `?`, `[...]`).
    fn keys(&mut self, pattern: &str) -> Result<Vec<String>, StoreError>;

    /// Wipes the whole store.
    fn flush_all(&mut self) -> Result<bool, StoreError>;

    /// Fetches many keys. Backends with a multi-key read should override this.
    fn get_many(&mut self, keys: &[String]) -> Result<Vec<Option<Vec<u8>>>, StoreError> {
        keys.iter().map(|key| self.get(key)).collect()
    }

    /// Stores many entries with one shared expiry, returning how many were written.
    /// Backends that can batch writes should override this.
    fn set_many(
        &mut self,
        entries: &[(String, Vec<u8>)],
        ttl_seconds: Option<u64>,
    ) -> Result<usize, StoreError> {
        let mut written = 0;
        for (key, value) in entries {
            if self.set(key, value, ttl_seconds)? {
                written += 1;
            }
        }
        Ok(written)
    }
}
