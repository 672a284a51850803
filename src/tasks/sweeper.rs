//! Expiry Sweeper Task
//!
//! Background task that periodically removes expired entries from a memory store.
//! Reads already skip expired entries; the sweep only reclaims their memory.

use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::store::MemoryStore;

/// Spawns a background task that sweeps expired entries every `interval`.
///
/// The task holds its own handle to the store and runs until aborted, so keep
/// the returned `JoinHandle` and call `abort()` on shutdown.
///
/// # Example
/// ```ignore
/// let store = MemoryStore::new();
/// let sweeper = spawn_sweeper(store.clone(), Duration::from_secs(1));
/// // Later, during shutdown:
/// sweeper.abort();
/// ```
pub fn spawn_sweeper(store: MemoryStore, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!("Starting expiry sweeper with interval of {:?}", interval);

        loop {
            tokio::time::sleep(interval).await;

            match store.cleanup_expired() {
                Ok(0) => debug!("Expiry sweep: no expired entries found"),
                Ok(removed) => info!("Expiry sweep: removed {} expired entries", removed),
                Err(err) => warn!("Expiry sweep skipped: {}", err),
            }
        }
    })
}
