//! Memory Store Module
//!
//! In-process store backend with per-entry TTL. Cloning a `MemoryStore` yields
//! another handle to the same data, so several clients can share one store.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::debug;

use super::entry::{current_timestamp_ms, StoreEntry};
use super::{Store, StoreError};

// == Memory Store ==
/// Shared in-memory key-value storage with TTL expiration.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    /// Key-value storage
    entries: Arc<Mutex<HashMap<String, StoreEntry>>>,
    /// When true every command fails as if the connection were down
    offline: Arc<AtomicBool>,
}

impl MemoryStore {
    // == Constructor ==
    /// Creates a new, empty store.
    pub fn new() -> Self {
        Self::default()
    }

    // == Connectivity ==
    /// Simulates losing (or regaining) the connection to the store.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    fn lock(&self) -> Result<MutexGuard<'_, HashMap<String, StoreEntry>>, StoreError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(StoreError::Unreachable("memory store is offline".to_string()));
        }
        self.entries
            .lock()
            .map_err(|_| StoreError::Command("memory store lock poisoned".to_string()))
    }

    // == Remaining TTL ==
    /// Returns the remaining TTL of a live key: `Some(None)` for keys without expiry,
    /// `None` for missing keys.
    pub fn ttl(&self, key: &str) -> Result<Option<Option<u64>>, StoreError> {
        let entries = self.lock()?;
        Ok(entries
            .get(key)
            .filter(|entry| !entry.is_expired())
            .map(StoreEntry::ttl_remaining))
    }

    // == Cleanup Expired ==
    /// Removes all expired entries from the store.
    ///
    /// Returns the number of entries removed.
    pub fn cleanup_expired(&self) -> Result<usize, StoreError> {
        let mut entries = self.lock()?;
        let now = current_timestamp_ms();
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_expired_at(now));
        Ok(before - entries.len())
    }

    // == Length ==
    /// Returns the number of live entries.
    pub fn len(&self) -> usize {
        self.lock()
            .map(|entries| entries.values().filter(|entry| !entry.is_expired()).count())
            .unwrap_or(0)
    }

    // == Is Empty ==
    /// Returns true if the store holds no live entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Removes a key if present and live, reporting whether it was.
    fn remove_live(entries: &mut HashMap<String, StoreEntry>, key: &str) -> bool {
        match entries.remove(key) {
            Some(entry) => !entry.is_expired(),
            None => false,
        }
    }
}

impl Store for MemoryStore {
    fn ping(&mut self) -> Result<(), StoreError> {
        self.lock().map(|_| ())
    }

    fn get(&mut self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let mut entries = self.lock()?;
        match entries.get(key) {
            Some(entry) if entry.is_expired() => {
                entries.remove(key);
                Ok(None)
            }
            Some(entry) => Ok(Some(entry.value.clone())),
            None => Ok(None),
        }
    }

    fn set(
        &mut self,
        key: &str,
        value: &[u8],
        ttl_seconds: Option<u64>,
    ) -> Result<bool, StoreError> {
        let mut entries = self.lock()?;
        entries.insert(key.to_string(), StoreEntry::new(value.to_vec(), ttl_seconds));
        Ok(true)
    }

    fn delete(&mut self, key: &str) -> Result<u64, StoreError> {
        let mut entries = self.lock()?;
        Ok(u64::from(Self::remove_live(&mut entries, key)))
    }

    fn delete_many(&mut self, keys: &[String]) -> Result<u64, StoreError> {
        let mut entries = self.lock()?;
        let removed = keys
            .iter()
            .filter(|key| Self::remove_live(&mut entries, key))
            .count();
        Ok(removed as u64)
    }

    fn exists(&mut self, key: &str) -> Result<bool, StoreError> {
        let entries = self.lock()?;
        Ok(entries.get(key).is_some_and(|entry| !entry.is_expired()))
    }

    fn keys(&mut self, pattern: &str) -> Result<Vec<String>, StoreError> {
        let matcher = glob::Pattern::new(pattern)
            .map_err(|err| StoreError::Command(format!("invalid key pattern '{}': {}", pattern, err)))?;
        let entries = self.lock()?;
        Ok(entries
            .iter()
            .filter(|(key, entry)| !entry.is_expired() && matcher.matches(key))
            .map(|(key, _)| key.clone())
            .collect())
    }

    fn flush_all(&mut self) -> Result<bool, StoreError> {
        let mut entries = self.lock()?;
        let count = entries.len();
        entries.clear();
        debug!("memory store flushed {} entries", count);
        Ok(true)
    }

    fn get_many(&mut self, keys: &[String]) -> Result<Vec<Option<Vec<u8>>>, StoreError> {
        let entries = self.lock()?;
        Ok(keys
            .iter()
            .map(|key| {
                entries
                    .get(key)
                    .filter(|entry| !entry.is_expired())
                    .map(|entry| entry.value.clone())
            })
            .collect())
    }

    fn set_many(
        &mut self,
        batch: &[(String, Vec<u8>)],
        ttl_seconds: Option<u64>,
    ) -> Result<usize, StoreError> {
        let mut entries = self.lock()?;
        for (key, value) in batch {
            entries.insert(key.clone(), StoreEntry::new(value.clone(), ttl_seconds));
        }
        Ok(batch.len())
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::sleep;
    use std::time::Duration;

    #[test]
    fn test_store_new() {
        let store = MemoryStore::new();
        assert_eq!(store.len(), 0);
        assert!(store.is_empty());
    }

    #[test]
    fn test_store_set_and_get() {
        let mut store = MemoryStore::new();

        assert!(store.set("key1", b"value1", None).unwrap());
        assert_eq!(store.get("key1").unwrap(), Some(b"value1".to_vec()));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_store_get_nonexistent() {
        let mut store = MemoryStore::new();
        assert_eq!(store.get("nonexistent").unwrap(), None);
    }

    #[test]
    fn test_store_clones_share_data() {
        let mut writer = MemoryStore::new();
        let mut reader = writer.clone();

        writer.set("shared", b"v", None).unwrap();
        assert!(reader.exists("shared").unwrap());
    }

    #[test]
    fn test_store_delete_counts() {
        let mut store = MemoryStore::new();

        store.set("key1", b"value1", None).unwrap();
        assert_eq!(store.delete("key1").unwrap(), 1);
        assert_eq!(store.delete("key1").unwrap(), 0);
    }

    #[test]
    fn test_store_delete_many_counts_only_present() {
        let mut store = MemoryStore::new();
        store.set("a", b"1", None).unwrap();
        store.set("b", b"2", None).unwrap();

        let keys = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        assert_eq!(store.delete_many(&keys).unwrap(), 2);
        assert!(store.is_empty());
    }

    #[test]
    fn test_store_ttl_expiration() {
        let mut store = MemoryStore::new();

        store.set("key1", b"value1", Some(1)).unwrap();
        assert!(store.exists("key1").unwrap());

        sleep(Duration::from_millis(1100));

        assert!(!store.exists("key1").unwrap());
        assert_eq!(store.get("key1").unwrap(), None);
    }

    #[test]
    fn test_store_ttl_reporting() {
        let mut store = MemoryStore::new();

        store.set("timed", b"v", Some(27)).unwrap();
        store.set("forever", b"v", None).unwrap();

        assert_eq!(store.ttl("timed").unwrap(), Some(Some(27)));
        assert_eq!(store.ttl("forever").unwrap(), Some(None));
        assert_eq!(store.ttl("missing").unwrap(), None);
    }

    #[test]
    fn test_store_keys_pattern() {
        let mut store = MemoryStore::new();
        store.set("APP_1", b"v", None).unwrap();
        store.set("APP_2", b"v", None).unwrap();
        store.set("OTHER_1", b"v", None).unwrap();

        let mut keys = store.keys("APP_*").unwrap();
        keys.sort();
        assert_eq!(keys, vec!["APP_1".to_string(), "APP_2".to_string()]);
    }

    #[test]
    fn test_store_keys_glob_forms() {
        let mut store = MemoryStore::new();
        for key in ["APP_a1", "APP_b2", "APP_c3", "APPB_a1", "k_y"] {
            store.set(key, b"v", None).unwrap();
        }

        let mut keys = store.keys("APP_[ab]*").unwrap();
        keys.sort();
        assert_eq!(keys, vec!["APP_a1".to_string(), "APP_b2".to_string()]);

        assert_eq!(store.keys("k?y").unwrap(), vec!["k_y".to_string()]);
        assert_eq!(store.keys("APP_*").unwrap().len(), 3);
        assert_eq!(store.keys("*").unwrap().len(), 5);
    }

    #[test]
    fn test_store_keys_invalid_pattern() {
        let mut store = MemoryStore::new();
        assert!(matches!(store.keys("APP_[ab"), Err(StoreError::Command(_))));
    }

    #[test]
    fn test_store_cleanup_expired() {
        let mut store = MemoryStore::new();

        store.set("key1", b"value1", Some(1)).unwrap();
        store.set("key2", b"value2", Some(10)).unwrap();

        sleep(Duration::from_millis(1100));

        assert_eq!(store.cleanup_expired().unwrap(), 1);
        assert_eq!(store.len(), 1);
        assert!(store.exists("key2").unwrap());
    }

    #[test]
    fn test_store_offline_fails_every_command() {
        let mut store = MemoryStore::new();
        store.set_offline(true);

        assert!(matches!(store.ping(), Err(StoreError::Unreachable(_))));
        assert!(store.get("k").is_err());

        store.set_offline(false);
        assert!(store.ping().is_ok());
    }

    #[test]
    fn test_store_flush_all() {
        let mut store = MemoryStore::new();
        store.set("a", b"1", None).unwrap();
        store.set("b", b"2", None).unwrap();

        assert!(store.flush_all().unwrap());
        assert!(store.is_empty());
    }
}
