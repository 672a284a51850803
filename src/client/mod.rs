//! Cache Client Module
//!
//! The public cache surface: addressed, TTL-normalized and codec-encoded
//! operations over any [`Store`].
//!
//! Values are serialized with `serde_json`, so `null`, `0`, `false` and `""`
//! all round-trip. Use [`CacheClient::has`] to tell a stored `null` from a miss.

mod builder;
mod stats;


use std::fmt;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, info, warn};
use zeroize::Zeroizing;

use crate::crypto::ValueCodec;
use crate::error::{CacheError, Result};
use crate::keys::KeyAddresser;
use crate::store::Store;
use crate::ttl::{Ttl, TtlNormalizer, TtlSeconds};

pub use builder::CacheClientBuilder;
pub use stats::ClientStats;

// == Client State ==
/// Lifecycle of a built client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    Ready,
    Disabled,
}

// == Cache Client ==
/// Cache client over a store handle it owns.
pub struct CacheClient<S: Store> {
    /// Backing store
    store: S,
    /// Logical key -> store key mapping
    keys: KeyAddresser,
    /// TTL normalization with the configured default
    ttl: TtlNormalizer,
    /// Plain or sealed value encoding
    codec: Box<dyn ValueCodec>,
    /// Whether `codec` seals values
    sealed: bool,
    /// Strict typing for dynamic inputs
    strict: bool,
    /// Operation counters
    stats: ClientStats,
    state: ClientState,
}

impl<S: Store> CacheClient<S> {
    // == Constructors ==
    /// Starts building a client over `store`.
    pub fn builder(store: S) -> CacheClientBuilder<S> {
        CacheClientBuilder::new(store)
    }

    pub(crate) fn from_parts(
        store: S,
        keys: KeyAddresser,
        ttl: TtlNormalizer,
        codec: Box<dyn ValueCodec>,
        sealed: bool,
        strict: bool,
    ) -> Self {
        Self {
            store,
            keys,
            ttl,
            codec,
            sealed,
            strict,
            stats: ClientStats::new(),
            state: ClientState::Ready,
        }
    }

    // == Accessors ==
    pub fn prefix(&self) -> &str {
        self.keys.prefix()
    }

    pub fn is_strict(&self) -> bool {
        self.strict
    }

    /// Whether values are sealed with authenticated encryption.
    pub fn is_sealed(&self) -> bool {
        self.sealed
    }

    pub fn is_enabled(&self) -> bool {
        self.state == ClientState::Ready
    }

    pub fn state(&self) -> ClientState {
        self.state
    }

    pub fn stats(&self) -> &ClientStats {
        &self.stats
    }

    /// TTL applied to writes that pass [`Ttl::Default`].
    pub fn default_ttl(&self) -> TtlSeconds {
        self.ttl.default_ttl()
    }

    /// The underlying store handle.
    pub fn store(&self) -> &S {
        &self.store
    }

    // == Get ==
    /// Fetches the value stored under `key`, or `default` when there is none.
    ///
    /// A payload that fails authentication or does not deserialize into `T`
    /// also yields `default`.
    pub fn get<T: DeserializeOwned>(&mut self, key: &str, default: T) -> Result<T> {
        self.ensure_enabled()?;
        let store_key = self.keys.address(key)?;

        let stored = self.store.get(&store_key)?;
        Ok(self.read_value(&store_key, stored.as_deref()).unwrap_or(default))
    }

    // == Set ==
    /// Stores `value` under `key`. Returns whether the store accepted the write.
    pub fn set<T: Serialize + ?Sized>(
        &mut self,
        key: &str,
        value: &T,
        ttl: impl Into<Ttl>,
    ) -> Result<bool> {
        self.ensure_enabled()?;
        let store_key = self.keys.address(key)?;
        let expiry = store_expiry(self.ttl.normalize(&ttl.into())?);
        let payload = self.encode_value(value)?;

        let written = self.store.set(&store_key, &payload, expiry)?;
        if written {
            self.stats.record_writes(1);
        }
        debug!(key = %store_key, ttl = ?expiry, "Stored value");
        Ok(written)
    }

    // == Has ==
    /// Whether an entry exists under `key`.
    ///
    /// Racy: another writer may remove or add the entry right after this returns.
    /// Use it for cache warming, not to guard a following `get`.
    pub fn has(&mut self, key: &str) -> Result<bool> {
        self.ensure_enabled()?;
        let store_key = self.keys.address(key)?;
        Ok(self.store.exists(&store_key)?)
    }

    // == Delete ==
    /// Removes the entry under `key`. True only if exactly one entry was removed.
    pub fn delete(&mut self, key: &str) -> Result<bool> {
        self.ensure_enabled()?;
        let store_key = self.keys.address(key)?;
        Ok(self.store.delete(&store_key)? == 1)
    }

    // == Batch Operations ==
    /// Fetches several keys at once, pairing each requested key with its value
    /// or `default`.
    pub fn get_multiple<K, T>(&mut self, keys: &[K], default: T) -> Result<Vec<(String, T)>>
    where
        K: AsRef<str>,
        T: DeserializeOwned + Clone,
    {
        self.ensure_enabled()?;
        let store_keys = self.keys.address_all(keys)?;
        if store_keys.is_empty() {
            return Ok(Vec::new());
        }

        let stored = self.store.get_many(&store_keys)?;
        let mut results = Vec::with_capacity(keys.len());
        for ((key, store_key), bytes) in keys.iter().zip(&store_keys).zip(stored) {
            let value = self
                .read_value(store_key, bytes.as_deref())
                .unwrap_or_else(|| default.clone());
            results.push((key.as_ref().to_string(), value));
        }
        Ok(results)
    }

    /// Stores several entries with one TTL.
    ///
    /// Every key and value is validated before the store is touched. Returns
    /// false if any entry was not written; entries already written stay.
    pub fn set_multiple<I, K, V>(&mut self, items: I, ttl: impl Into<Ttl>) -> Result<bool>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Serialize,
    {
        self.ensure_enabled()?;
        let expiry = store_expiry(self.ttl.normalize(&ttl.into())?);

        let mut entries = Vec::new();
        for (key, value) in items {
            let store_key = self.keys.address(key.as_ref())?;
            entries.push((store_key, self.encode_value(&value)?));
        }
        if entries.is_empty() {
            return Ok(true);
        }

        let written = self.store.set_many(&entries, expiry)?;
        self.stats.record_writes(written);
        debug!(requested = entries.len(), written, "Stored batch");
        Ok(written == entries.len())
    }

    /// Removes several keys. True only if every listed entry existed and was
    /// removed.
    ///
    /// Duplicate keys are collapsed first, so `["a", "a"]` succeeds when `a`
    /// exists. An empty list succeeds without touching the store.
    pub fn delete_multiple<K: AsRef<str>>(&mut self, keys: &[K]) -> Result<bool> {
        self.ensure_enabled()?;
        let mut store_keys = self.keys.address_all(keys)?;
        store_keys.sort_unstable();
        store_keys.dedup();
        if store_keys.is_empty() {
            return Ok(true);
        }

        let deleted = self.store.delete_many(&store_keys)?;
        Ok(deleted == store_keys.len() as u64)
    }

    // == Clear ==
    /// Removes every entry under this client's prefix.
    ///
    /// Scan-then-delete, not atomic: entries written concurrently may survive.
    /// True when every matched key was removed, including when none matched.
    pub fn clear(&mut self) -> Result<bool> {
        self.ensure_enabled()?;
        let matched = self.store.keys(&self.keys.scan_pattern())?;
        if matched.is_empty() {
            return Ok(true);
        }

        let deleted = self.store.delete_many(&matched)?;
        info!(prefix = %self.keys.prefix(), matched = matched.len(), deleted, "Cleared prefix");
        Ok(deleted == matched.len() as u64)
    }

    /// Flushes the whole store, every prefix included.
    pub fn clear_all(&mut self) -> Result<bool> {
        self.ensure_enabled()?;
        let flushed = self.store.flush_all()?;
        warn!("Flushed entire store");
        Ok(flushed)
    }

    // == Default TTL ==
    /// Replaces the default TTL. The value is normalized once, now.
    pub fn set_default_ttl(&mut self, ttl: impl Into<Ttl>) -> Result<()> {
        self.ensure_enabled()?;
        self.ttl.set_default(&ttl.into())?;
        info!(default_ttl = %self.ttl.default_ttl(), "Default TTL updated");
        Ok(())
    }

    // == Dispose ==
    /// Erases key material and disables the client. Every later operation
    /// returns [`CacheError::Disabled`] without touching the store.
    pub fn dispose(&mut self) {
        if self.state == ClientState::Disabled {
            return;
        }
        self.codec.dispose();
        self.state = ClientState::Disabled;
        info!(prefix = %self.keys.prefix(), "Cache client disposed");
    }

    // == Helpers ==
    fn ensure_enabled(&self) -> Result<()> {
        match self.state {
            ClientState::Ready => Ok(()),
            ClientState::Disabled => Err(CacheError::Disabled),
        }
    }

    fn encode_value<T: Serialize + ?Sized>(&self, value: &T) -> Result<Vec<u8>> {
        let plaintext = serde_json::to_vec(value)
            .map(Zeroizing::new)
            .map_err(|err| CacheError::TypeMismatch(format!("value cannot be serialized: {}", err)))?;
        self.codec.encode(plaintext)
    }

    /// Decodes a store payload, updating the counters. `None` for a miss or a
    /// rejected payload.
    fn read_value<T: DeserializeOwned>(&mut self, store_key: &str, stored: Option<&[u8]>) -> Option<T> {
        let Some(bytes) = stored else {
            self.stats.record_miss();
            return None;
        };

        let decoded = self
            .codec
            .decode(bytes)
            .and_then(|plaintext| serde_json::from_slice(&plaintext).ok());
        match decoded {
            Some(value) => {
                self.stats.record_hit();
                Some(value)
            }
            None => {
                self.stats.record_rejected();
                warn!(codec = self.codec.name(), "Rejected unreadable cache payload");
                debug!(key = %store_key, "Rejected payload key");
                None
            }
        }
    }
}

/// Store-level expiry. Zero and "no expiry" both mean a plain `SET`: Redis
/// refuses `EX 0`.
fn store_expiry(ttl: TtlSeconds) -> Option<u64> {
    match ttl {
        TtlSeconds::NoExpiry | TtlSeconds::Seconds(0) => None,
        TtlSeconds::Seconds(seconds) => Some(seconds),
    }
}

impl<S: Store> fmt::Debug for CacheClient<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheClient")
            .field("prefix", &self.keys.prefix())
            .field("codec", &self.codec.name())
            .field("sealed", &self.sealed)
            .field("strict", &self.strict)
            .field("default_ttl", &self.ttl.default_ttl())
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use serde_json::{json, Value};

    fn client() -> CacheClient<MemoryStore> {
        CacheClient::builder(MemoryStore::new())
            .prefix("unit")
            .build()
            .unwrap()
    }

    #[test]
    fn test_store_expiry_mapping() {
        assert_eq!(store_expiry(TtlSeconds::NoExpiry), None);
        assert_eq!(store_expiry(TtlSeconds::Seconds(0)), None);
        assert_eq!(store_expiry(TtlSeconds::Seconds(27)), Some(27));
    }

    #[test]
    fn test_set_and_get() {
        let mut cache = client();
        assert!(cache.set("greeting", "hello", Ttl::Default).unwrap());
        assert_eq!(cache.get("greeting", String::new()).unwrap(), "hello");
    }

    #[test]
    fn test_get_miss_returns_default() {
        let mut cache = client();
        assert_eq!(cache.get("missing", 42).unwrap(), 42);
        assert_eq!(cache.stats().misses, 1);
    }

    #[test]
    fn test_zero_ttl_never_expires() {
        let mut cache = client();
        cache.set("forever", &1, 0).unwrap();

        let store_key = cache.keys.address("forever").unwrap();
        assert_eq!(cache.store().ttl(&store_key).unwrap(), Some(None));
    }

    #[test]
    fn test_wrong_type_counts_as_rejected() {
        let mut cache = client();
        cache.set("number", &5, Ttl::Default).unwrap();

        assert_eq!(cache.get("number", "fallback".to_string()).unwrap(), "fallback");
        assert_eq!(cache.stats().rejected, 1);
    }

    #[test]
    fn test_invalid_key_touches_nothing() {
        let mut cache = client();
        assert!(matches!(
            cache.set("bad:key", &1, Ttl::Default),
            Err(CacheError::InvalidKey(_))
        ));
        assert!(cache.store().is_empty());
    }

    #[test]
    fn test_set_multiple_validates_before_writing() {
        let mut cache = client();
        let items = vec![("ok", json!(1)), ("not/ok", json!(2))];

        assert!(cache.set_multiple(items, Ttl::Default).is_err());
        assert!(cache.store().is_empty());
    }

    #[test]
    fn test_get_multiple_pairs_keys() {
        let mut cache = client();
        cache.set("a", &1, Ttl::Default).unwrap();

        let results = cache.get_multiple(&["a", "b"], Value::Null).unwrap();
        assert_eq!(results, vec![("a".to_string(), json!(1)), ("b".to_string(), Value::Null)]);
    }

    #[test]
    fn test_delete_multiple_counts_missing_as_failure() {
        let mut cache = client();
        cache.set("a", &1, Ttl::Default).unwrap();

        assert!(!cache.delete_multiple(&["a", "b"]).unwrap());
        assert!(cache.delete_multiple::<&str>(&[]).unwrap());
    }

    #[test]
    fn test_delete_multiple_collapses_duplicates() {
        let mut cache = client();
        cache.set("a", &1, Ttl::Default).unwrap();

        assert!(cache.delete_multiple(&["a", "a", " a "]).unwrap());
        assert!(!cache.has("a").unwrap());
    }

    #[test]
    fn test_sealed_flag_follows_codec() {
        let plain = CacheClient::from_parts(
            MemoryStore::new(),
            KeyAddresser::new(None, None).unwrap(),
            TtlNormalizer::new(),
            Box::new(crate::crypto::PlainCodec),
            false,
            false,
        );
        assert!(!plain.is_sealed());
        assert!(format!("{:?}", plain).contains("sealed: false"));
    }

    #[test]
    fn test_set_default_ttl() {
        let mut cache = client();
        cache.set_default_ttl(120).unwrap();
        assert_eq!(cache.default_ttl(), TtlSeconds::Seconds(120));

        assert!(matches!(cache.set_default_ttl(-1), Err(CacheError::InvalidTtl(_))));
        assert!(matches!(
            cache.set_default_ttl(Ttl::Default),
            Err(CacheError::TypeMismatch(_))
        ));
    }

    #[test]
    fn test_dispose_disables() {
        let mut cache = client();
        cache.set("key", &1, Ttl::Default).unwrap();
        cache.dispose();
        cache.dispose();

        assert!(!cache.is_enabled());
        assert!(matches!(cache.get("key", 0), Err(CacheError::Disabled)));
        assert!(matches!(cache.clear(), Err(CacheError::Disabled)));
        assert_eq!(cache.store().len(), 1);
    }

    #[test]
    fn test_debug_is_redacted() {
        let cache = CacheClient::builder(MemoryStore::new())
            .prefix("dbg")
            .salt("very-secret-salt")
            .build()
            .unwrap();
        let rendered = format!("{:?}", cache);

        assert!(rendered.contains("DBG"));
        assert!(!rendered.contains("very-secret-salt"));
    }
}
