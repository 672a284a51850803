//! Store Entry Module
//!
//! A single value held by the in-memory store, with optional expiry.

use std::time::{SystemTime, UNIX_EPOCH};

// == Store Entry ==
/// Raw bytes plus expiry metadata.
#[derive(Debug, Clone)]
pub struct StoreEntry {
    /// The stored payload
    pub value: Vec<u8>,
    /// Expiration timestamp (Unix milliseconds), None = no expiration
    pub expires_at: Option<u64>,
}

impl StoreEntry {
    // == Constructor ==
    /// Creates a new entry that expires `ttl_seconds` from now, or never.
    pub fn new(value: Vec<u8>, ttl_seconds: Option<u64>) -> Self {
        let now = current_timestamp_ms();
        let expires_at = ttl_seconds.map(|ttl| now.saturating_add(ttl.saturating_mul(1000)));

        Self { value, expires_at }
    }

    // == Is Expired ==
    /// Checks if the entry has expired.
    ///
    /// An entry is expired once the current time reaches its expiration time.
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(current_timestamp_ms())
    }

    /// Same as [`StoreEntry::is_expired`] against a caller-supplied clock.
    pub fn is_expired_at(&self, now_ms: u64) -> bool {
        match self.expires_at {
            Some(expires) => now_ms >= expires,
            None => false,
        }
    }

    // == Time To Live ==
    /// Returns remaining TTL in whole seconds (rounded up), or None if the entry never expires.
    ///
    /// Rounds up the way Redis' `TTL` reports a freshly written `EX 27` as 27.
    pub fn ttl_remaining(&self) -> Option<u64> {
        self.expires_at.map(|expires| {
            let remaining_ms = expires.saturating_sub(current_timestamp_ms());
            remaining_ms.div_ceil(1000)
        })
    }
}

// == Utility Functions ==
/// Returns current Unix timestamp in milliseconds.
pub fn current_timestamp_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as u64)
        .unwrap_or(0)
}
