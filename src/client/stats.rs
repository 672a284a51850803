//! Client Statistics Module
//!
//! Counts reads, writes and rejected payloads for one client.

use serde::Serialize;

// == Client Stats ==
/// Per-client operation counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ClientStats {
    /// Reads that returned a stored value
    pub hits: u64,
    /// Reads that found nothing under the key
    pub misses: u64,
    /// Reads whose payload failed authentication or deserialization
    pub rejected: u64,
    /// Entries successfully written
    pub writes: u64,
}

impl ClientStats {
    // == Constructor ==
    /// Creates a new ClientStats with all counters at zero.
    pub fn new() -> Self {
        Self::default()
    }

    // == Hit Rate ==
    /// Returns hits / (hits + misses + rejected), or 0.0 if no reads were made.
    ///
    /// Rejected payloads count against the rate: the caller got its default back.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses + self.rejected;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }

    pub fn record_hit(&mut self) {
        self.hits += 1;
    }

    pub fn record_miss(&mut self) {
        self.misses += 1;
    }

    pub fn record_rejected(&mut self) {
        self.rejected += 1;
    }

    /// Adds `count` written entries.
    pub fn record_writes(&mut self, count: usize) {
        self.writes += count as u64;
    }
}
