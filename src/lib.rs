//! Sealed Cache - a key-value cache client with sealed values
//!
//! Salted key addressing, TTL normalization and optional XChaCha20-Poly1305
//! sealing over a pluggable store backend.

pub mod client;
pub mod config;
pub mod crypto;
pub mod error;
pub mod keys;
pub mod store;
pub mod tasks;
pub mod ttl;

pub use client::{CacheClient, CacheClientBuilder, ClientState, ClientStats};
pub use config::CacheConfig;
pub use crypto::{AeadCodec, EncryptedEnvelope, SecretInput, SecretManager, SecretState};
pub use error::{CacheError, Result};
pub use keys::KeyAddresser;
pub use store::{MemoryStore, Store, StoreError};
pub use tasks::spawn_sweeper;
pub use ttl::{Ttl, TtlInterval, TtlNormalizer, TtlSeconds};
