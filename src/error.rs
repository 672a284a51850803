//! Error types for the cache client
//!
//! Provides unified error handling using thiserror.

use thiserror::Error;

use crate::store::StoreError;

// == Cache Error Enum ==
/// Unified error type for the cache client.
///
/// Messages never carry secret material: secret-related variants describe the
/// shape of the rejected input, not its contents.
#[derive(Error, Debug)]
pub enum CacheError {
    /// Input has the wrong kind (boolean where text was expected, missing secret, ...)
    #[error("Type mismatch: {0}")]
    TypeMismatch(String),

    /// Logical key is empty, too long or contains a reserved character
    #[error("Invalid key: {0}")]
    InvalidKey(String),

    /// Webapp prefix is not 3-32 alphanumeric characters
    #[error("Invalid prefix: {0}")]
    InvalidPrefix(String),

    /// Hash salt is too short
    #[error("Invalid salt: {0}")]
    InvalidSalt(String),

    /// TTL is negative, in the past, or cannot be parsed
    #[error("Invalid TTL: {0}")]
    InvalidTtl(String),

    /// Secret has the wrong length, encoding or looks like a password
    #[error("Invalid secret: {0}")]
    InvalidSecret(String),

    /// Configuration source could not be read or parsed
    #[error("Config parse error: {0}")]
    ConfigParse(String),

    /// Encryption was requested but no usable secret is provisioned
    #[error("Encryption unavailable: {0}")]
    EncryptionUnavailable(String),

    /// Failure reported by the underlying store
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Client was disposed and no longer touches the store
    #[error("Cache client is disabled")]
    Disabled,
}

impl CacheError {
    // == Classification ==
    /// Returns true for the invalid-argument class of conditions.
    pub fn is_invalid_argument(&self) -> bool {
        matches!(
            self,
            CacheError::InvalidKey(_)
                | CacheError::InvalidPrefix(_)
                | CacheError::InvalidSalt(_)
                | CacheError::InvalidTtl(_)
                | CacheError::InvalidSecret(_)
        )
    }
}

// == Result Type Alias ==
/// Convenience Result type for the cache client.
pub type Result<T> = std::result::Result<T, CacheError>;
