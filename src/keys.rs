//! Key Addressing Module
//!
//! Turns user-facing cache keys into store keys of the form `PREFIX_hash`,
//! where the hash is an HMAC-SHA256 of the trimmed key under the client's salt.

use std::fmt;

use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::error::{CacheError, Result};

type HmacSha256 = Hmac<Sha256>;

// == Public Constants ==
/// Maximum allowed logical key length in bytes (after trimming)
pub const MAX_KEY_LENGTH: usize = 255;

/// Characters that may not appear in a logical key
pub const RESERVED_KEY_CHARS: [char; 8] = ['{', '}', '(', ')', '/', '\\', '@', ':'];

/// Prefix used when none is configured
pub const DEFAULT_PREFIX: &str = "DEFAULT";

/// Salt used when none is configured
pub const DEFAULT_SALT: &str = "6Hq2Vk#nZ7wP$4tR9sLc!xB3mJ8dF0gY";

/// Minimum salt length in characters
pub const MIN_SALT_LENGTH: usize = 8;

const PREFIX_LENGTH: std::ops::RangeInclusive<usize> = 3..=32;

// == Key Addresser ==
/// Maps logical keys to store keys for one client instance.
#[derive(Clone)]
pub struct KeyAddresser {
    prefix: String,
    salt: String,
}

impl KeyAddresser {
    // == Constructor ==
    /// Validates prefix and salt, falling back to the defaults when absent.
    ///
    /// The prefix is trimmed and upper-cased; the salt is trimmed.
    pub fn new(prefix: Option<&str>, salt: Option<&str>) -> Result<Self> {
        let prefix = match prefix {
            Some(prefix) => validate_prefix(prefix)?,
            None => DEFAULT_PREFIX.to_string(),
        };
        let salt = match salt {
            Some(salt) => validate_salt(salt)?,
            None => DEFAULT_SALT.to_string(),
        };
        Ok(Self { prefix, salt })
    }

    /// The normalized webapp prefix.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    // == Address ==
    /// Computes the store key for a logical key.
    ///
    /// Fails with `InvalidKey` for keys that are blank, longer than
    /// [`MAX_KEY_LENGTH`] bytes after trimming, or contain a reserved character.
    pub fn address(&self, key: &str) -> Result<String> {
        let key = validate_key(key)?;

        // HMAC accepts keys of any length, so this cannot fail.
        let mut mac = HmacSha256::new_from_slice(self.salt.as_bytes())
            .map_err(|_| CacheError::InvalidSalt("salt rejected by HMAC".to_string()))?;
        mac.update(key.as_bytes());
        let digest = mac.finalize().into_bytes();

        Ok(format!("{}_{}", self.prefix, hex::encode(digest)))
    }

    /// Computes store keys for a batch, failing on the first invalid key.
    pub fn address_all<I, K>(&self, keys: I) -> Result<Vec<String>>
    where
        I: IntoIterator<Item = K>,
        K: AsRef<str>,
    {
        keys.into_iter().map(|key| self.address(key.as_ref())).collect()
    }

    // == Scan Pattern ==
    /// Glob matching every store key owned by this prefix.
    pub fn scan_pattern(&self) -> String {
        format!("{}_*", self.prefix)
    }
}

impl fmt::Debug for KeyAddresser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyAddresser")
            .field("prefix", &self.prefix)
            .field("salt", &"<redacted>")
            .finish()
    }
}

// == Validation ==
fn validate_key(key: &str) -> Result<&str> {
    let trimmed = key.trim();
    if trimmed.is_empty() {
        return Err(CacheError::InvalidKey("key cannot be empty".to_string()));
    }
    if trimmed.len() > MAX_KEY_LENGTH {
        return Err(CacheError::InvalidKey(format!(
            "key exceeds maximum length of {} bytes",
            MAX_KEY_LENGTH
        )));
    }
    if let Some(reserved) = trimmed.chars().find(|c| RESERVED_KEY_CHARS.contains(c)) {
        return Err(CacheError::InvalidKey(format!(
            "key contains reserved character '{}'",
            reserved
        )));
    }
    Ok(trimmed)
}

fn validate_prefix(prefix: &str) -> Result<String> {
    let trimmed = prefix.trim();
    if !PREFIX_LENGTH.contains(&trimmed.len()) {
        return Err(CacheError::InvalidPrefix(format!(
            "prefix must be between {} and {} characters",
            PREFIX_LENGTH.start(),
            PREFIX_LENGTH.end()
        )));
    }
    if !trimmed.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(CacheError::InvalidPrefix(
            "prefix may only contain letters A-Z and digits 0-9".to_string(),
        ));
    }
    Ok(trimmed.to_ascii_uppercase())
}

fn validate_salt(salt: &str) -> Result<String> {
    let trimmed = salt.trim();
    if trimmed.chars().count() < MIN_SALT_LENGTH {
        return Err(CacheError::InvalidSalt(format!(
            "salt must be at least {} characters",
            MIN_SALT_LENGTH
        )));
    }
    Ok(trimmed.to_string())
}
