//! Secret Management Module
//!
//! Holds the 32-byte symmetric secret used by the AEAD codec.
//!
//! Lifecycle: `Unset -> Validated -> Zeroed`. `Zeroed` is terminal. Secret bytes
//! live in a `ZeroizeOnDrop` buffer, candidate material passes through
//! `Zeroizing` buffers, and nothing here ever formats secret bytes.

use std::fmt;
use std::path::Path;

use serde::Deserialize;
use serde_json::Value;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use crate::config::CacheConfig;
use crate::error::{CacheError, Result};

// == Public Constants ==
/// Required secret length in bytes
pub const SECRET_LEN: usize = 32;

// == Secret Key ==
#[derive(Zeroize, ZeroizeOnDrop)]
struct SecretKey([u8; SECRET_LEN]);

// == Secret Input ==
/// The shapes a secret may be provisioned from.
pub enum SecretInput<'a> {
    /// Exactly 32 raw bytes
    Raw(&'a [u8]),
    /// 64 hex characters
    Hex(&'a str),
    /// A configuration payload carrying a hex `secret`
    Config(&'a CacheConfig),
}

/// Observable lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecretState {
    Unset,
    Validated,
    Zeroed,
}

enum Slot {
    Unset,
    Validated(SecretKey),
    Zeroed,
}

// == Secret Manager ==
/// Owns, validates and erases the codec secret.
pub struct SecretManager {
    slot: Slot,
}

impl Default for SecretManager {
    fn default() -> Self {
        Self { slot: Slot::Unset }
    }
}

impl SecretManager {
    // == Constructors ==
    /// Creates a manager without a secret.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a manager provisioned from `input`.
    pub fn with_secret(input: SecretInput<'_>) -> Result<Self> {
        let mut manager = Self::new();
        manager.provision(input)?;
        Ok(manager)
    }

    /// Reads a configuration document and provisions from its `secret` field.
    pub fn load_from_config(path: impl AsRef<Path>) -> Result<Self> {
        let config = CacheConfig::from_file(path)?;
        Self::with_secret(SecretInput::Config(&config))
    }

    // == State ==
    /// Current lifecycle state.
    pub fn state(&self) -> SecretState {
        match self.slot {
            Slot::Unset => SecretState::Unset,
            Slot::Validated(_) => SecretState::Validated,
            Slot::Zeroed => SecretState::Zeroed,
        }
    }

    // == Provision ==
    /// Validates and installs a secret, replacing (and erasing) any previous one.
    ///
    /// A failed call leaves the previous state untouched; the rejected candidate
    /// is erased before returning.
    pub fn provision(&mut self, input: SecretInput<'_>) -> Result<()> {
        self.ensure_not_zeroed()?;
        let candidate = decode_input(input)?;
        self.install(candidate)
    }

    /// Provisions from a JSON-typed value: a hex string, an array of byte values,
    /// or a configuration object.
    pub fn provision_value(&mut self, value: &Value) -> Result<()> {
        self.ensure_not_zeroed()?;
        match value {
            Value::String(hex) => self.provision(SecretInput::Hex(hex)),
            Value::Array(items) => {
                let mut candidate = Zeroizing::new(Vec::with_capacity(items.len()));
                for item in items {
                    let byte = item
                        .as_u64()
                        .and_then(|n| u8::try_from(n).ok())
                        .ok_or_else(|| {
                            CacheError::TypeMismatch(
                                "secret byte arrays may only hold values 0-255".to_string(),
                            )
                        })?;
                    candidate.push(byte);
                }
                self.install(candidate)
            }
            Value::Object(_) => {
                // Deserialize from the borrowed value: no unzeroized copy of the secret.
                let config = CacheConfig::deserialize(value)
                    .map_err(|err| CacheError::ConfigParse(err.to_string()))?;
                self.provision(SecretInput::Config(&config))
            }
            Value::Null => Err(CacheError::TypeMismatch("secret cannot be null".to_string())),
            Value::Bool(_) | Value::Number(_) => Err(CacheError::TypeMismatch(
                "secret must be bytes, a hex string or a configuration object".to_string(),
            )),
        }
    }

    // == Zero ==
    /// Overwrites the secret with zeros and retires the manager for good.
    pub fn zero(&mut self) {
        if let Slot::Validated(key) = &mut self.slot {
            key.zeroize();
        }
        self.slot = Slot::Zeroed;
    }

    // == Key Access ==
    /// Lends the secret to `f` without letting it escape.
    pub(crate) fn with_key<R>(&self, f: impl FnOnce(&[u8; SECRET_LEN]) -> R) -> Result<R> {
        match &self.slot {
            Slot::Validated(key) => Ok(f(&key.0)),
            Slot::Unset => Err(CacheError::EncryptionUnavailable(
                "no secret has been provisioned".to_string(),
            )),
            Slot::Zeroed => Err(CacheError::EncryptionUnavailable(
                "secret has been zeroed".to_string(),
            )),
        }
    }

    fn ensure_not_zeroed(&self) -> Result<()> {
        if matches!(self.slot, Slot::Zeroed) {
            return Err(CacheError::EncryptionUnavailable(
                "secret manager has been zeroed".to_string(),
            ));
        }
        Ok(())
    }

    fn install(&mut self, candidate: Zeroizing<Vec<u8>>) -> Result<()> {
        let key = validate(candidate)?;
        if let Slot::Validated(previous) = &mut self.slot {
            previous.zeroize();
        }
        self.slot = Slot::Validated(key);
        Ok(())
    }
}

impl Drop for SecretManager {
    fn drop(&mut self) {
        self.zero();
    }
}

impl fmt::Debug for SecretManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecretManager")
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

// == Decoding & Validation ==
fn decode_input(input: SecretInput<'_>) -> Result<Zeroizing<Vec<u8>>> {
    match input {
        SecretInput::Raw(bytes) => Ok(Zeroizing::new(bytes.to_vec())),
        SecretInput::Hex(text) => decode_hex(text),
        SecretInput::Config(config) => match config.secret.as_ref() {
            Some(hex) => decode_hex(hex),
            None => Err(CacheError::TypeMismatch(
                "configuration does not contain a secret".to_string(),
            )),
        },
    }
}

/// Decodes into zeroizing storage, so a partially decoded secret is erased
/// when decoding fails midway.
fn decode_hex(text: &str) -> Result<Zeroizing<Vec<u8>>> {
    let trimmed = text.trim();
    if trimmed.len() != SECRET_LEN * 2 {
        return Err(CacheError::InvalidSecret(format!(
            "hex secret must be {} characters, got {}",
            SECRET_LEN * 2,
            trimmed.len()
        )));
    }
    let mut decoded = Zeroizing::new([0u8; SECRET_LEN]);
    hex::decode_to_slice(trimmed, decoded.as_mut_slice())
        .map_err(|_| CacheError::InvalidSecret("secret is not valid hex".to_string()))?;
    Ok(Zeroizing::new(decoded.to_vec()))
}

/// Rejects candidates of the wrong length, and candidates made only of
/// printable ASCII.
///
/// The printable check is a heuristic against passwords typed in place of key
/// material, not a randomness test: 32 random bytes are all printable with
/// probability (95/256)^32, about 1e-14.
fn validate(candidate: Zeroizing<Vec<u8>>) -> Result<SecretKey> {
    if candidate.len() != SECRET_LEN {
        return Err(CacheError::InvalidSecret(format!(
            "secret must be {} bytes, got {}",
            SECRET_LEN,
            candidate.len()
        )));
    }
    if candidate.iter().all(|b| (0x20..=0x7e).contains(b)) {
        return Err(CacheError::InvalidSecret(
            "secret consists only of printable characters and looks like a password".to_string(),
        ));
    }
    let mut key = SecretKey([0u8; SECRET_LEN]);
    key.0.copy_from_slice(&candidate);
    Ok(key)
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn random_secret() -> [u8; SECRET_LEN] {
        use rand::RngCore;
        loop {
            let mut bytes = [0u8; SECRET_LEN];
            rand::rngs::OsRng.fill_bytes(&mut bytes);
            if !bytes.iter().all(|b| (0x20..=0x7e).contains(b)) {
                return bytes;
            }
        }
    }

    #[test]
    fn test_new_is_unset() {
        let manager = SecretManager::new();
        assert_eq!(manager.state(), SecretState::Unset);
        assert!(matches!(
            manager.with_key(|_| ()),
            Err(CacheError::EncryptionUnavailable(_))
        ));
    }

    #[test]
    fn test_provision_raw() {
        let secret = random_secret();
        let manager = SecretManager::with_secret(SecretInput::Raw(&secret)).unwrap();

        assert_eq!(manager.state(), SecretState::Validated);
        assert_eq!(manager.with_key(|key| *key).unwrap(), secret);
    }

    #[test]
    fn test_provision_hex() {
        let secret = random_secret();
        let hex = hex::encode(secret);
        let manager = SecretManager::with_secret(SecretInput::Hex(&hex)).unwrap();

        assert_eq!(manager.with_key(|key| *key).unwrap(), secret);
    }

    #[test]
    fn test_provision_config() {
        let secret = random_secret();
        let config = CacheConfig {
            secret: Some(Zeroizing::new(hex::encode(secret))),
            ..CacheConfig::default()
        };
        let manager = SecretManager::with_secret(SecretInput::Config(&config)).unwrap();

        assert_eq!(manager.with_key(|key| *key).unwrap(), secret);
    }

    #[test]
    fn test_config_without_secret_is_type_mismatch() {
        let config = CacheConfig::default();
        assert!(matches!(
            SecretManager::with_secret(SecretInput::Config(&config)),
            Err(CacheError::TypeMismatch(_))
        ));
    }

    #[test]
    fn test_wrong_lengths_rejected() {
        let secret = random_secret();

        let mut too_long = secret.to_vec();
        too_long.push(0x01);

        for bytes in [&secret[..31], too_long.as_slice()] {
            assert!(matches!(
                SecretManager::with_secret(SecretInput::Raw(bytes)),
                Err(CacheError::InvalidSecret(_))
            ));
        }

        let short_hex = hex::encode(&secret[..31]);
        let long_hex = format!("{}00", hex::encode(secret));
        for hex in [short_hex, long_hex] {
            assert!(matches!(
                SecretManager::with_secret(SecretInput::Hex(&hex)),
                Err(CacheError::InvalidSecret(_))
            ));
        }
    }

    #[test]
    fn test_hex_failing_late_keeps_previous_secret() {
        let secret = random_secret();
        let mut manager = SecretManager::with_secret(SecretInput::Raw(&secret)).unwrap();
        let bad_tail = format!("{}zz", &hex::encode(secret)[..62]);

        assert!(matches!(
            manager.provision(SecretInput::Hex(&bad_tail)),
            Err(CacheError::InvalidSecret(_))
        ));
        assert_eq!(manager.with_key(|key| *key).unwrap(), secret);
    }

    #[test]
    fn test_hex_surrounding_whitespace_accepted() {
        let secret = random_secret();
        let padded = format!("  {}\n", hex::encode(secret));
        let manager = SecretManager::with_secret(SecretInput::Hex(&padded)).unwrap();

        assert_eq!(manager.with_key(|key| *key).unwrap(), secret);
    }

    #[test]
    fn test_non_hex_rejected() {
        let text = "zz".repeat(32);
        assert!(matches!(
            SecretManager::with_secret(SecretInput::Hex(&text)),
            Err(CacheError::InvalidSecret(_))
        ));
    }

    #[test]
    fn test_printable_secret_rejected() {
        let password = b"correct horse battery staple 123";
        assert_eq!(password.len(), SECRET_LEN);

        assert!(matches!(
            SecretManager::with_secret(SecretInput::Raw(password)),
            Err(CacheError::InvalidSecret(_))
        ));
    }

    #[test]
    fn test_failed_provision_keeps_previous_secret() {
        let secret = random_secret();
        let mut manager = SecretManager::with_secret(SecretInput::Raw(&secret)).unwrap();

        assert!(manager.provision(SecretInput::Raw(&secret[..10])).is_err());
        assert_eq!(manager.with_key(|key| *key).unwrap(), secret);
    }

    #[test]
    fn test_replacing_secret() {
        let first = random_secret();
        let second = random_secret();
        let mut manager = SecretManager::with_secret(SecretInput::Raw(&first)).unwrap();

        manager.provision(SecretInput::Raw(&second)).unwrap();
        assert_eq!(manager.with_key(|key| *key).unwrap(), second);
    }

    #[test]
    fn test_zero_is_terminal() {
        let secret = random_secret();
        let mut manager = SecretManager::with_secret(SecretInput::Raw(&secret)).unwrap();

        manager.zero();

        assert_eq!(manager.state(), SecretState::Zeroed);
        assert!(matches!(
            manager.with_key(|_| ()),
            Err(CacheError::EncryptionUnavailable(_))
        ));
        assert!(matches!(
            manager.provision(SecretInput::Raw(&secret)),
            Err(CacheError::EncryptionUnavailable(_))
        ));
    }

    #[test]
    fn test_secret_key_zeroize_overwrites_bytes() {
        let mut key = SecretKey([0xAB; SECRET_LEN]);
        key.zeroize();
        assert_eq!(key.0, [0u8; SECRET_LEN]);
    }

    #[test]
    fn test_provision_value_shapes() {
        let secret = random_secret();

        let mut manager = SecretManager::new();
        manager.provision_value(&json!(hex::encode(secret))).unwrap();
        assert_eq!(manager.with_key(|key| *key).unwrap(), secret);

        let mut manager = SecretManager::new();
        manager.provision_value(&json!(secret.to_vec())).unwrap();
        assert_eq!(manager.with_key(|key| *key).unwrap(), secret);

        let mut manager = SecretManager::new();
        manager
            .provision_value(&json!({ "secret": hex::encode(secret) }))
            .unwrap();
        assert_eq!(manager.with_key(|key| *key).unwrap(), secret);
    }

    #[test]
    fn test_provision_value_type_mismatch() {
        for value in [json!(null), json!(true), json!(42), json!([1, 2, 300]), json!({})] {
            let mut manager = SecretManager::new();
            assert!(
                matches!(manager.provision_value(&value), Err(CacheError::TypeMismatch(_))),
                "{} should be a type mismatch",
                value
            );
        }
    }

    #[test]
    fn test_debug_never_shows_secret() {
        let secret = [0x9Fu8; SECRET_LEN];
        let manager = SecretManager::with_secret(SecretInput::Raw(&secret)).unwrap();
        let rendered = format!("{:?}", manager);

        assert!(rendered.contains("Validated"));
        assert!(!rendered.contains("159"));
        assert!(!rendered.to_lowercase().contains("9f"));
    }
}
