//! Configuration Module
//!
//! Loads client settings from a JSON document and/or environment variables.
//!
//! The document shape is `{"secret": "<64 hex chars>", "prefix": "...",
//! "salt": "...", "strict": true, "default_ttl": 300}`; every field is optional.
//! `hexkey` is accepted as an alias of `secret`.

use std::env;
use std::fmt;
use std::fs;
use std::path::Path;

use serde::Deserialize;
use serde_json::Value;
use zeroize::Zeroizing;

use crate::error::{CacheError, Result};

// == Environment Variables ==
pub const ENV_CONFIG_PATH: &str = "SEALED_CACHE_CONFIG";
pub const ENV_SECRET: &str = "SEALED_CACHE_SECRET";
pub const ENV_PREFIX: &str = "SEALED_CACHE_PREFIX";
pub const ENV_SALT: &str = "SEALED_CACHE_SALT";
pub const ENV_STRICT: &str = "SEALED_CACHE_STRICT";
pub const ENV_DEFAULT_TTL: &str = "SEALED_CACHE_DEFAULT_TTL";

/// Client configuration as read from a file or the environment.
///
/// Prefix, salt and default TTL keep their JSON type so that the client can
/// apply its typing rules (coercion vs. strict rejection) when it is built.
#[derive(Clone, Default, Deserialize)]
pub struct CacheConfig {
    /// Hex-encoded 32-byte secret
    #[serde(default, alias = "hexkey")]
    pub secret: Option<Zeroizing<String>>,
    /// Webapp prefix
    #[serde(default)]
    pub prefix: Option<Value>,
    /// Hash salt
    #[serde(default)]
    pub salt: Option<Value>,
    /// Strict typing flag; non-boolean values are ignored
    #[serde(default)]
    pub strict: Option<Value>,
    /// Default TTL applied to writes without one
    #[serde(default)]
    pub default_ttl: Option<Value>,
}

impl CacheConfig {
    // == File Loading ==
    /// Reads and parses a JSON configuration document.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = Zeroizing::new(fs::read_to_string(path).map_err(|err| {
            CacheError::ConfigParse(format!("cannot read '{}': {}", path.display(), err))
        })?);
        Self::from_json_str(&raw).map_err(|err| match err {
            CacheError::ConfigParse(msg) => {
                CacheError::ConfigParse(format!("'{}': {}", path.display(), msg))
            }
            other => other,
        })
    }

    /// Parses a JSON configuration document held in memory.
    pub fn from_json_str(raw: &str) -> Result<Self> {
        // serde_json errors carry positions only, never input excerpts.
        serde_json::from_str(raw).map_err(|err| CacheError::ConfigParse(err.to_string()))
    }

    // == Environment Loading ==
    /// Builds a configuration from environment variables.
    ///
    /// # Environment Variables
    /// - `SEALED_CACHE_CONFIG` - Path of a JSON document loaded first
    /// - `SEALED_CACHE_SECRET` - Hex secret, overrides the document
    /// - `SEALED_CACHE_PREFIX` - Webapp prefix, overrides the document
    /// - `SEALED_CACHE_SALT` - Hash salt, overrides the document
    /// - `SEALED_CACHE_STRICT` - `true`/`false`, overrides the document
    /// - `SEALED_CACHE_DEFAULT_TTL` - Default TTL (seconds or date expression)
    pub fn from_env() -> Result<Self> {
        let mut config = match env::var(ENV_CONFIG_PATH) {
            Ok(path) if !path.trim().is_empty() => Self::from_file(path.trim())?,
            _ => Self::default(),
        };

        if let Ok(secret) = env::var(ENV_SECRET) {
            config.secret = Some(Zeroizing::new(secret));
        }
        if let Ok(prefix) = env::var(ENV_PREFIX) {
            config.prefix = Some(Value::String(prefix));
        }
        if let Ok(salt) = env::var(ENV_SALT) {
            config.salt = Some(Value::String(salt));
        }
        if let Some(strict) = env::var(ENV_STRICT).ok().and_then(|v| v.parse::<bool>().ok()) {
            config.strict = Some(Value::Bool(strict));
        }
        if let Ok(ttl) = env::var(ENV_DEFAULT_TTL) {
            config.default_ttl = Some(match ttl.trim().parse::<i64>() {
                Ok(seconds) => Value::from(seconds),
                Err(_) => Value::String(ttl),
            });
        }
        Ok(config)
    }

    // == Accessors ==
    /// The strict flag, if the document carries a boolean one.
    pub fn strict(&self) -> Option<bool> {
        self.strict.as_ref().and_then(Value::as_bool)
    }

    /// Whether a secret is present.
    pub fn has_secret(&self) -> bool {
        self.secret.is_some()
    }
}

impl fmt::Debug for CacheConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheConfig")
            .field("secret", &self.secret.as_ref().map(|_| "<redacted>"))
            .field("prefix", &self.prefix)
            .field("salt", &self.salt.as_ref().map(|_| "<redacted>"))
            .field("strict", &self.strict)
            .field("default_ttl", &self.default_ttl)
            .finish()
    }
}

// == Text Coercion ==
/// Reads a text setting with the client's typing rules.
///
/// Strings pass through. Numbers become their decimal text unless `strict`
/// is set. Booleans, arrays, objects and null are always rejected.
pub fn coerce_text(value: &Value, strict: bool, field: &str) -> Result<String> {
    match value {
        Value::String(text) => Ok(text.clone()),
        Value::Number(number) if !strict => Ok(number.to_string()),
        Value::Number(_) => Err(CacheError::TypeMismatch(format!(
            "{} must be a string when strict typing is enabled",
            field
        ))),
        Value::Bool(_) => Err(CacheError::TypeMismatch(format!("{} cannot be a boolean", field))),
        Value::Array(_) => Err(CacheError::TypeMismatch(format!("{} cannot be an array", field))),
        Value::Object(_) => Err(CacheError::TypeMismatch(format!("{} cannot be an object", field))),
        Value::Null => Err(CacheError::TypeMismatch(format!("{} cannot be null", field))),
    }
}
