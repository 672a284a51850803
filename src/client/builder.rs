//! Client Builder Module
//!
//! Resolves client settings in order: explicit builder arguments, then the
//! configuration document, then built-in defaults.

use std::path::PathBuf;

use serde_json::Value;
use tracing::info;

use super::CacheClient;
use crate::config::{coerce_text, CacheConfig};
use crate::crypto::{AeadCodec, PlainCodec, SecretInput, SecretManager, ValueCodec};
use crate::error::{CacheError, Result};
use crate::keys::KeyAddresser;
use crate::store::Store;
use crate::ttl::{Ttl, TtlNormalizer};

enum ConfigSource {
    Inline(CacheConfig),
    File(PathBuf),
}

// == Builder ==
/// Builder for [`CacheClient`]. Nothing is validated until [`build`](Self::build).
pub struct CacheClientBuilder<S: Store> {
    store: S,
    prefix: Option<Value>,
    salt: Option<Value>,
    strict: Option<bool>,
    /// Explicit secret, provisioned as soon as it is given
    secret: Option<Result<SecretManager>>,
    config: Option<ConfigSource>,
    default_ttl: Option<Ttl>,
    sealed: bool,
}

impl<S: Store> CacheClientBuilder<S> {
    pub(crate) fn new(store: S) -> Self {
        Self {
            store,
            prefix: None,
            salt: None,
            strict: None,
            secret: None,
            config: None,
            default_ttl: None,
            sealed: false,
        }
    }

    /// Webapp prefix; strings, or numbers when not strict.
    pub fn prefix(mut self, prefix: impl Into<Value>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    /// Hash salt; strings, or numbers when not strict.
    pub fn salt(mut self, salt: impl Into<Value>) -> Self {
        self.salt = Some(salt.into());
        self
    }

    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = Some(strict);
        self
    }

    /// Secret for the sealed variant. The input is copied into zeroizing
    /// storage immediately; errors surface from `build`.
    pub fn secret(mut self, input: SecretInput<'_>) -> Self {
        self.secret = Some(SecretManager::with_secret(input));
        self
    }

    /// Secret given as a JSON-typed value (hex string, byte array or config object).
    pub fn secret_value(mut self, value: Value) -> Self {
        let mut manager = SecretManager::new();
        self.secret = Some(manager.provision_value(&value).map(|()| manager));
        self
    }

    /// Configuration document already in memory. Replaces any earlier
    /// `config`/`config_file` call.
    pub fn config(mut self, config: CacheConfig) -> Self {
        self.config = Some(ConfigSource::Inline(config));
        self
    }

    /// Configuration document read at build time. Replaces any earlier
    /// `config`/`config_file` call.
    pub fn config_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.config = Some(ConfigSource::File(path.into()));
        self
    }

    pub fn default_ttl(mut self, ttl: impl Into<Ttl>) -> Self {
        self.default_ttl = Some(ttl.into());
        self
    }

    /// Requires a secret: the build fails instead of falling back to plaintext.
    pub fn sealed(mut self) -> Self {
        self.sealed = true;
        self
    }

    // == Build ==
    /// Validates every setting, then pings the store.
    pub fn build(self) -> Result<CacheClient<S>> {
        let Self {
            mut store,
            prefix,
            salt,
            strict,
            secret,
            config,
            default_ttl,
            sealed,
        } = self;

        let config = match config {
            Some(ConfigSource::Inline(config)) => config,
            Some(ConfigSource::File(path)) => CacheConfig::from_file(path)?,
            None => CacheConfig::default(),
        };
        let strict = strict.or_else(|| config.strict()).unwrap_or(false);

        let prefix = prefix
            .or_else(|| config.prefix.clone())
            .map(|value| coerce_text(&value, strict, "prefix"))
            .transpose()?;
        let salt = salt
            .or_else(|| config.salt.clone())
            .map(|value| coerce_text(&value, strict, "salt"))
            .transpose()?;
        let keys = KeyAddresser::new(prefix.as_deref(), salt.as_deref())?;

        let mut ttl = TtlNormalizer::new();
        let default_ttl = match default_ttl {
            Some(ttl) => Some(ttl),
            None => config
                .default_ttl
                .as_ref()
                .map(|value| Ttl::from_value(value, strict))
                .transpose()?,
        };
        if let Some(default_ttl) = default_ttl.filter(|ttl| *ttl != Ttl::Default) {
            ttl.set_default(&default_ttl)?;
        }

        let secret = match secret {
            Some(manager) => Some(manager?),
            None if config.has_secret() => {
                Some(SecretManager::with_secret(SecretInput::Config(&config))?)
            }
            None => None,
        };
        let has_secret = secret.is_some();
        let codec: Box<dyn ValueCodec> = match secret {
            Some(manager) => Box::new(AeadCodec::new(manager)),
            None if sealed => {
                return Err(CacheError::TypeMismatch(
                    "sealed client requires a secret".to_string(),
                ))
            }
            None => Box::new(PlainCodec),
        };

        store.ping()?;

        info!(
            prefix = %keys.prefix(),
            codec = codec.name(),
            strict,
            default_ttl = %ttl.default_ttl(),
            "Cache client ready"
        );
        Ok(CacheClient::from_parts(store, keys, ttl, codec, has_secret, strict))
    }
}
