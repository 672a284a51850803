//! Sealed Cache - configuration generator
//!
//! Prints a fresh configuration document with a random secret and salt.
//! Prefix, strict flag and default TTL are taken from the environment
//! (`SEALED_CACHE_PREFIX`, `SEALED_CACHE_STRICT`, `SEALED_CACHE_DEFAULT_TTL`);
//! a salt from `SEALED_CACHE_SALT` is kept instead of generating one.
//!
//! The document is checked by building a client from it before it is printed.

use anyhow::Context;
use rand::rngs::OsRng;
use rand::RngCore;
use serde_json::{json, Map, Value};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use zeroize::Zeroizing;

use sealed_cache::config::CacheConfig;
use sealed_cache::crypto::SECRET_LEN;
use sealed_cache::{CacheClient, MemoryStore};

fn main() -> anyhow::Result<()> {
    // Logs go to stderr so stdout carries only the document.
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "sealed_cache=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let env_config = CacheConfig::from_env().context("failed to read environment")?;

    let secret = Zeroizing::new(hex::encode(random_secret().as_slice()));
    let salt = match env_config.salt.clone() {
        Some(salt) => salt,
        None => Value::String(hex::encode(random_bytes::<16>())),
    };

    let mut document = Map::new();
    document.insert("secret".to_string(), json!(secret.as_str()));
    document.insert("salt".to_string(), salt);
    if let Some(prefix) = env_config.prefix.clone() {
        document.insert("prefix".to_string(), prefix);
    }
    if let Some(strict) = env_config.strict() {
        document.insert("strict".to_string(), json!(strict));
    }
    if let Some(ttl) = env_config.default_ttl.clone() {
        document.insert("default_ttl".to_string(), ttl);
    }
    let document = Zeroizing::new(serde_json::to_string_pretty(&Value::Object(document))?);

    let config = CacheConfig::from_json_str(&document)?;
    let client = CacheClient::builder(MemoryStore::new())
        .config(config)
        .sealed()
        .build()
        .context("generated configuration was rejected")?;
    info!(prefix = %client.prefix(), "Generated configuration");

    println!("{}", document.as_str());
    Ok(())
}

/// Random secret that passes the printable-ASCII guard.
fn random_secret() -> Zeroizing<[u8; SECRET_LEN]> {
    loop {
        let bytes = Zeroizing::new(random_bytes::<SECRET_LEN>());
        if !bytes.iter().all(|b| (0x20..=0x7e).contains(b)) {
            return bytes;
        }
    }
}

fn random_bytes<const N: usize>() -> [u8; N] {
    let mut bytes = [0u8; N];
    OsRng.fill_bytes(&mut bytes);
    bytes
}
