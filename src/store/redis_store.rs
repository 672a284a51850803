//! Redis Store Module
//!
//! Adapts a blocking `redis::Connection` to the [`Store`] trait.
//! Connection-level timeouts and retries stay with the `redis` crate.

use redis::{Commands, Connection};
use tracing::debug;

use super::{Store, StoreError};

// == Redis Store ==
/// Store backend over a single Redis connection.
pub struct RedisStore {
    connection: Connection,
}

impl RedisStore {
    // == Constructor ==
    /// Wraps an already established connection.
    pub fn new(connection: Connection) -> Self {
        Self { connection }
    }

    /// Opens a connection to `url` (e.g. `redis://127.0.0.1/`).
    pub fn open(url: &str) -> Result<Self, StoreError> {
        let client = redis::Client::open(url).map_err(unreachable)?;
        let connection = client.get_connection().map_err(unreachable)?;
        debug!("connected to redis");
        Ok(Self::new(connection))
    }

    // == Remaining TTL ==
    /// Remaining TTL as reported by `TTL`: `-1` for no expiry, `-2` for a missing key.
    pub fn ttl(&mut self, key: &str) -> Result<i64, StoreError> {
        self.connection.ttl(key).map_err(command)
    }
}

fn unreachable(err: redis::RedisError) -> StoreError {
    StoreError::Unreachable(err.to_string())
}

fn command(err: redis::RedisError) -> StoreError {
    if err.is_connection_dropped() || err.is_connection_refusal() || err.is_timeout() {
        StoreError::Unreachable(err.to_string())
    } else {
        StoreError::Command(err.to_string())
    }
}

impl Store for RedisStore {
    fn ping(&mut self) -> Result<(), StoreError> {
        let reply: String = redis::cmd("PING")
            .query(&mut self.connection)
            .map_err(unreachable)?;
        if reply == "PONG" {
            Ok(())
        } else {
            Err(StoreError::Unreachable(format!("unexpected PING reply: {}", reply)))
        }
    }

    fn get(&mut self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        self.connection.get(key).map_err(command)
    }

    fn set(
        &mut self,
        key: &str,
        value: &[u8],
        ttl_seconds: Option<u64>,
    ) -> Result<bool, StoreError> {
        let result: redis::RedisResult<()> = match ttl_seconds {
            Some(seconds) => self.connection.set_ex(key, value, seconds),
            None => self.connection.set(key, value),
        };
        result.map(|_| true).map_err(command)
    }

    fn delete(&mut self, key: &str) -> Result<u64, StoreError> {
        self.connection.unlink(key).map_err(command)
    }

    fn delete_many(&mut self, keys: &[String]) -> Result<u64, StoreError> {
        if keys.is_empty() {
            return Ok(0);
        }
        self.connection.unlink(keys).map_err(command)
    }

    fn exists(&mut self, key: &str) -> Result<bool, StoreError> {
        self.connection.exists(key).map_err(command)
    }

    fn keys(&mut self, pattern: &str) -> Result<Vec<String>, StoreError> {
        self.connection.keys(pattern).map_err(command)
    }

    fn flush_all(&mut self) -> Result<bool, StoreError> {
        redis::cmd("FLUSHDB")
            .query::<()>(&mut self.connection)
            .map(|_| true)
            .map_err(command)
    }

    fn get_many(&mut self, keys: &[String]) -> Result<Vec<Option<Vec<u8>>>, StoreError> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        redis::cmd("MGET")
            .arg(keys)
            .query(&mut self.connection)
            .map_err(command)
    }

    fn set_many(
        &mut self,
        entries: &[(String, Vec<u8>)],
        ttl_seconds: Option<u64>,
    ) -> Result<usize, StoreError> {
        let mut pipe = redis::pipe();
        for (key, value) in entries {
            match ttl_seconds {
                Some(seconds) => pipe.set_ex(key, value.as_slice(), seconds).ignore(),
                None => pipe.set(key, value.as_slice()).ignore(),
            };
        }
        pipe.query::<()>(&mut self.connection).map_err(command)?;
        Ok(entries.len())
    }
}
