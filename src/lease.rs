//! Distributed mutual exclusion keyed by recipient.
//!
//! `Acquire` is a plain `SET key value NX EX ttl`, already atomic. `Renew`
//! and `Release` need a compare against the current owner before acting,
//! so both are implemented as `redis::Script` invocations: a single
//! round-trip, server-side, no TOCTOU window between the `GET` and the
//! `EXPIRE`/`DEL`.

use std::time::Duration;

use crate::error::{QueueError, Result};
use crate::redis_pool::RedisPool;

/// Renews only if the stored value still matches `owner_id`. Returns 1 if
/// renewed, 0 otherwise.
static RENEW_SCRIPT: &str = r#"
if redis.call("GET", KEYS[1]) == ARGV[1] then
    return redis.call("PEXPIRE", KEYS[1], ARGV[2])
else
    return 0
end
"#;

/// Deletes only if the stored value still matches `owner_id`. Returns 1 if
/// deleted, 0 otherwise.
static RELEASE_SCRIPT: &str = r#"
if redis.call("GET", KEYS[1]) == ARGV[1] then
    return redis.call("DEL", KEYS[1])
else
    return 0
end
"#;

pub struct Lease<'a> {
    pool: &'a RedisPool,
}

impl<'a> Lease<'a> {
    pub fn new(pool: &'a RedisPool) -> Self {
        Self { pool }
    }

    /// Atomically sets `key = owner_id` only if `key` is absent, with the
    /// given expiration. Returns `true` on acquisition.
    pub async fn acquire(&self, key: &str, owner_id: &str, ttl: Duration) -> Result<bool> {
        let mut conn = self.pool.get().await.map_err(QueueError::generic)?;
        let reply: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(owner_id)
            .arg("NX")
            .arg("PX")
            .arg(ttl.as_millis() as i64)
            .query_async(&mut *conn)
            .await
            .map_err(QueueError::StorageUnavailable)?;
        Ok(reply.is_some())
    }

    /// Extends expiration to `ttl` only if the current owner is `owner_id`.
    pub async fn renew(&self, key: &str, owner_id: &str, ttl: Duration) -> Result<bool> {
        let mut conn = self.pool.get().await.map_err(QueueError::generic)?;
        let renewed: i64 = redis::Script::new(RENEW_SCRIPT)
            .key(key)
            .arg(owner_id)
            .arg(ttl.as_millis() as i64)
            .invoke_async(&mut *conn)
            .await
            .map_err(QueueError::StorageUnavailable)?;
        Ok(renewed == 1)
    }

    /// Deletes `key` only if the current owner is `owner_id`.
    pub async fn release(&self, key: &str, owner_id: &str) -> Result<bool> {
        let mut conn = self.pool.get().await.map_err(QueueError::generic)?;
        let released: i64 = redis::Script::new(RELEASE_SCRIPT)
            .key(key)
            .arg(owner_id)
            .invoke_async(&mut *conn)
            .await
            .map_err(QueueError::StorageUnavailable)?;
        Ok(released == 1)
    }
}
