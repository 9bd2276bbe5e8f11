//! Connection pool construction.
//!
//! A single `bb8::Pool` is built once at startup and cloned (cheaply, it
//! is an `Arc` internally) into every component that needs a connection.

use bb8_redis::RedisConnectionManager;

use crate::error::{QueueError, Result};

pub type RedisPool = bb8::Pool<RedisConnectionManager>;

pub async fn build_pool(dsn: &str, max_connections: u32) -> Result<RedisPool> {
    let manager = RedisConnectionManager::new(dsn).map_err(QueueError::StorageUnavailable)?;
    bb8::Pool::builder()
        .max_size(max_connections)
        .build(manager)
        .await
        .map_err(QueueError::StorageUnavailable)
}
