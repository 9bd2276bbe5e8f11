//! Read-only operator-facing access to dead-letter queues. The dispatcher
//! is the only writer; this module exists so an operator tool or metrics
//! exporter can inspect `dlq:{recipient}` without reimplementing the key
//! scheme.

use redis::AsyncCommands;

use crate::error::{QueueError, Result};
use crate::keys;
use crate::model::QueuedMessage;
use crate::redis_pool::RedisPool;

pub struct Dlq {
    pool: RedisPool,
}

impl Dlq {
    pub fn new(pool: RedisPool) -> Self {
        Self { pool }
    }

    pub async fn len(&self, recipient_id: &str) -> Result<u64> {
        let mut conn = self.pool.get().await.map_err(QueueError::generic)?;
        conn.llen(keys::dlq(recipient_id))
            .await
            .map_err(QueueError::StorageUnavailable)
    }

    /// Returns up to `count` dead-lettered messages for `recipient_id`,
    /// oldest first, without removing them.
    pub async fn peek(&self, recipient_id: &str, count: isize) -> Result<Vec<QueuedMessage>> {
        let mut conn = self.pool.get().await.map_err(QueueError::generic)?;
        let raw: Vec<Vec<u8>> = conn
            .lrange(keys::dlq(recipient_id), 0, count.saturating_sub(1).max(0))
            .await
            .map_err(QueueError::StorageUnavailable)?;
        raw.iter().map(|b| QueuedMessage::from_bytes(b)).collect()
    }
}
