//! Producer-facing entry point. No lock required: the enqueuer never
//! touches `lease:{recipient}`.

use std::collections::HashMap;

use crate::error::{QueueError, Result};
use crate::keys;
use crate::model::{MessageKind, QueuedMessage};
use crate::redis_pool::RedisPool;

#[derive(Clone)]
pub struct Enqueuer {
    pool: RedisPool,
}

impl Enqueuer {
    pub fn new(pool: RedisPool) -> Self {
        Self { pool }
    }

    /// Appends `text` to `recipient_id`'s queue and registers the
    /// recipient as active. Both writes happen inside a single `MULTI`/
    /// `EXEC` so a concurrent dispatcher scan never observes the queue
    /// grow without `active_recipients` gaining the member, or vice
    /// versa.
    pub async fn enqueue(
        &self,
        recipient_id: &str,
        text: &str,
        kind: MessageKind,
        metadata: HashMap<String, String>,
    ) -> Result<()> {
        let msg = QueuedMessage::new(recipient_id, text, kind, metadata)?;
        let payload = msg.to_bytes()?;

        let mut conn = self.pool.get().await.map_err(QueueError::generic)?;
        let _: () = redis::pipe()
            .atomic()
            .rpush(keys::queue(recipient_id), payload)
            .sadd(keys::ACTIVE_RECIPIENTS, recipient_id)
            .query_async(&mut *conn)
            .await
            .map_err(QueueError::StorageUnavailable)?;

        tracing::trace!(recipient_id, kind = ?msg.message_type, "enqueued message");
        Ok(())
    }
}
