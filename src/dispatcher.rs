//! Long-running loop that converts `active_recipients` membership into
//! serialized per-recipient delivery.
//!
//! Scheduling model: a supervisor task periodically scans
//! `active_recipients` and spawns one task per recipient not already
//! being served by this worker process. Mutual exclusion across worker
//! processes is entirely the [`crate::lease::Lease`]'s responsibility;
//! this process only tracks which recipients *it* currently has a task
//! running for, to avoid spawning a second task for a recipient it is
//! already serving.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use redis::AsyncCommands;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::error::{QueueError, Result};
use crate::keys;
use crate::lease::Lease;
use crate::model::QueuedMessage;
use crate::redis_pool::RedisPool;
use crate::transport::{SendOutcome, Transport};
use crate::{delivery, redis_pool};

/// Move-to-inflight timeout for each blocking pop. Short so the
/// per-recipient loop notices cancellation promptly even when the queue
/// is empty.
const POP_BLOCK: Duration = Duration::from_millis(500);

struct Shared {
    pool: RedisPool,
    transport: Arc<dyn Transport>,
    cfg: Config,
    self_id: String,
}

pub struct Dispatcher {
    shared: Arc<Shared>,
}

impl Dispatcher {
    pub fn new(pool: RedisPool, transport: Arc<dyn Transport>, cfg: Config) -> Self {
        let self_id = uuid::Uuid::new_v4().to_string();
        tracing::info!(worker_id = %self_id, "dispatcher worker starting");
        Self {
            shared: Arc::new(Shared {
                pool,
                transport,
                cfg,
                self_id,
            }),
        }
    }

    pub async fn connect(backend_url: &str, transport: Arc<dyn Transport>, cfg: Config) -> Result<Self> {
        let pool = redis_pool::build_pool(backend_url, 16).await?;
        Ok(Self::new(pool, transport, cfg))
    }

    /// Reconstructs `active_recipients` from persistent state: any
    /// `queue:*` key with non-zero length gets its derived recipient
    /// added. This is the crash-recovery mechanism and MUST complete
    /// before the supervisor loop starts handing out work.
    pub async fn replay_startup_state(&self) -> Result<()> {
        let mut conn = self.shared.pool.get().await.map_err(QueueError::generic)?;
        let mut cursor: u64 = 0;
        let mut recovered = 0usize;
        loop {
            let (next_cursor, batch): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg("queue:*")
                .arg("COUNT")
                .arg(200)
                .query_async(&mut *conn)
                .await
                .map_err(QueueError::StorageUnavailable)?;

            for key in batch {
                let Some(recipient_id) = keys::recipient_id_from_queue_key(&key) else {
                    continue;
                };
                let len: u64 = conn.llen(&key).await.map_err(QueueError::StorageUnavailable)?;
                if len > 0 {
                    let _: () = conn
                        .sadd(keys::ACTIVE_RECIPIENTS, recipient_id)
                        .await
                        .map_err(QueueError::StorageUnavailable)?;
                    recovered += 1;
                }
            }

            cursor = next_cursor;
            if cursor == 0 {
                break;
            }
        }
        tracing::info!(recovered_recipients = recovered, "startup replay complete");
        Ok(())
    }

    /// Runs the supervisor loop until `shutdown` is cancelled. Replays
    /// startup state first.
    pub async fn run(&self, shutdown: CancellationToken) -> Result<()> {
        self.replay_startup_state().await?;

        let mut running: HashMap<String, JoinHandle<()>> = HashMap::new();
        let mut scan_interval = tokio::time::interval(self.shared.cfg.dispatcher_scan_interval);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    tracing::info!("dispatcher shutting down, waiting for in-flight deliveries");
                    break;
                }
                _ = scan_interval.tick() => {
                    running.retain(|_, handle| !handle.is_finished());

                    let active: Vec<String> = {
                        let mut conn = self.shared.pool.get().await.map_err(QueueError::generic)?;
                        conn.smembers(keys::ACTIVE_RECIPIENTS)
                            .await
                            .map_err(QueueError::StorageUnavailable)?
                    };

                    for recipient_id in active {
                        if running.contains_key(&recipient_id) {
                            continue;
                        }
                        let shared = Arc::clone(&self.shared);
                        let rid = recipient_id.clone();
                        let task_shutdown = shutdown.clone();
                        let handle = tokio::spawn(async move {
                            if let Err(err) = serve_recipient(shared, &rid, task_shutdown).await {
                                tracing::error!(recipient_id = %rid, error = %err, "per-recipient task ended with an error");
                            }
                        });
                        running.insert(recipient_id, handle);
                    }
                }
            }
        }

        for (recipient_id, handle) in running {
            if let Err(err) = handle.await {
                tracing::error!(recipient_id = %recipient_id, error = %err, "per-recipient task panicked during shutdown");
            }
        }
        tracing::info!("dispatcher shut down");
        Ok(())
    }
}

/// One recipient's serialized delivery session: acquire the lease, drain
/// the queue, release the lease. Returns without error if another worker
/// already owns the lease (`Ok(())`, not a failure — the supervisor will
/// simply not find this recipient worth re-spawning until this worker's
/// task map forgets it).
async fn serve_recipient(shared: Arc<Shared>, recipient_id: &str, shutdown: CancellationToken) -> Result<()> {
    let lease = Lease::new(&shared.pool);
    let lease_key = keys::lease(recipient_id);

    if !lease.acquire(&lease_key, &shared.self_id, shared.cfg.lease_ttl).await? {
        return Ok(());
    }

    recover_inflight(&shared, recipient_id).await?;

    let result = drain_recipient(&shared, recipient_id, &lease, &lease_key, &shutdown).await;

    if !lease.release(&lease_key, &shared.self_id).await? {
        tracing::warn!(recipient_id, "lease was already lost by the time of release");
    }

    result
}

/// Only the lease holder for a recipient ever touches `inflight:{r}`, so
/// finding anything there when a lease is freshly acquired means the
/// previous holder crashed between popping a message and acking it.
/// Moves every leftover entry back to the head of `queue:{r}`, oldest
/// first, so it is re-attempted before anything enqueued since. No
/// separate reaper task is needed because lease ownership already
/// serializes access to the inflight list.
async fn recover_inflight(shared: &Shared, recipient_id: &str) -> Result<()> {
    let queue_key = keys::queue(recipient_id);
    let inflight_key = keys::inflight(recipient_id);
    let mut conn = shared.pool.get().await.map_err(QueueError::generic)?;

    let mut recovered = 0u32;
    loop {
        let moved: Option<Vec<u8>> = conn
            .lmove(
                &inflight_key,
                &queue_key,
                redis::Direction::Right,
                redis::Direction::Left,
            )
            .await
            .map_err(QueueError::StorageUnavailable)?;
        if moved.is_none() {
            break;
        }
        recovered += 1;
    }
    if recovered > 0 {
        tracing::warn!(recipient_id, recovered, "recovered in-flight message(s) left by a previous worker");
    }
    Ok(())
}

async fn drain_recipient(
    shared: &Shared,
    recipient_id: &str,
    lease: &Lease<'_>,
    lease_key: &str,
    shutdown: &CancellationToken,
) -> Result<()> {
    let queue_key = keys::queue(recipient_id);
    let inflight_key = keys::inflight(recipient_id);
    let dlq_key = keys::dlq(recipient_id);
    let mut first_message = true;

    loop {
        if shutdown.is_cancelled() {
            tracing::info!(recipient_id, "stopping drain for recipient on shutdown");
            break;
        }

        let popped: Option<Vec<u8>> = {
            let mut conn = shared.pool.get().await.map_err(QueueError::generic)?;
            conn.blmove(
                &queue_key,
                &inflight_key,
                redis::Direction::Left,
                redis::Direction::Right,
                POP_BLOCK.as_secs_f64(),
            )
            .await
            .map_err(QueueError::StorageUnavailable)?
        };

        let Some(raw) = popped else {
            // Empty-but-member race: double-check under the lease before
            // giving up membership, in case a concurrent enqueue landed
            // between the pop and the membership check.
            let mut conn = shared.pool.get().await.map_err(QueueError::generic)?;
            let _: () = conn
                .srem(keys::ACTIVE_RECIPIENTS, recipient_id)
                .await
                .map_err(QueueError::StorageUnavailable)?;
            let len: u64 = conn.llen(&queue_key).await.map_err(QueueError::StorageUnavailable)?;
            if len > 0 {
                let _: () = conn
                    .sadd(keys::ACTIVE_RECIPIENTS, recipient_id)
                    .await
                    .map_err(QueueError::StorageUnavailable)?;
                continue;
            }
            break;
        };

        let msg = match QueuedMessage::from_bytes(&raw) {
            Ok(msg) => msg,
            Err(_) => {
                // MalformedPayload: treated as PermanentTransportFail without
                // a send attempt, routed straight to the DLQ.
                tracing::warn!(recipient_id, "dropping malformed queue payload to DLQ");
                move_to_dlq(shared, &inflight_key, &dlq_key, &raw).await?;
                continue;
            }
        };

        if msg.retry_count > shared.cfg.max_retries {
            tracing::warn!(recipient_id, retry_count = msg.retry_count, "retry bound exceeded at dequeue, routing to DLQ");
            move_to_dlq(shared, &inflight_key, &dlq_key, &raw).await?;
            continue;
        }

        if !lease.renew(lease_key, &shared.self_id, shared.cfg.lease_ttl).await? {
            return Err(QueueError::LeaseLost {
                recipient_id: recipient_id.to_string(),
            });
        }

        let skip_delay = first_message;
        first_message = false;

        let outcome = delivery::deliver(
            shared.transport.as_ref(),
            recipient_id,
            &msg.text,
            skip_delay,
            &shared.cfg,
        )
        .await;

        match outcome {
            SendOutcome::Success => {
                remove_from_inflight(shared, &inflight_key, &raw).await?;
            }
            SendOutcome::Transient if msg.retry_count < shared.cfg.max_retries => {
                let mut retried = msg.clone();
                retried.retry_count += 1;
                let retried_bytes = retried.to_bytes()?;

                requeue_head(shared, &inflight_key, &queue_key, &raw, &retried_bytes).await?;

                let backoff = backoff_for(retried.retry_count, shared.cfg.base_backoff, shared.cfg.max_backoff);
                tokio::time::sleep(backoff).await;
            }
            SendOutcome::Transient | SendOutcome::Permanent => {
                move_to_dlq(shared, &inflight_key, &dlq_key, &raw).await?;
            }
        }
    }

    Ok(())
}

async fn remove_from_inflight(shared: &Shared, inflight_key: &str, raw: &[u8]) -> Result<()> {
    let mut conn = shared.pool.get().await.map_err(QueueError::generic)?;
    let _: () = conn
        .lrem(inflight_key, 1, raw)
        .await
        .map_err(QueueError::StorageUnavailable)?;
    Ok(())
}

/// Removes `raw` from `inflight:{r}` and pushes `retried_bytes` onto the
/// head of `queue:{r}` in a single atomic pipeline, so a crash between the
/// two writes can never drop the message: it is either still in
/// `inflight:{r}` for `recover_inflight` to find, or already at the head
/// of `queue:{r}`, never neither.
async fn requeue_head(
    shared: &Shared,
    inflight_key: &str,
    queue_key: &str,
    raw: &[u8],
    retried_bytes: &[u8],
) -> Result<()> {
    let mut conn = shared.pool.get().await.map_err(QueueError::generic)?;
    let _: () = redis::pipe()
        .atomic()
        .lrem(inflight_key, 1, raw)
        .lpush(queue_key, retried_bytes)
        .query_async(&mut *conn)
        .await
        .map_err(QueueError::StorageUnavailable)?;
    Ok(())
}

async fn move_to_dlq(shared: &Shared, inflight_key: &str, dlq_key: &str, raw: &[u8]) -> Result<()> {
    let mut conn = shared.pool.get().await.map_err(QueueError::generic)?;
    let _: () = redis::pipe()
        .atomic()
        .lrem(inflight_key, 1, raw)
        .rpush(dlq_key, raw)
        .query_async(&mut *conn)
        .await
        .map_err(QueueError::StorageUnavailable)?;
    Ok(())
}

/// `min(BaseBackoff * 2^retry_count, MaxBackoff)`.
fn backoff_for(retry_count: u32, base: Duration, max: Duration) -> Duration {
    let scaled = base.as_secs_f64() * 2f64.powi(retry_count as i32);
    Duration::from_secs_f64(scaled.min(max.as_secs_f64()))
}
