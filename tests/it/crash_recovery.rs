//! Scenario E — crash recovery: a message left in `inflight:{r}` by a
//! simulated crash (no graceful release) is picked up and re-attempted by
//! the next worker that acquires the recipient's lease.

use std::sync::Arc;
use std::time::Duration;

use delivery_core::model::{MessageKind, QueuedMessage};
use delivery_core::transport::mock::MockTransport;
use delivery_core::SendOutcome;
use redis::AsyncCommands;

use crate::common;

#[tokio::test]
async fn inflight_message_left_by_a_crash_is_redelivered() {
    let pool = common::test_pool().await;
    let recipient_id = common::test_recipient();

    // Simulate a worker that popped "in-flight" into the inflight list
    // and then crashed before acking it, and a second, later-enqueued
    // message that never got popped at all.
    let inflight_msg = QueuedMessage::new(recipient_id.as_str(), "in-flight", MessageKind::Reactive, Default::default())
        .expect("valid message");
    let queued_msg = QueuedMessage::new(recipient_id.as_str(), "never-popped", MessageKind::Reactive, Default::default())
        .expect("valid message");

    let mut conn = pool.get().await.expect("pool connection");
    let _: () = conn
        .rpush(delivery_core::keys::inflight(&recipient_id), inflight_msg.to_bytes().unwrap())
        .await
        .expect("seed inflight list");
    let _: () = conn
        .rpush(delivery_core::keys::queue(&recipient_id), queued_msg.to_bytes().unwrap())
        .await
        .expect("seed queue");
    let _: () = conn
        .sadd(delivery_core::keys::ACTIVE_RECIPIENTS, &recipient_id)
        .await
        .expect("sadd active");
    // No lease held — this worker finds the key absent and acquires cleanly,
    // exactly as it would after the crashed holder's lease expired.

    let transport = Arc::new(MockTransport::always(SendOutcome::Success));
    let (dispatcher, shutdown) = common::spawn_dispatcher(pool.clone(), transport.clone(), common::test_config());
    let dispatcher_handle = tokio::spawn({
        let shutdown = shutdown.clone();
        async move { dispatcher.run(shutdown).await }
    });

    tokio::time::sleep(Duration::from_secs(2)).await;
    shutdown.cancel();
    let _ = dispatcher_handle.await;

    let sends = transport.sends();
    let texts: Vec<&str> = sends.iter().map(|(_, t)| t.as_str()).collect();
    // The recovered in-flight message is re-attempted ahead of the message
    // that was never popped, preserving head-of-line order.
    assert_eq!(texts, vec!["in-flight", "never-popped"]);

    let inflight_len: u64 = conn
        .llen(delivery_core::keys::inflight(&recipient_id))
        .await
        .expect("llen inflight");
    assert_eq!(inflight_len, 0, "inflight list should be drained after recovery");

    common::cleanup(&pool, &recipient_id).await;
}
