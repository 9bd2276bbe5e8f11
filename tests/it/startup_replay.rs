//! Scenario / property 7 — startup replay: a message enqueued while no
//! dispatcher is running is still delivered once one starts, because
//! `replay_startup_state` rebuilds `active_recipients` from `queue:*`.

use std::sync::Arc;
use std::time::Duration;

use delivery_core::transport::mock::MockTransport;
use delivery_core::SendOutcome;
use redis::AsyncCommands;

use crate::common;

#[tokio::test]
async fn message_enqueued_with_no_dispatcher_running_is_replayed_on_startup() {
    let pool = common::test_pool().await;
    let recipient_id = common::test_recipient();

    common::enqueue_text(&pool, &recipient_id, "queued before any worker started").await;

    // Simulate having lost `active_recipients` membership entirely (e.g. a
    // Redis restart that dropped a volatile set but kept the durable list).
    let mut conn = pool.get().await.expect("pool connection");
    let _: () = conn
        .srem(delivery_core::keys::ACTIVE_RECIPIENTS, &recipient_id)
        .await
        .expect("srem");

    let transport = Arc::new(MockTransport::always(SendOutcome::Success));
    let (dispatcher, shutdown) = common::spawn_dispatcher(pool.clone(), transport.clone(), common::test_config());

    dispatcher
        .replay_startup_state()
        .await
        .expect("startup replay should succeed");

    let is_member: bool = conn
        .sismember(delivery_core::keys::ACTIVE_RECIPIENTS, &recipient_id)
        .await
        .expect("sismember");
    assert!(is_member, "replay should have re-added the recipient");

    let dispatcher_handle = tokio::spawn({
        let shutdown = shutdown.clone();
        async move { dispatcher.run(shutdown).await }
    });

    tokio::time::sleep(Duration::from_secs(1)).await;
    shutdown.cancel();
    let _ = dispatcher_handle.await;

    assert_eq!(
        transport.sends(),
        vec![(recipient_id.clone(), "queued before any worker started".to_string())]
    );

    common::cleanup(&pool, &recipient_id).await;
}
