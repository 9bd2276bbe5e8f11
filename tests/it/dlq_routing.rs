//! Scenario C — transient failure then success, and Scenario D — DLQ
//! routing once retries are exhausted.

use std::sync::Arc;
use std::time::Duration;

use delivery_core::transport::mock::MockTransport;
use delivery_core::SendOutcome;
use redis::AsyncCommands;

use crate::common;

#[tokio::test]
async fn transient_failures_are_retried_before_success() {
    let pool = common::test_pool().await;
    let recipient_id = common::test_recipient();

    common::enqueue_text(&pool, &recipient_id, "flaky").await;
    common::enqueue_text(&pool, &recipient_id, "later").await;

    let transport = Arc::new(MockTransport::new(vec![
        SendOutcome::Transient,
        SendOutcome::Transient,
        SendOutcome::Success,
        SendOutcome::Success,
    ]));
    let (dispatcher, shutdown) = common::spawn_dispatcher(pool.clone(), transport.clone(), common::test_config());
    let dispatcher_handle = tokio::spawn({
        let shutdown = shutdown.clone();
        async move { dispatcher.run(shutdown).await }
    });

    tokio::time::sleep(Duration::from_secs(2)).await;
    shutdown.cancel();
    let _ = dispatcher_handle.await;

    let sends = transport.sends();
    // "flaky" is attempted 3 times (2 transient + 1 success) before "later"
    // is ever attempted, preserving head-of-line for the recipient.
    let flaky_attempts = sends.iter().filter(|(_, t)| t == "flaky").count();
    assert_eq!(flaky_attempts, 3);
    let later_index = sends.iter().position(|(_, t)| t == "later");
    assert!(later_index.is_some());
    assert!(later_index.unwrap() >= 3);

    common::cleanup(&pool, &recipient_id).await;
}

#[tokio::test]
async fn exhausted_retries_land_in_the_dead_letter_queue() {
    let pool = common::test_pool().await;
    let recipient_id = common::test_recipient();

    common::enqueue_text(&pool, &recipient_id, "doomed").await;
    common::enqueue_text(&pool, &recipient_id, "survivor").await;

    let mut cfg = common::test_config();
    cfg.max_retries = 3;

    let transport = Arc::new(MockTransport::new(vec![SendOutcome::Transient]));
    let (dispatcher, shutdown) = common::spawn_dispatcher(pool.clone(), transport.clone(), cfg);
    let dispatcher_handle = tokio::spawn({
        let shutdown = shutdown.clone();
        async move { dispatcher.run(shutdown).await }
    });

    tokio::time::sleep(Duration::from_secs(2)).await;

    let mut conn = pool.get().await.expect("pool connection");
    let dlq_key = delivery_core::keys::dlq(&recipient_id);
    let dlq_len: u64 = conn.llen(&dlq_key).await.expect("llen");
    assert_eq!(dlq_len, 1, "the doomed message should have exhausted its retries");

    shutdown.cancel();
    let _ = dispatcher_handle.await;

    // "doomed" was attempted MaxRetries + 1 = 4 times before dead-lettering.
    let doomed_attempts = transport.sends().iter().filter(|(_, t)| t == "doomed").count();
    assert_eq!(doomed_attempts, 4);

    common::cleanup(&pool, &recipient_id).await;
}
