//! Scenario F — typing pulses: a delay long enough to cross one typing
//! interval produces exactly the expected number of `Typing` calls before
//! `Send`.

use std::sync::Arc;
use std::time::Duration;

use delivery_core::transport::mock::{Event, MockTransport};
use delivery_core::SendOutcome;

use crate::common;

#[tokio::test]
async fn a_five_second_delay_produces_two_typing_pulses() {
    let pool = common::test_pool().await;
    let recipient_id = common::test_recipient();

    // First message in a session may skip the delay, so prime the session
    // with a throwaway message before the one we measure.
    common::enqueue_text(&pool, &recipient_id, "warmup").await;
    common::enqueue_text(&pool, &recipient_id, "measured").await;

    let mut cfg = common::test_config();
    cfg.min_typing_speed = 1.0;
    cfg.max_typing_speed = 1.0;
    cfg.random_offset_min = 0.0;
    cfg.random_offset_max = 0.0;
    cfg.max_delay = Duration::from_secs(5);
    cfg.typing_interval = Duration::from_secs(3);

    let transport = Arc::new(MockTransport::always(SendOutcome::Success));
    let (dispatcher, shutdown) = common::spawn_dispatcher(pool.clone(), transport.clone(), cfg);
    let dispatcher_handle = tokio::spawn({
        let shutdown = shutdown.clone();
        async move { dispatcher.run(shutdown).await }
    });

    tokio::time::sleep(Duration::from_secs(8)).await;
    shutdown.cancel();
    let _ = dispatcher_handle.await;

    let events = transport.events();
    let measured_send_index = events
        .iter()
        .position(|e| matches!(e, Event::Send { text, .. } if text == "measured"))
        .expect("measured message should have been sent");

    let typing_before_measured = events[..measured_send_index]
        .iter()
        .filter(|e| matches!(e, Event::Typing { .. }))
        .count();

    // "measured" is 8 chars at 1 char/s == 8s, clamped to MaxDelay (5s).
    // With a 3s typing interval that is exactly 2 pulses (t=0, t=3).
    assert_eq!(typing_before_measured, 2);

    common::cleanup(&pool, &recipient_id).await;
}
