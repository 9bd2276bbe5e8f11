//! Computes a human-like delay for a single message, drives typing-pulse
//! liveness signals over that delay, and invokes the transport send.

use std::time::Duration;

use crate::config::Config;
use crate::transport::{SendOutcome, Transport};

/// `delay = min(L / speed + offset, MaxDelay)`, with `speed` and `offset`
/// drawn uniformly from the configured ranges.
pub fn compute_delay(text_len: usize, cfg: &Config) -> Duration {
    let speed = uniform(cfg.min_typing_speed, cfg.max_typing_speed);
    let offset = uniform(cfg.random_offset_min, cfg.random_offset_max);
    let secs = (text_len as f64 / speed) + offset;
    Duration::from_secs_f64(secs.min(cfg.max_delay.as_secs_f64()))
}

fn uniform(min: f64, max: f64) -> f64 {
    if max <= min {
        return min;
    }
    min + fastrand::f64() * (max - min)
}

/// Sleeps for `delay`, emitting `Transport::typing` at `t = 0` and then
/// every `typing_interval` while time remains, provided `delay` exceeds
/// `typing_pulse_threshold`. Typing failures are not observable here
/// (`Transport::typing` returns `()`), matching the "pulses are
/// fire-and-forget" requirement.
async fn wait_with_typing(transport: &dyn Transport, recipient_id: &str, delay: Duration, cfg: &Config) {
    if delay <= cfg.typing_pulse_threshold {
        tokio::time::sleep(delay).await;
        return;
    }

    transport.typing(recipient_id).await;
    let mut remaining = delay;
    loop {
        let step = cfg.typing_interval.min(remaining);
        tokio::time::sleep(step).await;
        remaining = remaining.saturating_sub(step);
        if remaining.is_zero() {
            break;
        }
        transport.typing(recipient_id).await;
    }
}

/// Delivers a single message: waits out the computed (or skipped) delay
/// while pulsing typing, then calls `Transport::send` under a bounded
/// timeout. A timeout is treated as a transient failure, grouped with
/// rate-limiting and 5xx-equivalent signals rather than as a permanent
/// rejection.
pub async fn deliver(
    transport: &dyn Transport,
    recipient_id: &str,
    text: &str,
    skip_delay: bool,
    cfg: &Config,
) -> SendOutcome {
    if !skip_delay {
        let delay = compute_delay(text.chars().count(), cfg);
        wait_with_typing(transport, recipient_id, delay, cfg).await;
    }

    match tokio::time::timeout(cfg.transport_timeout, transport.send(recipient_id, text)).await {
        Ok(outcome) => outcome,
        Err(_) => SendOutcome::Transient,
    }
}
