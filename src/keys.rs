//! The Redis key namespace. Key names here are the wire format; changing
//! the prefixes is a breaking change for anything inspecting Redis directly.

pub const ACTIVE_RECIPIENTS: &str = "active_recipients";

pub fn queue(recipient_id: &str) -> String {
    format!("queue:{recipient_id}")
}

pub fn lease(recipient_id: &str) -> String {
    format!("lease:{recipient_id}")
}

pub fn dlq(recipient_id: &str) -> String {
    format!("dlq:{recipient_id}")
}

/// Holds the single message a lease holder has popped but not yet acked,
/// so a crash between pop and ack leaves something `recover_inflight` can
/// find and replay.
pub fn inflight(recipient_id: &str) -> String {
    format!("inflight:{recipient_id}")
}

/// Recovers a `recipient_id` from a `queue:{recipient_id}` key matched by a
/// `queue:*` scan. This is the sole rule the startup replay uses to derive
/// recipient identities from persisted state.
pub fn recipient_id_from_queue_key(key: &str) -> Option<&str> {
    key.strip_prefix("queue:")
}
