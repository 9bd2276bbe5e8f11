//! The unit of work moving through the queue.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{QueueError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    Reactive,
    Proactive,
}

/// A single outbound message, durable while it lives in `queue:{recipient}`
/// or `dlq:{recipient}`.
///
/// `chat_id` duplicates `recipient_id` on the wire: the core does not
/// distinguish a "user" from a "chat", but producers and downstream
/// tooling built around the wire format expect both field names to be
/// present.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueuedMessage {
    pub recipient_id: String,
    pub chat_id: String,
    pub text: String,
    pub message_type: MessageKind,
    pub timestamp: DateTime<Utc>,
    pub retry_count: u32,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl QueuedMessage {
    pub fn new(
        recipient_id: impl Into<String>,
        text: impl Into<String>,
        kind: MessageKind,
        metadata: HashMap<String, String>,
    ) -> Result<Self> {
        let recipient_id = recipient_id.into();
        let text = text.into();
        if recipient_id.is_empty() {
            return Err(QueueError::Config("recipient_id must not be empty".into()));
        }
        if text.is_empty() {
            return Err(QueueError::Config("text must not be empty".into()));
        }
        Ok(Self {
            chat_id: recipient_id.clone(),
            recipient_id,
            text,
            message_type: kind,
            timestamp: Utc::now(),
            retry_count: 0,
            metadata,
        })
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(QueueError::MalformedPayload)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes).map_err(QueueError::MalformedPayload)
    }
}
