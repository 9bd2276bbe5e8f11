//! The abstract chat transport the core dispatches to. This crate makes no
//! assumption about the transport beyond these two operations.

use async_trait::async_trait;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    Success,
    Transient,
    Permanent,
}

#[async_trait]
pub trait Transport: Send + Sync {
    /// Sends `text` to `recipient_id`. Implementations are expected to
    /// classify their own errors into the three-way outcome rather than
    /// returning a `Result` the core would have to guess about.
    async fn send(&self, recipient_id: &str, text: &str) -> SendOutcome;

    /// Signals that a message is being composed. Failures are ignored by
    /// callers; this is fire-and-forget.
    async fn typing(&self, recipient_id: &str);
}

pub mod http;

pub mod mock {
    //! An in-memory `Transport` test double, recording every call and its
    //! timestamp for assertions in the integration tests.

    use std::sync::Mutex;
    use std::time::Instant;

    use async_trait::async_trait;

    use super::{SendOutcome, Transport};

    #[derive(Debug, Clone)]
    pub enum Event {
        Send {
            recipient_id: String,
            text: String,
            at: Instant,
        },
        Typing {
            recipient_id: String,
            at: Instant,
        },
    }

    /// Replays a fixed sequence of outcomes for `send`, repeating the last
    /// one once exhausted (so a test can configure "fail twice then
    /// succeed" without tracking call counts by hand).
    pub struct MockTransport {
        outcomes: Mutex<Vec<SendOutcome>>,
        events: Mutex<Vec<Event>>,
    }

    impl MockTransport {
        pub fn new(outcomes: Vec<SendOutcome>) -> Self {
            Self {
                outcomes: Mutex::new(outcomes),
                events: Mutex::new(Vec::new()),
            }
        }

        pub fn always(outcome: SendOutcome) -> Self {
            Self::new(vec![outcome])
        }

        pub fn events(&self) -> Vec<Event> {
            self.events.lock().expect("mock transport mutex poisoned").clone()
        }

        pub fn sends(&self) -> Vec<(String, String)> {
            self.events()
                .into_iter()
                .filter_map(|e| match e {
                    Event::Send {
                        recipient_id, text, ..
                    } => Some((recipient_id, text)),
                    Event::Typing { .. } => None,
                })
                .collect()
        }
    }

    #[async_trait]
    impl Transport for MockTransport {
        async fn send(&self, recipient_id: &str, text: &str) -> SendOutcome {
            let outcome = {
                let mut outcomes = self.outcomes.lock().expect("mock transport mutex poisoned");
                if outcomes.len() > 1 {
                    outcomes.remove(0)
                } else {
                    *outcomes.first().unwrap_or(&SendOutcome::Success)
                }
            };
            self.events
                .lock()
                .expect("mock transport mutex poisoned")
                .push(Event::Send {
                    recipient_id: recipient_id.to_string(),
                    text: text.to_string(),
                    at: Instant::now(),
                });
            outcome
        }

        async fn typing(&self, recipient_id: &str) {
            self.events
                .lock()
                .expect("mock transport mutex poisoned")
                .push(Event::Typing {
                    recipient_id: recipient_id.to_string(),
                    at: Instant::now(),
                });
        }
    }
}
