//! Redis-backed, per-recipient serialized delivery queue for an outbound
//! chat transport.
//!
//! Four cooperating pieces, each its own module:
//!
//! - [`enqueuer`] accepts `(recipient, text, kind)` from producers.
//! - [`lease`] provides the distributed mutual exclusion a dispatcher
//!   needs to serialize delivery per recipient across worker processes.
//! - [`dispatcher`] discovers active recipients and drains their queues.
//! - [`delivery`] computes the human-like delay, drives typing pulses, and
//!   calls into the pluggable [`transport::Transport`].
//!
//! The crate makes no assumption about message content, persona, auth, or
//! the scheduler that decides when to create proactive messages — all of
//! that lives upstream, outside this crate, as producers of
//! [`model::QueuedMessage`]s.

pub mod config;
pub mod delivery;
pub mod dispatcher;
pub mod dlq;
pub mod enqueuer;
pub mod error;
pub mod keys;
pub mod lease;
pub mod model;
pub mod redis_pool;
pub mod transport;

pub use config::Config;
pub use dispatcher::Dispatcher;
pub use enqueuer::Enqueuer;
pub use error::{QueueError, Result};
pub use model::{MessageKind, QueuedMessage};
pub use transport::{SendOutcome, Transport};
