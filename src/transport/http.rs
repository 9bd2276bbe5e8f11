//! A minimal webhook-style `Transport`, POSTing JSON to a configured base
//! URL. This is one possible concrete transport the worker binary can be
//! wired to; the core itself stays transport-agnostic and is equally
//! happy with any other `Transport` implementation a caller supplies.

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;

use super::{SendOutcome, Transport};

pub struct HttpTransport {
    client: reqwest::Client,
    base_url: String,
}

#[derive(Serialize)]
struct SendRequest<'a> {
    recipient_id: &'a str,
    text: &'a str,
}

#[derive(Serialize)]
struct TypingRequest<'a> {
    recipient_id: &'a str,
}

impl HttpTransport {
    pub fn new(base_url: impl Into<String>, request_timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .expect("failed to build HTTP client for transport");
        Self {
            client,
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, recipient_id: &str, text: &str) -> SendOutcome {
        let result = self
            .client
            .post(format!("{}/send", self.base_url))
            .json(&SendRequest { recipient_id, text })
            .send()
            .await;

        match result {
            Ok(resp) if resp.status().is_success() => SendOutcome::Success,
            Ok(resp) if resp.status().is_client_error() => {
                tracing::warn!(recipient_id, status = %resp.status(), "transport rejected message permanently");
                SendOutcome::Permanent
            }
            Ok(resp) => {
                tracing::warn!(recipient_id, status = %resp.status(), "transport send failed transiently");
                SendOutcome::Transient
            }
            Err(err) => {
                tracing::warn!(recipient_id, error = %err, "transport send errored");
                SendOutcome::Transient
            }
        }
    }

    async fn typing(&self, recipient_id: &str) {
        let _ = self
            .client
            .post(format!("{}/typing", self.base_url))
            .json(&TypingRequest { recipient_id })
            .send()
            .await;
    }
}
