//! Upstream client for the chat-completions API

use reqwest::{header, Client, Response};
use serde_json::Value;
use thiserror::Error;
use tokio::time::Duration;

/// Failure modes of one outbound call. An upstream that answered with a
/// non-success status is NOT an error here: the response comes back as `Ok`
/// and the handler relays its status and body untouched.
#[derive(Debug, Error)]
pub enum CallError {
    /// No response within the configured budget.
    #[error("upstream timed out after {0}s")]
    Timeout(u64),

    /// No response at all: connection or network failure.
    #[error("upstream unreachable: {0}")]
    Network(#[source] reqwest::Error),
}

#[derive(Clone)]
pub struct UpstreamClient {
    http_client: Client,
    base_url: String,
    request_timeout: u64,
}

impl UpstreamClient {
    pub fn new(base_url: &str, connect_timeout: u64, request_timeout: u64) -> Self {
        let http_client = Client::builder()
            .connect_timeout(Duration::from_secs(connect_timeout))
            .pool_max_idle_per_host(16)
            .pool_idle_timeout(Duration::from_secs(90))
            .tcp_keepalive(Duration::from_secs(60))
            .timeout(Duration::from_secs(request_timeout))
            .user_agent(concat!("thinkrelay/", env!("CARGO_PKG_VERSION")))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            http_client,
            base_url: base_url.trim_end_matches('/').to_string(),
            request_timeout,
        }
    }

    fn chat_url(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }

    /// Issue the single outbound POST for one inbound request. The body is
    /// forwarded verbatim; only Accept varies with the streaming flag. No
    /// retries.
    pub async fn chat_completions(
        &self,
        api_key: &str,
        body: &Value,
        stream: bool,
    ) -> Result<Response, CallError> {
        let accept = if stream {
            "text/event-stream"
        } else {
            "application/json"
        };

        let result = self
            .http_client
            .post(self.chat_url())
            .header(header::AUTHORIZATION, format!("Bearer {}", api_key))
            .header(header::ACCEPT, accept)
            .json(body)
            .send()
            .await;

        match result {
            Ok(resp) => Ok(resp),
            Err(e) if e.is_timeout() => Err(CallError::Timeout(self.request_timeout)),
            Err(e) => Err(CallError::Network(e)),
        }
    }
}
