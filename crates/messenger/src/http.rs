use std::time::Duration;

use async_trait::async_trait;
use pipeline::{MessageSender, OutboundMessage, RetryPolicy, SendError};
use reqwest::{Client, Url};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, instrument, warn};

/// Longest gateway response body carried into a [`SendError`].
const MAX_ERROR_BODY: usize = 200;

/// Connection settings for the messaging gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayConfig {
    /// Gateway base URL; messages are posted to `<url>/send`.
    pub url: String,
    /// Bearer token sent with every request.
    pub token: Option<String>,
    /// Per-request timeout.
    pub timeout: Duration,
    /// Retries after the first attempt for retryable failures.
    pub max_retries: u32,
    /// Base delay between attempts; attempt `n` waits `n × backoff`.
    pub backoff: Duration,
}

impl GatewayConfig {
    pub const DEFAULT_TIMEOUT_SECS: u64 = 30;
    pub const DEFAULT_MAX_RETRIES: u32 = 3;
    pub const DEFAULT_BACKOFF_MS: u64 = 100;

    /// Settings for `url` with the default timeout, retries and back-off.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            token: None,
            timeout: Duration::from_secs(Self::DEFAULT_TIMEOUT_SECS),
            max_retries: Self::DEFAULT_MAX_RETRIES,
            backoff: Duration::from_millis(Self::DEFAULT_BACKOFF_MS),
        }
    }
}

/// The gateway client could not be constructed.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// The configured URL does not parse.
    #[error("Invalid gateway URL '{url}': {message}")]
    InvalidUrl { url: String, message: String },

    /// The HTTP client could not be built.
    #[error("Failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),
}

/// Request body of `POST <gateway>/send`.
#[derive(Debug, Serialize)]
struct SendRequest<'a> {
    platform: &'a str,
    target_type: &'a str,
    target_id: &'a str,
    text: &'a str,
}

impl<'a> From<&'a OutboundMessage> for SendRequest<'a> {
    fn from(message: &'a OutboundMessage) -> Self {
        Self {
            platform: message.platform.as_str(),
            target_type: message.target_type.as_str(),
            target_id: message.target_id.as_str(),
            text: &message.text,
        }
    }
}

/// [`MessageSender`] that posts to a messaging gateway over HTTP.
///
/// Retryable failures (see [`SendError::retry_policy`]) are retried up to
/// `max_retries` times with linear back-off.
#[derive(Debug, Clone)]
pub struct HttpMessenger {
    client: Client,
    endpoint: Url,
    token: Option<String>,
    max_retries: u32,
    backoff: Duration,
}

impl HttpMessenger {
    pub fn new(config: GatewayConfig) -> Result<Self, GatewayError> {
        let invalid = |message: String| GatewayError::InvalidUrl {
            url: config.url.clone(),
            message,
        };
        let base = Url::parse(&format!("{}/", config.url.trim_end_matches('/')))
            .map_err(|e| invalid(e.to_string()))?;
        let endpoint = base.join("send").map_err(|e| invalid(e.to_string()))?;

        let client = Client::builder().timeout(config.timeout).build()?;

        Ok(Self {
            client,
            endpoint,
            token: config.token.filter(|t| !t.is_empty()),
            max_retries: config.max_retries,
            backoff: config.backoff,
        })
    }

    /// The URL messages are posted to.
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    async fn send_once(&self, message: &OutboundMessage) -> Result<(), SendError> {
        let mut request = self
            .client
            .post(self.endpoint.clone())
            .json(&SendRequest::from(message));
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.map_err(|e| SendError::Transport {
            message: e.to_string(),
        })?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let body = response.text().await.unwrap_or_default();
        Err(SendError::Rejected {
            status: status.as_u16(),
            message: body.chars().take(MAX_ERROR_BODY).collect(),
        })
    }
}

#[async_trait]
impl MessageSender for HttpMessenger {
    #[instrument(skip_all, fields(platform = %message.platform, target_id = %message.target_id))]
    async fn send(&self, message: &OutboundMessage) -> Result<(), SendError> {
        let mut attempt: u32 = 0;
        loop {
            let error = match self.send_once(message).await {
                Ok(()) => {
                    debug!(attempt = attempt + 1, "Message delivered to gateway");
                    return Ok(());
                }
                Err(e) => e,
            };

            let delay = match error.retry_policy() {
                RetryPolicy::Retryable { after } if attempt < self.max_retries => {
                    after.unwrap_or(self.backoff * (attempt + 1))
                }
                _ => {
                    warn!(attempts = attempt + 1, error = %error, "Gateway delivery failed");
                    return Err(error);
                }
            };

            attempt += 1;
            warn!(attempt, error = %error, ?delay, "Gateway delivery failed, retrying");
            tokio::time::sleep(delay).await;
        }
    }
}

#[cfg(test)]
#[path = "http_tests.rs"]
mod tests;
