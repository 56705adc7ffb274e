//! Webhook delivery with bounded retry
//!
//! Each trial is POSTed as `{"event": "echo_test", "system": ..., "data": ...}`.
//! Delivery stops at the first 2xx response; after the configured number of
//! attempts it gives up and reports failure without raising an error.

use crate::audio::analyzer::Metrics;
use crate::device::SystemInfo;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;

/// Event name carried by every payload
pub const EVENT_NAME: &str = "echo_test";

/// Default number of delivery attempts
pub const DEFAULT_RETRIES: u32 = 3;

/// Default pause between delivery attempts
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Per-request timeout
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Errors for a single delivery attempt
#[derive(Error, Debug)]
pub enum WebhookError {
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Webhook rejected payload: {status} - {body}")]
    Status { status: u16, body: String },
}

/// JSON body sent to the webhook
#[derive(Debug, Serialize)]
pub struct WebhookPayload<'a> {
    pub event: &'static str,
    pub system: &'a SystemInfo,
    pub data: &'a Metrics,
}

impl<'a> WebhookPayload<'a> {
    pub fn new(system: &'a SystemInfo, data: &'a Metrics) -> Self {
        Self {
            event: EVENT_NAME,
            system,
            data,
        }
    }
}

/// Webhook client configuration
#[derive(Debug, Clone)]
pub struct WebhookConfig {
    pub url: String,
    /// Bearer token for the Authorization header
    pub token: Option<String>,
    pub retries: u32,
    pub retry_delay: Duration,
}

impl WebhookConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            token: None,
            retries: DEFAULT_RETRIES,
            retry_delay: DEFAULT_RETRY_DELAY,
        }
    }
}

/// Posts trial results to a webhook
#[derive(Debug, Clone)]
pub struct WebhookClient {
    client: Client,
    config: WebhookConfig,
}

impl WebhookClient {
    pub fn new(config: WebhookConfig) -> Result<Self, WebhookError> {
        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self { client, config })
    }

    pub fn config(&self) -> &WebhookConfig {
        &self.config
    }

    /// Deliver a payload, retrying up to the configured attempt count
    ///
    /// # Returns
    /// `true` on the first 2xx response, `false` once every attempt failed
    pub async fn send(&self, payload: &WebhookPayload<'_>) -> bool {
        match serde_json::to_string_pretty(payload) {
            Ok(json) => tracing::debug!(payload = %json, "Sending webhook payload"),
            Err(e) => tracing::warn!(error = %e, "Failed to render webhook payload for logging"),
        }

        for attempt in 1..=self.config.retries {
            match self.attempt(payload).await {
                Ok(status) => {
                    tracing::info!(attempt, status, "Webhook delivered");
                    return true;
                }
                Err(e) => {
                    tracing::warn!(attempt, error = %e, "Webhook delivery failed");
                }
            }
            if attempt < self.config.retries {
                tokio::time::sleep(self.config.retry_delay).await;
            }
        }

        tracing::error!(
            attempts = self.config.retries,
            url = %self.config.url,
            "Giving up on webhook delivery"
        );
        false
    }

    async fn attempt(&self, payload: &WebhookPayload<'_>) -> Result<u16, WebhookError> {
        let mut request = self
            .client
            .post(&self.config.url)
            .header(CONTENT_TYPE, "application/json")
            .json(payload);
        if let Some(token) = &self.config.token {
            request = request.header(AUTHORIZATION, format!("Bearer {}", token));
        }

        let response = request.send().await?;
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        tracing::info!(status = status.as_u16(), body = %body, "Webhook response");

        if status.is_success() {
            Ok(status.as_u16())
        } else {
            Err(WebhookError::Status {
                status: status.as_u16(),
                body,
            })
        }
    }
}
