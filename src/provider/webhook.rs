//! Webhook notify action.
//!
//! Posts each notification as JSON to a configured URL. The HTTP client is
//! async; a private current-thread runtime drives it so the action can be
//! called from the notifier's worker threads.

use crate::provider::{NotifyAction, NotifyError};
use serde::Serialize;

/// Webhook endpoint configuration.
#[derive(Debug, Clone)]
pub struct WebhookConfig {
    /// Endpoint receiving the POST
    pub url: String,
    /// Optional bearer token
    pub token: Option<String>,
    /// Request timeout in seconds
    pub timeout_secs: u64,
}

impl WebhookConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            token: None,
            timeout_secs: 10,
        }
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }
}

/// JSON body sent to the webhook.
#[derive(Debug, Clone, Serialize)]
pub struct WebhookPayload<'a> {
    pub message: &'a str,
    pub post_count: usize,
    pub source: &'static str,
    pub version: &'static str,
}

/// Notify action that POSTs to a webhook.
pub struct WebhookNotifyAction {
    config: WebhookConfig,
    client: reqwest::Client,
    runtime: tokio::runtime::Runtime,
}

impl WebhookNotifyAction {
    pub fn new(config: WebhookConfig) -> Result<Self, NotifyError> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| NotifyError::Action(format!("Failed to create HTTP client: {e}")))?;

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| NotifyError::Action(format!("Failed to create runtime: {e}")))?;

        Ok(Self {
            config,
            client,
            runtime,
        })
    }

    async fn send(&self, message: &str, post_count: usize) -> Result<(), NotifyError> {
        let payload = WebhookPayload {
            message,
            post_count,
            source: "update-limit-notifier",
            version: env!("CARGO_PKG_VERSION"),
        };

        let mut request = self.client.post(&self.config.url).json(&payload);
        if let Some(token) = &self.config.token {
            request = request.header("Authorization", format!("Bearer {token}"));
        }

        let response = request
            .send()
            .await
            .map_err(|e| NotifyError::Action(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(NotifyError::Action(format!(
                "webhook returned {}: {body}",
                status.as_u16()
            )));
        }

        Ok(())
    }
}

impl NotifyAction for WebhookNotifyAction {
    fn post(&self, message: &str, post_count: usize) -> Result<(), NotifyError> {
        self.runtime.block_on(self.send(message, post_count))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_shape() {
        let payload = WebhookPayload {
            message: "slow down",
            post_count: 120,
            source: "update-limit-notifier",
            version: "0.1.0",
        };
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["message"], "slow down");
        assert_eq!(json["post_count"], 120);
    }

    #[test]
    fn test_config_builder() {
        let config = WebhookConfig::new("http://127.0.0.1:9000/hook").with_token("secret");
        assert_eq!(config.token.as_deref(), Some("secret"));
        assert_eq!(config.timeout_secs, 10);
    }
}
