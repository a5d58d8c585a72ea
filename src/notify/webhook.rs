use crate::error::{AppError, Result};
use crate::notify::{ChannelRef, Message, MessageRef, NotificationGateway};
use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;
use uuid::Uuid;

/// Gateway delivering notifications to a generic webhook endpoint.
///
/// The receiving shim owns the translation into whatever chat platform is
/// in use; this side only posts `{target, text, actions}`.
#[derive(Clone)]
pub struct WebhookGateway {
    client: Client,
    url: String,
    timeout_secs: u64,
}

#[derive(Debug, Serialize)]
struct NotifyPayload<'a> {
    target: &'a str,
    #[serde(flatten)]
    message: &'a Message,
}

impl WebhookGateway {
    pub fn new(url: impl Into<String>, timeout_secs: u64) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| {
                AppError::Configuration(format!("failed to create HTTP client: {}", e))
            })?;

        Ok(Self {
            client,
            url: url.into(),
            timeout_secs,
        })
    }
}

#[async_trait]
impl NotificationGateway for WebhookGateway {
    async fn notify(&self, target: &ChannelRef, payload: Message) -> Result<MessageRef> {
        let body = NotifyPayload {
            target: &target.0,
            message: &payload,
        };

        let response = self
            .client
            .post(&self.url)
            .header("Content-Type", "application/json")
            .header("User-Agent", "incident-orchestrator/0.6")
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    AppError::Timeout(format!(
                        "notification webhook timed out after {} seconds",
                        self.timeout_secs
                    ))
                } else {
                    AppError::Integration {
                        source_name: "notify".to_string(),
                        message: e.to_string(),
                    }
                }
            })?;

        let status = response.status();
        let text = response.text().await.unwrap_or_default();

        if !status.is_success() {
            return Err(AppError::Integration {
                source_name: "notify".to_string(),
                message: format!("webhook returned {}: {}", status, text),
            });
        }

        // Receivers may echo back a provider message reference; fall back
        // to a generated one when they do not.
        let message_ref = serde_json::from_str::<serde_json::Value>(&text)
            .ok()
            .and_then(|v| v.get("message_ref").and_then(|r| r.as_str()).map(String::from))
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        Ok(MessageRef(message_ref))
    }
}
