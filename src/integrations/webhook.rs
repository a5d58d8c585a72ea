use crate::error::{AppError, Result};
use crate::integrations::{
    DocAdapter, IncidentView, PagingAdapter, StatusPageAdapter, TicketAdapter, TransitionKind,
};
use crate::models::{IntegrationKind, IntegrationRecord};
use crate::postmortem::PostmortemInput;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use std::time::Duration;

/// Generic webhook-backed adapter, one instance per configured capability.
///
/// Posts `{action, label, ...}` to the endpoint; the receiving shim owns the
/// vendor API. The `label` field carries the stable idempotency key, so a
/// receiver that searches-then-updates converges even when invoked twice.
#[derive(Clone)]
pub struct WebhookAdapter {
    name: String,
    kind: IntegrationKind,
    client: Client,
    url: String,
}

impl WebhookAdapter {
    pub fn new(
        name: impl Into<String>,
        kind: IntegrationKind,
        url: impl Into<String>,
        timeout_secs: u64,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| {
                AppError::Configuration(format!("failed to create HTTP client: {}", e))
            })?;

        Ok(Self {
            name: name.into(),
            kind,
            client,
            url: url.into(),
        })
    }

    async fn post(&self, payload: serde_json::Value) -> Result<serde_json::Value> {
        let response = self
            .client
            .post(&self.url)
            .header("Content-Type", "application/json")
            .header("User-Agent", "incident-orchestrator/0.6")
            .json(&payload)
            .send()
            .await
            .map_err(|e| AppError::Integration {
                source_name: self.name.clone(),
                message: e.to_string(),
            })?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();

        if !status.is_success() {
            return Err(AppError::Integration {
                source_name: self.name.clone(),
                message: format!("webhook returned {}: {}", status, body),
            });
        }

        Ok(serde_json::from_str(&body).unwrap_or(serde_json::Value::Null))
    }

    /// Shared apply path: report the transition, link an external artifact
    /// when the receiver creates one
    async fn apply_transition(
        &self,
        incident: &IncidentView,
        kind: TransitionKind,
        value: &str,
    ) -> Result<Option<IntegrationRecord>> {
        let body = self
            .post(json!({
                "action": "apply",
                "label": incident.label,
                "incident": incident,
                "kind": kind.to_string(),
                "value": value,
            }))
            .await?;

        Ok(body
            .get("external_ref")
            .and_then(|r| r.as_str())
            .map(|external_ref| IntegrationRecord::new(incident.id, self.kind, external_ref)))
    }
}

#[async_trait]
impl TicketAdapter for WebhookAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    async fn apply(
        &self,
        incident: &IncidentView,
        kind: TransitionKind,
        value: &str,
    ) -> Result<Option<IntegrationRecord>> {
        self.apply_transition(incident, kind, value).await
    }
}

#[async_trait]
impl PagingAdapter for WebhookAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    async fn apply(
        &self,
        incident: &IncidentView,
        kind: TransitionKind,
        value: &str,
    ) -> Result<Option<IntegrationRecord>> {
        self.apply_transition(incident, kind, value).await
    }

    async fn resolve(&self, external_ref: &str) -> Result<()> {
        self.post(json!({
            "action": "resolve",
            "external_ref": external_ref,
        }))
        .await
        .map(|_| ())
    }
}

#[async_trait]
impl DocAdapter for WebhookAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    async fn apply(
        &self,
        incident: &IncidentView,
        kind: TransitionKind,
        value: &str,
    ) -> Result<Option<IntegrationRecord>> {
        self.apply_transition(incident, kind, value).await
    }

    async fn generate(&self, input: &PostmortemInput) -> Result<String> {
        let body = self
            .post(json!({
                "action": "generate",
                "document": input,
            }))
            .await?;

        body.get("url")
            .and_then(|u| u.as_str())
            .map(String::from)
            .ok_or_else(|| AppError::Integration {
                source_name: self.name.clone(),
                message: "document endpoint returned no url".to_string(),
            })
    }
}

#[async_trait]
impl StatusPageAdapter for WebhookAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    async fn apply(
        &self,
        incident: &IncidentView,
        kind: TransitionKind,
        value: &str,
    ) -> Result<Option<IntegrationRecord>> {
        self.apply_transition(incident, kind, value).await
    }
}
