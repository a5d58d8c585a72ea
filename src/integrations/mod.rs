pub mod dispatcher;
pub mod webhook;

pub use dispatcher::IntegrationDispatcher;
pub use webhook::WebhookAdapter;

use crate::error::Result;
use crate::models::{Incident, IncidentId, IntegrationRecord};
use crate::postmortem::PostmortemInput;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use strum::{Display, EnumString};

/// Which dimension of the incident changed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, EnumString, Display)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum TransitionKind {
    Status,
    Severity,
}

/// One committed transition, handed to the dispatcher for fan-out
#[derive(Debug, Clone)]
pub struct TransitionEvent {
    pub incident_id: IncidentId,
    pub kind: TransitionKind,
    pub value: String,
}

/// Read-only projection of an incident passed to adapters, carrying the
/// stable idempotency label adapters key their search-then-update on
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IncidentView {
    pub id: IncidentId,
    pub slug: String,
    pub channel_name: Option<String>,
    pub description: String,
    pub severity: String,
    pub status: String,
    pub label: String,
}

impl From<&Incident> for IncidentView {
    fn from(incident: &Incident) -> Self {
        Self {
            id: incident.id,
            slug: incident.slug.clone(),
            channel_name: incident.channel_name.clone(),
            description: incident.description.clone(),
            severity: incident.severity.clone(),
            status: incident.status.clone(),
            label: stable_label(
                incident
                    .channel_name
                    .as_deref()
                    .unwrap_or(&incident.slug),
            ),
        }
    }
}

/// Stable label derived from the incident's channel name. An adapter
/// invoked twice for the same incident converges on the same external
/// artifact by searching for this label.
pub fn stable_label(channel_name: &str) -> String {
    let digest = Sha256::digest(channel_name.as_bytes());
    format!("incident-{:x}", digest)[..21].to_string()
}

/// Ticket tracker adapter (issue creation / re-labeling)
#[async_trait]
pub trait TicketAdapter: Send + Sync {
    fn name(&self) -> &str;

    async fn apply(
        &self,
        incident: &IncidentView,
        kind: TransitionKind,
        value: &str,
    ) -> Result<Option<IntegrationRecord>>;
}

/// Paging platform adapter
#[async_trait]
pub trait PagingAdapter: Send + Sync {
    fn name(&self) -> &str;

    async fn apply(
        &self,
        incident: &IncidentView,
        kind: TransitionKind,
        value: &str,
    ) -> Result<Option<IntegrationRecord>>;

    /// Resolve a previously linked paging incident
    async fn resolve(&self, external_ref: &str) -> Result<()>;
}

/// Document generator adapter
#[async_trait]
pub trait DocAdapter: Send + Sync {
    fn name(&self) -> &str;

    async fn apply(
        &self,
        incident: &IncidentView,
        kind: TransitionKind,
        value: &str,
    ) -> Result<Option<IntegrationRecord>>;

    /// Produce a document from the assembled input and return its URL
    async fn generate(&self, input: &PostmortemInput) -> Result<String>;
}

/// Status-page adapter
#[async_trait]
pub trait StatusPageAdapter: Send + Sync {
    fn name(&self) -> &str;

    async fn apply(
        &self,
        incident: &IncidentView,
        kind: TransitionKind,
        value: &str,
    ) -> Result<Option<IntegrationRecord>>;
}

/// Registry of capability adapters, populated once at startup from
/// configuration. The dispatcher iterates this instead of branching on
/// config at call sites.
#[derive(Default)]
pub struct IntegrationRegistry {
    tickets: Vec<Arc<dyn TicketAdapter>>,
    paging: Vec<Arc<dyn PagingAdapter>>,
    docs: Vec<Arc<dyn DocAdapter>>,
    status_pages: Vec<Arc<dyn StatusPageAdapter>>,
}

impl IntegrationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_ticket(&mut self, adapter: Arc<dyn TicketAdapter>) {
        tracing::info!(adapter = adapter.name(), "Registered ticket adapter");
        self.tickets.push(adapter);
    }

    pub fn register_paging(&mut self, adapter: Arc<dyn PagingAdapter>) {
        tracing::info!(adapter = adapter.name(), "Registered paging adapter");
        self.paging.push(adapter);
    }

    pub fn register_doc(&mut self, adapter: Arc<dyn DocAdapter>) {
        tracing::info!(adapter = adapter.name(), "Registered document adapter");
        self.docs.push(adapter);
    }

    pub fn register_status_page(&mut self, adapter: Arc<dyn StatusPageAdapter>) {
        tracing::info!(adapter = adapter.name(), "Registered status-page adapter");
        self.status_pages.push(adapter);
    }

    pub fn tickets(&self) -> &[Arc<dyn TicketAdapter>] {
        &self.tickets
    }

    pub fn paging(&self) -> &[Arc<dyn PagingAdapter>] {
        &self.paging
    }

    pub fn docs(&self) -> &[Arc<dyn DocAdapter>] {
        &self.docs
    }

    pub fn status_pages(&self) -> &[Arc<dyn StatusPageAdapter>] {
        &self.status_pages
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn len(&self) -> usize {
        self.tickets.len() + self.paging.len() + self.docs.len() + self.status_pages.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stable_label_is_deterministic() {
        let a = stable_label("inc-12-api-latency");
        let b = stable_label("inc-12-api-latency");
        let c = stable_label("inc-13-db-saturation");

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(a.starts_with("incident-"));
        assert_eq!(a.len(), 21);
    }

    #[test]
    fn test_view_label_falls_back_to_slug() {
        use chrono::Utc;
        let incident = Incident {
            id: 4,
            slug: "inc-4".to_string(),
            channel_ref: None,
            channel_name: None,
            description: "x".to_string(),
            components: None,
            impact: None,
            severity: "sev3".to_string(),
            status: "investigating".to_string(),
            link: None,
            last_update_sent: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };

        let view = IncidentView::from(&incident);
        assert_eq!(view.label, stable_label("inc-4"));
    }

    #[test]
    fn test_transition_kind_round_trip() {
        assert_eq!(TransitionKind::Status.to_string(), "status");
        assert_eq!(
            "severity".parse::<TransitionKind>().unwrap(),
            TransitionKind::Severity
        );
    }
}
