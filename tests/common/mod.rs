//! Shared harness for integration tests: an engine wired to in-memory
//! storage, a recording gateway, and scriptable adapters.

use async_trait::async_trait;
use incident_orchestrator::config::{Config, OptionsConfig, RemindersConfig};
use incident_orchestrator::error::{AppError, Result};
use incident_orchestrator::integrations::{
    DocAdapter, IncidentView, IntegrationDispatcher, IntegrationRegistry, PagingAdapter,
    TicketAdapter, TransitionKind,
};
use incident_orchestrator::lifecycle::{LifecycleCatalog, LifecycleEngine};
use incident_orchestrator::models::IntegrationRecord;
use incident_orchestrator::notify::MemoryGateway;
use incident_orchestrator::postmortem::PostmortemInput;
use incident_orchestrator::scheduler::ReminderScheduler;
use incident_orchestrator::store::MemoryStore;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub fn default_config() -> Config {
    config::Config::builder()
        .add_source(config::File::from_str(
            include_str!("../../config/default.toml"),
            config::FileFormat::Toml,
        ))
        .build()
        .unwrap()
        .try_deserialize()
        .unwrap()
}

/// Document adapter that always produces the same URL
pub struct FixedDocAdapter {
    pub url: String,
    pub generated: Arc<AtomicUsize>,
}

#[async_trait]
impl DocAdapter for FixedDocAdapter {
    fn name(&self) -> &str {
        "fixed-docs"
    }

    async fn apply(
        &self,
        _incident: &IncidentView,
        _kind: TransitionKind,
        _value: &str,
    ) -> Result<Option<IntegrationRecord>> {
        Ok(None)
    }

    async fn generate(&self, _input: &PostmortemInput) -> Result<String> {
        self.generated.fetch_add(1, Ordering::SeqCst);
        Ok(self.url.clone())
    }
}

/// Ticket adapter that records every apply call it receives
#[derive(Default)]
pub struct RecordingTicketAdapter {
    pub applied: Mutex<Vec<(TransitionKind, String)>>,
}

impl RecordingTicketAdapter {
    pub fn applied(&self) -> Vec<(TransitionKind, String)> {
        self.applied.lock().unwrap().clone()
    }
}

#[async_trait]
impl TicketAdapter for RecordingTicketAdapter {
    fn name(&self) -> &str {
        "recording-tickets"
    }

    async fn apply(
        &self,
        _incident: &IncidentView,
        kind: TransitionKind,
        value: &str,
    ) -> Result<Option<IntegrationRecord>> {
        self.applied.lock().unwrap().push((kind, value.to_string()));
        Ok(None)
    }
}

/// Ticket adapter that always errors
pub struct FailingTicketAdapter;

#[async_trait]
impl TicketAdapter for FailingTicketAdapter {
    fn name(&self) -> &str {
        "failing-tickets"
    }

    async fn apply(
        &self,
        _incident: &IncidentView,
        _kind: TransitionKind,
        _value: &str,
    ) -> Result<Option<IntegrationRecord>> {
        Err(AppError::Integration {
            source_name: "failing-tickets".to_string(),
            message: "configured to fail".to_string(),
        })
    }
}

/// Paging adapter that records resolved refs
#[derive(Default)]
pub struct RecordingPagingAdapter {
    pub resolved: Mutex<Vec<String>>,
}

impl RecordingPagingAdapter {
    pub fn resolved(&self) -> Vec<String> {
        self.resolved.lock().unwrap().clone()
    }
}

#[async_trait]
impl PagingAdapter for RecordingPagingAdapter {
    fn name(&self) -> &str {
        "recording-paging"
    }

    async fn apply(
        &self,
        _incident: &IncidentView,
        _kind: TransitionKind,
        _value: &str,
    ) -> Result<Option<IntegrationRecord>> {
        Ok(None)
    }

    async fn resolve(&self, external_ref: &str) -> Result<()> {
        self.resolved.lock().unwrap().push(external_ref.to_string());
        Ok(())
    }
}

/// Everything an integration test needs to drive the engine and observe
/// its side effects
pub struct Harness {
    pub engine: Arc<LifecycleEngine>,
    pub store: Arc<MemoryStore>,
    pub gateway: Arc<MemoryGateway>,
    pub scheduler: Arc<ReminderScheduler>,
    pub catalog: Arc<LifecycleCatalog>,
}

pub struct HarnessBuilder {
    registry: IntegrationRegistry,
    options: OptionsConfig,
    reminders: RemindersConfig,
}

impl HarnessBuilder {
    pub fn new() -> Self {
        let config = default_config();
        Self {
            registry: IntegrationRegistry::new(),
            options: config.options,
            reminders: config.reminders,
        }
    }

    pub fn with_registry(mut self, registry: IntegrationRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub async fn build(self) -> Harness {
        let config = default_config();
        let catalog = Arc::new(LifecycleCatalog::from_config(&config.lifecycle).unwrap());
        let store = Arc::new(MemoryStore::new());
        let gateway = Arc::new(MemoryGateway::new());

        let mut scheduler = ReminderScheduler::new().await.unwrap();
        scheduler.start().await.unwrap();
        let scheduler = Arc::new(scheduler);

        let dispatcher =
            IntegrationDispatcher::new(Arc::new(self.registry), Duration::from_secs(2));

        let engine = Arc::new(LifecycleEngine::new(
            store.clone(),
            store.clone(),
            catalog.clone(),
            gateway.clone(),
            dispatcher,
            scheduler.clone(),
            self.options,
            self.reminders,
        ));

        Harness {
            engine,
            store,
            gateway,
            scheduler,
            catalog,
        }
    }
}

impl Default for HarnessBuilder {
    fn default() -> Self {
        Self::new()
    }
}
