pub mod handlers;
pub mod routes;

pub use routes::build_router;

use crate::lifecycle::{LifecycleCatalog, LifecycleEngine};
use crate::scheduler::ReminderScheduler;
use crate::store::{EventLog, IncidentStore};
use std::sync::Arc;

/// Shared state for API handlers. The route layer is a thin caller of the
/// engine and store contracts; no lifecycle logic lives here.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<LifecycleEngine>,
    pub store: Arc<dyn IncidentStore>,
    pub events: Arc<dyn EventLog>,
    pub scheduler: Arc<ReminderScheduler>,
    pub catalog: Arc<LifecycleCatalog>,
}

impl AppState {
    pub fn new(
        engine: Arc<LifecycleEngine>,
        store: Arc<dyn IncidentStore>,
        events: Arc<dyn EventLog>,
        scheduler: Arc<ReminderScheduler>,
        catalog: Arc<LifecycleCatalog>,
    ) -> Self {
        Self {
            engine,
            store,
            events,
            scheduler,
            catalog,
        }
    }
}
