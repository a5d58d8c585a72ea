use crate::config::{StateBackend, StateConfig};
use crate::error::{AppError, Result};
use crate::store::{EventLog, IncidentStore, MemoryStore, SledStore};
use std::sync::Arc;

/// Build the configured storage backend. Both handles share one underlying
/// store, so aggregate deletes cascade onto the event log.
///
/// An unreachable database here is the one fatal startup condition.
pub fn create_store(config: &StateConfig) -> Result<(Arc<dyn IncidentStore>, Arc<dyn EventLog>)> {
    match config.backend {
        StateBackend::Memory => {
            tracing::info!("Using in-memory state backend");
            let store = MemoryStore::new();
            Ok((Arc::new(store.clone()), Arc::new(store)))
        }
        StateBackend::Sled => {
            let path = config.path.as_ref().ok_or_else(|| {
                AppError::Configuration("state.path is required for the sled backend".to_string())
            })?;
            let store = SledStore::new(path)?;
            Ok((Arc::new(store.clone()), Arc::new(store)))
        }
    }
}
