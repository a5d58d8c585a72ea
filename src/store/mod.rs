pub mod factory;
pub mod memory;
pub mod sled_store;

pub use factory::create_store;
pub use memory::MemoryStore;
pub use sled_store::SledStore;

use crate::error::Result;
use crate::models::{
    EventPatch, EventRecord, EventScope, Incident, IncidentField, IncidentId, IncidentSelector,
    IntegrationKind, IntegrationRecord, NewEvent, NewIncidentRow, Participant, StatuspageUpdate,
};
use async_trait::async_trait;
use uuid::Uuid;

/// Persistence and lookup of the incident aggregate and its relations.
///
/// All access to shared mutable incident state goes through this trait; no
/// component bypasses it.
#[async_trait]
pub trait IncidentStore: Send + Sync {
    /// Persist a new aggregate, allocating its id and slug in one write.
    /// Channel fields stay empty until a follow-up `update_field`.
    async fn create(&self, row: NewIncidentRow) -> Result<Incident>;

    /// Look up a single incident
    async fn get(&self, selector: &IncidentSelector) -> Result<Option<Incident>>;

    /// Single-column write. Last write wins; there is no concurrency token.
    async fn update_field(&self, id: IncidentId, field: IncidentField) -> Result<()>;

    /// All incidents not yet at the given final status
    async fn list_open(&self, final_status: &str) -> Result<Vec<Incident>>;

    /// Most recent open incidents, oldest first
    async fn list_recent(&self, final_status: &str, limit: usize) -> Result<Vec<Incident>>;

    /// Operator-level removal; cascades participants, events, and
    /// integration records
    async fn delete(&self, id: IncidentId) -> Result<()>;

    // Participants

    /// Store a role claim. Uniqueness on (incident, role, user) is the
    /// caller-visible contract; a duplicate claim is a validation error.
    async fn associate_role(&self, participant: Participant) -> Result<()>;

    /// Whether the (incident, role, user) triple is already claimed
    async fn role_claimed(&self, id: IncidentId, role: &str, user_id: &str) -> Result<bool>;

    /// Remove a claim; returns false when the triple was not claimed
    async fn remove_role(&self, id: IncidentId, role: &str, user_id: &str) -> Result<bool>;

    async fn list_participants(&self, id: IncidentId) -> Result<Vec<Participant>>;

    // Integration records

    /// Persist a link to an external artifact. For the postmortem kind the
    /// existence check and the insert are one conditional write: a second
    /// postmortem for the same incident is a validation conflict, not a
    /// silent duplicate.
    async fn add_integration_record(&self, record: IntegrationRecord) -> Result<IntegrationRecord>;

    async fn list_integration_records(
        &self,
        id: IncidentId,
        kind: Option<IntegrationKind>,
    ) -> Result<Vec<IntegrationRecord>>;

    async fn get_postmortem(&self, id: IncidentId) -> Result<Option<IntegrationRecord>>;

    /// Append one update to a status-page record's history
    async fn append_statuspage_update(
        &self,
        record_id: &Uuid,
        update: StatuspageUpdate,
    ) -> Result<()>;
}

/// Append-only, ordered record of everything that happened to one incident.
///
/// This is the sole source of truth consumed by postmortem assembly.
#[async_trait]
pub trait EventLog: Send + Sync {
    /// Append an entry; the log assigns the id and creation timestamp
    async fn append(&self, event: NewEvent) -> Result<EventRecord>;

    /// Timeline for one incident, ascending by creation time
    async fn read(&self, scope: &EventScope) -> Result<Vec<EventRecord>>;

    async fn read_one(&self, id: &Uuid) -> Result<Option<EventRecord>>;

    /// Edit text/title/timestamp; source, parent, and creation time are
    /// immutable
    async fn update(&self, id: &Uuid, patch: EventPatch) -> Result<()>;

    /// Hard remove of exactly one entry
    async fn delete(&self, id: &Uuid) -> Result<()>;
}
