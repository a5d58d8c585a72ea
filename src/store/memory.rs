use crate::error::{AppError, Result};
use crate::models::{
    format_channel_name, EventPatch, EventRecord, EventScope, Incident, IncidentField, IncidentId,
    IncidentSelector, IntegrationKind, IntegrationRecord, NewEvent, NewIncidentRow, Participant,
    StatuspageUpdate,
};
use crate::store::{EventLog, IncidentStore};
use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use uuid::Uuid;

/// In-memory store (for MVP and testing); implements both the aggregate
/// store and the event log over the same maps so deletes cascade.
#[derive(Clone)]
pub struct MemoryStore {
    incidents: Arc<DashMap<IncidentId, Incident>>,
    participants: Arc<DashMap<IncidentId, Vec<Participant>>>,
    records: Arc<DashMap<IncidentId, Vec<IntegrationRecord>>>,
    events: Arc<DashMap<Uuid, EventRecord>>,
    next_id: Arc<AtomicU64>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            incidents: Arc::new(DashMap::new()),
            participants: Arc::new(DashMap::new()),
            records: Arc::new(DashMap::new()),
            events: Arc::new(DashMap::new()),
            next_id: Arc::new(AtomicU64::new(1)),
        }
    }

    fn resolve(&self, selector: &IncidentSelector) -> Option<Incident> {
        match selector {
            IncidentSelector::ById(id) => self.incidents.get(id).map(|entry| entry.clone()),
            IncidentSelector::BySlug(slug) => self
                .incidents
                .iter()
                .find(|entry| entry.value().slug == *slug)
                .map(|entry| entry.value().clone()),
            IncidentSelector::ByChannel(channel) => self
                .incidents
                .iter()
                .find(|entry| entry.value().channel_ref.as_deref() == Some(channel.as_str()))
                .map(|entry| entry.value().clone()),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl IncidentStore for MemoryStore {
    async fn create(&self, row: NewIncidentRow) -> Result<Incident> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let now = Utc::now();
        let incident = Incident {
            id,
            slug: format!("{}-{}", row.slug_prefix, id),
            channel_ref: None,
            channel_name: Some(format_channel_name(&row.slug_prefix, id, &row.description)),
            description: row.description,
            components: row.components,
            impact: row.impact,
            severity: row.severity,
            status: row.status,
            link: None,
            last_update_sent: None,
            created_at: now,
            updated_at: now,
        };

        self.incidents.insert(id, incident.clone());
        tracing::debug!(incident_id = id, slug = %incident.slug, "Incident created");
        Ok(incident)
    }

    async fn get(&self, selector: &IncidentSelector) -> Result<Option<Incident>> {
        Ok(self.resolve(selector))
    }

    async fn update_field(&self, id: IncidentId, field: IncidentField) -> Result<()> {
        let mut entry = self
            .incidents
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound(format!("incident {} not found", id)))?;

        let name = field.name();
        field.apply(entry.value_mut());
        tracing::debug!(incident_id = id, field = name, "Incident field updated");
        Ok(())
    }

    async fn list_open(&self, final_status: &str) -> Result<Vec<Incident>> {
        let mut incidents: Vec<Incident> = self
            .incidents
            .iter()
            .map(|entry| entry.value().clone())
            .filter(|incident| incident.is_open(final_status))
            .collect();

        incidents.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(incidents)
    }

    async fn list_recent(&self, final_status: &str, limit: usize) -> Result<Vec<Incident>> {
        let open = self.list_open(final_status).await?;
        let skip = open.len().saturating_sub(limit);
        Ok(open.into_iter().skip(skip).collect())
    }

    async fn delete(&self, id: IncidentId) -> Result<()> {
        if self.incidents.remove(&id).is_none() {
            return Err(AppError::NotFound(format!("incident {} not found", id)));
        }

        self.participants.remove(&id);
        self.records.remove(&id);
        self.events.retain(|_, event| event.parent != id);

        tracing::debug!(incident_id = id, "Incident deleted with cascade");
        Ok(())
    }

    async fn associate_role(&self, participant: Participant) -> Result<()> {
        let mut entry = self.participants.entry(participant.parent).or_default();

        if entry
            .iter()
            .any(|p| p.role == participant.role && p.user_id == participant.user_id)
        {
            return Err(AppError::Validation(format!(
                "{} already claimed {} on incident {}",
                participant.user_name, participant.role, participant.parent
            )));
        }

        entry.push(participant);
        Ok(())
    }

    async fn role_claimed(&self, id: IncidentId, role: &str, user_id: &str) -> Result<bool> {
        Ok(self
            .participants
            .get(&id)
            .map(|entry| {
                entry
                    .iter()
                    .any(|p| p.role == role && p.user_id == user_id)
            })
            .unwrap_or(false))
    }

    async fn remove_role(&self, id: IncidentId, role: &str, user_id: &str) -> Result<bool> {
        if let Some(mut entry) = self.participants.get_mut(&id) {
            let before = entry.len();
            entry.retain(|p| !(p.role == role && p.user_id == user_id));
            Ok(entry.len() < before)
        } else {
            Ok(false)
        }
    }

    async fn list_participants(&self, id: IncidentId) -> Result<Vec<Participant>> {
        let mut participants = self
            .participants
            .get(&id)
            .map(|entry| entry.clone())
            .unwrap_or_default();
        participants.sort_by(|a, b| a.claimed_at.cmp(&b.claimed_at));
        Ok(participants)
    }

    async fn add_integration_record(&self, record: IntegrationRecord) -> Result<IntegrationRecord> {
        // The entry guard makes check-then-insert one operation for the
        // postmortem uniqueness constraint.
        let mut entry = self.records.entry(record.parent).or_default();

        if record.kind == IntegrationKind::Postmortem
            && entry.iter().any(|r| r.kind == IntegrationKind::Postmortem)
        {
            return Err(AppError::Validation(format!(
                "incident {} already has a postmortem record",
                record.parent
            )));
        }

        entry.push(record.clone());
        Ok(record)
    }

    async fn list_integration_records(
        &self,
        id: IncidentId,
        kind: Option<IntegrationKind>,
    ) -> Result<Vec<IntegrationRecord>> {
        let records = self
            .records
            .get(&id)
            .map(|entry| entry.clone())
            .unwrap_or_default();

        Ok(match kind {
            Some(kind) => records.into_iter().filter(|r| r.kind == kind).collect(),
            None => records,
        })
    }

    async fn get_postmortem(&self, id: IncidentId) -> Result<Option<IntegrationRecord>> {
        Ok(self
            .list_integration_records(id, Some(IntegrationKind::Postmortem))
            .await?
            .into_iter()
            .next())
    }

    async fn append_statuspage_update(
        &self,
        record_id: &Uuid,
        update: StatuspageUpdate,
    ) -> Result<()> {
        for mut entry in self.records.iter_mut() {
            if let Some(record) = entry.value_mut().iter_mut().find(|r| r.id == *record_id) {
                record.updates.push(update);
                record.updated_at = Utc::now();
                return Ok(());
            }
        }

        Err(AppError::NotFound(format!(
            "integration record {} not found",
            record_id
        )))
    }
}

#[async_trait]
impl EventLog for MemoryStore {
    async fn append(&self, event: NewEvent) -> Result<EventRecord> {
        let record = event.into_record();
        self.events.insert(record.id, record.clone());
        tracing::debug!(event_id = %record.id, incident_id = record.parent, "Event appended");
        Ok(record)
    }

    async fn read(&self, scope: &EventScope) -> Result<Vec<EventRecord>> {
        let mut records: Vec<EventRecord> = self
            .events
            .iter()
            .map(|entry| entry.value().clone())
            .filter(|event| match scope {
                EventScope::ByIncidentId(id) => event.parent == *id,
                EventScope::BySlug(slug) => event.incident_slug == *slug,
            })
            .collect();

        records.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(records)
    }

    async fn read_one(&self, id: &Uuid) -> Result<Option<EventRecord>> {
        Ok(self.events.get(id).map(|entry| entry.clone()))
    }

    async fn update(&self, id: &Uuid, patch: EventPatch) -> Result<()> {
        let mut entry = self
            .events
            .get_mut(id)
            .ok_or_else(|| AppError::NotFound(format!("event {} not found", id)))?;

        patch.apply(entry.value_mut());
        Ok(())
    }

    async fn delete(&self, id: &Uuid) -> Result<()> {
        self.events
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| AppError::NotFound(format!("event {} not found", id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(description: &str) -> NewIncidentRow {
        NewIncidentRow {
            slug_prefix: "inc".to_string(),
            description: description.to_string(),
            severity: "sev4".to_string(),
            status: "investigating".to_string(),
            components: None,
            impact: None,
        }
    }

    #[tokio::test]
    async fn test_create_allocates_id_and_slug() {
        let store = MemoryStore::new();

        let first = store.create(row("api errors")).await.unwrap();
        let second = store.create(row("db saturation")).await.unwrap();

        assert_eq!(first.id, 1);
        assert_eq!(first.slug, "inc-1");
        assert_eq!(second.slug, "inc-2");
        assert!(first.channel_ref.is_none());
    }

    #[tokio::test]
    async fn test_lookup_by_each_selector() {
        let store = MemoryStore::new();
        let incident = store.create(row("api errors")).await.unwrap();

        store
            .update_field(incident.id, IncidentField::ChannelRef("C123".to_string()))
            .await
            .unwrap();

        assert!(store
            .get(&IncidentSelector::ById(incident.id))
            .await
            .unwrap()
            .is_some());
        assert!(store
            .get(&IncidentSelector::BySlug("inc-1".to_string()))
            .await
            .unwrap()
            .is_some());
        assert!(store
            .get(&IncidentSelector::ByChannel("C123".to_string()))
            .await
            .unwrap()
            .is_some());
        assert!(store
            .get(&IncidentSelector::BySlug("inc-99".to_string()))
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_postmortem_conditional_insert() {
        let store = MemoryStore::new();
        let incident = store.create(row("api errors")).await.unwrap();

        store
            .add_integration_record(IntegrationRecord::new(
                incident.id,
                IntegrationKind::Postmortem,
                "https://docs.example.com/pm/1",
            ))
            .await
            .unwrap();

        let duplicate = store
            .add_integration_record(IntegrationRecord::new(
                incident.id,
                IntegrationKind::Postmortem,
                "https://docs.example.com/pm/other",
            ))
            .await;

        assert!(matches!(duplicate, Err(AppError::Validation(_))));
        assert!(store.get_postmortem(incident.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_delete_cascades() {
        let store = MemoryStore::new();
        let incident = store.create(row("api errors")).await.unwrap();

        store
            .associate_role(Participant::new(incident.id, "scribe", "U1", "casey", false))
            .await
            .unwrap();
        EventLog::append(
            &store,
            NewEvent::system(incident.id, &incident.slug, "Incident created"),
        )
        .await
        .unwrap();

        IncidentStore::delete(&store, incident.id).await.unwrap();

        assert!(store
            .get(&IncidentSelector::ById(incident.id))
            .await
            .unwrap()
            .is_none());
        assert!(store.list_participants(incident.id).await.unwrap().is_empty());
        assert!(EventLog::read(&store, &EventScope::ByIncidentId(incident.id))
            .await
            .unwrap()
            .is_empty());
    }
}
