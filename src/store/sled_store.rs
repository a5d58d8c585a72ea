use crate::error::{AppError, Result};
use crate::models::{
    format_channel_name, EventPatch, EventRecord, EventScope, Incident, IncidentField, IncidentId,
    IncidentSelector, IntegrationKind, IntegrationRecord, NewEvent, NewIncidentRow, Participant,
    StatuspageUpdate,
};
use crate::store::{EventLog, IncidentStore};
use async_trait::async_trait;
use chrono::Utc;
use sled::Db;
use std::path::Path;
use std::sync::Arc;
use uuid::Uuid;

/// Persistent store using the Sled embedded database.
///
/// Trees: `incidents` (id → row), `slug_index` and `channel_index`
/// (secondary lookups), `participants` (composite key → row), `records`
/// (incident+uuid → row), `postmortems` (id → record uuid, conditional),
/// `events` (incident+uuid → row) and `event_index` (uuid → incident).
#[derive(Clone)]
pub struct SledStore {
    db: Arc<Db>,
    incidents: sled::Tree,
    slug_index: sled::Tree,
    channel_index: sled::Tree,
    participants: sled::Tree,
    records: sled::Tree,
    record_index: sled::Tree,
    postmortems: sled::Tree,
    events: sled::Tree,
    event_index: sled::Tree,
}

impl SledStore {
    /// Open (or create) a store at the specified path
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let db = sled::open(&path)
            .map_err(|e| AppError::Database(format!("failed to open database: {}", e)))?;

        fn open_tree(db: &Db, name: &str) -> Result<sled::Tree> {
            db.open_tree(name)
                .map_err(|e| AppError::Database(format!("failed to open tree {}: {}", name, e)))
        }

        let store = Self {
            incidents: open_tree(&db, "incidents")?,
            slug_index: open_tree(&db, "slug_index")?,
            channel_index: open_tree(&db, "channel_index")?,
            participants: open_tree(&db, "participants")?,
            records: open_tree(&db, "records")?,
            record_index: open_tree(&db, "record_index")?,
            postmortems: open_tree(&db, "postmortems")?,
            events: open_tree(&db, "events")?,
            event_index: open_tree(&db, "event_index")?,
            db: Arc::new(db),
        };

        tracing::info!(path = ?path.as_ref(), "Initialized sled store");
        Ok(store)
    }

    fn serialize<T: serde::Serialize>(value: &T) -> Result<Vec<u8>> {
        bincode::serialize(value)
            .map_err(|e| AppError::Serialization(format!("failed to serialize row: {}", e)))
    }

    fn deserialize<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> Result<T> {
        bincode::deserialize(bytes)
            .map_err(|e| AppError::Serialization(format!("failed to deserialize row: {}", e)))
    }

    fn id_key(id: IncidentId) -> [u8; 8] {
        id.to_be_bytes()
    }

    fn participant_key(id: IncidentId, role: &str, user_id: &str) -> Vec<u8> {
        let mut key = Self::id_key(id).to_vec();
        key.push(0);
        key.extend_from_slice(role.as_bytes());
        key.push(0);
        key.extend_from_slice(user_id.as_bytes());
        key
    }

    fn child_key(id: IncidentId, child: &Uuid) -> Vec<u8> {
        let mut key = Self::id_key(id).to_vec();
        key.extend_from_slice(child.as_bytes());
        key
    }

    fn load_incident(&self, id: IncidentId) -> Result<Option<Incident>> {
        match self.incidents.get(Self::id_key(id))? {
            Some(bytes) => Ok(Some(Self::deserialize(&bytes)?)),
            None => Ok(None),
        }
    }

    fn id_from_index(&self, tree: &sled::Tree, key: &str) -> Result<Option<IncidentId>> {
        match tree.get(key.as_bytes())? {
            Some(bytes) => {
                let raw: [u8; 8] = bytes
                    .as_ref()
                    .try_into()
                    .map_err(|_| AppError::Database("corrupt index entry".to_string()))?;
                Ok(Some(IncidentId::from_be_bytes(raw)))
            }
            None => Ok(None),
        }
    }

    /// Flush pending writes to disk
    pub async fn flush(&self) -> Result<()> {
        self.db
            .flush_async()
            .await
            .map_err(|e| AppError::Database(format!("failed to flush database: {}", e)))?;
        Ok(())
    }
}

#[async_trait]
impl IncidentStore for SledStore {
    async fn create(&self, row: NewIncidentRow) -> Result<Incident> {
        let id = self.db.generate_id()? + 1;
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

        self.incidents
            .insert(Self::id_key(id), Self::serialize(&incident)?)?;
        self.slug_index
            .insert(incident.slug.as_bytes(), Self::id_key(id).to_vec())?;
        self.incidents.flush()?;

        tracing::debug!(incident_id = id, slug = %incident.slug, "Incident created");
        Ok(incident)
    }

    async fn get(&self, selector: &IncidentSelector) -> Result<Option<Incident>> {
        let id = match selector {
            IncidentSelector::ById(id) => Some(*id),
            IncidentSelector::BySlug(slug) => self.id_from_index(&self.slug_index, slug)?,
            IncidentSelector::ByChannel(channel) => {
                self.id_from_index(&self.channel_index, channel)?
            }
        };

        match id {
            Some(id) => self.load_incident(id),
            None => Ok(None),
        }
    }

    async fn update_field(&self, id: IncidentId, field: IncidentField) -> Result<()> {
        let mut incident = self
            .load_incident(id)?
            .ok_or_else(|| AppError::NotFound(format!("incident {} not found", id)))?;

        if let IncidentField::ChannelRef(ref channel) = field {
            if let Some(ref old) = incident.channel_ref {
                self.channel_index.remove(old.as_bytes())?;
            }
            self.channel_index
                .insert(channel.as_bytes(), Self::id_key(id).to_vec())?;
        }

        let name = field.name();
        field.apply(&mut incident);
        self.incidents
            .insert(Self::id_key(id), Self::serialize(&incident)?)?;
        self.incidents.flush()?;

        tracing::debug!(incident_id = id, field = name, "Incident field updated");
        Ok(())
    }

    async fn list_open(&self, final_status: &str) -> Result<Vec<Incident>> {
        let mut incidents = Vec::new();
        for result in self.incidents.iter() {
            let (_, value) = result?;
            let incident: Incident = Self::deserialize(&value)?;
            if incident.is_open(final_status) {
                incidents.push(incident);
            }
        }

        incidents.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(incidents)
    }

    async fn list_recent(&self, final_status: &str, limit: usize) -> Result<Vec<Incident>> {
        let open = self.list_open(final_status).await?;
        let skip = open.len().saturating_sub(limit);
        Ok(open.into_iter().skip(skip).collect())
    }

    async fn delete(&self, id: IncidentId) -> Result<()> {
        let incident = self
            .load_incident(id)?
            .ok_or_else(|| AppError::NotFound(format!("incident {} not found", id)))?;

        self.incidents.remove(Self::id_key(id))?;
        self.slug_index.remove(incident.slug.as_bytes())?;
        if let Some(ref channel) = incident.channel_ref {
            self.channel_index.remove(channel.as_bytes())?;
        }

        let prefix = Self::id_key(id);
        for tree in [&self.participants, &self.records] {
            let keys: Vec<_> = tree
                .scan_prefix(prefix)
                .keys()
                .collect::<std::result::Result<_, _>>()?;
            for key in keys {
                tree.remove(key)?;
            }
        }
        self.postmortems.remove(prefix)?;

        let event_keys: Vec<_> = self
            .events
            .scan_prefix(prefix)
            .keys()
            .collect::<std::result::Result<_, _>>()?;
        for key in event_keys {
            // Child uuid trails the 8-byte incident prefix
            if key.len() > 8 {
                self.event_index.remove(&key[8..])?;
            }
            self.events.remove(key)?;
        }

        let record_keys: Vec<_> = self
            .record_index
            .iter()
            .filter_map(|entry| entry.ok())
            .filter(|(_, parent)| parent.as_ref() == prefix.as_slice())
            .map(|(key, _)| key)
            .collect();
        for key in record_keys {
            self.record_index.remove(key)?;
        }

        self.incidents.flush()?;
        tracing::debug!(incident_id = id, "Incident deleted with cascade");
        Ok(())
    }

    async fn associate_role(&self, participant: Participant) -> Result<()> {
        let key = Self::participant_key(participant.parent, &participant.role, &participant.user_id);

        // compare_and_swap against absence makes the uniqueness check and
        // the insert one operation
        let outcome = self
            .participants
            .compare_and_swap(key, None as Option<&[u8]>, Some(Self::serialize(&participant)?))?;

        if outcome.is_err() {
            return Err(AppError::Validation(format!(
                "{} already claimed {} on incident {}",
                participant.user_name, participant.role, participant.parent
            )));
        }

        self.participants.flush()?;
        Ok(())
    }

    async fn role_claimed(&self, id: IncidentId, role: &str, user_id: &str) -> Result<bool> {
        Ok(self
            .participants
            .contains_key(Self::participant_key(id, role, user_id))?)
    }

    async fn remove_role(&self, id: IncidentId, role: &str, user_id: &str) -> Result<bool> {
        let removed = self
            .participants
            .remove(Self::participant_key(id, role, user_id))?
            .is_some();
        if removed {
            self.participants.flush()?;
        }
        Ok(removed)
    }

    async fn list_participants(&self, id: IncidentId) -> Result<Vec<Participant>> {
        let mut participants = Vec::new();
        for result in self.participants.scan_prefix(Self::id_key(id)) {
            let (_, value) = result?;
            participants.push(Self::deserialize::<Participant>(&value)?);
        }

        participants.sort_by(|a, b| a.claimed_at.cmp(&b.claimed_at));
        Ok(participants)
    }

    async fn add_integration_record(&self, record: IntegrationRecord) -> Result<IntegrationRecord> {
        if record.kind == IntegrationKind::Postmortem {
            // Unique postmortem per incident, enforced as a conditional
            // write rather than a check-then-insert
            let outcome = self.postmortems.compare_and_swap(
                Self::id_key(record.parent),
                None as Option<&[u8]>,
                Some(record.id.as_bytes().as_slice()),
            )?;

            if outcome.is_err() {
                return Err(AppError::Validation(format!(
                    "incident {} already has a postmortem record",
                    record.parent
                )));
            }
        }

        let key = Self::child_key(record.parent, &record.id);
        self.records.insert(&key, Self::serialize(&record)?)?;
        self.record_index
            .insert(record.id.as_bytes(), Self::id_key(record.parent).to_vec())?;
        self.records.flush()?;

        tracing::debug!(
            incident_id = record.parent,
            kind = %record.kind,
            external_ref = %record.external_ref,
            "Integration record added"
        );
        Ok(record)
    }

    async fn list_integration_records(
        &self,
        id: IncidentId,
        kind: Option<IntegrationKind>,
    ) -> Result<Vec<IntegrationRecord>> {
        let mut records = Vec::new();
        for result in self.records.scan_prefix(Self::id_key(id)) {
            let (_, value) = result?;
            let record: IntegrationRecord = Self::deserialize(&value)?;
            if kind.map(|k| record.kind == k).unwrap_or(true) {
                records.push(record);
            }
        }

        records.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(records)
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
        let parent = match self.record_index.get(record_id.as_bytes())? {
            Some(bytes) => {
                let raw: [u8; 8] = bytes
                    .as_ref()
                    .try_into()
                    .map_err(|_| AppError::Database("corrupt record index".to_string()))?;
                IncidentId::from_be_bytes(raw)
            }
            None => {
                return Err(AppError::NotFound(format!(
                    "integration record {} not found",
                    record_id
                )))
            }
        };

        let key = Self::child_key(parent, record_id);
        let bytes = self.records.get(&key)?.ok_or_else(|| {
            AppError::NotFound(format!("integration record {} not found", record_id))
        })?;

        let mut record: IntegrationRecord = Self::deserialize(&bytes)?;
        record.updates.push(update);
        record.updated_at = Utc::now();
        self.records.insert(&key, Self::serialize(&record)?)?;
        self.records.flush()?;
        Ok(())
    }
}

#[async_trait]
impl EventLog for SledStore {
    async fn append(&self, event: NewEvent) -> Result<EventRecord> {
        let record = event.into_record();
        let key = Self::child_key(record.parent, &record.id);

        self.events.insert(&key, Self::serialize(&record)?)?;
        self.event_index
            .insert(record.id.as_bytes(), Self::id_key(record.parent).to_vec())?;
        self.events.flush()?;

        tracing::debug!(event_id = %record.id, incident_id = record.parent, "Event appended");
        Ok(record)
    }

    async fn read(&self, scope: &EventScope) -> Result<Vec<EventRecord>> {
        let id = match scope {
            EventScope::ByIncidentId(id) => Some(*id),
            EventScope::BySlug(slug) => self.id_from_index(&self.slug_index, slug)?,
        };

        let Some(id) = id else {
            return Ok(Vec::new());
        };

        let mut records = Vec::new();
        for result in self.events.scan_prefix(Self::id_key(id)) {
            let (_, value) = result?;
            records.push(Self::deserialize::<EventRecord>(&value)?);
        }

        // Keys embed v7 uuids, so the scan is already time-ordered; sorting
        // by creation time keeps the contract explicit.
        records.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(records)
    }

    async fn read_one(&self, id: &Uuid) -> Result<Option<EventRecord>> {
        let parent = match self.event_index.get(id.as_bytes())? {
            Some(bytes) => {
                let raw: [u8; 8] = bytes
                    .as_ref()
                    .try_into()
                    .map_err(|_| AppError::Database("corrupt event index".to_string()))?;
                IncidentId::from_be_bytes(raw)
            }
            None => return Ok(None),
        };

        match self.events.get(Self::child_key(parent, id))? {
            Some(bytes) => Ok(Some(Self::deserialize(&bytes)?)),
            None => Ok(None),
        }
    }

    async fn update(&self, id: &Uuid, patch: EventPatch) -> Result<()> {
        let mut record = self
            .read_one(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("event {} not found", id)))?;

        patch.apply(&mut record);
        let key = Self::child_key(record.parent, id);
        self.events.insert(&key, Self::serialize(&record)?)?;
        self.events.flush()?;
        Ok(())
    }

    async fn delete(&self, id: &Uuid) -> Result<()> {
        let record = self
            .read_one(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("event {} not found", id)))?;

        self.events.remove(Self::child_key(record.parent, id))?;
        self.event_index.remove(id.as_bytes())?;
        self.events.flush()?;

        tracing::debug!(event_id = %id, "Event deleted");
        Ok(())
    }
}
