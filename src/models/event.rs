use crate::models::IncidentId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use uuid::Uuid;

/// Where a timeline entry came from
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, EnumString, Display,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum EventSource {
    /// Written by the orchestrator itself on a transition
    System,
    /// Written by an explicit user command
    User,
    /// Pinned content (message or image) promoted onto the timeline
    Pin,
}

/// One append-only timeline entry for an incident.
///
/// `source`, `parent`, and `created_at` never change after creation; only
/// text, title, attachment, and the logical timestamp are editable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventRecord {
    /// Unique, time-sortable identifier
    pub id: Uuid,

    pub parent: IncidentId,

    pub incident_slug: String,

    pub source: EventSource,

    pub text: Option<String>,

    pub title: Option<String>,

    /// Attachment bytes, stored alongside the row
    pub image: Option<Vec<u8>>,

    pub mimetype: Option<String>,

    /// Reference to the originating chat message, if any
    pub message_ref: Option<String>,

    /// Who caused the entry
    pub actor: Option<String>,

    /// Logical event time, distinct from creation time; used for pinned
    /// content that predates the pin action
    pub timestamp: Option<DateTime<Utc>>,

    pub created_at: DateTime<Utc>,

    pub updated_at: Option<DateTime<Utc>>,
}

/// A timeline entry about to be appended; the log assigns id and created_at
#[derive(Debug, Clone, Default)]
pub struct NewEvent {
    pub parent: IncidentId,
    pub incident_slug: String,
    pub source: Option<EventSource>,
    pub text: Option<String>,
    pub title: Option<String>,
    pub image: Option<Vec<u8>>,
    pub mimetype: Option<String>,
    pub message_ref: Option<String>,
    pub actor: Option<String>,
    pub timestamp: Option<DateTime<Utc>>,
}

impl NewEvent {
    /// A system-sourced entry, the shape every transition writes
    pub fn system(parent: IncidentId, slug: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            parent,
            incident_slug: slug.into(),
            source: Some(EventSource::System),
            text: Some(text.into()),
            ..Default::default()
        }
    }

    /// A user-sourced entry
    pub fn user(
        parent: IncidentId,
        slug: impl Into<String>,
        text: impl Into<String>,
        actor: impl Into<String>,
    ) -> Self {
        Self {
            parent,
            incident_slug: slug.into(),
            source: Some(EventSource::User),
            text: Some(text.into()),
            actor: Some(actor.into()),
            ..Default::default()
        }
    }

    /// A pinned entry, optionally carrying an attachment
    pub fn pin(parent: IncidentId, slug: impl Into<String>) -> Self {
        Self {
            parent,
            incident_slug: slug.into(),
            source: Some(EventSource::Pin),
            ..Default::default()
        }
    }

    pub fn with_actor(mut self, actor: impl Into<String>) -> Self {
        self.actor = Some(actor.into());
        self
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_attachment(mut self, image: Vec<u8>, mimetype: impl Into<String>) -> Self {
        self.image = Some(image);
        self.mimetype = Some(mimetype.into());
        self
    }

    pub fn with_message_ref(mut self, message_ref: impl Into<String>) -> Self {
        self.message_ref = Some(message_ref.into());
        self
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// Seal into a record: assign the time-sortable id and creation time
    pub fn into_record(self) -> EventRecord {
        EventRecord {
            id: Uuid::now_v7(),
            parent: self.parent,
            incident_slug: self.incident_slug,
            source: self.source.unwrap_or(EventSource::System),
            text: self.text,
            title: self.title,
            image: self.image,
            mimetype: self.mimetype,
            message_ref: self.message_ref,
            actor: self.actor,
            timestamp: self.timestamp,
            created_at: Utc::now(),
            updated_at: None,
        }
    }
}

/// Editable slice of a timeline entry
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventPatch {
    pub text: Option<String>,
    pub title: Option<String>,
    pub timestamp: Option<DateTime<Utc>>,
}

impl EventPatch {
    pub fn is_empty(&self) -> bool {
        self.text.is_none() && self.title.is_none() && self.timestamp.is_none()
    }

    /// Apply onto an existing record, leaving immutable fields untouched
    pub fn apply(&self, record: &mut EventRecord) {
        if let Some(ref text) = self.text {
            record.text = Some(text.clone());
        }
        if let Some(ref title) = self.title {
            record.title = Some(title.clone());
        }
        if let Some(timestamp) = self.timestamp {
            record.timestamp = Some(timestamp);
        }
        record.updated_at = Some(Utc::now());
    }
}

/// Lookup key for an incident's timeline
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventScope {
    ByIncidentId(IncidentId),
    BySlug(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_ids_are_time_sortable() {
        let a = NewEvent::system(1, "inc-1", "first").into_record();
        std::thread::sleep(std::time::Duration::from_millis(2));
        let b = NewEvent::system(1, "inc-1", "second").into_record();

        assert_eq!(a.id.get_version_num(), 7);
        assert!(a.id < b.id);
        assert!(a.created_at <= b.created_at);
    }

    #[test]
    fn test_patch_leaves_immutable_fields() {
        let mut record = NewEvent::user(1, "inc-1", "original", "casey").into_record();
        let source = record.source;
        let created_at = record.created_at;

        EventPatch {
            text: Some("edited".to_string()),
            ..Default::default()
        }
        .apply(&mut record);

        assert_eq!(record.text.as_deref(), Some("edited"));
        assert_eq!(record.source, source);
        assert_eq!(record.created_at, created_at);
        assert!(record.updated_at.is_some());
    }

    #[test]
    fn test_event_source_parsing() {
        assert_eq!("pin".parse::<EventSource>().unwrap(), EventSource::Pin);
        assert_eq!(EventSource::System.to_string(), "system");
    }

    #[test]
    fn test_pin_with_attachment() {
        let record = NewEvent::pin(3, "inc-3")
            .with_attachment(vec![0x89, 0x50], "image/png")
            .with_message_ref("1712000000.000100")
            .into_record();

        assert_eq!(record.source, EventSource::Pin);
        assert_eq!(record.mimetype.as_deref(), Some("image/png"));
        assert!(record.image.is_some());
    }
}
