//! Postmortem input assembly.
//!
//! Builds the document-generator input from the aggregate, its ordered
//! timeline, and its ordered participant list. Generation itself lives
//! behind [`crate::integrations::DocAdapter`]; this module only shapes the
//! data the generator receives.

use crate::models::{EventRecord, Incident, Participant};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One timeline tuple handed to the document generator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostmortemEntry {
    pub timestamp: DateTime<Utc>,
    pub actor: Option<String>,
    #[serde(flatten)]
    pub body: PostmortemBody,
}

/// Text entries pass through as-is; attachments keep their bytes and MIME
/// type untouched
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PostmortemBody {
    Text { text: String },
    Attachment { bytes: Vec<u8>, mimetype: String },
}

/// One (role, user) tuple
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostmortemRole {
    pub role: String,
    pub user: String,
}

/// Everything the orchestrator supplies to a document generator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostmortemInput {
    pub title: String,
    pub description: String,
    pub severity: String,
    pub components: Option<String>,
    pub impact: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub timeline: Vec<PostmortemEntry>,
    pub participants: Vec<PostmortemRole>,
}

impl PostmortemInput {
    /// Assemble from the aggregate plus its ordered relations. Events carry
    /// their logical timestamp when one was set (pinned content predating
    /// the pin), falling back to creation time.
    pub fn assemble(
        incident: &Incident,
        events: &[EventRecord],
        participants: &[Participant],
    ) -> Self {
        let timeline = events
            .iter()
            .filter_map(|event| {
                let body = match (&event.image, &event.mimetype, &event.text) {
                    (Some(bytes), Some(mimetype), _) => Some(PostmortemBody::Attachment {
                        bytes: bytes.clone(),
                        mimetype: mimetype.clone(),
                    }),
                    (_, _, Some(text)) => Some(PostmortemBody::Text { text: text.clone() }),
                    _ => None,
                };

                body.map(|body| PostmortemEntry {
                    timestamp: event.timestamp.unwrap_or(event.created_at),
                    actor: event.actor.clone(),
                    body,
                })
            })
            .collect();

        let participants = participants
            .iter()
            .map(|p| PostmortemRole {
                role: p.role.clone(),
                user: p.user_name.clone(),
            })
            .collect();

        Self {
            title: format!(
                "{} - {} - {}",
                incident.created_at.format("%Y-%m-%d"),
                incident.slug.to_uppercase(),
                incident.description
            ),
            description: incident.description.clone(),
            severity: incident.severity.clone(),
            components: incident.components.clone(),
            impact: incident.impact.clone(),
            created_at: incident.created_at,
            updated_at: incident.updated_at,
            timeline,
            participants,
        }
    }
}
