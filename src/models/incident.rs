use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use uuid::Uuid;
use validator::Validate;

/// Numeric incident identifier, allocated by the store
pub type IncidentId = u64;

/// The central aggregate: one tracked operational event
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Incident {
    /// Unique numeric identifier
    pub id: IncidentId,

    /// Human slug, `{prefix}-{id}`; immutable after creation
    pub slug: String,

    /// Reference to the externally created channel, if one exists yet
    pub channel_ref: Option<String>,

    /// Normalized channel name derived from the description
    pub channel_name: Option<String>,

    /// What is happening
    pub description: String,

    /// Impacted components
    pub components: Option<String>,

    /// User-facing impact text
    pub impact: Option<String>,

    /// Current severity; member of the configured severity set
    pub severity: String,

    /// Current status; member of the configured status set
    pub status: String,

    /// Permalink to the incident channel
    pub link: Option<String>,

    /// When the last periodic update went out
    pub last_update_sent: Option<DateTime<Utc>>,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Last update timestamp
    pub updated_at: DateTime<Utc>,
}

impl Incident {
    /// Whether the incident has not yet reached the given final status
    pub fn is_open(&self, final_status: &str) -> bool {
        self.status != final_status
    }

    /// Notification target for this incident: the channel if it exists,
    /// otherwise the slug
    pub fn channel(&self) -> &str {
        self.channel_ref.as_deref().unwrap_or(&self.slug)
    }
}

/// Parameters accepted when opening a new incident
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CreateIncident {
    #[validate(length(min = 1, max = 500))]
    pub description: String,

    /// Member of the configured severity set
    #[validate(length(min = 1, max = 64))]
    pub severity: String,

    pub components: Option<String>,

    pub impact: Option<String>,
}

/// Row-level parameters handed to the store; the store allocates the id and
/// builds the slug from it within the same write
#[derive(Debug, Clone)]
pub struct NewIncidentRow {
    pub slug_prefix: String,
    pub description: String,
    pub severity: String,
    pub status: String,
    pub components: Option<String>,
    pub impact: Option<String>,
}

/// Lookup key for an incident
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IncidentSelector {
    ById(IncidentId),
    BySlug(String),
    ByChannel(String),
}

impl std::fmt::Display for IncidentSelector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IncidentSelector::ById(id) => write!(f, "id {}", id),
            IncidentSelector::BySlug(slug) => write!(f, "slug {}", slug),
            IncidentSelector::ByChannel(channel) => write!(f, "channel {}", channel),
        }
    }
}

/// Single-column update on an incident row. The slug has no variant here:
/// it never changes after creation.
#[derive(Debug, Clone)]
pub enum IncidentField {
    ChannelRef(String),
    ChannelName(String),
    Description(String),
    Components(String),
    Impact(String),
    Severity(String),
    Status(String),
    Link(String),
    LastUpdateSent(DateTime<Utc>),
}

impl IncidentField {
    pub fn name(&self) -> &'static str {
        match self {
            IncidentField::ChannelRef(_) => "channel_ref",
            IncidentField::ChannelName(_) => "channel_name",
            IncidentField::Description(_) => "description",
            IncidentField::Components(_) => "components",
            IncidentField::Impact(_) => "impact",
            IncidentField::Severity(_) => "severity",
            IncidentField::Status(_) => "status",
            IncidentField::Link(_) => "link",
            IncidentField::LastUpdateSent(_) => "last_update_sent",
        }
    }

    /// Apply this single-column write to an aggregate
    pub fn apply(&self, incident: &mut Incident) {
        match self {
            IncidentField::ChannelRef(v) => incident.channel_ref = Some(v.clone()),
            IncidentField::ChannelName(v) => incident.channel_name = Some(v.clone()),
            IncidentField::Description(v) => incident.description = v.clone(),
            IncidentField::Components(v) => incident.components = Some(v.clone()),
            IncidentField::Impact(v) => incident.impact = Some(v.clone()),
            IncidentField::Severity(v) => incident.severity = v.clone(),
            IncidentField::Status(v) => incident.status = v.clone(),
            IncidentField::Link(v) => incident.link = Some(v.clone()),
            IncidentField::LastUpdateSent(v) => incident.last_update_sent = Some(*v),
        }
        incident.updated_at = Utc::now();
    }
}

/// A user who has claimed a role on an incident
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Participant {
    pub id: Uuid,
    pub parent: IncidentId,
    pub role: String,
    pub user_id: String,
    pub user_name: String,
    pub is_lead: bool,
    pub claimed_at: DateTime<Utc>,
}

impl Participant {
    pub fn new(
        parent: IncidentId,
        role: impl Into<String>,
        user_id: impl Into<String>,
        user_name: impl Into<String>,
        is_lead: bool,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            parent,
            role: role.into(),
            user_id: user_id.into(),
            user_name: user_name.into(),
            is_lead,
            claimed_at: Utc::now(),
        }
    }
}

/// Kinds of external artifacts an incident can be linked to
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, EnumString, Display,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum IntegrationKind {
    Ticket,
    Paging,
    Postmortem,
    StatusPage,
}

/// One update pushed to a status-page incident
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatuspageUpdate {
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

/// Link from an incident to one externally created artifact
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntegrationRecord {
    pub id: Uuid,
    pub parent: IncidentId,
    pub kind: IntegrationKind,

    /// Ticket key/URL, paging incident URL, postmortem URL, or
    /// status-page incident id
    pub external_ref: String,

    pub status: Option<String>,

    /// Update history; only status-page records accumulate entries
    #[serde(default)]
    pub updates: Vec<StatuspageUpdate>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl IntegrationRecord {
    pub fn new(parent: IncidentId, kind: IntegrationKind, external_ref: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            parent,
            kind,
            external_ref: external_ref.into(),
            status: None,
            updates: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }
}

/// Build the normalized channel name for an incident:
/// lowercase, spaces to dashes, everything outside `[a-z0-9-]` dropped.
pub fn format_channel_name(prefix: &str, id: IncidentId, description: &str) -> String {
    let suffix: String = description
        .to_lowercase()
        .chars()
        .map(|c| if c.is_whitespace() { '-' } else { c })
        .filter(|c| c.is_ascii_alphanumeric() || *c == '-')
        .collect();

    format!("{}-{}-{}", prefix, id, suffix.trim_matches('-'))
}
