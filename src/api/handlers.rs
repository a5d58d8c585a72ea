use crate::api::AppState;
use crate::error::{AppError, Result};
use crate::lifecycle::machine::RoleChange;
use crate::models::{CreateIncident, EventPatch, EventScope, Incident, IncidentSelector};
use crate::scheduler::ReminderJob;
use crate::store::{EventLog, IncidentStore};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

/// Health check endpoint
pub async fn health_check() -> Result<Json<HealthResponse>> {
    Ok(Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    }))
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Declare a new incident
pub async fn create_incident(
    State(state): State<AppState>,
    Json(request): Json<CreateIncidentRequest>,
) -> Result<(StatusCode, Json<Incident>)> {
    request.validate()?;

    let severity = request
        .severity
        .unwrap_or_else(|| state.catalog.default_severity().to_string());

    let incident = state
        .engine
        .open_incident(
            CreateIncident {
                description: request.description,
                severity,
                components: request.components,
                impact: request.impact,
            },
            request.actor.as_deref().unwrap_or("api"),
        )
        .await?;

    Ok((StatusCode::CREATED, Json(incident)))
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateIncidentRequest {
    #[validate(length(min = 1, max = 500))]
    pub description: String,
    pub severity: Option<String>,
    pub components: Option<String>,
    pub impact: Option<String>,
    pub actor: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    /// Return only the most recent incidents
    pub recent: Option<usize>,
}

/// List open incidents, or the most recent ones with `?recent=N`
pub async fn list_incidents(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<Incident>>> {
    let final_status = state.catalog.final_status();

    let incidents = match query.recent {
        Some(limit) => state.store.list_recent(final_status, limit).await?,
        None => state.store.list_open(final_status).await?,
    };

    Ok(Json(incidents))
}

/// Fetch one incident by slug
pub async fn get_incident(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> Result<Json<Incident>> {
    let incident = state
        .store
        .get(&IncidentSelector::BySlug(slug.clone()))
        .await?
        .ok_or_else(|| AppError::NotFound(format!("no incident found for slug {}", slug)))?;

    Ok(Json(incident))
}

/// Operator-level removal, cascading all relations
pub async fn delete_incident(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> Result<StatusCode> {
    state
        .engine
        .delete_incident(&IncidentSelector::BySlug(slug))
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize, Validate)]
pub struct TransitionRequest {
    #[validate(length(min = 1, max = 64))]
    pub value: String,
    pub actor: Option<String>,
}

pub async fn set_status(
    State(state): State<AppState>,
    Path(slug): Path<String>,
    Json(request): Json<TransitionRequest>,
) -> Result<StatusCode> {
    request.validate()?;
    state
        .engine
        .set_status(
            &IncidentSelector::BySlug(slug),
            &request.value,
            request.actor.as_deref().unwrap_or("api"),
        )
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn set_severity(
    State(state): State<AppState>,
    Path(slug): Path<String>,
    Json(request): Json<TransitionRequest>,
) -> Result<StatusCode> {
    request.validate()?;
    state
        .engine
        .set_severity(
            &IncidentSelector::BySlug(slug),
            &request.value,
            request.actor.as_deref().unwrap_or("api"),
        )
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize, Validate)]
pub struct DescriptionRequest {
    #[validate(length(min = 1, max = 500))]
    pub description: String,
    pub actor: Option<String>,
}

pub async fn set_description(
    State(state): State<AppState>,
    Path(slug): Path<String>,
    Json(request): Json<DescriptionRequest>,
) -> Result<StatusCode> {
    request.validate()?;
    state
        .engine
        .set_description(
            &IncidentSelector::BySlug(slug),
            &request.description,
            request.actor.as_deref().unwrap_or("api"),
        )
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize, Validate)]
pub struct RoleRequest {
    #[validate(length(min = 1, max = 64))]
    pub role: String,
    #[validate(length(min = 1, max = 64))]
    pub user_id: String,
    #[validate(length(min = 1, max = 255))]
    pub user_name: String,
}

#[derive(Debug, Serialize)]
pub struct RoleResponse {
    pub outcome: String,
}

impl From<RoleChange> for RoleResponse {
    fn from(change: RoleChange) -> Self {
        let outcome = match change {
            RoleChange::Applied => "applied",
            RoleChange::AlreadyClaimed => "already_claimed",
            RoleChange::NotClaimed => "not_claimed",
        };
        Self {
            outcome: outcome.to_string(),
        }
    }
}

pub async fn join_role(
    State(state): State<AppState>,
    Path(slug): Path<String>,
    Json(request): Json<RoleRequest>,
) -> Result<Json<RoleResponse>> {
    request.validate()?;
    let change = state
        .engine
        .associate_role(
            &IncidentSelector::BySlug(slug),
            &request.role,
            &request.user_id,
            &request.user_name,
        )
        .await?;
    Ok(Json(change.into()))
}

pub async fn leave_role(
    State(state): State<AppState>,
    Path(slug): Path<String>,
    Json(request): Json<RoleRequest>,
) -> Result<Json<RoleResponse>> {
    request.validate()?;
    let change = state
        .engine
        .remove_role(
            &IncidentSelector::BySlug(slug),
            &request.role,
            &request.user_id,
            &request.user_name,
        )
        .await?;
    Ok(Json(change.into()))
}

/// Timeline for one incident, ascending by creation time
pub async fn list_events(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> Result<Json<Vec<EventView>>> {
    let events = state.events.read(&EventScope::BySlug(slug)).await?;
    Ok(Json(events.into_iter().map(EventView::from).collect()))
}

/// Timeline entry without the attachment bytes
#[derive(Debug, Serialize)]
pub struct EventView {
    pub id: Uuid,
    pub incident_slug: String,
    pub source: String,
    pub text: Option<String>,
    pub title: Option<String>,
    pub mimetype: Option<String>,
    pub actor: Option<String>,
    pub timestamp: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl From<crate::models::EventRecord> for EventView {
    fn from(record: crate::models::EventRecord) -> Self {
        Self {
            id: record.id,
            incident_slug: record.incident_slug,
            source: record.source.to_string(),
            text: record.text,
            title: record.title,
            mimetype: record.mimetype,
            actor: record.actor,
            timestamp: record.timestamp,
            created_at: record.created_at,
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateEventRequest {
    #[validate(length(min = 1, max = 2000))]
    pub text: String,
    pub actor: Option<String>,
    pub timestamp: Option<DateTime<Utc>>,
}

/// Append a user-sourced timeline entry
pub async fn create_event(
    State(state): State<AppState>,
    Path(slug): Path<String>,
    Json(request): Json<CreateEventRequest>,
) -> Result<(StatusCode, Json<EventView>)> {
    request.validate()?;

    let incident = state
        .store
        .get(&IncidentSelector::BySlug(slug.clone()))
        .await?
        .ok_or_else(|| AppError::NotFound(format!("no incident found for slug {}", slug)))?;

    let mut event = crate::models::NewEvent::user(
        incident.id,
        &incident.slug,
        request.text,
        request.actor.unwrap_or_else(|| "api".to_string()),
    );
    event.timestamp = request.timestamp;

    let record = state.events.append(event).await?;
    Ok((StatusCode::CREATED, Json(record.into())))
}

#[derive(Debug, Deserialize, Validate)]
pub struct PinRequest {
    #[validate(length(min = 1, max = 2000))]
    pub text: String,
    pub message_ref: Option<String>,
    /// Logical event time for content that predates the pin action
    pub timestamp: Option<DateTime<Utc>>,
    pub actor: Option<String>,
}

/// Pin message content onto the timeline. Binary attachments arrive through
/// the chat-platform shim, not this route.
pub async fn pin_content(
    State(state): State<AppState>,
    Path(slug): Path<String>,
    Json(request): Json<PinRequest>,
) -> Result<StatusCode> {
    request.validate()?;
    state
        .engine
        .pin_to_timeline(
            &IncidentSelector::BySlug(slug),
            Some(request.text),
            None,
            request.message_ref,
            request.timestamp,
            request.actor.as_deref().unwrap_or("api"),
        )
        .await?;
    Ok(StatusCode::CREATED)
}

/// Edit a timeline entry's text/title/timestamp
pub async fn update_event(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(patch): Json<EventPatch>,
) -> Result<StatusCode> {
    if patch.is_empty() {
        return Err(AppError::Validation("empty event patch".to_string()));
    }
    state.events.update(&id, patch).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Hard-remove a timeline entry
pub async fn delete_event(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode> {
    state.events.delete(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// All live reminder jobs
pub async fn list_jobs(State(state): State<AppState>) -> Result<Json<Vec<ReminderJob>>> {
    Ok(Json(state.scheduler.list()))
}

/// Cancel one reminder job by id (`{slug}_{kind}`)
pub async fn delete_job(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode> {
    state.scheduler.cancel(&id).await.map_err(AppError::from)?;
    Ok(StatusCode::NO_CONTENT)
}
