use crate::api::{handlers, AppState};
use axum::{
    routing::{delete, get, patch, post},
    Router,
};
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};

/// Build the main API router
pub fn build_router(state: AppState) -> Router {
    Router::new()
        // Health endpoints
        .route("/health", get(handlers::health_check))
        // Incident management
        .route("/api/v1/incidents", post(handlers::create_incident))
        .route("/api/v1/incidents", get(handlers::list_incidents))
        .route("/api/v1/incidents/:slug", get(handlers::get_incident))
        .route("/api/v1/incidents/:slug", delete(handlers::delete_incident))
        .route(
            "/api/v1/incidents/:slug/status",
            patch(handlers::set_status),
        )
        .route(
            "/api/v1/incidents/:slug/severity",
            patch(handlers::set_severity),
        )
        .route(
            "/api/v1/incidents/:slug/description",
            patch(handlers::set_description),
        )
        .route("/api/v1/incidents/:slug/roles", post(handlers::join_role))
        .route(
            "/api/v1/incidents/:slug/roles",
            delete(handlers::leave_role),
        )
        // Timeline
        .route("/api/v1/incidents/:slug/pins", post(handlers::pin_content))
        .route("/api/v1/incidents/:slug/events", get(handlers::list_events))
        .route(
            "/api/v1/incidents/:slug/events",
            post(handlers::create_event),
        )
        .route("/api/v1/events/:id", patch(handlers::update_event))
        .route("/api/v1/events/:id", delete(handlers::delete_event))
        // Scheduled jobs
        .route("/api/v1/jobs", get(handlers::list_jobs))
        .route("/api/v1/jobs/:id", delete(handlers::delete_job))
        // Add state
        .with_state(state)
        // Add middleware
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new())
                .on_response(DefaultOnResponse::new()),
        )
        .layer(CorsLayer::permissive())
}
