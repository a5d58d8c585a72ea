//! End-to-end tests for the lifecycle engine: transition semantics,
//! terminal actions, reminder cancellation, and fan-out isolation.

mod common;

use common::{
    FailingTicketAdapter, FixedDocAdapter, HarnessBuilder, RecordingPagingAdapter,
    RecordingTicketAdapter,
};
use incident_orchestrator::integrations::{IntegrationRegistry, TransitionKind};
use incident_orchestrator::lifecycle::machine::RoleChange;
use incident_orchestrator::models::{
    CreateIncident, EventScope, IncidentSelector, IntegrationKind, IntegrationRecord,
};
use incident_orchestrator::scheduler::{job_id, JobKind};
use incident_orchestrator::store::{EventLog, IncidentStore};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

fn params(description: &str, severity: &str) -> CreateIncident {
    CreateIncident {
        description: description.to_string(),
        severity: severity.to_string(),
        components: None,
        impact: None,
    }
}

#[tokio::test]
async fn test_open_incident_schedules_both_reminders() {
    let harness = HarnessBuilder::new().build().await;

    let incident = harness
        .engine
        .open_incident(params("api errors", "sev3"), "casey")
        .await
        .unwrap();

    assert_eq!(incident.status, "investigating");
    assert!(harness
        .scheduler
        .get(&job_id(&incident.slug, JobKind::CommsReminder))
        .is_some());
    assert!(harness
        .scheduler
        .get(&job_id(&incident.slug, JobKind::RoleWatcher))
        .is_some());

    // Creation writes the first timeline entry
    let events = harness
        .store
        .as_ref()
        as &dyn EventLog;
    let timeline = events
        .read(&EventScope::ByIncidentId(incident.id))
        .await
        .unwrap();
    assert_eq!(timeline.len(), 1);
}

#[tokio::test]
async fn test_no_op_on_equal_status_writes_nothing() {
    let harness = HarnessBuilder::new().build().await;
    let incident = harness
        .engine
        .open_incident(params("api errors", "sev3"), "casey")
        .await
        .unwrap();

    let selector = IncidentSelector::BySlug(incident.slug.clone());
    let before = (harness.store.as_ref() as &dyn EventLog)
        .read(&EventScope::ByIncidentId(incident.id))
        .await
        .unwrap()
        .len();

    harness
        .engine
        .set_status(&selector, "investigating", "casey")
        .await
        .unwrap();

    let after = (harness.store.as_ref() as &dyn EventLog)
        .read(&EventScope::ByIncidentId(incident.id))
        .await
        .unwrap()
        .len();
    assert_eq!(before, after, "equal-value transition must not append");

    // The caller still gets a user-visible notice
    let notices = harness.gateway.sent_to(&incident.slug);
    assert!(notices
        .iter()
        .any(|m| m.text.contains("already Investigating")));
}

#[tokio::test]
async fn test_invalid_status_rejected() {
    let harness = HarnessBuilder::new().build().await;
    let incident = harness
        .engine
        .open_incident(params("api errors", "sev3"), "casey")
        .await
        .unwrap();

    let result = harness
        .engine
        .set_status(
            &IncidentSelector::BySlug(incident.slug.clone()),
            "escalated",
            "casey",
        )
        .await;
    assert!(result.is_err());

    let unchanged = harness
        .store
        .get(&IncidentSelector::ById(incident.id))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(unchanged.status, "investigating");
}

#[tokio::test]
async fn test_terminal_action_is_idempotent() {
    let generated = Arc::new(AtomicUsize::new(0));
    let mut registry = IntegrationRegistry::new();
    registry.register_doc(Arc::new(FixedDocAdapter {
        url: "https://docs.example.com/pm/1".to_string(),
        generated: generated.clone(),
    }));

    let harness = HarnessBuilder::new().with_registry(registry).build().await;
    let incident = harness
        .engine
        .open_incident(params("api errors", "sev2"), "casey")
        .await
        .unwrap();
    let selector = IncidentSelector::BySlug(incident.slug.clone());

    harness
        .engine
        .set_status(&selector, "resolved", "casey")
        .await
        .unwrap();

    // Reopen and resolve a second time; the postmortem must not duplicate
    harness
        .engine
        .set_status(&selector, "monitoring", "casey")
        .await
        .unwrap();
    harness
        .engine
        .set_status(&selector, "resolved", "casey")
        .await
        .unwrap();

    let postmortems = harness
        .store
        .list_integration_records(incident.id, Some(IntegrationKind::Postmortem))
        .await
        .unwrap();
    assert_eq!(postmortems.len(), 1);
    assert_eq!(postmortems[0].external_ref, "https://docs.example.com/pm/1");
    assert_eq!(generated.load(Ordering::SeqCst), 1);

    let timeline = (harness.store.as_ref() as &dyn EventLog)
        .read(&EventScope::ByIncidentId(incident.id))
        .await
        .unwrap();
    let postmortem_events = timeline
        .iter()
        .filter(|e| e.text.as_deref() == Some("Postmortem generated"))
        .count();
    assert_eq!(postmortem_events, 1);
}

#[tokio::test]
async fn test_resolution_cancels_jobs_and_resolves_paging() {
    let paging = Arc::new(RecordingPagingAdapter::default());
    let mut registry = IntegrationRegistry::new();
    registry.register_paging(paging.clone());

    let harness = HarnessBuilder::new().with_registry(registry).build().await;
    let incident = harness
        .engine
        .open_incident(params("api errors", "sev1"), "casey")
        .await
        .unwrap();

    harness
        .store
        .add_integration_record(IntegrationRecord::new(
            incident.id,
            IntegrationKind::Paging,
            "https://paging.example.com/p/41",
        ))
        .await
        .unwrap();

    harness
        .engine
        .set_status(
            &IncidentSelector::BySlug(incident.slug.clone()),
            "resolved",
            "casey",
        )
        .await
        .unwrap();

    assert!(harness
        .scheduler
        .get(&job_id(&incident.slug, JobKind::CommsReminder))
        .is_none());
    assert!(harness
        .scheduler
        .get(&job_id(&incident.slug, JobKind::RoleWatcher))
        .is_none());
    assert_eq!(
        paging.resolved(),
        vec!["https://paging.example.com/p/41".to_string()]
    );
}

#[tokio::test]
async fn test_adapter_failure_does_not_block_transition() {
    let recording = Arc::new(RecordingTicketAdapter::default());
    let mut registry = IntegrationRegistry::new();
    registry.register_ticket(Arc::new(FailingTicketAdapter));
    registry.register_ticket(recording.clone());

    let harness = HarnessBuilder::new().with_registry(registry).build().await;
    let incident = harness
        .engine
        .open_incident(params("api errors", "sev3"), "casey")
        .await
        .unwrap();

    harness
        .engine
        .set_status(
            &IncidentSelector::BySlug(incident.slug.clone()),
            "identified",
            "casey",
        )
        .await
        .unwrap();

    // Status persisted despite the failing adapter
    let updated = harness
        .store
        .get(&IncidentSelector::ById(incident.id))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(updated.status, "identified");

    // The healthy adapter still ran
    assert_eq!(
        recording.applied(),
        vec![(TransitionKind::Status, "identified".to_string())]
    );
}

#[tokio::test]
async fn test_role_claim_uniqueness() {
    let harness = HarnessBuilder::new().build().await;
    let incident = harness
        .engine
        .open_incident(params("api errors", "sev3"), "casey")
        .await
        .unwrap();
    let selector = IncidentSelector::BySlug(incident.slug.clone());

    let first = harness
        .engine
        .associate_role(&selector, "incident_commander", "U1", "casey")
        .await
        .unwrap();
    assert_eq!(first, RoleChange::Applied);

    let second = harness
        .engine
        .associate_role(&selector, "incident_commander", "U1", "casey")
        .await
        .unwrap();
    assert_eq!(second, RoleChange::AlreadyClaimed);

    let participants = harness.store.list_participants(incident.id).await.unwrap();
    assert_eq!(participants.len(), 1);
    assert!(participants[0].is_lead);

    // Releasing an unclaimed role is a no-op notice
    let release = harness
        .engine
        .remove_role(&selector, "scribe", "U1", "casey")
        .await
        .unwrap();
    assert_eq!(release, RoleChange::NotClaimed);

    let release = harness
        .engine
        .remove_role(&selector, "incident_commander", "U1", "casey")
        .await
        .unwrap();
    assert_eq!(release, RoleChange::Applied);
    assert!(harness
        .store
        .list_participants(incident.id)
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn test_append_only_ordering_survives_delete() {
    let harness = HarnessBuilder::new().build().await;
    let incident = harness
        .engine
        .open_incident(params("api errors", "sev3"), "casey")
        .await
        .unwrap();
    let selector = IncidentSelector::BySlug(incident.slug.clone());

    harness
        .engine
        .set_status(&selector, "identified", "casey")
        .await
        .unwrap();
    harness
        .engine
        .set_status(&selector, "monitoring", "casey")
        .await
        .unwrap();
    harness
        .engine
        .set_severity(&selector, "sev2", "casey")
        .await
        .unwrap();

    let log = harness.store.as_ref() as &dyn EventLog;
    let timeline = log
        .read(&EventScope::ByIncidentId(incident.id))
        .await
        .unwrap();
    assert_eq!(timeline.len(), 4);
    assert!(timeline
        .windows(2)
        .all(|w| w[0].created_at <= w[1].created_at));

    let victim = timeline[1].id;
    log.delete(&victim).await.unwrap();

    let remaining = log
        .read(&EventScope::ByIncidentId(incident.id))
        .await
        .unwrap();
    assert_eq!(remaining.len(), 3);
    assert!(remaining.iter().all(|e| e.id != victim));
    assert!(remaining
        .windows(2)
        .all(|w| w[0].created_at <= w[1].created_at));
}

#[tokio::test]
async fn test_end_to_end_scenario() {
    let generated = Arc::new(AtomicUsize::new(0));
    let mut registry = IntegrationRegistry::new();
    registry.register_doc(Arc::new(FixedDocAdapter {
        url: "https://docs.example.com/pm/9".to_string(),
        generated,
    }));

    let harness = HarnessBuilder::new().with_registry(registry).build().await;

    // create with severity sev4, initial status
    let incident = harness
        .engine
        .open_incident(params("checkout errors", "sev4"), "casey")
        .await
        .unwrap();
    assert_eq!(incident.status, "investigating");
    assert_eq!(harness.catalog.initial_status(), "investigating");
    assert!(harness.catalog.is_final("resolved"));
    let selector = IncidentSelector::BySlug(incident.slug.clone());

    // escalate severity
    harness
        .engine
        .set_severity(&selector, "sev1", "casey")
        .await
        .unwrap();

    let log = harness.store.as_ref() as &dyn EventLog;
    let timeline = log
        .read(&EventScope::ByIncidentId(incident.id))
        .await
        .unwrap();
    assert!(timeline
        .iter()
        .any(|e| e.text.as_deref() == Some("The incident severity was changed to SEV1")));

    let current = harness
        .store
        .get(&IncidentSelector::ById(incident.id))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(current.severity, "sev1");

    // resolve
    harness
        .engine
        .set_status(&selector, "resolved", "casey")
        .await
        .unwrap();

    let timeline = log
        .read(&EventScope::ByIncidentId(incident.id))
        .await
        .unwrap();
    assert!(timeline
        .iter()
        .any(|e| e.text.as_deref() == Some("The incident status was changed to Resolved")));

    let postmortems = harness
        .store
        .list_integration_records(incident.id, Some(IntegrationKind::Postmortem))
        .await
        .unwrap();
    assert_eq!(postmortems.len(), 1);

    assert!(harness
        .scheduler
        .get(&job_id(&incident.slug, JobKind::CommsReminder))
        .is_none());
    assert!(harness
        .scheduler
        .get(&job_id(&incident.slug, JobKind::RoleWatcher))
        .is_none());
}

#[tokio::test]
async fn test_severity_change_fans_out_severity_kind() {
    let recording = Arc::new(RecordingTicketAdapter::default());
    let mut registry = IntegrationRegistry::new();
    registry.register_ticket(recording.clone());

    let harness = HarnessBuilder::new().with_registry(registry).build().await;
    let incident = harness
        .engine
        .open_incident(params("api errors", "sev4"), "casey")
        .await
        .unwrap();
    let selector = IncidentSelector::BySlug(incident.slug.clone());

    harness
        .engine
        .set_severity(&selector, "sev2", "casey")
        .await
        .unwrap();

    // Equal-value severity must not fan out
    harness
        .engine
        .set_severity(&selector, "sev2", "casey")
        .await
        .unwrap();

    assert_eq!(
        recording.applied(),
        vec![(TransitionKind::Severity, "sev2".to_string())]
    );
}

#[tokio::test]
async fn test_pinned_content_lands_on_timeline() {
    let harness = HarnessBuilder::new().build().await;
    let incident = harness
        .engine
        .open_incident(params("api errors", "sev3"), "casey")
        .await
        .unwrap();
    let selector = IncidentSelector::BySlug(incident.slug.clone());

    let pinned_at = chrono::Utc::now() - chrono::Duration::minutes(10);
    harness
        .engine
        .pin_to_timeline(
            &selector,
            Some("Deploy 4812 rolled out right before the errors".to_string()),
            Some((vec![0x89, 0x50, 0x4e, 0x47], "image/png".to_string())),
            Some("1712000000.000300".to_string()),
            Some(pinned_at),
            "casey",
        )
        .await
        .unwrap();

    let timeline = (harness.store.as_ref() as &dyn EventLog)
        .read(&EventScope::ByIncidentId(incident.id))
        .await
        .unwrap();

    let pin = timeline
        .iter()
        .find(|e| e.source == incident_orchestrator::models::EventSource::Pin)
        .expect("pin entry on the timeline");
    assert_eq!(pin.mimetype.as_deref(), Some("image/png"));
    assert_eq!(pin.timestamp, Some(pinned_at));
    assert_eq!(pin.message_ref.as_deref(), Some("1712000000.000300"));
}

#[tokio::test]
async fn test_delete_incident_cascades_and_cancels() {
    let harness = HarnessBuilder::new().build().await;
    let incident = harness
        .engine
        .open_incident(params("api errors", "sev3"), "casey")
        .await
        .unwrap();
    let selector = IncidentSelector::BySlug(incident.slug.clone());

    harness
        .engine
        .associate_role(&selector, "scribe", "U2", "jordan")
        .await
        .unwrap();

    harness.engine.delete_incident(&selector).await.unwrap();

    assert!(harness
        .store
        .get(&IncidentSelector::ById(incident.id))
        .await
        .unwrap()
        .is_none());
    assert!(harness
        .scheduler
        .get(&job_id(&incident.slug, JobKind::CommsReminder))
        .is_none());
    assert!((harness.store.as_ref() as &dyn EventLog)
        .read(&EventScope::ByIncidentId(incident.id))
        .await
        .unwrap()
        .is_empty());
}
