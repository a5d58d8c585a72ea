//! Handlers for the per-incident reminder jobs.
//!
//! Each factory captures its collaborators and returns a [`JobHandler`]
//! the scheduler fires on interval. Failures bubble up as strings for the
//! scheduler to log; nothing here retries or reschedules.

use super::jobs::JobHandler;
use crate::models::IncidentId;
use crate::notify::{ChannelRef, Message, NotificationGateway};
use crate::store::IncidentStore;
use std::sync::Arc;
use tracing::debug;

/// Recurring nudge to keep communications flowing. Fires until silenced or
/// the incident resolves; the message offers snooze and disable.
pub fn comms_reminder(notifier: Arc<dyn NotificationGateway>, target: ChannelRef) -> JobHandler {
    Arc::new(move || {
        let notifier = notifier.clone();
        let target = target.clone();

        Box::pin(async move {
            let message = Message::text(
                "Some time has passed since this incident was declared. \
                 How about updating others on its status?",
            )
            .with_action("comms_reminder_snooze", "Snooze")
            .with_action("comms_reminder_disable", "Never remind me again");

            notifier
                .notify(&target, message)
                .await
                .map(|_| ())
                .map_err(|e| e.to_string())
        })
    })
}

/// Watches for incidents with no claimed roles and nags the channel.
/// Once at least one participant exists the handler goes inert; the job
/// itself keeps running until resolution cancels it.
pub fn role_watcher(
    store: Arc<dyn IncidentStore>,
    notifier: Arc<dyn NotificationGateway>,
    incident_id: IncidentId,
    target: ChannelRef,
) -> JobHandler {
    Arc::new(move || {
        let store = store.clone();
        let notifier = notifier.clone();
        let target = target.clone();

        Box::pin(async move {
            let participants = store
                .list_participants(incident_id)
                .await
                .map_err(|e| e.to_string())?;

            if !participants.is_empty() {
                debug!(incident_id, "Roles are claimed; role watcher idle");
                return Ok(());
            }

            notifier
                .notify(
                    &target,
                    Message::text(
                        "No roles have been assigned for this incident yet. \
                         Please review, assess, and claim as-needed.",
                    ),
                )
                .await
                .map(|_| ())
                .map_err(|e| e.to_string())
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{NewIncidentRow, Participant};
    use crate::notify::MemoryGateway;
    use crate::store::MemoryStore;

    fn row() -> NewIncidentRow {
        NewIncidentRow {
            slug_prefix: "inc".to_string(),
            description: "api errors".to_string(),
            severity: "sev3".to_string(),
            status: "investigating".to_string(),
            components: None,
            impact: None,
        }
    }

    #[tokio::test]
    async fn test_comms_reminder_offers_snooze_and_disable() {
        let gateway = Arc::new(MemoryGateway::new());
        let handler = comms_reminder(gateway.clone(), ChannelRef::new("inc-1"));

        handler().await.unwrap();

        let sent = gateway.sent_to("inc-1");
        assert_eq!(sent.len(), 1);
        let ids: Vec<&str> = sent[0].actions.iter().map(|a| a.id.as_str()).collect();
        assert_eq!(ids, vec!["comms_reminder_snooze", "comms_reminder_disable"]);
    }

    #[tokio::test]
    async fn test_role_watcher_goes_inert_once_claimed() {
        let store = Arc::new(MemoryStore::new());
        let gateway = Arc::new(MemoryGateway::new());
        let incident = store.create(row()).await.unwrap();

        let handler = role_watcher(
            store.clone(),
            gateway.clone(),
            incident.id,
            ChannelRef::new(incident.slug.clone()),
        );

        handler().await.unwrap();
        assert_eq!(gateway.sent_to(&incident.slug).len(), 1);

        store
            .associate_role(Participant::new(
                incident.id,
                "incident_commander",
                "U1",
                "casey",
                true,
            ))
            .await
            .unwrap();

        handler().await.unwrap();
        assert_eq!(gateway.sent_to(&incident.slug).len(), 1);
    }
}
