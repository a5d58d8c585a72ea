use crate::config::{OptionsConfig, RemindersConfig};
use crate::error::{AppError, Result};
use crate::integrations::{IntegrationDispatcher, TransitionEvent, TransitionKind};
use crate::lifecycle::LifecycleCatalog;
use crate::models::{
    CreateIncident, EventScope, Incident, IncidentField, IncidentSelector, IntegrationKind,
    IntegrationRecord, NewEvent, NewIncidentRow, Participant,
};
use crate::notify::{ChannelRef, Message, NotificationGateway};
use crate::postmortem::PostmortemInput;
use crate::scheduler::{job_id, tasks, JobKind, ReminderScheduler};
use crate::store::{EventLog, IncidentStore};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use validator::Validate;

/// Outcome of a role claim or release
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoleChange {
    Applied,
    AlreadyClaimed,
    NotClaimed,
}

/// The state machine governing status/severity/role transitions.
///
/// Every mutating operation follows the same side-effect order: persist the
/// aggregate, append the timeline entry, notify, dispatch integrations.
/// Notification and dispatch failures never roll back the persisted state.
pub struct LifecycleEngine {
    store: Arc<dyn IncidentStore>,
    events: Arc<dyn EventLog>,
    catalog: Arc<LifecycleCatalog>,
    notifier: Arc<dyn NotificationGateway>,
    dispatcher: IntegrationDispatcher,
    scheduler: Arc<ReminderScheduler>,
    options: OptionsConfig,
    reminders: RemindersConfig,
}

impl LifecycleEngine {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Arc<dyn IncidentStore>,
        events: Arc<dyn EventLog>,
        catalog: Arc<LifecycleCatalog>,
        notifier: Arc<dyn NotificationGateway>,
        dispatcher: IntegrationDispatcher,
        scheduler: Arc<ReminderScheduler>,
        options: OptionsConfig,
        reminders: RemindersConfig,
    ) -> Self {
        Self {
            store,
            events,
            catalog,
            notifier,
            dispatcher,
            scheduler,
            options,
            reminders,
        }
    }

    pub fn catalog(&self) -> &LifecycleCatalog {
        &self.catalog
    }

    /// Open a new incident: allocate the aggregate in its initial status,
    /// write the first timeline entry, announce it, and schedule both
    /// reminder kinds.
    pub async fn open_incident(&self, params: CreateIncident, actor: &str) -> Result<Incident> {
        params.validate()?;
        self.catalog.validate_severity(&params.severity)?;

        let incident = self
            .store
            .create(NewIncidentRow {
                slug_prefix: self.options.slug_prefix.clone(),
                description: params.description,
                severity: params.severity,
                status: self.catalog.initial_status().to_string(),
                components: params.components,
                impact: params.impact,
            })
            .await?;

        self.append_system_event(
            &incident,
            format!("Incident {} created by {}", incident.slug, actor),
        )
        .await?;

        self.notify_best_effort(
            &self.digest_target(),
            Message::text(format!(
                "A new incident has been declared: {} ({}) - {}",
                incident.slug,
                incident.severity.to_uppercase(),
                incident.description
            )),
        )
        .await;

        self.schedule_reminders(&incident).await;

        info!(
            incident_id = incident.id,
            slug = %incident.slug,
            severity = %incident.severity,
            "Incident opened"
        );
        Ok(incident)
    }

    /// Change the status. No-op with a user-visible notice when the value
    /// is already current. The first arrival at the configured final status
    /// additionally generates the postmortem, resolves linked paging
    /// incidents, and cancels both reminder jobs.
    pub async fn set_status(
        &self,
        selector: &IncidentSelector,
        new_status: &str,
        actor: &str,
    ) -> Result<()> {
        let incident = self.load(selector).await?;
        self.catalog.validate_status(new_status)?;

        if incident.status == new_status {
            self.notify_best_effort(
                &self.channel_target(&incident),
                Message::text(format!(
                    "The status for this incident is already {}.",
                    title_case(new_status)
                )),
            )
            .await;
            return Ok(());
        }

        self.store
            .update_field(incident.id, IncidentField::Status(new_status.to_string()))
            .await?;

        self.append_system_event(
            &incident,
            format!("The incident status was changed to {}", title_case(new_status)),
        )
        .await?;

        self.notify_best_effort(
            &self.channel_target(&incident),
            Message::text(format!(
                "The incident status has been changed to {}.",
                title_case(new_status)
            )),
        )
        .await;

        let updated = self.load(&IncidentSelector::ById(incident.id)).await?;
        self.dispatcher
            .fanout(
                &updated,
                TransitionEvent {
                    incident_id: incident.id,
                    kind: TransitionKind::Status,
                    value: new_status.to_string(),
                },
            )
            .await;

        if self.catalog.is_final(new_status) {
            self.finalize(&updated).await;
        }

        info!(
            incident_id = incident.id,
            slug = %incident.slug,
            status = new_status,
            actor = actor,
            "Incident status updated"
        );
        Ok(())
    }

    /// Change the severity. Same no-op-on-equal rule as status; triggers
    /// severity-mapped fan-out and no terminal side effects.
    pub async fn set_severity(
        &self,
        selector: &IncidentSelector,
        new_severity: &str,
        actor: &str,
    ) -> Result<()> {
        let incident = self.load(selector).await?;
        self.catalog.validate_severity(new_severity)?;

        if incident.severity == new_severity {
            self.notify_best_effort(
                &self.channel_target(&incident),
                Message::text(format!(
                    "The severity for this incident is already {}.",
                    new_severity.to_uppercase()
                )),
            )
            .await;
            return Ok(());
        }

        self.store
            .update_field(
                incident.id,
                IncidentField::Severity(new_severity.to_string()),
            )
            .await?;

        self.append_system_event(
            &incident,
            format!(
                "The incident severity was changed to {}",
                new_severity.to_uppercase()
            ),
        )
        .await?;

        self.notify_best_effort(
            &self.channel_target(&incident),
            Message::text(format!(
                "The incident severity has been changed to {}.",
                new_severity.to_uppercase()
            )),
        )
        .await;

        let updated = self.load(&IncidentSelector::ById(incident.id)).await?;
        self.dispatcher
            .fanout(
                &updated,
                TransitionEvent {
                    incident_id: incident.id,
                    kind: TransitionKind::Severity,
                    value: new_severity.to_string(),
                },
            )
            .await;

        info!(
            incident_id = incident.id,
            slug = %incident.slug,
            severity = new_severity,
            actor = actor,
            "Incident severity updated"
        );
        Ok(())
    }

    /// Update the description and the derived channel name
    pub async fn set_description(
        &self,
        selector: &IncidentSelector,
        description: &str,
        actor: &str,
    ) -> Result<()> {
        if description.trim().is_empty() {
            return Err(AppError::Validation(
                "description must not be empty".to_string(),
            ));
        }

        let incident = self.load(selector).await?;

        self.store
            .update_field(
                incident.id,
                IncidentField::Description(description.to_string()),
            )
            .await?;
        self.store
            .update_field(
                incident.id,
                IncidentField::ChannelName(crate::models::format_channel_name(
                    &self.options.slug_prefix,
                    incident.id,
                    description,
                )),
            )
            .await?;

        self.append_system_event(
            &incident,
            format!(
                "The incident description was updated to {} by {}",
                description, actor
            ),
        )
        .await?;

        self.notify_best_effort(
            &self.channel_target(&incident),
            Message::text(format!(
                "The description of this incident has been updated to {}.",
                description
            )),
        )
        .await;

        Ok(())
    }

    /// Claim a role. A duplicate (incident, role, user) claim is reported
    /// back as [`RoleChange::AlreadyClaimed`] and leaves exactly one
    /// participant row for the triple.
    pub async fn associate_role(
        &self,
        selector: &IncidentSelector,
        role: &str,
        user_id: &str,
        user_name: &str,
    ) -> Result<RoleChange> {
        let incident = self.load(selector).await?;
        let definition = self.catalog.validate_role(role)?.clone();
        let role_display = title_case(role);

        if self.store.role_claimed(incident.id, role, user_id).await? {
            self.notify_best_effort(
                &self.channel_target(&incident),
                Message::text(format!(
                    "{} has already joined this incident as {}.",
                    user_name, role_display
                )),
            )
            .await;
            return Ok(RoleChange::AlreadyClaimed);
        }

        match self
            .store
            .associate_role(Participant::new(
                incident.id,
                role,
                user_id,
                user_name,
                definition.is_lead,
            ))
            .await
        {
            Ok(()) => {}
            // Lost a race with a concurrent identical claim
            Err(AppError::Validation(_)) => return Ok(RoleChange::AlreadyClaimed),
            Err(e) => return Err(e),
        }

        self.append_system_event(
            &incident,
            format!("{} joined the incident as {}", user_name, role_display),
        )
        .await?;

        self.notify_best_effort(
            &self.channel_target(&incident),
            Message::text(format!(
                "{} has joined this incident as {}. {}",
                user_name, role_display, definition.description
            )),
        )
        .await;

        Ok(RoleChange::Applied)
    }

    /// Release a role. Removing an unclaimed triple is a no-op notice.
    pub async fn remove_role(
        &self,
        selector: &IncidentSelector,
        role: &str,
        user_id: &str,
        user_name: &str,
    ) -> Result<RoleChange> {
        let incident = self.load(selector).await?;
        self.catalog.validate_role(role)?;
        let role_display = title_case(role);

        if !self.store.remove_role(incident.id, role, user_id).await? {
            self.notify_best_effort(
                &self.channel_target(&incident),
                Message::text(format!(
                    "{} is not assigned {} on this incident.",
                    user_name, role_display
                )),
            )
            .await;
            return Ok(RoleChange::NotClaimed);
        }

        self.append_system_event(
            &incident,
            format!("{} left the incident as {}", user_name, role_display),
        )
        .await?;

        self.notify_best_effort(
            &self.channel_target(&incident),
            Message::text(format!(
                "{} is no longer {} for this incident.",
                user_name, role_display
            )),
        )
        .await;

        Ok(RoleChange::Applied)
    }

    /// Pin content onto the timeline, optionally with an attachment
    #[allow(clippy::too_many_arguments)]
    pub async fn pin_to_timeline(
        &self,
        selector: &IncidentSelector,
        text: Option<String>,
        image: Option<(Vec<u8>, String)>,
        message_ref: Option<String>,
        timestamp: Option<DateTime<Utc>>,
        actor: &str,
    ) -> Result<()> {
        let incident = self.load(selector).await?;

        if image.is_some() && !self.options.enable_pinned_images {
            return Err(AppError::Validation(
                "pinned images are disabled".to_string(),
            ));
        }

        let mut event = NewEvent::pin(incident.id, &incident.slug).with_actor(actor);
        event.text = text;
        if let Some((bytes, mimetype)) = image {
            event = event.with_attachment(bytes, mimetype);
        }
        if let Some(message_ref) = message_ref {
            event = event.with_message_ref(message_ref);
        }
        if let Some(timestamp) = timestamp {
            event = event.with_timestamp(timestamp);
        }

        self.events.append(event).await?;
        Ok(())
    }

    /// Move the communications reminder to the configured snooze interval
    pub async fn snooze_comms_reminder(&self, selector: &IncidentSelector) -> Result<()> {
        let incident = self.load(selector).await?;
        let id = job_id(&incident.slug, JobKind::CommsReminder);

        self.scheduler
            .reschedule(&id, Duration::from_secs(self.reminders.snooze_minutes * 60))
            .await
            .map_err(AppError::from)?;

        self.notify_best_effort(
            &self.channel_target(&incident),
            Message::text(format!(
                "Communications reminder snoozed for {} minutes.",
                self.reminders.snooze_minutes
            )),
        )
        .await;
        Ok(())
    }

    /// Cancel the communications reminder for good
    pub async fn silence_comms_reminder(&self, selector: &IncidentSelector) -> Result<()> {
        let incident = self.load(selector).await?;
        let id = job_id(&incident.slug, JobKind::CommsReminder);

        self.scheduler.cancel(&id).await.map_err(AppError::from)?;

        self.notify_best_effort(
            &self.channel_target(&incident),
            Message::text("Communications reminder disabled for this incident."),
        )
        .await;
        Ok(())
    }

    /// Operator-level removal: cancels reminder jobs and cascades the
    /// aggregate's participants, events, and integration records
    pub async fn delete_incident(&self, selector: &IncidentSelector) -> Result<()> {
        let incident = self.load(selector).await?;

        self.scheduler.cancel_incident_jobs(&incident.slug).await;
        self.store.delete(incident.id).await?;

        info!(incident_id = incident.id, slug = %incident.slug, "Incident deleted");
        Ok(())
    }

    // Terminal actions, run exactly when the incident first reaches the
    // final status. The postmortem path is guarded by the store's
    // conditional insert, so a concurrent arrival produces a conflict
    // instead of a second document record.
    async fn finalize(&self, incident: &Incident) {
        self.generate_postmortem(incident).await;
        self.resolve_paging(incident).await;
        self.scheduler.cancel_incident_jobs(&incident.slug).await;

        self.notify_best_effort(
            &self.channel_target(incident),
            Message::text("This incident has been resolved."),
        )
        .await;
    }

    async fn generate_postmortem(&self, incident: &Incident) {
        if self.dispatcher.registry().docs().is_empty() {
            return;
        }

        match self.store.get_postmortem(incident.id).await {
            Ok(Some(_)) => {
                debug!(incident_id = incident.id, "Postmortem already exists; skipping");
                return;
            }
            Ok(None) => {}
            Err(e) => {
                warn!(incident_id = incident.id, error = %e, "Postmortem lookup failed");
                return;
            }
        }

        let (events, participants) = match (
            self.events
                .read(&EventScope::ByIncidentId(incident.id))
                .await,
            self.store.list_participants(incident.id).await,
        ) {
            (Ok(events), Ok(participants)) => (events, participants),
            (events, participants) => {
                warn!(
                    incident_id = incident.id,
                    events_ok = events.is_ok(),
                    participants_ok = participants.is_ok(),
                    "Could not assemble postmortem input"
                );
                return;
            }
        };

        let input = PostmortemInput::assemble(incident, &events, &participants);
        let timeout = self.dispatcher.adapter_timeout();

        for adapter in self.dispatcher.registry().docs() {
            let url = match tokio::time::timeout(timeout, adapter.generate(&input)).await {
                Ok(Ok(url)) => url,
                Ok(Err(e)) => {
                    warn!(adapter = adapter.name(), error = %e, "Postmortem generation failed");
                    continue;
                }
                Err(_) => {
                    warn!(
                        adapter = adapter.name(),
                        timeout_secs = timeout.as_secs(),
                        "Postmortem generation timed out"
                    );
                    continue;
                }
            };

            match self
                .store
                .add_integration_record(IntegrationRecord::new(
                    incident.id,
                    IntegrationKind::Postmortem,
                    url.clone(),
                ))
                .await
            {
                Ok(_) => {
                    if let Err(e) = self
                        .append_system_event(incident, "Postmortem generated".to_string())
                        .await
                    {
                        warn!(incident_id = incident.id, error = %e, "Postmortem event append failed");
                    }

                    self.notify_best_effort(
                        &self.channel_target(incident),
                        Message::text(format!(
                            "A starter postmortem has been composed based on data \
                             gathered during this incident: {}",
                            url
                        )),
                    )
                    .await;
                }
                Err(AppError::Validation(_)) => {
                    debug!(
                        incident_id = incident.id,
                        "Another writer recorded the postmortem first"
                    );
                }
                Err(e) => {
                    warn!(incident_id = incident.id, error = %e, "Postmortem record write failed");
                }
            }

            break;
        }
    }

    async fn resolve_paging(&self, incident: &Incident) {
        let records = match self
            .store
            .list_integration_records(incident.id, Some(IntegrationKind::Paging))
            .await
        {
            Ok(records) => records,
            Err(e) => {
                warn!(incident_id = incident.id, error = %e, "Paging record lookup failed");
                return;
            }
        };

        let timeout = self.dispatcher.adapter_timeout();
        for record in &records {
            for adapter in self.dispatcher.registry().paging() {
                match tokio::time::timeout(timeout, adapter.resolve(&record.external_ref)).await {
                    Ok(Ok(())) => {
                        debug!(
                            incident_id = incident.id,
                            external_ref = %record.external_ref,
                            "Linked paging incident resolved"
                        );
                    }
                    Ok(Err(e)) => {
                        warn!(
                            adapter = adapter.name(),
                            external_ref = %record.external_ref,
                            error = %e,
                            "Failed to resolve linked paging incident"
                        );
                    }
                    Err(_) => {
                        warn!(
                            adapter = adapter.name(),
                            external_ref = %record.external_ref,
                            "Paging resolution timed out"
                        );
                    }
                }
            }
        }
    }

    async fn schedule_reminders(&self, incident: &Incident) {
        let target = self.channel_target(incident);

        if self.reminders.comms_reminder_minutes != 0 {
            let handler = tasks::comms_reminder(self.notifier.clone(), target.clone());
            if let Err(e) = self
                .scheduler
                .schedule(
                    &incident.slug,
                    JobKind::CommsReminder,
                    Duration::from_secs(self.reminders.comms_reminder_minutes * 60),
                    handler,
                )
                .await
            {
                warn!(slug = %incident.slug, error = %e, "Failed to schedule comms reminder");
            }
        }

        if self.reminders.role_watcher_minutes != 0 {
            let handler = tasks::role_watcher(
                self.store.clone(),
                self.notifier.clone(),
                incident.id,
                target,
            );
            if let Err(e) = self
                .scheduler
                .schedule(
                    &incident.slug,
                    JobKind::RoleWatcher,
                    Duration::from_secs(self.reminders.role_watcher_minutes * 60),
                    handler,
                )
                .await
            {
                warn!(slug = %incident.slug, error = %e, "Failed to schedule role watcher");
            }
        }
    }

    async fn load(&self, selector: &IncidentSelector) -> Result<Incident> {
        self.store
            .get(selector)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("no incident found for {}", selector)))
    }

    async fn append_system_event(&self, incident: &Incident, text: String) -> Result<()> {
        self.events
            .append(NewEvent::system(incident.id, &incident.slug, text))
            .await
            .map(|_| ())
    }

    fn channel_target(&self, incident: &Incident) -> ChannelRef {
        ChannelRef::new(incident.channel())
    }

    fn digest_target(&self) -> ChannelRef {
        ChannelRef::new(&self.options.digest_channel)
    }

    async fn notify_best_effort(&self, target: &ChannelRef, message: Message) {
        if let Err(e) = self.notifier.notify(target, message).await {
            warn!(target = %target, error = %e, "Notification failed; transition unaffected");
        }
    }
}

/// `incident_commander` → `Incident Commander`, `identified` → `Identified`
fn title_case(value: &str) -> String {
    value
        .split(['_', ' '])
        .filter(|word| !word.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}
