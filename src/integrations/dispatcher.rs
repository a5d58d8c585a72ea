use crate::integrations::{IncidentView, IntegrationRegistry, TransitionEvent};
use crate::models::Incident;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Best-effort fan-out of one committed transition to every registered
/// adapter.
///
/// Each adapter call is isolated (one failure never stops the rest and
/// never unwinds the transition), bounded by a per-call timeout, and
/// fire-and-forget: nothing propagates back into the transition result.
/// Failures are visible only through the structured log.
#[derive(Clone)]
pub struct IntegrationDispatcher {
    registry: Arc<IntegrationRegistry>,
    adapter_timeout: Duration,
}

impl IntegrationDispatcher {
    pub fn new(registry: Arc<IntegrationRegistry>, adapter_timeout: Duration) -> Self {
        Self {
            registry,
            adapter_timeout,
        }
    }

    pub fn registry(&self) -> &IntegrationRegistry {
        &self.registry
    }

    pub fn adapter_timeout(&self) -> Duration {
        self.adapter_timeout
    }

    /// Invoke every adapter for this transition. Returns once all calls
    /// have completed or timed out.
    pub async fn fanout(&self, incident: &Incident, event: TransitionEvent) {
        if self.registry.is_empty() {
            return;
        }

        let view = IncidentView::from(incident);
        let mut calls = Vec::with_capacity(self.registry.len());

        for adapter in self.registry.tickets() {
            let adapter = adapter.clone();
            let view = view.clone();
            let event = event.clone();
            calls.push(self.bounded(adapter.name().to_string(), async move {
                adapter.apply(&view, event.kind, &event.value).await.map(|_| ())
            }));
        }

        for adapter in self.registry.paging() {
            let adapter = adapter.clone();
            let view = view.clone();
            let event = event.clone();
            calls.push(self.bounded(adapter.name().to_string(), async move {
                adapter.apply(&view, event.kind, &event.value).await.map(|_| ())
            }));
        }

        for adapter in self.registry.docs() {
            let adapter = adapter.clone();
            let view = view.clone();
            let event = event.clone();
            calls.push(self.bounded(adapter.name().to_string(), async move {
                adapter.apply(&view, event.kind, &event.value).await.map(|_| ())
            }));
        }

        for adapter in self.registry.status_pages() {
            let adapter = adapter.clone();
            let view = view.clone();
            let event = event.clone();
            calls.push(self.bounded(adapter.name().to_string(), async move {
                adapter.apply(&view, event.kind, &event.value).await.map(|_| ())
            }));
        }

        let outcomes = futures::future::join_all(calls).await;
        let failed = outcomes.iter().filter(|ok| !**ok).count();

        debug!(
            incident_id = event.incident_id,
            kind = %event.kind,
            value = %event.value,
            adapters = outcomes.len(),
            failed = failed,
            "Integration fan-out complete"
        );
    }

    /// Run one adapter call with the configured timeout, logging any
    /// failure with its adapter name and the idempotency context. Returns
    /// whether the call succeeded.
    fn bounded<'a, F>(
        &self,
        adapter: String,
        call: F,
    ) -> futures::future::BoxFuture<'a, bool>
    where
        F: std::future::Future<Output = crate::error::Result<()>> + Send + 'a,
    {
        let timeout = self.adapter_timeout;
        Box::pin(async move {
            match tokio::time::timeout(timeout, call).await {
                Ok(Ok(())) => true,
                Ok(Err(error)) => {
                    warn!(
                        adapter = %adapter,
                        error = %error,
                        "Integration adapter failed; transition unaffected"
                    );
                    false
                }
                Err(_) => {
                    warn!(
                        adapter = %adapter,
                        timeout_secs = timeout.as_secs(),
                        "Integration adapter timed out; transition unaffected"
                    );
                    false
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{AppError, Result};
    use crate::integrations::{TicketAdapter, TransitionKind};
    use crate::models::IntegrationRecord;
    use async_trait::async_trait;
    use chrono::Utc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingAdapter {
        calls: Arc<AtomicUsize>,
        fail: bool,
    }

    #[async_trait]
    impl TicketAdapter for CountingAdapter {
        fn name(&self) -> &str {
            "counting"
        }

        async fn apply(
            &self,
            _incident: &IncidentView,
            _kind: TransitionKind,
            _value: &str,
        ) -> Result<Option<IntegrationRecord>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(AppError::Integration {
                    source_name: "counting".to_string(),
                    message: "always fails".to_string(),
                })
            } else {
                Ok(None)
            }
        }
    }

    struct StallingAdapter;

    #[async_trait]
    impl TicketAdapter for StallingAdapter {
        fn name(&self) -> &str {
            "stalling"
        }

        async fn apply(
            &self,
            _incident: &IncidentView,
            _kind: TransitionKind,
            _value: &str,
        ) -> Result<Option<IntegrationRecord>> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(None)
        }
    }

    fn incident() -> Incident {
        Incident {
            id: 1,
            slug: "inc-1".to_string(),
            channel_ref: None,
            channel_name: Some("inc-1-api-errors".to_string()),
            description: "api errors".to_string(),
            components: None,
            impact: None,
            severity: "sev2".to_string(),
            status: "investigating".to_string(),
            link: None,
            last_update_sent: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_failure_does_not_stop_other_adapters() {
        let healthy_calls = Arc::new(AtomicUsize::new(0));
        let failing_calls = Arc::new(AtomicUsize::new(0));

        let mut registry = IntegrationRegistry::new();
        registry.register_ticket(Arc::new(CountingAdapter {
            calls: failing_calls.clone(),
            fail: true,
        }));
        registry.register_ticket(Arc::new(CountingAdapter {
            calls: healthy_calls.clone(),
            fail: false,
        }));

        let dispatcher =
            IntegrationDispatcher::new(Arc::new(registry), Duration::from_secs(5));
        dispatcher
            .fanout(
                &incident(),
                TransitionEvent {
                    incident_id: 1,
                    kind: TransitionKind::Status,
                    value: "identified".to_string(),
                },
            )
            .await;

        assert_eq!(failing_calls.load(Ordering::SeqCst), 1);
        assert_eq!(healthy_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_slow_adapter_is_bounded() {
        let healthy_calls = Arc::new(AtomicUsize::new(0));

        let mut registry = IntegrationRegistry::new();
        registry.register_ticket(Arc::new(StallingAdapter));
        registry.register_ticket(Arc::new(CountingAdapter {
            calls: healthy_calls.clone(),
            fail: false,
        }));

        let dispatcher =
            IntegrationDispatcher::new(Arc::new(registry), Duration::from_millis(50));

        let started = std::time::Instant::now();
        dispatcher
            .fanout(
                &incident(),
                TransitionEvent {
                    incident_id: 1,
                    kind: TransitionKind::Severity,
                    value: "sev1".to_string(),
                },
            )
            .await;

        assert!(started.elapsed() < Duration::from_secs(5));
        assert_eq!(healthy_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_empty_registry_is_a_no_op() {
        let dispatcher = IntegrationDispatcher::new(
            Arc::new(IntegrationRegistry::new()),
            Duration::from_secs(1),
        );
        dispatcher
            .fanout(
                &incident(),
                TransitionEvent {
                    incident_id: 1,
                    kind: TransitionKind::Status,
                    value: "resolved".to_string(),
                },
            )
            .await;
    }
}
