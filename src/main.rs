use clap::Parser;
use incident_orchestrator::{
    api::{build_router, AppState},
    config::{Config, NotificationBackend},
    integrations::{IntegrationDispatcher, IntegrationRegistry, WebhookAdapter},
    lifecycle::{LifecycleCatalog, LifecycleEngine},
    models::IntegrationKind,
    notify::{MemoryGateway, NotificationGateway, WebhookGateway},
    scheduler::ReminderScheduler,
    store::create_store,
};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(name = "incident-orchestrator", version, about)]
struct Args {
    /// Configuration file path (overrides CONFIG_PATH)
    #[arg(long, env = "CONFIG_PATH")]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "incident_orchestrator=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    if let Some(path) = args.config {
        std::env::set_var("CONFIG_PATH", path);
    }

    let config = Config::load()?;

    tracing::info!("Starting incident orchestrator v{}", env!("CARGO_PKG_VERSION"));

    // Lifecycle catalogs are validated up front; a bad status set is fatal
    let catalog = Arc::new(LifecycleCatalog::from_config(&config.lifecycle)?);
    tracing::info!(
        initial = catalog.initial_status(),
        terminal = catalog.final_status(),
        "Lifecycle catalog loaded"
    );

    // Storage is the one startup dependency that may halt the process
    let (store, events) = create_store(&config.state)?;
    tracing::info!("Storage backend initialized");

    // Notification gateway
    let notifier: Arc<dyn NotificationGateway> = match config.notifications.backend {
        NotificationBackend::Memory => {
            tracing::info!("Using in-memory notification gateway");
            Arc::new(MemoryGateway::new())
        }
        NotificationBackend::Webhook => {
            let url = std::env::var(&config.notifications.webhook_url_env).map_err(|_| {
                anyhow::anyhow!(
                    "notification backend is webhook but {} is not set",
                    config.notifications.webhook_url_env
                )
            })?;
            tracing::info!("Using webhook notification gateway");
            Arc::new(WebhookGateway::new(url, config.notifications.timeout_secs)?)
        }
    };

    // Integration registry, populated once from configuration
    let mut registry = IntegrationRegistry::new();
    if let Some(ref endpoint) = config.integrations.ticketing {
        if endpoint.enabled {
            registry.register_ticket(Arc::new(WebhookAdapter::new(
                "ticketing",
                IntegrationKind::Ticket,
                endpoint.url.clone(),
                endpoint.timeout_secs,
            )?));
        }
    }
    if let Some(ref endpoint) = config.integrations.paging {
        if endpoint.enabled {
            registry.register_paging(Arc::new(WebhookAdapter::new(
                "paging",
                IntegrationKind::Paging,
                endpoint.url.clone(),
                endpoint.timeout_secs,
            )?));
        }
    }
    if let Some(ref endpoint) = config.integrations.documents {
        if endpoint.enabled {
            registry.register_doc(Arc::new(WebhookAdapter::new(
                "documents",
                IntegrationKind::Postmortem,
                endpoint.url.clone(),
                endpoint.timeout_secs,
            )?));
        }
    }
    if let Some(ref endpoint) = config.integrations.status_page {
        if endpoint.enabled {
            registry.register_status_page(Arc::new(WebhookAdapter::new(
                "status_page",
                IntegrationKind::StatusPage,
                endpoint.url.clone(),
                endpoint.timeout_secs,
            )?));
        }
    }
    tracing::info!(adapters = registry.len(), "Integration registry populated");

    let dispatcher = IntegrationDispatcher::new(
        Arc::new(registry),
        Duration::from_secs(config.integrations.adapter_timeout_secs),
    );

    // Reminder scheduler: explicit lifecycle, started before serving
    let mut scheduler = ReminderScheduler::new().await?;
    scheduler.start().await?;
    let scheduler = Arc::new(scheduler);
    tracing::info!("Reminder scheduler started");

    let engine = Arc::new(LifecycleEngine::new(
        store.clone(),
        events.clone(),
        catalog.clone(),
        notifier,
        dispatcher,
        scheduler.clone(),
        config.options.clone(),
        config.reminders.clone(),
    ));

    let state = AppState::new(engine, store, events, scheduler, catalog);
    let app = build_router(state);

    let addr = format!("{}:{}", config.server.host, config.server.http_port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("HTTP API listening on http://{}", addr);
    tracing::info!("  Health check: http://{}/health", addr);
    tracing::info!("  REST API: http://{}/api/v1/incidents", addr);

    let server = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!("HTTP server error: {}", e);
        }
    });

    tokio::select! {
        _ = server => {
            tracing::warn!("HTTP server stopped");
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutdown signal received");
        }
    }

    tracing::info!("Shutting down gracefully...");
    Ok(())
}
