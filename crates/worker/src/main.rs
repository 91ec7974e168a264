use std::sync::Arc;

use anyhow::Context;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use vigil_checks::registry::PluginRegistry;
use vigil_worker::config::WorkerConfig;
use vigil_worker::queue::{PgTaskQueue, TaskQueue};
use vigil_worker::service::{ServiceConfig, TaskExecutionService};
use vigil_worker::store::{PgPluginCatalog, PgStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "vigil_worker=info,vigil_checks=info,vigil_db=info".into());
    let json = std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }

    // --- Configuration ---
    let config = WorkerConfig::from_env().context("Invalid worker configuration")?;
    tracing::info!(
        worker_id = %config.worker_id,
        lease_secs = config.lease_duration.as_secs(),
        "Loaded worker configuration",
    );

    // --- Database ---
    let pool = vigil_db::create_pool(&config.database_url, config.db_max_connections)
        .await
        .context("Failed to connect to database")?;
    vigil_db::health_check(&pool)
        .await
        .context("Database health check failed")?;
    vigil_db::run_migrations(&pool)
        .await
        .context("Failed to run database migrations")?;
    tracing::info!("Database ready");

    // --- Plugins ---
    let registry = Arc::new(PluginRegistry::new(Arc::new(PgPluginCatalog::new(pool.clone()))));
    let report = registry
        .reconcile(vigil_checks::builtin_plugins())
        .await
        .context("Failed to register check plugins")?;
    tracing::info!(
        registered = report.registered.len(),
        dead = report.dead.len(),
        "Check plugins reconciled",
    );

    // --- Queue ---
    let queue = Arc::new(
        PgTaskQueue::new(pool.clone(), config.worker_id.clone()).with_lease(config.lease_duration),
    );
    match queue.stats().await {
        Ok(stats) => tracing::info!(
            pending = stats.pending,
            processing = stats.processing,
            completed = stats.completed,
            failed = stats.failed,
            "Queue status at startup",
        ),
        Err(e) => tracing::warn!(error = %e, "Failed to read queue statistics"),
    }

    // --- Service ---
    let service = TaskExecutionService::new(
        queue,
        Arc::new(PgStore::new(pool)),
        registry,
        config.worker_id.clone(),
        ServiceConfig::from(&config),
    );

    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => {
                    tracing::info!("Shutdown signal received");
                    cancel.cancel();
                }
                Err(e) => tracing::warn!(error = %e, "Failed to listen for shutdown signal"),
            }
        }
    });

    service.run(cancel).await;
    Ok(())
}
