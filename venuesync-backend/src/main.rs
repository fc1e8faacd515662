use venuesync_backend::config::BackendConfig;
use venuesync_backend::module::clock::{Clock, SystemClock};
use venuesync_backend::module::lease::JobLeases;
use venuesync_backend::module::osm::OverpassClient;
use venuesync_backend::module::reconcile::{CandidateTable, Curator, Reconciler, SyncOrchestrator, VenueCatalog};
use venuesync_backend::module::scheduled::{ScheduledTaskConfig, ScheduledTaskManager};
use venuesync_backend::service::{self, AppState};

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = BackendConfig::load()?;

    // Initialize logging
    let _logging_guard = venuesync_backend::logging::init_logging(
        "logs",
        "venuesync-backend",
        &config.log_level,
    )?;

    tracing::info!("Venuesync Backend starting...");
    tracing::info!("Server will listen on {}", config.server_address());

    // Open stores
    let candidates = Arc::new(
        CandidateTable::open(&config.data_dir)
            .await
            .context("Failed to open candidate table")?,
    );
    let catalog = Arc::new(
        VenueCatalog::open(&config.data_dir)
            .await
            .context("Failed to open venue catalog")?,
    );

    let source = Arc::new(
        OverpassClient::new(
            &config.overpass.url,
            config.overpass.timeout_secs,
            &config.overpass.user_agent,
        )
        .context("Failed to build Overpass client")?,
    );

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let reconciler = Reconciler::new(
        candidates.clone(),
        catalog.clone(),
        clock.clone(),
        config.sync.batch_size,
    );
    let orchestrator = Arc::new(SyncOrchestrator::new(
        source,
        reconciler,
        Arc::new(JobLeases::new(clock)),
        config.regions.clone(),
        config.sync_settings(),
    ));
    tracing::info!("Configured {} sync regions", config.regions.len());

    // Configure and start scheduled tasks
    let task_config = ScheduledTaskConfig {
        sync_interval_hours: config.sync.interval_hours,
        sync_timeout: Duration::from_secs(config.sync.run_timeout_secs),
        perform_initial_sync: config.sync.perform_initial_sync,
    };
    let mut task_manager = ScheduledTaskManager::new(task_config, orchestrator.clone());
    task_manager.start_all();

    let state = Arc::new(AppState {
        curator: Curator::new(candidates, catalog),
        orchestrator,
    });
    let app = service::build_router(state);

    let listener = tokio::net::TcpListener::bind(config.server_address())
        .await
        .with_context(|| format!("Failed to bind {}", config.server_address()))?;
    tracing::info!("HTTP server listening on {}", config.server_address());

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("Shutdown signal received");
        })
        .await?;

    task_manager.shutdown().await;
    Ok(())
}
