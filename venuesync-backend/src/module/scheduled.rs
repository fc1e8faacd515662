///! Scheduled task manager - periodic venue sync
///!
///! Runs one sync at startup (optional) and then one at every aligned
///! interval boundary. Runs are bounded by a timeout and never fatal.

use super::reconcile::{SyncError, SyncOrchestrator};
use chrono::{DateTime, Duration as ChronoDuration, Timelike, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Configuration for scheduled tasks
#[derive(Debug, Clone)]
pub struct ScheduledTaskConfig {
    /// Hours between syncs; runs are aligned to multiples of this from midnight UTC
    pub sync_interval_hours: u32,

    /// Upper bound on a single sync run
    pub sync_timeout: Duration,

    /// Perform a sync immediately on start
    pub perform_initial_sync: bool,
}

impl Default for ScheduledTaskConfig {
    fn default() -> Self {
        Self {
            sync_interval_hours: 24,
            sync_timeout: Duration::from_secs(30 * 60),
            perform_initial_sync: true,
        }
    }
}

/// Scheduled task manager
pub struct ScheduledTaskManager {
    config: ScheduledTaskConfig,
    orchestrator: Arc<SyncOrchestrator>,
    task_handles: Vec<JoinHandle<()>>,
}

impl ScheduledTaskManager {
    pub fn new(config: ScheduledTaskConfig, orchestrator: Arc<SyncOrchestrator>) -> Self {
        Self {
            config,
            orchestrator,
            task_handles: Vec::new(),
        }
    }

    /// Start all scheduled tasks
    pub fn start_all(&mut self) {
        tracing::info!("Starting scheduled task manager...");

        let handle = self.start_sync_task();
        self.task_handles.push(handle);

        tracing::info!(
            "Started {} scheduled tasks (venue sync every {} h)",
            self.task_handles.len(),
            self.config.sync_interval_hours
        );
    }

    fn start_sync_task(&self) -> JoinHandle<()> {
        let orchestrator = self.orchestrator.clone();
        let config = self.config.clone();

        tracing::info!(
            "Scheduling venue sync task (interval: {} h, initial: {}, regions: {})",
            config.sync_interval_hours,
            config.perform_initial_sync,
            orchestrator.regions().len()
        );

        tokio::spawn(async move {
            if config.perform_initial_sync {
                tracing::info!("Performing initial venue sync...");
                Self::run_sync(&orchestrator, config.sync_timeout).await;
            }

            Self::sync_loop(orchestrator, config).await;
        })
    }

    async fn sync_loop(orchestrator: Arc<SyncOrchestrator>, config: ScheduledTaskConfig) {
        loop {
            let now = Utc::now();
            let next_trigger = Self::calculate_next_sync_time(now, config.sync_interval_hours);
            let sleep_duration = (next_trigger - now)
                .to_std()
                .unwrap_or(Duration::from_secs(60));

            tracing::info!(
                "Next venue sync at: {} (in {:.1} h)",
                next_trigger.format("%Y-%m-%d %H:%M:%S UTC"),
                sleep_duration.as_secs_f64() / 3600.0
            );

            tokio::time::sleep(sleep_duration).await;
            Self::run_sync(&orchestrator, config.sync_timeout).await;
        }
    }

    /// Next boundary strictly after `now` that is a multiple of `interval_hours` since midnight UTC
    fn calculate_next_sync_time(now: DateTime<Utc>, interval_hours: u32) -> DateTime<Utc> {
        let interval = interval_hours.clamp(1, 24);
        let midnight = now
            .with_hour(0)
            .and_then(|t| t.with_minute(0))
            .and_then(|t| t.with_second(0))
            .and_then(|t| t.with_nanosecond(0))
            .unwrap_or(now);

        let mut next = midnight;
        while next <= now {
            next += ChronoDuration::hours(interval as i64);
        }
        next
    }

    /// Run one sync; failures are logged, never propagated
    async fn run_sync(orchestrator: &SyncOrchestrator, timeout: Duration) {
        match tokio::time::timeout(timeout, orchestrator.run()).await {
            Ok(Ok(summary)) => {
                tracing::info!(
                    "Venue sync: {} found, {} processed, {} regions{}",
                    summary.found,
                    summary.processed,
                    summary.regions,
                    if summary.error.is_some() { " (with errors)" } else { "" }
                );
            }
            Ok(Err(SyncError::AlreadyRunning(job))) => {
                tracing::warn!("Skipping scheduled sync: '{}' is already running", job);
            }
            Ok(Err(e)) => {
                tracing::error!("Venue sync failed: {}", e);
            }
            Err(_) => {
                tracing::error!("Venue sync timed out after {} seconds", timeout.as_secs());
            }
        }
    }

    /// Gracefully shutdown all tasks
    pub async fn shutdown(self) {
        tracing::info!("Shutting down scheduled task manager...");

        for handle in self.task_handles {
            handle.abort();
        }

        tracing::info!("All scheduled tasks stopped");
    }
}
