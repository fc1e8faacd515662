///! Sync orchestrator
///!
///! Fetches every configured region in strict sequence, pacing requests to
///! respect the provider's rate limit, and commits each region's candidates
///! against one catalog snapshot taken at the start of the run.

use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;

use venuesync_common::{Region, SyncSummary};

use crate::module::lease::JobLeases;
use crate::module::osm::PoiSource;

use super::reconciler::Reconciler;
use super::store::StoreError;

/// Lease key guarding the sync job
pub const SYNC_JOB: &str = "osm-sync";

pub const DEFAULT_REGION_DELAY: Duration = Duration::from_secs(3);

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("sync job '{0}' is already running")]
    AlreadyRunning(String),

    #[error("failed to load catalog snapshot: {0}")]
    Snapshot(#[from] StoreError),
}

#[derive(Debug, Clone)]
pub struct SyncSettings {
    /// Pause between two region requests
    pub region_delay: Duration,
    pub lease_ttl: chrono::Duration,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            region_delay: DEFAULT_REGION_DELAY,
            lease_ttl: chrono::Duration::hours(1),
        }
    }
}

pub struct SyncOrchestrator {
    source: Arc<dyn PoiSource>,
    reconciler: Reconciler,
    leases: Arc<JobLeases>,
    regions: Vec<Region>,
    settings: SyncSettings,
}

impl SyncOrchestrator {
    pub fn new(
        source: Arc<dyn PoiSource>,
        reconciler: Reconciler,
        leases: Arc<JobLeases>,
        regions: Vec<Region>,
        settings: SyncSettings,
    ) -> Self {
        Self {
            source,
            reconciler,
            leases,
            regions,
            settings,
        }
    }

    pub fn regions(&self) -> &[Region] {
        &self.regions
    }

    /// Run a sync over the configured regions
    pub async fn run(&self) -> Result<SyncSummary, SyncError> {
        self.run_regions(&self.regions).await
    }

    /// Run a sync over an explicit region list.
    ///
    /// A failing region is recorded and skipped; later regions are still attempted.
    pub async fn run_regions(&self, regions: &[Region]) -> Result<SyncSummary, SyncError> {
        let _lease = self
            .leases
            .try_acquire(SYNC_JOB, self.settings.lease_ttl)
            .ok_or_else(|| SyncError::AlreadyRunning(SYNC_JOB.to_string()))?;

        let start_time = Instant::now();
        tracing::info!("Starting venue sync over {} regions...", regions.len());

        let mut snapshot = self.reconciler.snapshot().await?;
        let mut summary = SyncSummary::default();
        let mut errors: Vec<String> = Vec::new();

        for (index, region) in regions.iter().enumerate() {
            if index > 0 && !self.settings.region_delay.is_zero() {
                tokio::time::sleep(self.settings.region_delay).await;
            }

            let candidates = match self.source.fetch_region(region).await {
                Ok(candidates) => candidates,
                Err(e) => {
                    tracing::warn!("Region {} failed: {}", region.name, e);
                    errors.push(format!("{}: {}", region.name, e));
                    continue;
                }
            };

            summary.found += candidates.len();
            let report = self
                .reconciler
                .commit_region(&region.name, &candidates, &mut snapshot)
                .await;
            summary.processed += report.processed;
            summary.regions += 1;
            errors.extend(report.failures);
        }

        if !errors.is_empty() {
            summary.error = Some(errors.join("; "));
        }

        tracing::info!(
            "Sync complete: {} found, {} processed, {}/{} regions in {:.2}s",
            summary.found,
            summary.processed,
            summary.regions,
            regions.len(),
            start_time.elapsed().as_secs_f64()
        );
        if let Some(error) = &summary.error {
            tracing::warn!("Sync finished with errors: {}", error);
        }

        Ok(summary)
    }
}
