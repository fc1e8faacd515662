///! Batch commit of fetched candidates into the candidate table
///!
///! Each region's candidates are processed in fixed-size chunks. Known
///! external ids only get a `last_seen_at` heartbeat; unknown ones are
///! matched once against the catalog snapshot and inserted.

use std::collections::HashSet;
use std::sync::Arc;
use uuid::Uuid;

use venuesync_common::{CandidateRecord, CandidateStatus};

use crate::module::clock::Clock;
use crate::module::osm::Candidate;

use super::matcher::{CatalogSnapshot, find_best_match};
use super::store::{CandidateBatch, CandidateStore, CatalogRepository, StoreError};

pub const DEFAULT_BATCH_SIZE: usize = 10;

/// Outcome of committing one region's candidates
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CommitReport {
    /// Candidates in successfully committed chunks
    pub processed: usize,
    pub inserted: usize,
    pub matched: usize,
    pub heartbeats: usize,
    /// Catalog venues that received an external id
    pub backfilled: usize,
    pub failures: Vec<String>,
}

pub struct Reconciler {
    candidates: Arc<dyn CandidateStore>,
    catalog: Arc<dyn CatalogRepository>,
    clock: Arc<dyn Clock>,
    batch_size: usize,
}

impl Reconciler {
    pub fn new(
        candidates: Arc<dyn CandidateStore>,
        catalog: Arc<dyn CatalogRepository>,
        clock: Arc<dyn Clock>,
        batch_size: usize,
    ) -> Self {
        Self {
            candidates,
            catalog,
            clock,
            batch_size: batch_size.max(1),
        }
    }

    /// Load the catalog once for a whole run
    pub async fn snapshot(&self) -> Result<CatalogSnapshot, StoreError> {
        let snapshot = CatalogSnapshot::new(self.catalog.snapshot().await?);
        if snapshot.is_empty() {
            tracing::warn!("Catalog snapshot is empty, every candidate will be recorded as new");
        } else {
            tracing::debug!("Catalog snapshot: {} venues", snapshot.len());
        }
        Ok(snapshot)
    }

    /// Commit one region's candidates. Chunk failures are collected, never fatal.
    pub async fn commit_region(
        &self,
        region: &str,
        candidates: &[Candidate],
        snapshot: &mut CatalogSnapshot,
    ) -> CommitReport {
        let mut report = CommitReport::default();

        for (index, chunk) in candidates.chunks(self.batch_size).enumerate() {
            if let Err(e) = self.commit_chunk(region, index, chunk, snapshot, &mut report).await {
                tracing::error!("Region {}: chunk {} failed: {}", region, index, e);
                report.failures.push(format!("{}: chunk {}: {}", region, index, e));
            }
        }

        // one write per region; committed chunks stay visible even if this fails
        if let Err(e) = self.candidates.flush().await {
            tracing::error!("Region {}: flushing candidates failed: {}", region, e);
            report.failures.push(format!("{}: flush: {}", region, e));
        }

        tracing::info!(
            "Region {}: {} processed ({} new records, {} matched, {} heartbeats, {} backfilled), {} failed chunks",
            region,
            report.processed,
            report.inserted,
            report.matched,
            report.heartbeats,
            report.backfilled,
            report.failures.len()
        );

        report
    }

    async fn commit_chunk(
        &self,
        region: &str,
        index: usize,
        chunk: &[Candidate],
        snapshot: &mut CatalogSnapshot,
        report: &mut CommitReport,
    ) -> Result<(), StoreError> {
        let external_ids: Vec<String> = chunk.iter().map(|c| c.external_id.clone()).collect();
        let existing = self.candidates.find_by_external_ids(&external_ids).await?;

        let now = self.clock.now();
        let mut batch = CandidateBatch::new(now);
        let mut seen: HashSet<&str> = HashSet::new();
        let mut matched = 0;
        let mut backfilled = 0;

        for candidate in chunk {
            if existing.contains_key(&candidate.external_id) || !seen.insert(&candidate.external_id) {
                batch.heartbeats.push(candidate.external_id.clone());
                continue;
            }

            let found = find_best_match(candidate, snapshot)
                .map(|m| (m.venue.id.clone(), m.venue.external_id.is_none()));

            let (status, matched_catalog_id) = match found {
                Some((catalog_id, needs_backfill)) => {
                    // link before inserting, so a failed commit is safe to retry wholesale
                    if needs_backfill {
                        if self.catalog.link_external_id(&catalog_id, &candidate.external_id).await? {
                            backfilled += 1;
                        }
                        snapshot.record_link(&catalog_id, &candidate.external_id);
                    }
                    matched += 1;
                    (CandidateStatus::Matched, Some(catalog_id))
                }
                None => (CandidateStatus::New, None),
            };

            batch.inserts.push(CandidateRecord {
                id: Uuid::now_v7().to_string(),
                external_id: candidate.external_id.clone(),
                external_kind: candidate.external_kind,
                name: candidate.name.clone(),
                lat: candidate.lat,
                lon: candidate.lon,
                address: candidate.address.clone(),
                locality: candidate.locality.clone(),
                status,
                matched_catalog_id,
                discovered_at: now,
                last_seen_at: now,
            });
        }

        let size = batch.len();
        let inserted = batch.inserts.len();
        let heartbeats = batch.heartbeats.len();
        self.candidates.commit(batch).await?;

        tracing::debug!("Region {}: chunk {} committed ({} records)", region, index, size);
        report.processed += size;
        report.inserted += inserted;
        report.matched += matched;
        report.heartbeats += heartbeats;
        report.backfilled += backfilled;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::clock::ManualClock;
    use crate::module::reconcile::table::{CandidateTable, VenueCatalog};
    use async_trait::async_trait;
    use chrono::{Duration, Utc};
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use venuesync_common::{CatalogVenue, ExternalKind};

    fn candidate(external_id: &str, name: &str, lat: f64, lon: f64) -> Candidate {
        Candidate {
            external_id: external_id.to_string(),
            external_kind: ExternalKind::Node,
            name: name.to_string(),
            lat,
            lon,
            address: None,
            locality: Some("Indre By".to_string()),
        }
    }

    fn venue(id: &str, name: &str, lat: f64, lon: f64) -> CatalogVenue {
        CatalogVenue {
            id: id.to_string(),
            name: name.to_string(),
            lat,
            lon,
            address: None,
            locality: None,
            active: true,
            external_id: None,
        }
    }

    struct Fixture {
        clock: Arc<ManualClock>,
        table: Arc<CandidateTable>,
        catalog: Arc<VenueCatalog>,
        reconciler: Reconciler,
    }

    fn fixture(venues: Vec<CatalogVenue>) -> Fixture {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let table = Arc::new(CandidateTable::in_memory());
        let catalog = Arc::new(VenueCatalog::with_venues(venues));
        let reconciler = Reconciler::new(table.clone(), catalog.clone(), clock.clone(), DEFAULT_BATCH_SIZE);
        Fixture { clock, table, catalog, reconciler }
    }

    #[tokio::test]
    async fn test_first_sighting_matches_and_backfills() {
        let f = fixture(vec![venue("v1", "Café Guldhornene", 55.6761, 12.5683)]);
        let mut snapshot = f.reconciler.snapshot().await.unwrap();

        let report = f
            .reconciler
            .commit_region(
                "Indre By",
                &[
                    candidate("node/1", "Guldhornene", 55.6761, 12.5684),
                    candidate("node/2", "Vesterbro Vinbar", 55.7211, 12.5683),
                ],
                &mut snapshot,
            )
            .await;

        assert_eq!(report.processed, 2);
        assert_eq!(report.inserted, 2);
        assert_eq!(report.matched, 1);
        assert_eq!(report.backfilled, 1);
        assert!(report.failures.is_empty());

        let found = f
            .table
            .find_by_external_ids(&["node/1".to_string(), "node/2".to_string()])
            .await
            .unwrap();
        assert_eq!(found["node/1"].status, CandidateStatus::Matched);
        assert_eq!(found["node/1"].matched_catalog_id.as_deref(), Some("v1"));
        assert_eq!(found["node/2"].status, CandidateStatus::New);
        assert_eq!(found["node/2"].matched_catalog_id, None);

        let v1 = f.catalog.get("v1").await.unwrap().unwrap();
        assert_eq!(v1.external_id.as_deref(), Some("node/1"));
    }

    #[tokio::test]
    async fn test_second_pass_only_heartbeats() {
        let f = fixture(vec![venue("v1", "Café Guldhornene", 55.6761, 12.5683)]);
        let input: Vec<Candidate> = (0..25)
            .map(|i| candidate(&format!("node/{i}"), &format!("Bar {i}"), 56.0 + i as f64 * 0.01, 10.0))
            .collect();

        let mut snapshot = f.reconciler.snapshot().await.unwrap();
        let first = f.reconciler.commit_region("Aarhus", &input, &mut snapshot).await;
        assert_eq!(first.inserted, 25);
        let discovered = f.table.find_by_external_ids(&["node/3".to_string()]).await.unwrap()["node/3"].clone();

        f.clock.advance(Duration::hours(24));
        let mut snapshot = f.reconciler.snapshot().await.unwrap();
        let second = f.reconciler.commit_region("Aarhus", &input, &mut snapshot).await;
        assert_eq!(second.inserted, 0);
        assert_eq!(second.heartbeats, 25);
        assert_eq!(second.processed, 25);

        let counts = f.table.count_by_status().await.unwrap();
        assert_eq!(counts.values().sum::<usize>(), 25);

        let after = f.table.find_by_external_ids(&["node/3".to_string()]).await.unwrap()["node/3"].clone();
        assert_eq!(after.id, discovered.id);
        assert_eq!(after.status, discovered.status);
        assert_eq!(after.discovered_at, discovered.discovered_at);
        assert_eq!(after.last_seen_at, discovered.last_seen_at + Duration::hours(24));
    }

    #[tokio::test]
    async fn test_duplicates_within_payload_collapse() {
        let f = fixture(vec![]);
        let mut snapshot = f.reconciler.snapshot().await.unwrap();
        let dup = candidate("way/7", "Hviids Vinstue", 55.679, 12.585);

        let report = f
            .reconciler
            .commit_region("Indre By", &[dup.clone(), dup.clone(), dup], &mut snapshot)
            .await;
        assert_eq!(report.inserted, 1);
        assert_eq!(report.heartbeats, 2);
        assert!(report.failures.is_empty());
    }

    #[tokio::test]
    async fn test_two_candidates_one_venue_backfills_once() {
        let f = fixture(vec![venue("v1", "Mikkeller", 55.6701, 12.5501)]);
        let mut snapshot = f.reconciler.snapshot().await.unwrap();

        let report = f
            .reconciler
            .commit_region(
                "Vesterbro",
                &[
                    candidate("node/1", "Mikkeller", 55.6701, 12.5501),
                    candidate("way/1", "Mikkeller", 55.67012, 12.5501),
                ],
                &mut snapshot,
            )
            .await;

        assert_eq!(report.matched, 2);
        assert_eq!(report.backfilled, 1);
        let v1 = f.catalog.get("v1").await.unwrap().unwrap();
        assert_eq!(v1.external_id.as_deref(), Some("node/1"));
    }

    #[tokio::test]
    async fn test_region_commit_is_flushed_once() {
        let dir = tempfile::tempdir().unwrap();
        let table = Arc::new(CandidateTable::open(dir.path()).await.unwrap());
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let reconciler = Reconciler::new(table.clone(), Arc::new(VenueCatalog::in_memory()), clock, 10);

        let input: Vec<Candidate> = (0..25)
            .map(|i| candidate(&format!("node/{i}"), "Bodega", 55.0 + i as f64 * 0.01, 12.0))
            .collect();
        let mut snapshot = reconciler.snapshot().await.unwrap();
        let report = reconciler.commit_region("Amager", &input, &mut snapshot).await;
        assert_eq!(report.processed, 25);
        assert!(report.failures.is_empty());

        let reopened = CandidateTable::open(dir.path()).await.unwrap();
        let counts = reopened.count_by_status().await.unwrap();
        assert_eq!(counts[&CandidateStatus::New], 25);
    }

    /// Candidate store that fails every n-th commit
    struct FlakyStore {
        inner: CandidateTable,
        commits: AtomicUsize,
        fail_on: usize,
    }

    #[async_trait]
    impl CandidateStore for FlakyStore {
        async fn find_by_external_ids(
            &self,
            external_ids: &[String],
        ) -> Result<HashMap<String, CandidateRecord>, StoreError> {
            self.inner.find_by_external_ids(external_ids).await
        }

        async fn commit(&self, batch: CandidateBatch) -> Result<(), StoreError> {
            let n = self.commits.fetch_add(1, Ordering::SeqCst);
            if n == self.fail_on {
                return Err(StoreError::Io(std::io::Error::other("connection reset")));
            }
            self.inner.commit(batch).await
        }

        async fn get(&self, id: &str) -> Result<Option<CandidateRecord>, StoreError> {
            self.inner.get(id).await
        }

        async fn update(&self, record: CandidateRecord) -> Result<(), StoreError> {
            self.inner.update(record).await
        }

        async fn list_by_status(&self, status: CandidateStatus) -> Result<Vec<CandidateRecord>, StoreError> {
            self.inner.list_by_status(status).await
        }

        async fn matched_catalog_ids(&self) -> Result<HashSet<String>, StoreError> {
            self.inner.matched_catalog_ids().await
        }

        async fn count_by_status(&self) -> Result<HashMap<CandidateStatus, usize>, StoreError> {
            self.inner.count_by_status().await
        }
    }

    #[tokio::test]
    async fn test_failed_chunk_does_not_stop_the_rest() {
        let store = Arc::new(FlakyStore {
            inner: CandidateTable::in_memory(),
            commits: AtomicUsize::new(0),
            fail_on: 1,
        });
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let reconciler = Reconciler::new(store.clone(), Arc::new(VenueCatalog::in_memory()), clock, 10);

        let input: Vec<Candidate> = (0..30)
            .map(|i| candidate(&format!("node/{i}"), "Bodega", 55.0 + i as f64 * 0.01, 12.0))
            .collect();
        let mut snapshot = reconciler.snapshot().await.unwrap();
        let report = reconciler.commit_region("Amager", &input, &mut snapshot).await;

        assert_eq!(report.processed, 20);
        assert_eq!(report.failures.len(), 1);
        assert!(report.failures[0].starts_with("Amager: chunk 1:"), "{}", report.failures[0]);

        // a retry picks up exactly the failed chunk
        let retry = reconciler.commit_region("Amager", &input, &mut snapshot).await;
        assert_eq!(retry.inserted, 10);
        assert_eq!(retry.heartbeats, 20);
        let counts = store.count_by_status().await.unwrap();
        assert_eq!(counts[&CandidateStatus::New], 30);
    }
}
