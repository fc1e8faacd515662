///! Curator actions over the candidate table
///!
///! Human-driven dispositions: import a new candidate into the catalog,
///! ignore it, link it to an existing venue by hand, or flag a catalog
///! venue as closed. Precondition failures surface as [`CuratorError`].

use std::sync::Arc;
use thiserror::Error;

use venuesync_common::{
    CandidateRecord, CandidateStats, CandidateStatus, CatalogVenue, NewCatalogVenue,
};

use super::store::{CandidateStore, CatalogRepository, StoreError};

#[derive(Debug, Error)]
pub enum CuratorError {
    #[error("candidate {0} not found")]
    CandidateNotFound(String),

    #[error("candidate {id} already processed (status: {status})")]
    AlreadyProcessed { id: String, status: CandidateStatus },

    #[error("catalog venue {0} not found")]
    CatalogVenueNotFound(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

pub struct Curator {
    candidates: Arc<dyn CandidateStore>,
    catalog: Arc<dyn CatalogRepository>,
}

impl Curator {
    pub fn new(candidates: Arc<dyn CandidateStore>, catalog: Arc<dyn CatalogRepository>) -> Self {
        Self { candidates, catalog }
    }

    async fn load(&self, id: &str) -> Result<CandidateRecord, CuratorError> {
        self.candidates
            .get(id)
            .await?
            .ok_or_else(|| CuratorError::CandidateNotFound(id.to_string()))
    }

    pub async fn list_new(&self) -> Result<Vec<CandidateRecord>, CuratorError> {
        Ok(self.candidates.list_by_status(CandidateStatus::New).await?)
    }

    /// Active catalog venues that no external record points at
    pub async fn list_missing(&self) -> Result<Vec<CatalogVenue>, CuratorError> {
        let referenced = self.candidates.matched_catalog_ids().await?;
        Ok(self
            .catalog
            .list_unlinked()
            .await?
            .into_iter()
            .filter(|v| v.active && !referenced.contains(&v.id))
            .collect())
    }

    pub async fn get_stats(&self) -> Result<CandidateStats, CuratorError> {
        let mut stats = CandidateStats::default();
        for (status, count) in self.candidates.count_by_status().await? {
            stats.set(status, count);
        }
        stats.missing = self.list_missing().await?.len();
        Ok(stats)
    }

    /// Create a catalog venue from a `new` candidate and mark it imported.
    pub async fn import_candidate(&self, id: &str) -> Result<CatalogVenue, CuratorError> {
        let mut record = self.load(id).await?;
        if record.status != CandidateStatus::New {
            return Err(CuratorError::AlreadyProcessed {
                id: record.id,
                status: record.status,
            });
        }

        // a venue may exist from an earlier attempt that failed before the candidate was saved
        let venue = match self.catalog.find_by_external_id(&record.external_id).await? {
            Some(existing) => existing,
            None => {
                self.catalog
                    .create(NewCatalogVenue {
                        name: record.name.clone(),
                        lat: record.lat,
                        lon: record.lon,
                        address: record.address.clone(),
                        locality: record.locality.clone(),
                        external_id: Some(record.external_id.clone()),
                    })
                    .await?
            }
        };

        record.status = CandidateStatus::Imported;
        record.matched_catalog_id = Some(venue.id.clone());
        self.candidates.update(record).await?;

        tracing::info!("Imported candidate {} as catalog venue {} '{}'", id, venue.id, venue.name);
        Ok(venue)
    }

    /// Mark a candidate ignored. Ignoring twice is a no-op; imported candidates are final.
    pub async fn ignore_candidate(&self, id: &str) -> Result<CandidateRecord, CuratorError> {
        let mut record = self.load(id).await?;
        match record.status {
            CandidateStatus::Ignored => return Ok(record),
            CandidateStatus::Imported => {
                return Err(CuratorError::AlreadyProcessed {
                    id: record.id,
                    status: record.status,
                });
            }
            CandidateStatus::New | CandidateStatus::Matched => {}
        }

        record.status = CandidateStatus::Ignored;
        record.matched_catalog_id = None;
        self.candidates.update(record.clone()).await?;

        tracing::info!("Ignored candidate {} '{}'", id, record.name);
        Ok(record)
    }

    /// Manually link a candidate to a catalog venue, backfilling the venue's external id if absent.
    pub async fn link_candidate(&self, id: &str, catalog_id: &str) -> Result<CandidateRecord, CuratorError> {
        let mut record = self.load(id).await?;
        if matches!(record.status, CandidateStatus::Imported | CandidateStatus::Ignored) {
            return Err(CuratorError::AlreadyProcessed {
                id: record.id,
                status: record.status,
            });
        }

        let venue = self
            .catalog
            .get(catalog_id)
            .await?
            .ok_or_else(|| CuratorError::CatalogVenueNotFound(catalog_id.to_string()))?;

        if venue.external_id.is_none() {
            self.catalog.link_external_id(&venue.id, &record.external_id).await?;
        }

        record.status = CandidateStatus::Matched;
        record.matched_catalog_id = Some(venue.id.clone());
        self.candidates.update(record.clone()).await?;

        tracing::info!("Linked candidate {} to catalog venue {}", id, venue.id);
        Ok(record)
    }

    /// Flag a catalog venue as closed. Candidate records are left alone.
    pub async fn mark_catalog_venue_missing(&self, catalog_id: &str) -> Result<CatalogVenue, CuratorError> {
        let venue = self.catalog.set_active(catalog_id, false).await.map_err(|e| match e {
            StoreError::VenueNotFound(id) => CuratorError::CatalogVenueNotFound(id),
            other => CuratorError::Store(other),
        })?;

        tracing::info!("Marked catalog venue {} '{}' inactive", venue.id, venue.name);
        Ok(venue)
    }
}
