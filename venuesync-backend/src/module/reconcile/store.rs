///! Storage seams for the candidate table and the venue catalog
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use thiserror::Error;

use venuesync_common::{CandidateRecord, CandidateStatus, CatalogVenue, NewCatalogVenue};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("candidate {0} not found")]
    CandidateNotFound(String),

    #[error("catalog venue {0} not found")]
    VenueNotFound(String),

    #[error("external id {0} is already recorded")]
    DuplicateExternalId(String),

    #[error("invalid candidate {id}: {reason}")]
    InvalidRecord { id: String, reason: String },

    #[error("storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("storage encoding error: {0}")]
    Encoding(#[from] serde_json::Error),
}

/// One commit unit for the candidate table: applied entirely or not at all
#[derive(Debug, Clone)]
pub struct CandidateBatch {
    pub inserts: Vec<CandidateRecord>,
    /// External ids whose `last_seen_at` is refreshed
    pub heartbeats: Vec<String>,
    pub seen_at: DateTime<Utc>,
}

impl CandidateBatch {
    pub fn new(seen_at: DateTime<Utc>) -> Self {
        Self {
            inserts: Vec::new(),
            heartbeats: Vec::new(),
            seen_at,
        }
    }

    pub fn len(&self) -> usize {
        self.inserts.len() + self.heartbeats.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inserts.is_empty() && self.heartbeats.is_empty()
    }
}

/// Check `matched_catalog_id` is set exactly for linked statuses.
pub fn validate_record(record: &CandidateRecord) -> Result<(), StoreError> {
    let linked = record.status.is_linked();
    if linked != record.matched_catalog_id.is_some() {
        return Err(StoreError::InvalidRecord {
            id: record.id.clone(),
            reason: format!(
                "status {} {} a matched catalog id",
                record.status,
                if linked { "requires" } else { "forbids" }
            ),
        });
    }
    Ok(())
}

/// Persisted table of external candidates, unique by external id
#[async_trait]
pub trait CandidateStore: Send + Sync {
    /// Indexed lookup of the records among `external_ids` that already exist
    async fn find_by_external_ids(
        &self,
        external_ids: &[String],
    ) -> Result<HashMap<String, CandidateRecord>, StoreError>;

    async fn commit(&self, batch: CandidateBatch) -> Result<(), StoreError>;

    /// Make committed batches durable. Stores that write through need not override this.
    async fn flush(&self) -> Result<(), StoreError> {
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<CandidateRecord>, StoreError>;

    /// Replace an existing record
    async fn update(&self, record: CandidateRecord) -> Result<(), StoreError>;

    async fn list_by_status(&self, status: CandidateStatus) -> Result<Vec<CandidateRecord>, StoreError>;

    /// Catalog ids referenced by any candidate
    async fn matched_catalog_ids(&self) -> Result<HashSet<String>, StoreError>;

    async fn count_by_status(&self) -> Result<HashMap<CandidateStatus, usize>, StoreError>;
}

/// The slice of the venue catalog this engine reads and writes
#[async_trait]
pub trait CatalogRepository: Send + Sync {
    async fn snapshot(&self) -> Result<Vec<CatalogVenue>, StoreError>;

    async fn get(&self, id: &str) -> Result<Option<CatalogVenue>, StoreError>;

    async fn find_by_external_id(&self, external_id: &str) -> Result<Option<CatalogVenue>, StoreError>;

    async fn create(&self, venue: NewCatalogVenue) -> Result<CatalogVenue, StoreError>;

    /// Set the venue's external id if it has none. Returns whether it was written.
    async fn link_external_id(&self, id: &str, external_id: &str) -> Result<bool, StoreError>;

    async fn set_active(&self, id: &str, active: bool) -> Result<CatalogVenue, StoreError>;

    /// Venues that carry no external id
    async fn list_unlinked(&self) -> Result<Vec<CatalogVenue>, StoreError>;
}
