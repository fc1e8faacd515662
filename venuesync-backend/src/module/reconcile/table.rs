///! File-backed candidate table and venue catalog
///!
///! Both keep the full table in memory with secondary indexes and
///! rewrite a pretty-printed JSON file on change. Candidate batch commits
///! are buffered until `flush`; every other mutation writes through.
///! Without a path they are purely in-memory.

use async_trait::async_trait;
use serde::{Serialize, de::DeserializeOwned};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::sync::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

use venuesync_common::{CandidateRecord, CandidateStatus, CatalogVenue, NewCatalogVenue};

use super::store::{
    CandidateBatch, CandidateStore, CatalogRepository, StoreError, validate_record,
};

pub const CANDIDATES_FILE: &str = "candidates.json";
pub const CATALOG_FILE: &str = "catalog.json";

async fn load_rows<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>, StoreError> {
    if !path.exists() {
        debug!("Table file does not exist yet: {:?}", path);
        return Ok(Vec::new());
    }
    let content = fs::read_to_string(path).await?;
    Ok(serde_json::from_str(&content)?)
}

/// Write through a temp file so a crash never leaves a truncated table behind
async fn save_rows<T: Serialize>(path: &Path, rows: &[&T]) -> Result<(), StoreError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await?;
    }
    let content = serde_json::to_string_pretty(rows)?;
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, content).await?;
    fs::rename(&tmp, path).await?;
    Ok(())
}

#[derive(Debug, Default)]
struct CandidateState {
    records: BTreeMap<String, CandidateRecord>,
    by_external_id: HashMap<String, String>,
    /// Commits applied in memory but not yet written out
    dirty: bool,
}

impl CandidateState {
    fn insert(&mut self, record: CandidateRecord) {
        self.by_external_id.insert(record.external_id.clone(), record.id.clone());
        self.records.insert(record.id.clone(), record);
    }

    fn by_external_id_mut(&mut self, external_id: &str) -> Option<&mut CandidateRecord> {
        let id = self.by_external_id.get(external_id)?;
        self.records.get_mut(id)
    }
}

/// Candidate table persisted to `candidates.json`
pub struct CandidateTable {
    path: Option<PathBuf>,
    state: RwLock<CandidateState>,
}

impl CandidateTable {
    pub fn in_memory() -> Self {
        Self {
            path: None,
            state: RwLock::new(CandidateState::default()),
        }
    }

    /// Open the table under `data_dir`, loading existing rows
    pub async fn open(data_dir: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = data_dir.as_ref().join(CANDIDATES_FILE);
        let rows: Vec<CandidateRecord> = load_rows(&path).await?;

        let mut state = CandidateState::default();
        for record in rows {
            if state.by_external_id.contains_key(&record.external_id) {
                return Err(StoreError::DuplicateExternalId(record.external_id));
            }
            state.insert(record);
        }
        info!("Loaded {} candidates from {:?}", state.records.len(), path);

        Ok(Self {
            path: Some(path),
            state: RwLock::new(state),
        })
    }

    async fn persist(&self, state: &CandidateState) -> Result<(), StoreError> {
        match &self.path {
            Some(path) => {
                let rows: Vec<&CandidateRecord> = state.records.values().collect();
                save_rows(path, &rows).await
            }
            None => Ok(()),
        }
    }
}

#[async_trait]
impl CandidateStore for CandidateTable {
    async fn find_by_external_ids(
        &self,
        external_ids: &[String],
    ) -> Result<HashMap<String, CandidateRecord>, StoreError> {
        let state = self.state.read().await;
        Ok(external_ids
            .iter()
            .filter_map(|ext| {
                let id = state.by_external_id.get(ext)?;
                state.records.get(id).map(|r| (ext.clone(), r.clone()))
            })
            .collect())
    }

    async fn commit(&self, batch: CandidateBatch) -> Result<(), StoreError> {
        let mut state = self.state.write().await;

        let mut pending = HashSet::new();
        for record in &batch.inserts {
            validate_record(record)?;
            if state.by_external_id.contains_key(&record.external_id)
                || !pending.insert(record.external_id.as_str())
            {
                return Err(StoreError::DuplicateExternalId(record.external_id.clone()));
            }
        }
        for external_id in &batch.heartbeats {
            if !state.by_external_id.contains_key(external_id) && !pending.contains(external_id.as_str()) {
                return Err(StoreError::CandidateNotFound(external_id.clone()));
            }
        }

        for record in batch.inserts {
            state.insert(record);
        }
        for external_id in &batch.heartbeats {
            if let Some(record) = state.by_external_id_mut(external_id) {
                record.last_seen_at = batch.seen_at;
            }
        }

        // written out by the next flush or update, not once per chunk
        state.dirty = true;
        Ok(())
    }

    async fn flush(&self) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        if !state.dirty {
            return Ok(());
        }
        self.persist(&state).await?;
        state.dirty = false;
        debug!("Flushed {} candidates", state.records.len());
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<CandidateRecord>, StoreError> {
        Ok(self.state.read().await.records.get(id).cloned())
    }

    async fn update(&self, record: CandidateRecord) -> Result<(), StoreError> {
        validate_record(&record)?;
        let mut state = self.state.write().await;

        let previous = match state.records.get(&record.id) {
            Some(existing) if existing.external_id != record.external_id => {
                return Err(StoreError::InvalidRecord {
                    id: record.id.clone(),
                    reason: "external id is immutable".to_string(),
                });
            }
            Some(existing) => existing.clone(),
            None => return Err(StoreError::CandidateNotFound(record.id.clone())),
        };

        state.records.insert(record.id.clone(), record);
        if let Err(e) = self.persist(&state).await {
            state.records.insert(previous.id.clone(), previous);
            return Err(e);
        }
        // the full table went out, buffered commits included
        state.dirty = false;
        Ok(())
    }

    async fn list_by_status(&self, status: CandidateStatus) -> Result<Vec<CandidateRecord>, StoreError> {
        let state = self.state.read().await;
        Ok(state
            .records
            .values()
            .filter(|r| r.status == status)
            .cloned()
            .collect())
    }

    async fn matched_catalog_ids(&self) -> Result<HashSet<String>, StoreError> {
        let state = self.state.read().await;
        Ok(state
            .records
            .values()
            .filter_map(|r| r.matched_catalog_id.clone())
            .collect())
    }

    async fn count_by_status(&self) -> Result<HashMap<CandidateStatus, usize>, StoreError> {
        let state = self.state.read().await;
        let mut counts: HashMap<CandidateStatus, usize> =
            CandidateStatus::ALL.iter().map(|s| (*s, 0)).collect();
        for record in state.records.values() {
            *counts.entry(record.status).or_default() += 1;
        }
        Ok(counts)
    }
}

#[derive(Debug, Default)]
struct CatalogState {
    venues: BTreeMap<String, CatalogVenue>,
    by_external_id: HashMap<String, String>,
}

/// Venue catalog persisted to `catalog.json`
pub struct VenueCatalog {
    path: Option<PathBuf>,
    state: RwLock<CatalogState>,
}

impl VenueCatalog {
    pub fn in_memory() -> Self {
        Self {
            path: None,
            state: RwLock::new(CatalogState::default()),
        }
    }

    /// In-memory catalog seeded with existing venues
    pub fn with_venues(venues: Vec<CatalogVenue>) -> Self {
        let mut state = CatalogState::default();
        for venue in venues {
            if let Some(external_id) = &venue.external_id {
                state.by_external_id.insert(external_id.clone(), venue.id.clone());
            }
            state.venues.insert(venue.id.clone(), venue);
        }
        Self {
            path: None,
            state: RwLock::new(state),
        }
    }

    pub async fn open(data_dir: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = data_dir.as_ref().join(CATALOG_FILE);
        let rows: Vec<CatalogVenue> = load_rows(&path).await?;
        info!("Loaded {} catalog venues from {:?}", rows.len(), path);

        let mut catalog = Self::with_venues(rows);
        catalog.path = Some(path);
        Ok(catalog)
    }

    async fn persist(&self, state: &CatalogState) -> Result<(), StoreError> {
        match &self.path {
            Some(path) => {
                let rows: Vec<&CatalogVenue> = state.venues.values().collect();
                save_rows(path, &rows).await
            }
            None => Ok(()),
        }
    }
}

#[async_trait]
impl CatalogRepository for VenueCatalog {
    async fn snapshot(&self) -> Result<Vec<CatalogVenue>, StoreError> {
        Ok(self.state.read().await.venues.values().cloned().collect())
    }

    async fn get(&self, id: &str) -> Result<Option<CatalogVenue>, StoreError> {
        Ok(self.state.read().await.venues.get(id).cloned())
    }

    async fn find_by_external_id(&self, external_id: &str) -> Result<Option<CatalogVenue>, StoreError> {
        let state = self.state.read().await;
        Ok(state
            .by_external_id
            .get(external_id)
            .and_then(|id| state.venues.get(id))
            .cloned())
    }

    async fn create(&self, venue: NewCatalogVenue) -> Result<CatalogVenue, StoreError> {
        let mut state = self.state.write().await;
        let created = CatalogVenue {
            id: Uuid::now_v7().to_string(),
            name: venue.name,
            lat: venue.lat,
            lon: venue.lon,
            address: venue.address,
            locality: venue.locality,
            active: true,
            external_id: venue.external_id,
        };

        if let Some(external_id) = &created.external_id {
            if state.by_external_id.contains_key(external_id) {
                return Err(StoreError::DuplicateExternalId(external_id.clone()));
            }
            state.by_external_id.insert(external_id.clone(), created.id.clone());
        }
        state.venues.insert(created.id.clone(), created.clone());

        if let Err(e) = self.persist(&state).await {
            state.venues.remove(&created.id);
            if let Some(external_id) = &created.external_id {
                state.by_external_id.remove(external_id);
            }
            return Err(e);
        }
        Ok(created)
    }

    async fn link_external_id(&self, id: &str, external_id: &str) -> Result<bool, StoreError> {
        let mut state = self.state.write().await;
        let venue = state
            .venues
            .get_mut(id)
            .ok_or_else(|| StoreError::VenueNotFound(id.to_string()))?;

        if venue.external_id.is_some() {
            return Ok(false);
        }
        venue.external_id = Some(external_id.to_string());
        // another venue may already hold this id; keep the first holder in the index
        state
            .by_external_id
            .entry(external_id.to_string())
            .or_insert_with(|| id.to_string());

        if let Err(e) = self.persist(&state).await {
            if let Some(venue) = state.venues.get_mut(id) {
                venue.external_id = None;
            }
            if state.by_external_id.get(external_id).is_some_and(|v| v == id) {
                state.by_external_id.remove(external_id);
            }
            return Err(e);
        }
        Ok(true)
    }

    async fn set_active(&self, id: &str, active: bool) -> Result<CatalogVenue, StoreError> {
        let mut state = self.state.write().await;
        let venue = state
            .venues
            .get_mut(id)
            .ok_or_else(|| StoreError::VenueNotFound(id.to_string()))?;
        let previous = venue.active;
        venue.active = active;
        let updated = venue.clone();

        if let Err(e) = self.persist(&state).await {
            if let Some(venue) = state.venues.get_mut(id) {
                venue.active = previous;
            }
            return Err(e);
        }
        Ok(updated)
    }

    async fn list_unlinked(&self) -> Result<Vec<CatalogVenue>, StoreError> {
        let state = self.state.read().await;
        Ok(state
            .venues
            .values()
            .filter(|v| v.external_id.is_none())
            .cloned()
            .collect())
    }
}
