use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Disposition of an externally sourced venue observation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CandidateStatus {
    New,
    Matched,
    Imported,
    Ignored,
}

impl CandidateStatus {
    pub const ALL: [CandidateStatus; 4] = [
        CandidateStatus::New,
        CandidateStatus::Matched,
        CandidateStatus::Imported,
        CandidateStatus::Ignored,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CandidateStatus::New => "new",
            CandidateStatus::Matched => "matched",
            CandidateStatus::Imported => "imported",
            CandidateStatus::Ignored => "ignored",
        }
    }

    /// Whether a record in this state must carry a `matched_catalog_id`
    pub fn is_linked(&self) -> bool {
        matches!(self, CandidateStatus::Matched | CandidateStatus::Imported)
    }
}

impl std::fmt::Display for CandidateStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for CandidateStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "new" => Ok(CandidateStatus::New),
            "matched" => Ok(CandidateStatus::Matched),
            "imported" => Ok(CandidateStatus::Imported),
            "ignored" => Ok(CandidateStatus::Ignored),
            _ => Err(format!("Unknown candidate status: {}", s)),
        }
    }
}

/// Element kind in the external geographic database
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExternalKind {
    Node,
    Way,
    Relation,
}

impl ExternalKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExternalKind::Node => "node",
            ExternalKind::Way => "way",
            ExternalKind::Relation => "relation",
        }
    }
}

impl std::fmt::Display for ExternalKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One row of the candidate table: a distinct external record ever observed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CandidateRecord {
    pub id: String,
    pub external_id: String,
    pub external_kind: ExternalKind,
    pub name: String,
    pub lat: f64,
    pub lon: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locality: Option<String>,
    pub status: CandidateStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub matched_catalog_id: Option<String>,
    /// Set once, at first insert
    pub discovered_at: DateTime<Utc>,
    /// Liveness heartbeat, refreshed every time the record reappears upstream
    pub last_seen_at: DateTime<Utc>,
}

/// Venue in the internal catalog
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogVenue {
    pub id: String,
    pub name: String,
    pub lat: f64,
    pub lon: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locality: Option<String>,
    pub active: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_id: Option<String>,
}

/// Fields needed to create a catalog venue
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewCatalogVenue {
    pub name: String,
    pub lat: f64,
    pub lon: f64,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub locality: Option<String>,
    #[serde(default)]
    pub external_id: Option<String>,
}

/// Rectangular query area, `min_lat,min_lon,max_lat,max_lon`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f64; 4]", into = "[f64; 4]")]
pub struct BoundingBox {
    pub min_lat: f64,
    pub min_lon: f64,
    pub max_lat: f64,
    pub max_lon: f64,
}

impl BoundingBox {
    pub fn new(min_lat: f64, min_lon: f64, max_lat: f64, max_lon: f64) -> Self {
        Self { min_lat, min_lon, max_lat, max_lon }
    }

    pub fn validate(&self) -> Result<(), String> {
        let lat_ok = |v: f64| (-90.0..=90.0).contains(&v);
        let lon_ok = |v: f64| (-180.0..=180.0).contains(&v);
        if !(lat_ok(self.min_lat) && lat_ok(self.max_lat)) {
            return Err(format!("latitude out of range in {}", self));
        }
        if !(lon_ok(self.min_lon) && lon_ok(self.max_lon)) {
            return Err(format!("longitude out of range in {}", self));
        }
        if self.min_lat >= self.max_lat || self.min_lon >= self.max_lon {
            return Err(format!("min must be below max in {}", self));
        }
        Ok(())
    }
}

impl std::fmt::Display for BoundingBox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{},{},{},{}", self.min_lat, self.min_lon, self.max_lat, self.max_lon)
    }
}

impl From<[f64; 4]> for BoundingBox {
    fn from(v: [f64; 4]) -> Self {
        Self::new(v[0], v[1], v[2], v[3])
    }
}

impl From<BoundingBox> for [f64; 4] {
    fn from(b: BoundingBox) -> Self {
        [b.min_lat, b.min_lon, b.max_lat, b.max_lon]
    }
}

/// Named query area, processed in configuration order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Region {
    pub name: String,
    pub bbox: BoundingBox,
}

/// Result of one full sync run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SyncSummary {
    pub found: usize,
    pub processed: usize,
    pub regions: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Candidate counts per status plus unreferenced catalog venues
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateStats {
    pub new: usize,
    pub matched: usize,
    pub imported: usize,
    pub ignored: usize,
    pub missing: usize,
}

impl CandidateStats {
    pub fn set(&mut self, status: CandidateStatus, count: usize) {
        match status {
            CandidateStatus::New => self.new = count,
            CandidateStatus::Matched => self.matched = count,
            CandidateStatus::Imported => self.imported = count,
            CandidateStatus::Ignored => self.ignored = count,
        }
    }
}
