///! Candidate-to-catalog matcher
///!
///! Resolves one external candidate against an in-memory catalog snapshot
///! taken once per sync run.

use std::collections::HashMap;

use venuesync_common::CatalogVenue;

use crate::module::osm::Candidate;

use super::scorer::{great_circle_distance_meters, name_similarity};

/// Entries farther than this are never scored
pub const MAX_SCORING_DISTANCE_METERS: f64 = 100.0;

/// (max distance in meters, min name similarity); a candidate qualifies if it meets any tier
pub const MATCH_TIERS: [(f64, f64); 2] = [(50.0, 0.85), (30.0, 0.70)];

/// Grid cell size in degrees for the spatial index. 0.01 deg of latitude is ~1.1 km,
/// so one row above and below always covers the scoring radius.
const GRID_CELL_DEGREES: f64 = 0.01;

/// Longitude columns around the globe; column indexes wrap at the antimeridian
const GRID_COLUMNS: i64 = 36_000;

/// Length of one degree of latitude (and of longitude at the equator)
const METERS_PER_DEGREE: f64 = 111_320.0;

/// Why a catalog entry was chosen
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MatchKind {
    /// The entry already carries the candidate's external id
    Linked,
    /// Chosen by combined name/distance scoring
    Scored {
        similarity: f64,
        distance_meters: f64,
        score: f64,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct CatalogMatch<'a> {
    pub venue: &'a CatalogVenue,
    pub kind: MatchKind,
}

type GridCell = (i64, i64);

fn grid_cell(lat: f64, lon: f64) -> GridCell {
    (
        (lat / GRID_CELL_DEGREES).floor() as i64,
        ((lon / GRID_CELL_DEGREES).floor() as i64).rem_euclid(GRID_COLUMNS),
    )
}

/// Columns on each side of a point that can hold an entry within the scoring radius.
/// Grows toward the poles as longitude cells shrink, up to the whole ring.
fn column_reach(lat: f64) -> i64 {
    // worst case is the poleward edge of the neighbouring row
    let extreme = (lat.abs() + 2.0 * GRID_CELL_DEGREES).min(90.0);
    let cell_width = METERS_PER_DEGREE * GRID_CELL_DEGREES * extreme.to_radians().cos();
    if cell_width <= 0.0 {
        return GRID_COLUMNS / 2;
    }
    ((MAX_SCORING_DISTANCE_METERS / cell_width).ceil() as i64).clamp(1, GRID_COLUMNS / 2)
}

/// Wrapped column indexes to visit around `col`, each at most once
fn nearby_columns(lat: f64, col: i64) -> Vec<i64> {
    let reach = column_reach(lat);
    if 2 * reach + 1 >= GRID_COLUMNS {
        return (0..GRID_COLUMNS).collect();
    }
    (col - reach..=col + reach)
        .map(|c| c.rem_euclid(GRID_COLUMNS))
        .collect()
}

/// Read-only catalog view with lookups keyed by external id and by location
#[derive(Debug, Default)]
pub struct CatalogSnapshot {
    venues: Vec<CatalogVenue>,
    by_external_id: HashMap<String, usize>,
    by_id: HashMap<String, usize>,
    grid: HashMap<GridCell, Vec<usize>>,
}

impl CatalogSnapshot {
    pub fn new(venues: Vec<CatalogVenue>) -> Self {
        let mut snapshot = Self {
            venues: Vec::with_capacity(venues.len()),
            ..Default::default()
        };
        for venue in venues {
            snapshot.push(venue);
        }
        snapshot
    }

    fn push(&mut self, venue: CatalogVenue) {
        let index = self.venues.len();
        if let Some(external_id) = &venue.external_id {
            self.by_external_id.entry(external_id.clone()).or_insert(index);
        }
        self.by_id.insert(venue.id.clone(), index);
        self.grid.entry(grid_cell(venue.lat, venue.lon)).or_default().push(index);
        self.venues.push(venue);
    }

    pub fn len(&self) -> usize {
        self.venues.len()
    }

    pub fn is_empty(&self) -> bool {
        self.venues.is_empty()
    }

    pub fn get(&self, catalog_id: &str) -> Option<&CatalogVenue> {
        self.by_id.get(catalog_id).map(|&i| &self.venues[i])
    }

    pub fn find_by_external_id(&self, external_id: &str) -> Option<&CatalogVenue> {
        self.by_external_id.get(external_id).map(|&i| &self.venues[i])
    }

    /// Record a backfill done by this run so later candidates see the link.
    /// An entry that already carries an external id is left untouched.
    pub fn record_link(&mut self, catalog_id: &str, external_id: &str) {
        let Some(&index) = self.by_id.get(catalog_id) else {
            return;
        };
        let venue = &mut self.venues[index];
        if venue.external_id.is_none() {
            venue.external_id = Some(external_id.to_string());
            self.by_external_id.entry(external_id.to_string()).or_insert(index);
        }
    }

    /// Entries in the grid neighbourhood of a point: one row either side, and enough
    /// columns either side to span the scoring radius at this latitude
    fn nearby(&self, lat: f64, lon: f64) -> impl Iterator<Item = &CatalogVenue> {
        let (row, col) = grid_cell(lat, lon);
        let columns = nearby_columns(lat, col);
        (row - 1..=row + 1)
            .flat_map(move |r| columns.clone().into_iter().map(move |c| (r, c)))
            .filter_map(|cell| self.grid.get(&cell))
            .flatten()
            .map(|&i| &self.venues[i])
    }
}

/// Whether a (distance, similarity) pair meets any match tier
pub fn qualifies(distance_meters: f64, similarity: f64) -> bool {
    MATCH_TIERS
        .iter()
        .any(|&(max_distance, min_similarity)| distance_meters <= max_distance && similarity >= min_similarity)
}

/// Combined score: name similarity discounted linearly by distance over the scoring radius
pub fn match_score(similarity: f64, distance_meters: f64) -> f64 {
    similarity * (1.0 - distance_meters / MAX_SCORING_DISTANCE_METERS)
}

/// Find the best catalog entry for a candidate, if any qualifies.
pub fn find_best_match<'a>(candidate: &Candidate, snapshot: &'a CatalogSnapshot) -> Option<CatalogMatch<'a>> {
    if let Some(venue) = snapshot.find_by_external_id(&candidate.external_id) {
        return Some(CatalogMatch { venue, kind: MatchKind::Linked });
    }

    let mut best: Option<CatalogMatch<'a>> = None;
    let mut best_score = f64::NEG_INFINITY;

    for venue in snapshot.nearby(candidate.lat, candidate.lon) {
        let distance = great_circle_distance_meters(candidate.lat, candidate.lon, venue.lat, venue.lon);
        if distance > MAX_SCORING_DISTANCE_METERS {
            continue;
        }

        let similarity = name_similarity(&candidate.name, &venue.name);
        if !qualifies(distance, similarity) {
            continue;
        }

        let score = match_score(similarity, distance);
        if score > best_score {
            best_score = score;
            best = Some(CatalogMatch {
                venue,
                kind: MatchKind::Scored {
                    similarity,
                    distance_meters: distance,
                    score,
                },
            });
        }
    }

    if let Some(m) = &best {
        tracing::debug!(
            "Matched {} '{}' to catalog {} '{}' ({:?})",
            candidate.external_id,
            candidate.name,
            m.venue.id,
            m.venue.name,
            m.kind
        );
    }

    best
}
