///! Overpass response and candidate types

use serde::Deserialize;
use std::collections::HashMap;

use venuesync_common::ExternalKind;

/// Top-level Overpass JSON response
#[derive(Debug, Deserialize)]
pub struct OverpassResponse {
    #[serde(default)]
    pub elements: Vec<OverpassElement>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct LatLon {
    pub lat: f64,
    pub lon: f64,
}

/// One element of the response. Nodes carry their own coordinates,
/// ways and relations only carry a centroid (requested with `out center`).
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum OverpassElement {
    Node {
        id: u64,
        lat: Option<f64>,
        lon: Option<f64>,
        #[serde(default)]
        tags: HashMap<String, String>,
    },
    Way {
        id: u64,
        center: Option<LatLon>,
        #[serde(default)]
        tags: HashMap<String, String>,
    },
    Relation {
        id: u64,
        center: Option<LatLon>,
        #[serde(default)]
        tags: HashMap<String, String>,
    },
    #[serde(other)]
    Other,
}

impl OverpassElement {
    pub fn kind(&self) -> Option<ExternalKind> {
        match self {
            OverpassElement::Node { .. } => Some(ExternalKind::Node),
            OverpassElement::Way { .. } => Some(ExternalKind::Way),
            OverpassElement::Relation { .. } => Some(ExternalKind::Relation),
            OverpassElement::Other => None,
        }
    }

    pub fn id(&self) -> Option<u64> {
        match self {
            OverpassElement::Node { id, .. }
            | OverpassElement::Way { id, .. }
            | OverpassElement::Relation { id, .. } => Some(*id),
            OverpassElement::Other => None,
        }
    }

    pub fn position(&self) -> Option<LatLon> {
        match self {
            OverpassElement::Node { lat: Some(lat), lon: Some(lon), .. } => Some(LatLon { lat: *lat, lon: *lon }),
            OverpassElement::Way { center, .. } | OverpassElement::Relation { center, .. } => *center,
            _ => None,
        }
    }

    pub fn tag(&self, key: &str) -> Option<&str> {
        let tags = match self {
            OverpassElement::Node { tags, .. }
            | OverpassElement::Way { tags, .. }
            | OverpassElement::Relation { tags, .. } => tags,
            OverpassElement::Other => return None,
        };
        tags.get(key).map(|v| v.trim()).filter(|v| !v.is_empty())
    }
}

/// Normalized external observation, ready for matching
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    /// `<kind>/<id>`, unique across element kinds
    pub external_id: String,
    pub external_kind: ExternalKind,
    pub name: String,
    pub lat: f64,
    pub lon: f64,
    pub address: Option<String>,
    pub locality: Option<String>,
}
