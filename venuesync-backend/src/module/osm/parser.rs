///! Overpass JSON parser
///!
///! Turns a raw Overpass response into candidates, dropping elements
///! that have no usable name or position.

use tracing::debug;

use venuesync_common::Region;

use super::types::{Candidate, OverpassElement, OverpassResponse};

/// Join `addr:street` and `addr:housenumber` into one display line
fn street_address(element: &OverpassElement) -> Option<String> {
    match (element.tag("addr:street"), element.tag("addr:housenumber")) {
        (Some(street), Some(number)) => Some(format!("{} {}", street, number)),
        (Some(street), None) => Some(street.to_string()),
        _ => None,
    }
}

/// Extract a candidate from one element; `None` when it is not actionable.
pub fn extract_candidate(element: &OverpassElement, region: &Region) -> Option<Candidate> {
    let kind = element.kind()?;
    let id = element.id()?;
    let name = element.tag("name")?;
    let position = element.position()?;

    Some(Candidate {
        external_id: format!("{}/{}", kind, id),
        external_kind: kind,
        name: name.to_string(),
        lat: position.lat,
        lon: position.lon,
        address: street_address(element),
        locality: Some(
            element
                .tag("addr:city")
                .unwrap_or(region.name.as_str())
                .to_string(),
        ),
    })
}

/// Parse an Overpass JSON body into candidates for `region`.
pub fn parse_overpass_json(json: &str, region: &Region) -> Result<Vec<Candidate>, serde_json::Error> {
    let response: OverpassResponse = serde_json::from_str(json)?;
    let total = response.elements.len();

    let candidates: Vec<Candidate> = response
        .elements
        .iter()
        .filter_map(|element| extract_candidate(element, region))
        .collect();

    debug!(
        "Region {}: {} elements, {} usable candidates",
        region.name,
        total,
        candidates.len()
    );

    Ok(candidates)
}

#[cfg(test)]
mod tests {
    use super::*;
    use venuesync_common::{BoundingBox, ExternalKind};

    fn region() -> Region {
        Region {
            name: "Vesterbro".to_string(),
            bbox: BoundingBox::new(55.66, 12.53, 55.68, 12.56),
        }
    }

    const SAMPLE: &str = r#"{
        "version": 0.6,
        "generator": "Overpass API",
        "elements": [
            {
                "type": "node", "id": 101, "lat": 55.6701, "lon": 12.5501,
                "tags": {"amenity": "bar", "name": "Mikkeller Bar",
                         "addr:street": "Viktoriagade", "addr:housenumber": "8",
                         "addr:city": "København V"}
            },
            {
                "type": "node", "id": 102, "lat": 55.671, "lon": 12.551,
                "tags": {"amenity": "pub"}
            },
            {
                "type": "node", "id": 103, "lat": 55.672, "lon": 12.552,
                "tags": {"amenity": "pub", "name": "   "}
            },
            {
                "type": "way", "id": 201,
                "center": {"lat": 55.6705, "lon": 12.5402},
                "nodes": [1, 2, 3],
                "tags": {"amenity": "biergarten", "name": "Fælledens Ølhave"}
            },
            {
                "type": "way", "id": 202,
                "tags": {"amenity": "bar", "name": "No Center"}
            },
            {
                "type": "area", "id": 3600000001,
                "tags": {"name": "Somewhere"}
            }
        ]
    }"#;

    #[test]
    fn test_parse_keeps_named_elements_only() {
        let candidates = parse_overpass_json(SAMPLE, &region()).unwrap();
        assert_eq!(candidates.len(), 2);

        let bar = &candidates[0];
        assert_eq!(bar.external_id, "node/101");
        assert_eq!(bar.external_kind, ExternalKind::Node);
        assert_eq!(bar.name, "Mikkeller Bar");
        assert_eq!(bar.address.as_deref(), Some("Viktoriagade 8"));
        assert_eq!(bar.locality.as_deref(), Some("København V"));

        let garden = &candidates[1];
        assert_eq!(garden.external_id, "way/201");
        assert_eq!(garden.lat, 55.6705);
        assert_eq!(garden.address, None);
        // no addr:city, falls back to the region name
        assert_eq!(garden.locality.as_deref(), Some("Vesterbro"));
    }

    #[test]
    fn test_parse_empty_and_invalid() {
        assert!(parse_overpass_json(r#"{"elements": []}"#, &region()).unwrap().is_empty());
        assert!(parse_overpass_json(r#"{}"#, &region()).unwrap().is_empty());
        assert!(parse_overpass_json("<html>rate limited</html>", &region()).is_err());
    }
}
