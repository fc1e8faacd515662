///! OpenStreetMap point-of-interest import
///!
///! Queries the Overpass API for bar/pub venues inside a region's bounding box
///! and turns the returned elements into normalized candidates.

pub mod types;
pub mod parser;
pub mod client;

pub use client::{FetchError, OverpassClient, PoiSource, build_query};
pub use parser::parse_overpass_json;
pub use types::Candidate;
