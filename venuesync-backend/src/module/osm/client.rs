///! Overpass API client
use async_trait::async_trait;
use reqwest::Client;
use reqwest::header::CONTENT_TYPE;
use std::time::Duration;
use thiserror::Error;

use venuesync_common::{BoundingBox, Region};

use super::parser::parse_overpass_json;
use super::types::Candidate;

pub const DEFAULT_OVERPASS_URL: &str = "https://overpass-api.de/api/interpreter";

/// Amenity values imported as venues
const VENUE_AMENITIES: &str = "bar|pub|biergarten";

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("invalid response: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Source of venue candidates for one region
#[async_trait]
pub trait PoiSource: Send + Sync {
    async fn fetch_region(&self, region: &Region) -> Result<Vec<Candidate>, FetchError>;
}

/// Build the Overpass QL query for venues inside `bbox`.
pub fn build_query(bbox: &BoundingBox, timeout_secs: u64) -> String {
    format!(
        "[out:json][timeout:{timeout}];\n(\n  node[\"amenity\"~\"^({amenities})$\"]({bbox});\n  way[\"amenity\"~\"^({amenities})$\"]({bbox});\n);\nout center tags;",
        timeout = timeout_secs,
        amenities = VENUE_AMENITIES,
        bbox = bbox,
    )
}

pub struct OverpassClient {
    client: Client,
    url: String,
    timeout_secs: u64,
}

impl OverpassClient {
    pub fn new(url: impl Into<String>, timeout_secs: u64, user_agent: &str) -> Result<Self, FetchError> {
        let client = Client::builder()
            // leave headroom over the server-side query timeout
            .timeout(Duration::from_secs(timeout_secs + 15))
            .user_agent(user_agent)
            .build()?;

        Ok(Self {
            client,
            url: url.into(),
            timeout_secs,
        })
    }

    async fn post_query(&self, region: &Region) -> Result<String, FetchError> {
        let query = build_query(&region.bbox, self.timeout_secs);
        let body = format!("data={}", urlencoding::encode(&query));

        let response = self
            .client
            .post(&self.url)
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(FetchError::Status {
                status: status.as_u16(),
                body: body.chars().take(200).collect(),
            });
        }

        Ok(response.text().await?)
    }
}

#[async_trait]
impl PoiSource for OverpassClient {
    async fn fetch_region(&self, region: &Region) -> Result<Vec<Candidate>, FetchError> {
        tracing::info!("Fetching venues for region {} ({})", region.name, region.bbox);

        let json = self.post_query(region).await?;
        let candidates = parse_overpass_json(&json, region)?;

        tracing::info!("Region {}: {} named venues", region.name, candidates.len());
        Ok(candidates)
    }
}
