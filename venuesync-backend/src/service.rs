///! HTTP curation surface
///!
///! Read endpoints for the curation UI (new candidates, missing venues, stats),
///! write endpoints for curator actions, and a manual sync trigger.

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use venuesync_common::{CandidateRecord, CandidateStats, CatalogVenue, SyncSummary};

use crate::module::reconcile::{Curator, CuratorError, StoreError, SyncError, SyncOrchestrator};

/// Shared state of the HTTP service
pub struct AppState {
    pub curator: Curator,
    pub orchestrator: Arc<SyncOrchestrator>,
}

/// Error body `{ "error": "..." }` with a status derived from the domain error
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

impl From<CuratorError> for ApiError {
    fn from(e: CuratorError) -> Self {
        let status = match &e {
            CuratorError::CandidateNotFound(_) | CuratorError::CatalogVenueNotFound(_) => StatusCode::NOT_FOUND,
            CuratorError::AlreadyProcessed { .. } => StatusCode::CONFLICT,
            CuratorError::Store(StoreError::CandidateNotFound(_) | StoreError::VenueNotFound(_)) => {
                StatusCode::NOT_FOUND
            }
            CuratorError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            tracing::error!("Curator action failed: {}", e);
        }
        Self { status, message: e.to_string() }
    }
}

impl From<SyncError> for ApiError {
    fn from(e: SyncError) -> Self {
        let status = match &e {
            SyncError::AlreadyRunning(_) => StatusCode::CONFLICT,
            SyncError::Snapshot(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self { status, message: e.to_string() }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkRequest {
    pub catalog_id: String,
}

async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

async fn stats(State(state): State<Arc<AppState>>) -> Result<Json<CandidateStats>, ApiError> {
    Ok(Json(state.curator.get_stats().await?))
}

async fn list_new(State(state): State<Arc<AppState>>) -> Result<Json<Vec<CandidateRecord>>, ApiError> {
    Ok(Json(state.curator.list_new().await?))
}

async fn list_missing(State(state): State<Arc<AppState>>) -> Result<Json<Vec<CatalogVenue>>, ApiError> {
    Ok(Json(state.curator.list_missing().await?))
}

async fn import_candidate(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<CatalogVenue>, ApiError> {
    Ok(Json(state.curator.import_candidate(&id).await?))
}

async fn ignore_candidate(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<CandidateRecord>, ApiError> {
    Ok(Json(state.curator.ignore_candidate(&id).await?))
}

async fn link_candidate(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(request): Json<LinkRequest>,
) -> Result<Json<CandidateRecord>, ApiError> {
    Ok(Json(state.curator.link_candidate(&id, &request.catalog_id).await?))
}

async fn mark_missing(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<CatalogVenue>, ApiError> {
    Ok(Json(state.curator.mark_catalog_venue_missing(&id).await?))
}

async fn run_sync(State(state): State<Arc<AppState>>) -> Result<Json<SyncSummary>, ApiError> {
    Ok(Json(state.orchestrator.run().await?))
}

pub fn build_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_check))
        .route("/stats", get(stats))
        .route("/candidates/new", get(list_new))
        .route("/candidates/{id}/import", post(import_candidate))
        .route("/candidates/{id}/ignore", post(ignore_candidate))
        .route("/candidates/{id}/link", post(link_candidate))
        .route("/catalog/missing", get(list_missing))
        .route("/catalog/{id}/missing", post(mark_missing))
        .route("/sync", post(run_sync))
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()).layer(cors))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::clock::SystemClock;
    use crate::module::lease::JobLeases;
    use crate::module::osm::{Candidate, FetchError, PoiSource};
    use crate::module::reconcile::{
        CandidateBatch, CandidateStore, CandidateTable, Reconciler, SyncSettings, VenueCatalog,
    };
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::Request;
    use chrono::Utc;
    use http_body_util::BodyExt;
    use tower::ServiceExt;
    use venuesync_common::{CandidateStatus, ExternalKind, Region};

    struct NoSource;

    #[async_trait]
    impl PoiSource for NoSource {
        async fn fetch_region(&self, _region: &Region) -> Result<Vec<Candidate>, FetchError> {
            Ok(Vec::new())
        }
    }

    async fn make_router() -> Router {
        let table = Arc::new(CandidateTable::in_memory());
        let now = Utc::now();
        let mut batch = CandidateBatch::new(now);
        batch.inserts.push(CandidateRecord {
            id: "c1".to_string(),
            external_id: "node/1".to_string(),
            external_kind: ExternalKind::Node,
            name: "Kassen".to_string(),
            lat: 55.69,
            lon: 12.55,
            address: None,
            locality: Some("Nørrebro".to_string()),
            status: CandidateStatus::New,
            matched_catalog_id: None,
            discovered_at: now,
            last_seen_at: now,
        });
        table.commit(batch).await.unwrap();

        let catalog = Arc::new(VenueCatalog::with_venues(vec![CatalogVenue {
            id: "v1".to_string(),
            name: "Props Coffee Shop".to_string(),
            lat: 55.69,
            lon: 12.56,
            address: None,
            locality: None,
            active: true,
            external_id: None,
        }]));

        let clock = Arc::new(SystemClock);
        let reconciler = Reconciler::new(table.clone(), catalog.clone(), clock.clone(), 10);
        let orchestrator = SyncOrchestrator::new(
            Arc::new(NoSource),
            reconciler,
            Arc::new(JobLeases::new(clock)),
            vec![],
            SyncSettings::default(),
        );

        build_router(Arc::new(AppState {
            curator: Curator::new(table, catalog),
            orchestrator: Arc::new(orchestrator),
        }))
    }

    async fn call(router: Router, method: &str, uri: &str, body: Option<serde_json::Value>) -> (StatusCode, serde_json::Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        let body = match body {
            Some(json) => {
                builder = builder.header("content-type", "application/json");
                Body::from(json.to_string())
            }
            None => Body::empty(),
        };
        let response = router.oneshot(builder.body(body).unwrap()).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let json = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
        (status, json)
    }

    #[tokio::test]
    async fn test_stats_and_lists() {
        let router = make_router().await;

        let (status, json) = call(router.clone(), "GET", "/stats", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["new"], 1);
        assert_eq!(json["missing"], 1);

        let (status, json) = call(router.clone(), "GET", "/candidates/new", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json[0]["externalId"], "node/1");
        assert_eq!(json[0]["status"], "new");

        let (_, json) = call(router, "GET", "/catalog/missing", None).await;
        assert_eq!(json[0]["id"], "v1");
    }

    #[tokio::test]
    async fn test_import_then_conflict() {
        let router = make_router().await;

        let (status, json) = call(router.clone(), "POST", "/candidates/c1/import", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["externalId"], "node/1");

        let (status, json) = call(router.clone(), "POST", "/candidates/c1/import", None).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert!(json["error"].as_str().unwrap().contains("already processed"));

        let (status, _) = call(router, "POST", "/candidates/c404/ignore", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_link_and_mark_missing() {
        let router = make_router().await;

        let (status, json) = call(
            router.clone(),
            "POST",
            "/candidates/c1/link",
            Some(serde_json::json!({ "catalogId": "v1" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["status"], "matched");
        assert_eq!(json["matchedCatalogId"], "v1");

        let (status, json) = call(router.clone(), "POST", "/catalog/v1/missing", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["active"], false);

        let (status, _) = call(router, "POST", "/catalog/v404/missing", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_sync_endpoint_returns_summary() {
        let router = make_router().await;
        let (status, json) = call(router, "POST", "/sync", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json, serde_json::json!({ "found": 0, "processed": 0, "regions": 0 }));
    }

    #[tokio::test]
    async fn test_health() {
        let router = make_router().await;
        let response = router
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
