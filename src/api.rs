//! HTTP API surface.
//!
//! Exposes the engine over REST for a detached presentation layer: region
//! CRUD, scan control, job submission and state/progress polling, plus the
//! operational endpoints (health, metrics).

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::error::ScanError;
use crate::geo::Bounds;
use crate::job::JobOrchestrator;
use crate::marker::MarkerSync;
use crate::metrics;
use crate::provider::ResultStore;
use crate::region::RegionManager;
use crate::scanner::Scanner;
use crate::state::ScanState;
use crate::sync::ResultSync;

/// Shared handles for the request handlers.
#[derive(Clone)]
pub struct ApiContext {
    pub state: Arc<ScanState>,
    pub regions: Arc<RegionManager>,
    pub scanner: Arc<Scanner>,
    pub jobs: Arc<JobOrchestrator>,
    pub markers: Arc<MarkerSync>,
    pub store: Arc<dyn ResultStore>,
}

struct ApiError(ScanError);

impl From<ScanError> for ApiError {
    fn from(err: ScanError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            ScanError::StateGuard(_) => StatusCode::CONFLICT,
            ScanError::InvalidData(_) => StatusCode::BAD_REQUEST,
            ScanError::Transport(_) | ScanError::Submission(_) => StatusCode::BAD_GATEWAY,
            ScanError::Config(_) | ScanError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(json!({ "error": self.0.to_string() }))).into_response()
    }
}

pub fn build_router(context: ApiContext) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/metrics", get(metrics_endpoint))
        .route("/state", get(get_state))
        .route("/progress", get(get_progress))
        .route("/regions", get(list_regions).post(create_region))
        .route("/regions/{id}", delete(remove_region))
        .route("/regions/{id}/scan", post(scan_region))
        .route("/regions/{id}/focus", post(focus_region))
        .route("/refresh", post(refresh_scan))
        .route("/submit", post(submit_job))
        .route("/reset", post(reset))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(context)
}

async fn health() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn metrics_endpoint() -> impl IntoResponse {
    metrics::export_metrics()
}

async fn get_state(State(ctx): State<ApiContext>) -> impl IntoResponse {
    Json(ctx.state.snapshot().await)
}

async fn get_progress(State(ctx): State<ApiContext>) -> impl IntoResponse {
    Json(ctx.state.progress())
}

async fn list_regions(State(ctx): State<ApiContext>) -> impl IntoResponse {
    Json(ctx.state.all_regions().await)
}

#[derive(Debug, Deserialize)]
struct CreateRegionRequest {
    north: f64,
    south: f64,
    east: f64,
    west: f64,
}

#[derive(Debug, Serialize)]
struct ScanStartedResponse {
    status: &'static str,
}

/// Create a region from drawn bounds and kick off its initial grid scan in
/// the background. The response carries the region; discovery results land
/// in state as the scan progresses.
async fn create_region(
    State(ctx): State<ApiContext>,
    Json(body): Json<CreateRegionRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if body.north <= body.south || body.east <= body.west {
        return Err(ScanError::InvalidData("degenerate region bounds".to_string()).into());
    }

    let bounds = Bounds {
        north: body.north,
        south: body.south,
        east: body.east,
        west: body.west,
    };
    let region = ctx.regions.add_region(bounds).await?;

    let scanner = ctx.scanner.clone();
    let scan_region = region.clone();
    tokio::spawn(async move {
        scanner.scan_single_region(&scan_region).await;
    });

    Ok((StatusCode::CREATED, Json(region)))
}

async fn remove_region(
    State(ctx): State<ApiContext>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    ctx.regions.remove_region(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Re-probe one region's grid without touching the rest of the session.
/// Already-seen panoramas stay deduplicated.
async fn scan_region(
    State(ctx): State<ApiContext>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let region = ctx
        .state
        .get_region(&id)
        .await
        .ok_or_else(|| ScanError::StateGuard(format!("unknown region: {}", id)))?;

    let scanner = ctx.scanner.clone();
    tokio::spawn(async move {
        scanner.scan_single_region(&region).await;
    });

    Ok((StatusCode::ACCEPTED, Json(ScanStartedResponse { status: "scanning" })))
}

async fn focus_region(
    State(ctx): State<ApiContext>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    ctx.regions.focus(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Full re-scan of every region: tears down markers, resets discoveries and
/// re-probes all grids in the background.
async fn refresh_scan(State(ctx): State<ApiContext>) -> Result<impl IntoResponse, ApiError> {
    if ctx.state.region_count().await == 0 {
        return Err(ScanError::StateGuard("no regions selected for scanning".to_string()).into());
    }

    ctx.markers.clear().await;
    let scanner = ctx.scanner.clone();
    tokio::spawn(async move {
        if let Err(e) = scanner.refresh_all().await {
            tracing::error!("Refresh scan failed: {}", e);
        }
    });

    Ok((StatusCode::ACCEPTED, Json(ScanStartedResponse { status: "scanning" })))
}

/// Submit every discovered point as one analysis job, then start streaming
/// its realtime results into the canonical point map.
async fn submit_job(State(ctx): State<ApiContext>) -> Result<impl IntoResponse, ApiError> {
    let job_id = ctx.jobs.submit().await?;

    let sync = ResultSync::new(ctx.state.clone(), ctx.store.clone(), ctx.markers.clone());
    let sync_job_id = job_id.clone();
    tokio::spawn(async move {
        if let Err(e) = sync.run(sync_job_id).await {
            tracing::error!("Result sync stopped with error: {}", e);
        }
    });

    Ok((StatusCode::CREATED, Json(json!({ "jobId": job_id }))))
}

/// Clear all discovered state and markers. Regions survive.
async fn reset(State(ctx): State<ApiContext>) -> Result<impl IntoResponse, ApiError> {
    ctx.store.unsubscribe().await;
    ctx.markers.clear().await;
    ctx.state.reset_discoveries().await;
    Ok(StatusCode::NO_CONTENT)
}
