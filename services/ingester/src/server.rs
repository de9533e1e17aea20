//! HTTP server for the ingester service.
//!
//! Provides endpoints for:
//! - `POST /trigger/nexrad` - Ingest one radar volume (latest or at a time)
//! - `POST /trigger/nexrad/frames` - Ingest recent radar volumes in a batch
//! - `POST /trigger/goes` - Ingest one GOES ABI scan
//! - `POST /trigger/mrms` - Ingest one MRMS composite mosaic
//! - `GET /v1/radar/nexrad/:site/frames` - Recent frames of a site
//! - `GET /v1/legend/nexrad/:site/:timestamp_key` - Legend of a published frame
//! - `GET /v1/timeline/*layer` - Index documents of a layer
//! - `GET /health` - Health check
//! - `GET /metrics` - Prometheus metrics

use std::net::SocketAddr;
use std::sync::Arc;

use atmos_common::TimeTarget;
use axum::{
    extract::{rejection::JsonRejection, Extension, Json, Path, Query},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{info, warn};

use ingestion::{Ingester, IngestionError, PipelineFailure, SensorParams};

/// Bounds on batch trigger parameters.
const MAX_FRAMES_PER_TRIGGER: usize = 20;
const MAX_LOOKBACK_MINUTES: i64 = 360;
const DEFAULT_FRAMES_PER_TRIGGER: usize = 3;

/// Shared state for the HTTP server.
pub struct ServerState {
    pub ingester: Ingester,
    pub metrics: PrometheusHandle,
}

/// Request body for `/trigger/nexrad`.
#[derive(Debug, Default, Deserialize)]
pub struct NexradTrigger {
    /// Radar site identifier (e.g. KTLX)
    #[serde(default)]
    pub site: Option<String>,
    /// UTC time to target; omitted or "latest" picks the freshest volume
    #[serde(default)]
    pub timestamp: Option<String>,
}

/// Request body for `/trigger/nexrad/frames`.
#[derive(Debug, Default, Deserialize)]
pub struct NexradFramesTrigger {
    #[serde(default)]
    pub site: Option<String>,
    /// Maximum number of new frames to ingest
    #[serde(default)]
    pub frames: Option<usize>,
    #[serde(default)]
    pub lookback_minutes: Option<i64>,
}

/// Request body for `/trigger/goes`.
#[derive(Debug, Default, Deserialize)]
pub struct GoesTrigger {
    #[serde(default)]
    pub band: Option<u8>,
    /// Sector shorthand (CONUS, FULL)
    #[serde(default)]
    pub sector: Option<String>,
    #[serde(default)]
    pub timestamp: Option<String>,
}

/// Request body for `/trigger/mrms`.
#[derive(Debug, Default, Deserialize)]
pub struct MrmsTrigger {
    /// Mosaic product (reflq)
    #[serde(default)]
    pub product: Option<String>,
    #[serde(default)]
    pub timestamp: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct FramesQuery {
    pub limit: Option<usize>,
}

/// Successful trigger response.
#[derive(Debug, Serialize)]
pub struct TriggerResponse<T> {
    pub status: &'static str,
    pub detail: T,
}

impl<T> TriggerResponse<T> {
    fn ok(detail: T) -> Self {
        Self {
            status: "ok",
            detail,
        }
    }
}

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub version: String,
    pub object_store: String,
    pub nexrad_bucket: String,
    pub goes_bucket: String,
    pub mrms_bucket: String,
}

/// Error surfaced to HTTP clients as `{status, kind, stage?, detail}`.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    kind: &'static str,
    stage: Option<String>,
    detail: String,
}

impl ApiError {
    fn bad_request(detail: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            kind: "invalid_request",
            stage: None,
            detail: detail.into(),
        }
    }
}

fn status_code(code: u16) -> StatusCode {
    StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
}

impl From<IngestionError> for ApiError {
    fn from(err: IngestionError) -> Self {
        Self {
            status: status_code(err.http_status()),
            kind: err.kind(),
            stage: None,
            detail: err.to_string(),
        }
    }
}

impl From<PipelineFailure> for ApiError {
    fn from(failure: PipelineFailure) -> Self {
        Self {
            status: status_code(failure.http_status()),
            kind: failure.source.kind(),
            stage: Some(failure.stage.to_string()),
            detail: failure.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            warn!(status = self.status.as_u16(), kind = self.kind, detail = %self.detail, "Request failed");
        }
        let mut body = json!({
            "status": "error",
            "kind": self.kind,
            "detail": self.detail,
        });
        if let Some(stage) = self.stage {
            body["stage"] = Value::String(stage);
        }
        (self.status, Json(body)).into_response()
    }
}

/// A missing body means "all defaults"; a malformed one is rejected.
fn body_or_default<T: Default>(body: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    match body {
        Ok(Json(body)) => Ok(body),
        Err(JsonRejection::MissingJsonContentType(_)) => Ok(T::default()),
        Err(rejection) => Err(ApiError::bad_request(rejection.body_text())),
    }
}

fn time_target(timestamp: Option<&str>) -> Result<TimeTarget, ApiError> {
    TimeTarget::from_request(timestamp).map_err(|e| ApiError::from(IngestionError::from(e)))
}

/// POST /trigger/nexrad
async fn trigger_nexrad_handler(
    Extension(state): Extension<Arc<ServerState>>,
    body: Result<Json<NexradTrigger>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let request = body_or_default(body)?;
    let params = SensorParams::radar(request.site.as_deref(), state.ingester.config())?;
    let target = time_target(request.timestamp.as_deref())?;
    info!(params = %params, target = %target.marker(), "Received NEXRAD trigger");

    let outcome = state.ingester.ingest(params, target).await?;
    Ok(Json(TriggerResponse::ok(outcome)))
}

/// POST /trigger/nexrad/frames
async fn trigger_nexrad_frames_handler(
    Extension(state): Extension<Arc<ServerState>>,
    body: Result<Json<NexradFramesTrigger>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let request = body_or_default(body)?;
    let frames = request.frames.unwrap_or(DEFAULT_FRAMES_PER_TRIGGER);
    if !(1..=MAX_FRAMES_PER_TRIGGER).contains(&frames) {
        return Err(ApiError::bad_request(format!(
            "frames must be 1..={}, got {}",
            MAX_FRAMES_PER_TRIGGER, frames
        )));
    }
    if let Some(lookback) = request.lookback_minutes {
        if !(1..=MAX_LOOKBACK_MINUTES).contains(&lookback) {
            return Err(ApiError::bad_request(format!(
                "lookback_minutes must be 1..={}, got {}",
                MAX_LOOKBACK_MINUTES, lookback
            )));
        }
    }
    let site = request
        .site
        .unwrap_or_else(|| state.ingester.config().radar.default_site.clone());
    info!(site = %site, frames, lookback = ?request.lookback_minutes, "Received NEXRAD frames trigger");

    let outcome = state
        .ingester
        .ingest_frames(&site, frames, request.lookback_minutes)
        .await?;
    Ok(Json(TriggerResponse::ok(outcome)))
}

/// POST /trigger/goes
async fn trigger_goes_handler(
    Extension(state): Extension<Arc<ServerState>>,
    body: Result<Json<GoesTrigger>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let request = body_or_default(body)?;
    let params = SensorParams::satellite(
        request.band,
        request.sector.as_deref(),
        state.ingester.config(),
    )?;
    let target = time_target(request.timestamp.as_deref())?;
    info!(params = %params, target = %target.marker(), "Received GOES trigger");

    let outcome = state.ingester.ingest(params, target).await?;
    Ok(Json(TriggerResponse::ok(outcome)))
}

/// POST /trigger/mrms
async fn trigger_mrms_handler(
    Extension(state): Extension<Arc<ServerState>>,
    body: Result<Json<MrmsTrigger>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let request = body_or_default(body)?;
    let params = SensorParams::composite(request.product.as_deref(), state.ingester.config())?;
    let target = time_target(request.timestamp.as_deref())?;
    info!(params = %params, target = %target.marker(), "Received MRMS trigger");

    let outcome = state.ingester.ingest(params, target).await?;
    Ok(Json(TriggerResponse::ok(outcome)))
}

/// GET /v1/radar/nexrad/:site/frames
async fn frames_handler(
    Extension(state): Extension<Arc<ServerState>>,
    Path(site): Path<String>,
    Query(query): Query<FramesQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let listing = state.ingester.list_frames(&site, query.limit).await?;
    Ok(Json(listing))
}

/// GET /v1/legend/nexrad/:site/:timestamp_key
async fn legend_handler(
    Extension(state): Extension<Arc<ServerState>>,
    Path((site, timestamp_key)): Path<(String, String)>,
) -> Result<impl IntoResponse, ApiError> {
    let legend = state.ingester.legend(&site, &timestamp_key).await?;
    Ok(Json(legend))
}

/// GET /v1/timeline/*layer
async fn timeline_handler(
    Extension(state): Extension<Arc<ServerState>>,
    Path(layer): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let listing = state.ingester.timeline(&layer).await?;
    Ok(Json(listing))
}

/// GET /health
async fn health_handler(Extension(state): Extension<Arc<ServerState>>) -> impl IntoResponse {
    let config = state.ingester.config();
    Json(HealthResponse {
        status: "ok".to_string(),
        service: "ingester".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        object_store: config.derived.bucket.clone(),
        nexrad_bucket: config.radar.bucket.clone(),
        goes_bucket: config.satellite.bucket.clone(),
        mrms_bucket: config.composite.bucket.clone(),
    })
}

/// GET /metrics
async fn metrics_handler(Extension(state): Extension<Arc<ServerState>>) -> impl IntoResponse {
    (
        [("content-type", "text/plain; version=0.0.4")],
        state.metrics.render(),
    )
}

/// Build the HTTP router.
pub fn build_router(state: Arc<ServerState>) -> Router {
    Router::new()
        .route("/trigger/nexrad", post(trigger_nexrad_handler))
        .route("/trigger/nexrad/frames", post(trigger_nexrad_frames_handler))
        .route("/trigger/goes", post(trigger_goes_handler))
        .route("/trigger/mrms", post(trigger_mrms_handler))
        .route("/v1/radar/nexrad/:site/frames", get(frames_handler))
        .route(
            "/v1/legend/nexrad/:site/:timestamp_key",
            get(legend_handler),
        )
        .route("/v1/timeline/*layer", get(timeline_handler))
        .route("/health", get(health_handler))
        .route("/healthz", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .layer(Extension(state))
}

/// Start the HTTP server.
pub async fn start_server(state: Arc<ServerState>, port: u16) -> anyhow::Result<()> {
    let app = build_router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!(port = port, "Starting ingester HTTP server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
