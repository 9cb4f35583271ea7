//! HTTP API for the presence dashboard.
//!
//! A thin layer over [`QueryService`]: handlers parse query parameters,
//! call one query, and map [`QueryError`] onto status codes. Raw scanner
//! payloads can also be posted to `/api/ingest`, which queues them for the
//! ingest worker.
//!
//! # Architecture
//!
//! ```text
//! Scanner ──→ POST /api/ingest ──→ [ingest queue] ──→ worker ──→ store
//!                                                                 ↑
//! Dashboard ──→ GET /api/... ──→ QueryService ──────── read ──────┘
//! ```

use crate::config::ApiConfig;
use crate::ingest::{IngestError, PayloadSender};
use crate::query::{
    DashboardBundle, DeviceView, PeriodCount, QueryError, QueryService, RealtimeView, SeriesMode,
    TimeSeries, Timeframe,
};
use crate::store::{Snapshot, SnapshotSummary, StoreStatistics};
use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use uuid::Uuid;

/// Default `limit` for recent snapshots and the dashboard bundle.
const DEFAULT_LIMIT: usize = 100;

/// Shared server state
#[derive(Debug, Clone)]
pub struct AppState {
    query: QueryService,
    ingest: Option<PayloadSender>,
    instance_id: Uuid,
}

impl AppState {
    pub fn new(query: QueryService) -> Self {
        Self {
            query,
            ingest: None,
            instance_id: Uuid::new_v4(),
        }
    }

    /// Accept payloads on `POST /api/ingest` through this sender.
    pub fn with_ingest(mut self, sender: PayloadSender) -> Self {
        self.ingest = Some(sender);
        self
    }

    pub fn instance_id(&self) -> Uuid {
        self.instance_id
    }
}

/// Health check response
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub instance_id: String,
}

/// Error response
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

#[derive(Serialize)]
pub struct StatusResponse {
    pub status: String,
}

#[derive(Serialize)]
pub struct DevicesResponse {
    pub devices: Vec<DeviceView>,
    pub count: usize,
}

#[derive(Serialize)]
pub struct RecentResponse {
    pub data: Vec<Snapshot>,
    pub count: usize,
}

#[derive(Debug, Deserialize)]
pub struct LimitParams {
    pub limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct TimeframeParams {
    pub timeframe: Option<String>,
    pub mode: Option<String>,
}

type ApiError = (StatusCode, Json<ErrorResponse>);
type ApiResult<T> = Result<Json<T>, ApiError>;

fn error_response(status: StatusCode, code: &str, error: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: error.into(),
            code: code.to_string(),
        }),
    )
}

fn query_error(e: QueryError) -> ApiError {
    match e {
        QueryError::NotReady => {
            error_response(StatusCode::SERVICE_UNAVAILABLE, "NOT_READY", e.to_string())
        }
        QueryError::DeviceNotFound(_) => {
            error_response(StatusCode::NOT_FOUND, "DEVICE_NOT_FOUND", e.to_string())
        }
    }
}

fn respond<T>(result: Result<T, QueryError>) -> ApiResult<T> {
    result.map(Json).map_err(query_error)
}

/// GET /api/health
async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        instance_id: state.instance_id.to_string(),
    })
}

/// GET /api/statistics
async fn statistics(State(state): State<Arc<AppState>>) -> ApiResult<StoreStatistics> {
    respond(state.query.statistics())
}

/// GET /api/devices?limit=
async fn devices(
    State(state): State<Arc<AppState>>,
    Query(params): Query<LimitParams>,
) -> ApiResult<DevicesResponse> {
    let devices = state.query.devices(params.limit).map_err(query_error)?;
    Ok(Json(DevicesResponse {
        count: devices.len(),
        devices,
    }))
}

/// GET /api/devices/:mac
async fn device(
    State(state): State<Arc<AppState>>,
    Path(mac): Path<String>,
) -> ApiResult<DeviceView> {
    respond(state.query.device(&mac))
}

/// GET /api/recent?limit=100
async fn recent(
    State(state): State<Arc<AppState>>,
    Query(params): Query<LimitParams>,
) -> ApiResult<RecentResponse> {
    let data = state
        .query
        .recent(params.limit.unwrap_or(DEFAULT_LIMIT))
        .map_err(query_error)?;
    Ok(Json(RecentResponse {
        count: data.len(),
        data,
    }))
}

/// GET /api/dashboard?limit=100
async fn dashboard(
    State(state): State<Arc<AppState>>,
    Query(params): Query<LimitParams>,
) -> ApiResult<DashboardBundle> {
    respond(state.query.dashboard(params.limit.unwrap_or(DEFAULT_LIMIT)))
}

/// GET /api/stats/realtime
async fn realtime(State(state): State<Arc<AppState>>) -> ApiResult<RealtimeView> {
    respond(state.query.realtime())
}

/// GET /api/stats/summary
async fn summary(State(state): State<Arc<AppState>>) -> ApiResult<SnapshotSummary> {
    respond(state.query.summary())
}

/// GET /api/stats/count?timeframe=
async fn period_count(
    State(state): State<Arc<AppState>>,
    Query(params): Query<TimeframeParams>,
) -> ApiResult<PeriodCount> {
    let timeframe = Timeframe::parse_or_default(params.timeframe.as_deref());
    respond(state.query.period_count(timeframe))
}

/// GET /api/stats/devices_timeseries?timeframe=&mode=
async fn devices_timeseries(
    State(state): State<Arc<AppState>>,
    Query(params): Query<TimeframeParams>,
) -> ApiResult<TimeSeries> {
    let timeframe = Timeframe::parse_or_default(params.timeframe.as_deref());
    let mode = match params.mode.as_deref() {
        None | Some("") => SeriesMode::default(),
        Some(raw) => raw
            .parse::<SeriesMode>()
            .map_err(|e| error_response(StatusCode::BAD_REQUEST, "INVALID_MODE", e))?,
    };
    respond(state.query.timeseries(timeframe, mode))
}

/// GET /api/stats/timeseries?timeframe=
///
/// Older dashboards send the window in minutes (`60`, `360`, `720`).
async fn legacy_timeseries(
    State(state): State<Arc<AppState>>,
    Query(params): Query<TimeframeParams>,
) -> ApiResult<TimeSeries> {
    let timeframe = params
        .timeframe
        .as_deref()
        .map(Timeframe::from_legacy)
        .unwrap_or_default();
    respond(state.query.timeseries(timeframe, SeriesMode::Snapshots))
}

/// POST /api/clear
async fn clear(State(state): State<Arc<AppState>>) -> ApiResult<StatusResponse> {
    state.query.clear().map_err(query_error)?;
    Ok(Json(StatusResponse {
        status: "cleared".to_string(),
    }))
}

/// POST /api/ingest
///
/// Queues one raw scanner payload. Parsing happens on the ingest worker,
/// so malformed bodies are accepted here and counted there.
async fn ingest(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<(StatusCode, Json<StatusResponse>), ApiError> {
    let sender = state.ingest.as_ref().ok_or_else(|| {
        error_response(
            StatusCode::SERVICE_UNAVAILABLE,
            "INGEST_DISABLED",
            "Ingestion is not enabled on this server",
        )
    })?;

    sender.submit(body.to_vec()).map_err(|e| {
        tracing::warn!("Rejected ingest payload: {}", e);
        let code = match e {
            IngestError::ChannelFull => "QUEUE_FULL",
            IngestError::Disconnected => "INGEST_STOPPED",
        };
        error_response(StatusCode::SERVICE_UNAVAILABLE, code, e.to_string())
    })?;

    Ok((
        StatusCode::ACCEPTED,
        Json(StatusResponse {
            status: "queued".to_string(),
        }),
    ))
}

/// Build the API router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(health))
        .route("/api/statistics", get(statistics))
        .route("/api/devices", get(devices))
        .route("/api/devices/:mac", get(device))
        .route("/api/recent", get(recent))
        .route("/api/dashboard", get(dashboard))
        .route("/api/stats/realtime", get(realtime))
        .route("/api/stats/summary", get(summary))
        .route("/api/stats/count", get(period_count))
        .route("/api/stats/devices_timeseries", get(devices_timeseries))
        .route("/api/stats/timeseries", get(legacy_timeseries))
        .route("/api/clear", post(clear))
        .route("/api/ingest", post(ingest))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(Arc::new(state))
}

/// Run the HTTP server
pub async fn run(
    api: &ApiConfig,
    state: AppState,
) -> anyhow::Result<(SocketAddr, tokio::sync::oneshot::Sender<()>)> {
    let app = router(state);

    let listener = TcpListener::bind((api.host.as_str(), api.port)).await?;
    let actual_addr = listener.local_addr()?;

    tracing::info!("Presence API listening on http://{}", actual_addr);

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
                tracing::info!("Server shutdown signal received");
            })
            .await
        {
            tracing::error!("Server error: {}", e);
        }
    });

    Ok((actual_addr, shutdown_tx))
}
