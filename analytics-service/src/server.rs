use std::{net::SocketAddr, sync::Arc};

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use time::Duration;

use crate::{
    analytics::{alert_digest, AlertDigest},
    cache::SiteTables,
    dispatch::{dispatch, DispatchSettings, PlannedQuery, QueryOutput},
    error::AnalyticsError,
};

pub struct AppState {
    pub tables: SiteTables,
    pub settings: DispatchSettings,
    pub lookback: Duration,
}

#[derive(Debug, Serialize)]
pub struct QueryResponse {
    pub plan: PlannedQuery,
    pub output: QueryOutput,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

pub struct ApiError {
    status: StatusCode,
    message: String,
}

fn status_for(e: &AnalyticsError) -> StatusCode {
    match e {
        AnalyticsError::UnknownParameter(_) => StatusCode::BAD_REQUEST,
        AnalyticsError::InsufficientData { .. } | AnalyticsError::DegenerateSeries { .. } => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
        AnalyticsError::InputShape(_) | AnalyticsError::Source(_) | AnalyticsError::Sink(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

impl From<AnalyticsError> for ApiError {
    fn from(e: AnalyticsError) -> Self {
        Self {
            status: status_for(&e),
            message: e.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            tracing::error!(error = %self.message, "query failed");
            metrics::counter!("http_query_failed_total").increment(1);
        } else {
            tracing::warn!(error = %self.message, status = %self.status, "query rejected");
        }
        (self.status, Json(ErrorBody { error: self.message })).into_response()
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/query", post(query_json))
        .route("/query/text", post(query_text))
        .route("/alerts", get(alerts))
        .with_state(state)
}

pub async fn serve(bind_addr: &str, state: Arc<AppState>) -> anyhow::Result<()> {
    let addr: SocketAddr = bind_addr
        .parse()
        .map_err(|e| anyhow::anyhow!("invalid server bind address {bind_addr}: {e}"))?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "query server listening");
    axum::serve(listener, router(state).into_make_service()).await?;
    Ok(())
}

/// Load the (cached) tables and run one plan.
pub fn run_query(state: &AppState, plan: PlannedQuery) -> Result<QueryResponse, AnalyticsError> {
    let (flow, quality) = state.tables.load()?;
    let output = dispatch(&flow, &quality, &plan, &state.settings)?;
    Ok(QueryResponse { plan, output })
}

pub fn run_alerts(state: &AppState) -> Result<AlertDigest, AnalyticsError> {
    let (_, quality) = state.tables.load()?;
    Ok(alert_digest(&quality, state.lookback))
}

/// Parsing, analytics and file reads are synchronous; keep them off the
/// async workers.
async fn blocking<T, F>(state: Arc<AppState>, work: F) -> Result<T, ApiError>
where
    T: Send + 'static,
    F: FnOnce(&AppState) -> Result<T, AnalyticsError> + Send + 'static,
{
    tokio::task::spawn_blocking(move || work(&state))
        .await
        .map_err(|e| ApiError {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: format!("query task failed: {e}"),
        })?
        .map_err(ApiError::from)
}

async fn query_json(
    State(state): State<Arc<AppState>>,
    Json(body): Json<serde_json::Value>,
) -> Result<Json<QueryResponse>, ApiError> {
    metrics::counter!("http_query_requests_total", "route" => "query").increment(1);
    let plan = PlannedQuery::from_value(&body, &state.settings.limits);
    blocking(state, move |s| run_query(s, plan)).await.map(Json)
}

async fn query_text(
    State(state): State<Arc<AppState>>,
    body: String,
) -> Result<Json<QueryResponse>, ApiError> {
    metrics::counter!("http_query_requests_total", "route" => "query_text").increment(1);
    let plan = PlannedQuery::from_planner_text(&body, &state.settings.limits);
    blocking(state, move |s| run_query(s, plan)).await.map(Json)
}

async fn alerts(State(state): State<Arc<AppState>>) -> Result<Json<AlertDigest>, ApiError> {
    metrics::counter!("http_query_requests_total", "route" => "alerts").increment(1);
    blocking(state, run_alerts).await.map(Json)
}
