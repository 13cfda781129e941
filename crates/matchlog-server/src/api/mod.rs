//! HTTP surface
//!
//! Two routes: the ingestion endpoint sources POST their log batches to, and
//! a health probe. The ingest handler's only jobs are admission control and
//! handing the body to the pipeline; everything else happens on the source's
//! worker task.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::{ConnectInfo, Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde_json::json;
use sqlx::PgPool;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use crate::access::AccessPolicy;
use crate::error::{AppError, AppResult};
use crate::pipeline::IngestPipeline;

/// Shared state for all handlers.
#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    pub pipeline: Arc<IngestPipeline>,
    pub access: Arc<dyn AccessPolicy>,
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/ingest/:source_id", post(ingest))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

async fn health(State(state): State<AppState>) -> AppResult<impl IntoResponse> {
    sqlx::query("SELECT 1").fetch_one(&state.db).await?;
    Ok(Json(json!({
        "status": "healthy",
        "database": "connected",
    })))
}

/// Accept a plain-text batch of log lines from one source.
///
/// Returns a receipt as soon as the raw lines are persisted and queued;
/// classification completes asynchronously. Duplicate deliveries are stored
/// again, not deduplicated.
async fn ingest(
    State(state): State<AppState>,
    Path(source_id): Path<Uuid>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    body: String,
) -> AppResult<impl IntoResponse> {
    let authorized = state
        .access
        .is_authorized(source_id)
        .await
        .map_err(|e| AppError::Internal(e.to_string()))?;

    if !authorized {
        return Err(AppError::Unauthorized(format!(
            "source {} is not registered or not active",
            source_id
        )));
    }

    let address = addr.ip().to_string();
    let receipt = state.pipeline.ingest(source_id, &address, &body).await;

    tracing::info!(%source_id, accepted = receipt.accepted, "Accepted log batch");

    Ok((
        StatusCode::OK,
        Json(json!({
            "received": true,
            "line_count": receipt.accepted,
            "server_id": source_id,
            "timestamp": Utc::now(),
        })),
    ))
}
