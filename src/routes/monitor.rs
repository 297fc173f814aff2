//! # routes::monitor
//!
//! ## Endpoints
//!
//! | Method | Path                    | Description                          |
//! |--------|-------------------------|--------------------------------------|
//! | GET    | `/health`               | liveness + counters (no token)       |
//! | GET    | `/api/executions`       | recent execution records, newest first |
//! | GET    | `/api/executions/:id`   | one execution record                 |

use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use serde_json::json;
use std::sync::atomic::Ordering;
use uuid::Uuid;

use crate::error::AppError;
use crate::state::SharedState;

const DEFAULT_LIMIT: usize = 50;
const MAX_LIMIT: usize = 500;

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub limit: Option<usize>,
}

/// GET /health
pub async fn health(State(state): State<SharedState>) -> impl IntoResponse {
    let c = &state.counters;
    let uptime = (chrono::Utc::now() - state.started_at).num_seconds();

    Json(json!({
        "ok":               true,
        "status":           "ok",
        "uptime_secs":      uptime,
        "signals_received": c.signals_received.load(Ordering::Relaxed),
        "orders_placed":    c.orders_placed.load(Ordering::Relaxed),
        "orders_failed":    c.orders_failed.load(Ordering::Relaxed),
        "duplicates":       c.duplicates.load(Ordering::Relaxed),
        "dedup_keys":       state.engine.tracked_dedup_keys(),
    }))
}

/// GET /api/executions?limit=N
pub async fn list_executions(
    State(state): State<SharedState>,
    Query(query): Query<ListQuery>,
) -> impl IntoResponse {
    let limit = query.limit.unwrap_or(DEFAULT_LIMIT).min(MAX_LIMIT);
    let records = state.history.recent(limit).await;
    Json(json!({
        "ok":      true,
        "count":   records.len(),
        "records": records,
    }))
}

/// GET /api/executions/:id
pub async fn get_execution(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let id = Uuid::parse_str(&id)
        .map_err(|e| AppError::BadRequest(format!("invalid execution id '{id}': {e}")))?;

    let record = state
        .history
        .find(id)
        .await
        .ok_or_else(|| AppError::NotFound(format!("execution {id}")))?;

    Ok(Json(json!({
        "ok":     true,
        "record": record,
    })))
}
