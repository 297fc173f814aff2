//! # routes::webhook
//!
//! **Alert intake**: `POST /` and `POST /webhook`.
//!
//! The body is taken as raw text; the engine decides whether it is JSON or a
//! bare signal word. Execution runs on a spawned task and finishes even when
//! the caller disconnects. The status code is derived from the terminal outcome:
//!
//! | Outcome                          | Status |
//! |----------------------------------|--------|
//! | FILLED, DEDUPLICATED             | 200    |
//! | IGNORED                          | 200 (400 under `UNKNOWN_SIGNAL_POLICY=reject`) |
//! | INVALID                          | 400    |
//! | REJECTED, EXHAUSTED_RETRIES      | 502    |
//! | ABORTED                          | 503    |

use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use tracing::debug;

use crate::engine::normalizer::UnknownSignalPolicy;
use crate::error::AppError;
use crate::models::Outcome;
use crate::state::SharedState;

pub fn status_for(outcome: Outcome, unknown_policy: UnknownSignalPolicy) -> StatusCode {
    match outcome {
        Outcome::Filled | Outcome::Deduplicated => StatusCode::OK,
        Outcome::Ignored => match unknown_policy {
            UnknownSignalPolicy::Ignore => StatusCode::OK,
            UnknownSignalPolicy::Reject => StatusCode::BAD_REQUEST,
        },
        Outcome::Invalid => StatusCode::BAD_REQUEST,
        Outcome::Rejected | Outcome::ExhaustedRetries => StatusCode::BAD_GATEWAY,
        Outcome::Aborted => StatusCode::SERVICE_UNAVAILABLE,
    }
}

/// POST /webhook: run one alert through the engine.
pub async fn handle_alert(
    State(state): State<SharedState>,
    body: String,
) -> Result<Response, AppError> {
    debug!(bytes = body.len(), "Alert received");

    // Runs on its own task: a caller that hangs up mid-retry must not cancel
    // broker work or the audit record.
    let task_state = Arc::clone(&state);
    let record = tokio::spawn(async move {
        let record = task_state.engine.execute(&body).await;
        task_state.counters.observe(record.outcome);
        record
    })
    .await
    .map_err(|e| anyhow::anyhow!("execution task failed: {e}"))?;

    let status = status_for(record.outcome, state.unknown_policy);
    let execution = serde_json::to_value(&record).map_err(anyhow::Error::from)?;

    let body = Json(json!({
        "ok":           status.is_success(),
        "outcome":      record.outcome.as_str(),
        "execution_id": record.execution_id,
        "reason":       record.reason,
        "execution":    execution,
    }));

    Ok((status, body).into_response())
}
