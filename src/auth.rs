//! # auth: webhook token middleware
//!
//! Charting platforms cannot always set headers, so the token is accepted
//! either way:
//!
//! * `X-Webhook-Token: <token>` header
//! * `?token=<token>` query parameter
//!
//! ## Mode
//! - `WEBHOOK_TOKEN` unset or empty → **allow all**
//! - `WEBHOOK_TOKEN` set → every request except `/health` must present it
//!
//! ```bash
//! curl -X POST "http://localhost:3000/webhook?token=s3cret" -d 'buy'
//! ```

use axum::{
    body::Body,
    extract::{Query, Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use tracing::warn;

use crate::error::AppError;
use crate::state::SharedState;

pub const TOKEN_HEADER: &str = "X-Webhook-Token";

#[derive(Debug, Deserialize)]
struct TokenQuery {
    token: Option<String>,
}

pub async fn require_webhook_token(
    State(state): State<SharedState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let Some(expected) = state.webhook_token.as_deref().filter(|t| !t.is_empty()) else {
        return next.run(request).await;
    };

    if request.uri().path() == "/health" {
        return next.run(request).await;
    }

    let from_header = request
        .headers()
        .get(TOKEN_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned);
    let provided = from_header.or_else(|| {
        Query::<TokenQuery>::try_from_uri(request.uri())
            .ok()
            .and_then(|Query(q)| q.token)
    });

    if provided.as_deref() == Some(expected) {
        next.run(request).await
    } else {
        let path = request.uri().path().to_string();
        warn!(path, "❌ Unauthorized request: invalid or missing webhook token");
        AppError::Unauthorized(format!(
            "invalid or missing {TOKEN_HEADER} header or token query parameter"
        ))
        .into_response()
    }
}
