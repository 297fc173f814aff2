//! # routes
//!
//! ```text
//!  TradingView alert ──POST /webhook──▶ [token guard] ──▶ ExecutionEngine ──▶ OANDA
//!  Operator          ──GET /health───────────────────────▶ counters
//!                    ──GET /api/executions──▶ [token guard] ──▶ MemoryLogger
//! ```

use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::auth::require_webhook_token;
use crate::state::SharedState;

pub mod monitor;
pub mod webhook;

pub fn build_router(state: SharedState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // ── Alert Intake ─────────────────────────────────────────────────────
        .route("/",                   post(webhook::handle_alert))
        .route("/webhook",            post(webhook::handle_alert))
        // ── Monitoring ───────────────────────────────────────────────────────
        .route("/health",             get(monitor::health))
        .route("/api/executions",     get(monitor::list_executions))
        .route("/api/executions/:id", get(monitor::get_execution))
        // ── Middleware ───────────────────────────────────────────────────────
        .layer(middleware::from_fn_with_state(state.clone(), require_webhook_token))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use serde_json::Value;
    use tower::ServiceExt;

    use super::*;
    use crate::audit::{ExecutionLogger, MemoryLogger};
    use crate::broker::stub::{rejected, StubBroker};
    use crate::broker::Broker;
    use crate::config::EngineConfig;
    use crate::engine::clock::{Clock, SystemClock};
    use crate::engine::normalizer::UnknownSignalPolicy;
    use crate::engine::reconciler::ReconcileFailurePolicy;
    use crate::engine::ExecutionEngine;
    use crate::state::build_state;

    const ALERT: &str = r#"{"signal":"anybuy","ticker":"GBP_JPY","price":150.00}"#;

    fn app_with(broker: StubBroker, config: EngineConfig, token: Option<&str>) -> Router {
        app_parts(Arc::new(broker), Arc::new(MemoryLogger::new(50)), config, token)
    }

    fn app_parts(
        broker: Arc<StubBroker>,
        history: Arc<MemoryLogger>,
        config: EngineConfig,
        token: Option<&str>,
    ) -> Router {
        let engine = ExecutionEngine::new(
            config,
            broker as Arc<dyn Broker>,
            Arc::clone(&history) as Arc<dyn ExecutionLogger>,
            Arc::new(SystemClock) as Arc<dyn Clock>,
        );
        build_router(build_state(engine, history, token.map(str::to_owned)))
    }

    fn test_config() -> EngineConfig {
        EngineConfig {
            retry_delay: Duration::ZERO,
            settle_delay: Duration::ZERO,
            ..EngineConfig::default()
        }
    }

    fn app() -> Router {
        app_with(StubBroker::new(), test_config(), None)
    }

    fn post(uri: &str, body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    async fn send(app: &Router, req: Request<Body>) -> (StatusCode, Value) {
        let resp = app.clone().oneshot(req).await.unwrap();
        let status = resp.status();
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, json)
    }

    #[tokio::test]
    async fn test_fill_then_duplicate() {
        let app = app();

        let (status, body) = send(&app, post("/webhook", ALERT)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["ok"], true);
        assert_eq!(body["outcome"], "FILLED");

        let (status, body) = send(&app, post("/", ALERT)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["outcome"], "DEDUPLICATED");

        let (_, health) = send(&app, get("/health")).await;
        assert_eq!(health["signals_received"], 2);
        assert_eq!(health["orders_placed"], 1);
        assert_eq!(health["duplicates"], 1);
    }

    #[tokio::test]
    async fn test_plain_text_body() {
        let (status, body) = send(&app(), post("/webhook", "sell")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["outcome"], "FILLED");
        assert_eq!(body["execution"]["order"]["units"], -1000);
    }

    #[tokio::test]
    async fn test_malformed_is_bad_request() {
        let (status, body) = send(&app(), post("/webhook", "{not json")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["ok"], false);
        assert_eq!(body["outcome"], "INVALID");
    }

    #[tokio::test]
    async fn test_unknown_signal_policy() {
        let (status, body) = send(&app(), post("/webhook", r#"{"signal":"hold"}"#)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["outcome"], "IGNORED");

        let strict = EngineConfig {
            unknown_signal: UnknownSignalPolicy::Reject,
            ..test_config()
        };
        let app = app_with(StubBroker::new(), strict, None);
        let (status, _) = send(&app, post("/webhook", r#"{"signal":"hold"}"#)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_broker_failures_map_to_gateway_statuses() {
        let broker = StubBroker::new().with_order_script((0..3).map(|_| Ok(rejected(400))).collect());
        let app = app_with(broker, test_config(), None);
        let (status, body) = send(&app, post("/webhook", ALERT)).await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(body["outcome"], "REJECTED");

        let abort = EngineConfig {
            reconcile_on_failure: ReconcileFailurePolicy::Abort,
            ..test_config()
        };
        let app = app_with(StubBroker::new().with_failing_query(), abort, None);
        let (status, body) = send(&app, post("/webhook", ALERT)).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["outcome"], "ABORTED");
    }

    #[tokio::test]
    async fn test_caller_disconnect_does_not_cancel_execution() {
        let broker = Arc::new(StubBroker::new().with_order_script(vec![Ok(rejected(503))]));
        let history = Arc::new(MemoryLogger::new(50));
        let config = EngineConfig {
            retry_delay: Duration::from_millis(200),
            ..test_config()
        };
        let app = app_parts(Arc::clone(&broker), Arc::clone(&history), config, None);

        // The caller gives up while the first retry delay is still running.
        let request = app.clone().oneshot(post("/webhook", ALERT));
        assert!(tokio::time::timeout(Duration::from_millis(50), request).await.is_err());

        tokio::time::sleep(Duration::from_millis(600)).await;

        assert_eq!(broker.order_calls().len(), 2);
        let logged = history.recent(10).await;
        assert_eq!(logged.len(), 1);
        assert_eq!(logged[0].outcome, crate::models::Outcome::Filled);
        assert_eq!(logged[0].result.as_ref().map(|r| r.attempt_log.len()), Some(2));
    }

    #[tokio::test]
    async fn test_bare_json_scalar_is_bad_request() {
        let (status, body) = send(&app(), post("/webhook", "42")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["outcome"], "INVALID");
    }

    #[tokio::test]
    async fn test_webhook_token_guard() {
        let app = app_with(StubBroker::new(), test_config(), Some("s3cret"));

        let (status, body) = send(&app, post("/webhook", ALERT)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["ok"], false);

        let (status, _) = send(&app, post("/webhook?token=wrong", ALERT)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, _) = send(&app, get("/health")).await;
        assert_eq!(status, StatusCode::OK);

        let (status, _) = send(&app, post("/webhook?token=s3cret", ALERT)).await;
        assert_eq!(status, StatusCode::OK);

        let req = Request::builder()
            .method("POST")
            .uri("/webhook")
            .header("X-Webhook-Token", "s3cret")
            .body(Body::from("sell"))
            .unwrap();
        let (status, _) = send(&app, req).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_execution_history_endpoints() {
        let app = app();
        let (_, first) = send(&app, post("/webhook", ALERT)).await;
        send(&app, post("/webhook", "{bad")).await;

        let (status, list) = send(&app, get("/api/executions?limit=10")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(list["count"], 2);
        assert_eq!(list["records"][0]["outcome"], "INVALID");

        let id = first["execution_id"].as_str().unwrap();
        let (status, one) = send(&app, get(&format!("/api/executions/{id}"))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(one["record"]["outcome"], "FILLED");

        let (status, _) = send(&app, get("/api/executions/not-a-uuid")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let missing = uuid::Uuid::new_v4();
        let (status, _) = send(&app, get(&format!("/api/executions/{missing}"))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
