//! # fxrelay: TradingView alert → OANDA order relay
//!
//! ## Architecture Overview
//!
//! ```text
//!  ┌──────────────┐  POST /webhook   ┌─────────────────────────────────────────┐
//!  │  TradingView │ ────────────────▶│ ExecutionEngine                          │
//!  │  alert       │                  │  normalize → dedup → [instrument lock]   │
//!  └──────────────┘                  │  reconcile → place (retry) ──────────────┼──▶ OANDA v3
//!                                    └───────────────┬──────────────────────────┘
//!                                                    │ ExecutionRecord
//!                                                    ▼
//!                                    tracing · memory · CSV · Notion
//! ```
//!
//! ## Environment Variables (selection, see `config.rs`)
//!
//! | Variable              | Default        | Description                    |
//! |-----------------------|----------------|--------------------------------|
//! | `BIND_ADDR`           | `0.0.0.0:3000` | Address axum listens on        |
//! | `OANDA_ACCESS_TOKEN`  | required       | Broker bearer token            |
//! | `OANDA_ACCOUNT_ID`    | required       | Broker account                 |
//! | `OANDA_ENV`           | `practice`     | `practice` or `live`           |
//! | `RUST_LOG`            | `fxrelay=debug`| Tracing filter                 |

use std::sync::Arc;

use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod audit;
mod auth;
mod broker;
mod config;
mod engine;
mod error;
mod models;
mod routes;
mod state;

use audit::{build_logger, MemoryLogger};
use broker::{oanda::OandaBroker, Broker};
use config::Config;
use engine::clock::{Clock, SystemClock};
use engine::ExecutionEngine;
use routes::build_router;
use state::build_state;

// ─── Entry Point ──────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── 1. Load .env (optional, real env vars win) ───────────────────────────
    dotenvy::dotenv().ok();

    // ── 2. Structured logging ────────────────────────────────────────────────
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env()
            .add_directive("fxrelay=debug".parse()?)
            .add_directive("tower_http=info".parse()?))
        .init();

    info!(
        r#"

  ╔═══════════════════════════════════════════════╗
  ║        FXRELAY · Alert Execution Engine       ║
  ║        Rust + Axum  ·  TradingView → OANDA    ║
  ╚═══════════════════════════════════════════════╝"#
    );

    // ── 3. Configuration (missing credentials are fatal) ─────────────────────
    let config = Config::from_env().inspect_err(|e| error!(error = %e, "❌ Configuration error"))?;

    info!(
        base_url    = %config.broker.base_url,
        account_id  = %config.broker.account_id,
        instrument  = %config.engine.default_instrument,
        units       = config.engine.trade_units,
        risk_mode   = ?config.engine.risk_mode,
        cooldown    = ?config.engine.dedup_cooldown,
        "⚙️  Configuration loaded"
    );

    // ── 4. Broker + audit sinks ──────────────────────────────────────────────
    let broker: Arc<dyn Broker> = Arc::new(OandaBroker::new(&config.broker)?);

    let http = reqwest::Client::builder()
        .timeout(config.broker.timeout)
        .build()?;
    let history = Arc::new(MemoryLogger::new(config.audit.history_size));
    let logger = build_logger(&config.audit, http, Arc::clone(&history));

    // ── 5. Engine + shared state ─────────────────────────────────────────────
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let engine = ExecutionEngine::new(config.engine.clone(), broker, logger, clock);
    let state = build_state(engine, history, config.webhook_token.clone());

    if config.webhook_token.is_none() {
        info!("🔓 WEBHOOK_TOKEN not set: alert endpoints are open");
    }

    // ── 6. Router ────────────────────────────────────────────────────────────
    let app = build_router(state);

    // ── 7. Serve ─────────────────────────────────────────────────────────────
    let addr = config.bind_addr;
    info!(?addr, "🚀 fxrelay server starting");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
