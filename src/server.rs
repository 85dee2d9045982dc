//! HTTP trigger for pipeline runs.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/sync` | Run the pipeline once; plain-text summary |
//! | `GET`  | `/sync/last` | JSON summary of the previous run |
//! | `GET`  | `/health` | Health check (returns version) |
//!
//! # Status contract
//!
//! `POST /sync` answers `200` whenever the run completed, even if some or
//! all sources failed; those failures are listed in the body. It answers
//! `500` only when the run could not start: the source catalog is
//! unreadable or the store cannot be opened.
//!
//! Runs are serialised: a second `POST /sync` waits for the first to finish.

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};

use crate::config::Config;
use crate::pipeline::{Pipeline, PipelineOptions};
use crate::report::RunSummary;

/// Shared application state passed to all route handlers via Axum's `State` extractor.
#[derive(Clone)]
struct AppState {
    config: Arc<Config>,
    /// Held for the duration of a run.
    run_lock: Arc<Mutex<()>>,
    last_run: Arc<RwLock<Option<RunSummary>>>,
}

/// Build the router. Exposed separately from [`run_server`] for tests.
pub fn router(config: Config) -> Router {
    let state = AppState {
        config: Arc::new(config),
        run_lock: Arc::new(Mutex::new(())),
        last_run: Arc::new(RwLock::new(None)),
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/sync", post(handle_sync))
        .route("/sync/last", get(handle_last_run))
        .route("/health", get(handle_health))
        .layer(cors)
        .with_state(state)
}

/// Starts the HTTP trigger on `[server].bind`. Runs until the process exits.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let bind_addr = config.server.bind.clone();
    let app = router(config.clone());

    info!(bind = %bind_addr, "feedsync trigger listening");
    println!("feedsync listening on http://{}", bind_addr);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Plain-text failure response.
fn internal_error(message: String) -> Response {
    (StatusCode::INTERNAL_SERVER_ERROR, message).into_response()
}

// ============ POST /sync ============

async fn handle_sync(State(state): State<AppState>) -> Response {
    let _running = state.run_lock.lock().await;

    let options = PipelineOptions::from_config(&state.config);
    let pipeline = match Pipeline::from_config(&state.config, options).await {
        Ok(pipeline) => pipeline,
        Err(e) => {
            error!(error = %e, "cannot start sync");
            return internal_error(format!("cannot start sync: {:#}", e));
        }
    };

    match pipeline.run().await {
        Ok(summary) => {
            let body = summary.to_string();
            *state.last_run.write().await = Some(summary);
            (StatusCode::OK, body).into_response()
        }
        Err(e) => internal_error(e.to_string()),
    }
}

// ============ GET /sync/last ============

async fn handle_last_run(State(state): State<AppState>) -> Response {
    match state.last_run.read().await.as_ref() {
        Some(summary) => Json(summary.clone()).into_response(),
        None => (StatusCode::NOT_FOUND, "no sync has run yet").into_response(),
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}
