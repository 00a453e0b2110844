// bases/download_server/src/server.rs
use crate::config::Config;
use crate::error::ServerError;
use crate::ws;
use axum::body::Bytes;
use axum::extract::{DefaultBodyLimit, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use job_engine::JobEngine;
use media_probe::YtDlp;
use std::sync::Arc;
use temp_store::{Sweeper, TempStore, DEFAULT_MAX_AGE, DEFAULT_SWEEP_INTERVAL};
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

const MAX_COVER_UPLOAD: usize = 10 * 1024 * 1024;

/// Shared state handed to every socket.
#[derive(Clone)]
pub struct AppState {
    pub engine: JobEngine,
    pub store: TempStore,
}

pub async fn run(config: Config) -> Result<(), ServerError> {
    // Both executables are hard preconditions; refusing to start beats
    // failing every job later.
    let tools = media_probe::locate_tools(&config.bin_dir)?;

    let store = TempStore::open(&config.scratch_dir);
    if store.is_degraded() {
        error!("running with an unusable scratch directory; downloads will fail");
    }
    let sweeper = Sweeper::spawn(store.clone(), DEFAULT_SWEEP_INTERVAL, DEFAULT_MAX_AGE);

    let source = Arc::new(YtDlp::new(tools.extractor.clone()));
    let engine = JobEngine::new(store.clone(), tools, source);
    let state = AppState { engine, store };

    let app = Router::new()
        .route("/healthz", get(healthz))
        .route(
            "/covers",
            post(upload_cover).layer(DefaultBodyLimit::max(MAX_COVER_UPLOAD)),
        )
        .route("/ws", get(ws::upgrade))
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("listening on http://{addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    sweeper.shutdown().await;
    Ok(())
}

async fn healthz() -> &'static str {
    "ok"
}

/// Accept a client-supplied cover image. The bytes are normalized through
/// the same resampler remote thumbnails go through, then parked in the
/// scratch store; the returned path can be referenced by later download
/// requests as `cover_path`.
async fn upload_cover(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<serde_json::Value>, StatusCode> {
    let jpeg = tokio::task::spawn_blocking(move || {
        cover_art::square_jpeg(&body, cover_art::COVER_SIZE)
    })
    .await
    .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?
    .map_err(|e| {
        warn!(error = %e, "rejected cover upload");
        StatusCode::UNSUPPORTED_MEDIA_TYPE
    })?;

    let path = state.store.reserve("jpg");
    tokio::fs::write(&path, jpeg)
        .await
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    Ok(Json(serde_json::json!({ "cover_path": path })))
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("shutting down");
}
