//! HTTP service: upload a rider, get its patch list back.
//!
//! | Route | |
//! |-------|--|
//! | `POST /api/riders` | multipart upload (field `file`), extract and store |
//! | `GET /api/riders` | storage keys of every stored patch list |
//! | `GET /api/riders/{storage_key}` | stored channels for one artist |
//! | `GET /health` | liveness |

mod config;
mod error;
mod riders;
mod state;

pub use config::ServerConfig;
pub use error::{ApiError, ErrorResponse};
pub use riders::{RiderListResponse, RiderResponse, UploadResponse};
pub use state::AppState;

use axum::{extract::DefaultBodyLimit, routing::get, Json, Router};
use serde_json::{json, Value};
use tower_http::trace::TraceLayer;
use tracing::info;

/// Room for multipart boundaries and headers on top of the file itself.
const MULTIPART_OVERHEAD: u64 = 64 * 1024;

pub fn router(state: AppState) -> Router {
    let body_limit = (state.config.max_upload_bytes + MULTIPART_OVERHEAD) as usize;

    Router::new()
        .route("/health", get(health))
        .nest("/api/riders", riders::router())
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok", "version": env!("CARGO_PKG_VERSION") }))
}

/// Bind and serve until the process is stopped.
pub async fn serve(state: AppState) -> std::io::Result<()> {
    tokio::fs::create_dir_all(&state.config.upload_dir).await?;

    let addr = state.config.bind;
    let app = router(state);

    info!("Starting patchlist service on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await
}
