//! HTTP server for the WIB dashboard.
//!
//! Serves the pages the poller renders, straight from its document store.
//! Read-only: nothing here triggers a poll.

use std::sync::Arc;

use axum::{
    Router,
    extract::{Path, State},
    http::{StatusCode, header},
    response::{IntoResponse, Json, Response},
    routing::get,
};
use serde::Serialize;

use wibmon_core::FleetSnapshot;
use wibmon_core::overlay::Status;
use wibmon_core::store::{DASHBOARD_KEY, DEVICE_DIR, DocumentStore, SNAPSHOT_KEY};

/// Shared server state.
struct AppState {
    store: Arc<dyn DocumentStore>,
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: String,
    version: String,
    /// Time of the last completed cycle, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    last_cycle: Option<String>,
    devices: usize,
    good: usize,
    busy: usize,
    absent: usize,
}

fn content_type(key: &str) -> &'static str {
    if key.ends_with(".json") {
        "application/json"
    } else if key.ends_with(".html") {
        "text/html; charset=utf-8"
    } else {
        "text/plain; charset=utf-8"
    }
}

/// Serve one stored document, or 404.
fn serve_document(store: &dyn DocumentStore, key: &str) -> Response {
    match store.read(key) {
        Ok(Some(text)) => ([(header::CONTENT_TYPE, content_type(key))], text).into_response(),
        Ok(None) => (StatusCode::NOT_FOUND, format!("{key} not found\n")).into_response(),
        Err(e) => {
            log::error!("reading {key}: {e}");
            (StatusCode::INTERNAL_SERVER_ERROR, "store error\n").into_response()
        }
    }
}

async fn handle_index(State(state): State<Arc<AppState>>) -> Response {
    serve_document(state.store.as_ref(), DASHBOARD_KEY)
}

async fn handle_snapshot(State(state): State<Arc<AppState>>) -> Response {
    serve_document(state.store.as_ref(), SNAPSHOT_KEY)
}

async fn handle_device(State(state): State<Arc<AppState>>, Path(file): Path<String>) -> Response {
    let allowed = (file.ends_with(".html") || file.ends_with(".json"))
        && !file.starts_with('.')
        && !file.contains(['/', '\\']);
    if !allowed {
        return (StatusCode::BAD_REQUEST, "invalid file name\n").into_response();
    }
    serve_document(state.store.as_ref(), &format!("{DEVICE_DIR}/{file}"))
}

async fn handle_health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let snapshot = match state.store.read(SNAPSHOT_KEY) {
        Ok(Some(text)) => serde_json::from_str::<FleetSnapshot>(&text)
            .map_err(|e| log::warn!("unreadable fleet snapshot: {e}"))
            .ok(),
        Ok(None) => None,
        Err(e) => {
            log::warn!("reading fleet snapshot: {e}");
            None
        }
    };

    let mut health = HealthResponse {
        status: "waiting".to_string(),
        version: wibmon_core::VERSION.to_string(),
        last_cycle: None,
        devices: 0,
        good: 0,
        busy: 0,
        absent: 0,
    };
    if let Some(snapshot) = snapshot {
        health.status = "ok".to_string();
        health.last_cycle = Some(snapshot.generated_at.to_string());
        health.devices = snapshot.devices.len();
        for device in &snapshot.devices {
            match device.status {
                Status::Good => health.good += 1,
                Status::Busy => health.busy += 1,
                Status::Absent => health.absent += 1,
            }
        }
    }
    Json(health)
}

/// Routes: `/`, `/wibs/{file}`, `/status.json`, `/health`.
pub fn build_router(store: Arc<dyn DocumentStore>) -> Router {
    let state = Arc::new(AppState { store });

    Router::new()
        .route("/", get(handle_index))
        .route("/index.html", get(handle_index))
        .route("/wibs/{file}", get(handle_device))
        .route("/status.json", get(handle_snapshot))
        .route("/health", get(handle_health))
        .with_state(state)
}

/// Run the dashboard server until the process is stopped.
pub async fn run_server(store: Arc<dyn DocumentStore>, host: &str, port: u16) -> std::io::Result<()> {
    let app = build_router(store);
    let addr = format!("{host}:{port}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    log::info!("serving dashboard on http://{addr}");
    axum::serve(listener, app).await
}
