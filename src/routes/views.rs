// src/routes/views.rs
//! Snapshot endpoints.
//!
//! - `GET /views` – every output's snapshot, keyed by output name
//! - `GET /views/{name}` – one output's snapshot, 404 if unknown
//!
//! A snapshot never errors: a stale output still answers 200 with its last
//! good view and `"state": "stale"`.
use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use tracing::debug;

use crate::Dashboard;

// ---

pub fn router() -> Router<Arc<Dashboard>> {
    // ---
    Router::new()
        .route("/views", get(list))
        .route("/views/{name}", get(one))
}

async fn list(State(dashboard): State<Arc<Dashboard>>) -> impl IntoResponse {
    // ---
    Json(dashboard.snapshots())
}

async fn one(
    Path(name): Path<String>,
    State(dashboard): State<Arc<Dashboard>>,
) -> impl IntoResponse {
    // ---
    match dashboard.snapshot(&name) {
        Some(snapshot) => (StatusCode::OK, Json(snapshot)).into_response(),
        None => {
            debug!("GET /views/{} - unknown output", name);
            (
                StatusCode::NOT_FOUND,
                Json(serde_json::json!({ "error": format!("no output named {name:?}") })),
            )
                .into_response()
        }
    }
}
