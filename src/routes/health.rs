// src/routes/health.rs
//! Liveness endpoint for the dashboard backend.
//!
//! Internal to this file: the handler and its response body. Exported to the
//! gateway (`mod.rs`): a subrouter holding `/health`.
//!
//! The endpoint answers as long as the process serves HTTP, whatever the
//! store is doing; it only counts how many outputs are currently stale so
//! probes can tell "up" from "up but blind".

use std::sync::Arc;

use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;

use crate::{Dashboard, RefreshState};

/// JSON response body for the `/health` endpoint.
#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    outputs: usize,
    stale: usize,
}

/// Handle `GET /health`.
async fn health(State(dashboard): State<Arc<Dashboard>>) -> Json<HealthResponse> {
    // ---
    let (outputs, stale) = dashboard.names().fold((0, 0), |(total, stale), name| {
        let is_stale = dashboard.state(name) == Some(RefreshState::Stale);
        (total + 1, stale + usize::from(is_stale))
    });

    Json(HealthResponse {
        status: "ok",
        outputs,
        stale,
    })
}

/// Create a subrouter containing the `/health` route.
pub fn router() -> Router<Arc<Dashboard>> {
    Router::new().route("/health", get(health))
}
