//! Read surface for the presentation layer.
//!
//! Gateway for the route modules (EMBP): each sibling exports a subrouter and
//! this module merges them over the shared dashboard state.
use std::sync::Arc;

use axum::Router;

use crate::Dashboard;

mod health;
mod views;

// ---

pub fn router(dashboard: Arc<Dashboard>) -> Router {
    // ---
    Router::new()
        .merge(views::router())
        .merge(health::router())
        .with_state(dashboard)
}
