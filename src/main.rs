//! Application entry point for the `codemetal-sensordash` backend.
//!
//! This binary orchestrates the startup sequence:
//! - Loading configuration from environment variables or `.env`
//! - Initializing structured logging/tracing
//! - Reading store credentials and building a lazily connecting pool
//! - Starting one refresh task per dashboard output
//! - Binding the Axum HTTP server that serves the current snapshots
//!
//! # Environment Variables
//! - `REFRESH_INTERVAL_MS` (optional) – tick interval (default: 5000)
//! - `FETCH_TIMEOUT_MS` (optional) – per-tick timeout (default: the interval)
//! - `STORE_CONFIG` (optional) – credentials file (default: `config/database.ini`)
//! - `STORE_HOST`, `STORE_USER`, ... (optional) – override credential keys
//! - `ASSETS_DIR` (optional) – where images are written (default: `assets`)
//! - `DB_POOL_MAX` (optional) – maximum number of store connections (default: 5)
//! - `BIND_ADDR` (optional) – listen address (default: `0.0.0.0:8080`)
//! - `DASH_SERIES` (optional) – gas series in merge order (default: `methane,ammonia,co2`)
//! - `DASH_LOG_LEVEL` (optional) – log verbosity (default: `debug`)
//! - `DASH_SPAN_EVENTS` (optional) – span event mode for tracing
//!
//! The store is not contacted at startup. If it is unreachable, outputs go
//! stale on their first tick and recover on their own once it returns.
use std::{env, sync::Arc};

use anyhow::{Context, Result};
use dotenvy::dotenv;
use is_terminal::IsTerminal;
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::fmt::format::FmtSpan;

use codemetal_sensordash::{load_from_env, router, Dashboard, MySqlSource, StoreConfig};

// ---

#[tokio::main]
async fn main() -> Result<()> {
    // ---
    dotenv().ok();
    init_tracing();

    let cfg = load_from_env()?;
    cfg.log_config();

    let store = StoreConfig::load(&cfg.store_config_path)?;
    store.log_config();

    let source = MySqlSource::connect_lazy(&store, cfg.db_pool_max, cfg.fetch_timeout);
    let dashboard = Arc::new(Dashboard::start(&cfg, Arc::new(source)));

    let app = router(dashboard);

    tracing::info!("Listening on {}", cfg.bind_addr);
    let listener = tokio::net::TcpListener::bind(cfg.bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", cfg.bind_addr))?;
    axum::serve(listener, app).await?;

    Ok(())
}

// ---

/// Initialize the global tracing subscriber for structured logging.
///
/// - Color output follows `FORCE_COLOR` (`1|true|yes` on, `0|false|no` off)
///   and otherwise TTY detection
/// - `DASH_SPAN_EVENTS`: `"full"` for ENTER/EXIT/CLOSE with timing,
///   `"enter_exit"` for ENTER and EXIT, anything else CLOSE only. Every
///   refresh runs in a `tick` span, so CLOSE events give per-tick timings.
/// - `RUST_LOG` wins when set, otherwise `DASH_LOG_LEVEL` (default `debug`)
///
/// Call once at startup before any logging macros are invoked.
fn init_tracing() {
    // ---
    let span_events = match env::var("DASH_SPAN_EVENTS").as_deref() {
        Ok("full") => FmtSpan::FULL,
        Ok("enter_exit") => FmtSpan::ENTER | FmtSpan::EXIT,
        _ => FmtSpan::CLOSE,
    };

    let use_color = match env::var("FORCE_COLOR").as_deref() {
        Ok("1") | Ok("true") | Ok("yes") => true,
        Ok("0") | Ok("false") | Ok("no") => false,
        _ => std::io::stdout().is_terminal(),
    };

    let env_filter = if env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        let level = match env::var("DASH_LOG_LEVEL").ok().as_deref() {
            Some(level @ ("trace" | "debug" | "info" | "warn" | "error")) => level.to_string(),
            _ => "debug".to_string(),
        };
        EnvFilter::new(format!("{level},sqlx::query=warn"))
    };

    tracing_subscriber::fmt()
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
        .with_span_events(span_events)
        .with_env_filter(env_filter)
        .with_ansi(use_color)
        .compact()
        .init();
}
