//! Configuration loader for the `codemetal-sensordash` backend.
//!
//! Runtime knobs come from environment variables (with optional `.env` file
//! support provided by the caller). Store credentials live in a separate
//! `key=value` file so they can be mounted independently of the process
//! environment; any credential may still be overridden by `STORE_<KEY>`.
use std::{env, net::SocketAddr, path::PathBuf, time::Duration};

use anyhow::{anyhow, bail, Context, Result};
use serde::Deserialize;

/// Parse an optional environment variable with a default value.
macro_rules! parse_env {
    ($var_name:expr, $ty:ty, $default:expr) => {
        env::var($var_name)
            .ok()
            .map(|v| v.trim().parse::<$ty>())
            .transpose()
            .map_err(|e| anyhow!("Invalid {}: {}", $var_name, e))?
            .unwrap_or($default)
    };
}

/// Read an optional string environment variable with a default value.
macro_rules! env_or {
    ($var_name:expr, $default:expr) => {
        env::var($var_name).unwrap_or_else(|_| $default.to_string())
    };
}

pub const DEFAULT_REFRESH_MS: u64 = 5000;
pub const DEFAULT_SERIES: &str = "methane,ammonia,co2";
const DEFAULT_STORE_PORT: u16 = 3306;

/// Strongly typed application configuration.
///
/// All fields are immutable after loading.
#[derive(Debug, Clone)]
pub struct Config {
    // ---
    /// Interval between two ticks of the same output.
    pub refresh_interval: Duration,

    /// Upper bound on one tick's fetch-and-transform work.
    pub fetch_timeout: Duration,

    /// Path of the store credentials file.
    pub store_config_path: PathBuf,

    /// Directory fetched images are persisted into.
    pub assets_dir: PathBuf,

    /// Maximum number of store connections in the pool.
    pub db_pool_max: u32,

    /// Address the read surface listens on.
    pub bind_addr: SocketAddr,

    /// Gas series, in the order they are merged.
    pub series: Vec<String>,
}

/// Load configuration from environment variables with defaults.
///
/// Optional:
/// - `REFRESH_INTERVAL_MS` – tick interval (default: 5000)
/// - `FETCH_TIMEOUT_MS` – per-tick timeout (default: the refresh interval)
/// - `STORE_CONFIG` – credentials file (default: `config/database.ini`)
/// - `ASSETS_DIR` – image output directory (default: `assets`)
/// - `DB_POOL_MAX` – max store connections (default: 5)
/// - `BIND_ADDR` – listen address (default: `0.0.0.0:8080`)
/// - `DASH_SERIES` – comma separated series names (default: `methane,ammonia,co2`)
pub fn load_from_env() -> Result<Config> {
    // ---
    let refresh_ms = parse_env!("REFRESH_INTERVAL_MS", u64, DEFAULT_REFRESH_MS);
    if refresh_ms == 0 {
        bail!("REFRESH_INTERVAL_MS must be greater than zero");
    }
    let timeout_ms = parse_env!("FETCH_TIMEOUT_MS", u64, refresh_ms);
    if timeout_ms == 0 {
        bail!("FETCH_TIMEOUT_MS must be greater than zero");
    }
    let db_pool_max = parse_env!("DB_POOL_MAX", u32, 5);
    let bind_addr = parse_env!(
        "BIND_ADDR",
        SocketAddr,
        SocketAddr::from(([0, 0, 0, 0], 8080))
    );
    let series = parse_series(&env_or!("DASH_SERIES", DEFAULT_SERIES))?;

    Ok(Config {
        refresh_interval: Duration::from_millis(refresh_ms),
        fetch_timeout: Duration::from_millis(timeout_ms),
        store_config_path: PathBuf::from(env_or!("STORE_CONFIG", "config/database.ini")),
        assets_dir: PathBuf::from(env_or!("ASSETS_DIR", "assets")),
        db_pool_max,
        bind_addr,
        series,
    })
}

/// Split a comma separated list of series names.
///
/// Names become table names (`<name>_data`), so only lowercase letters,
/// digits and underscores are accepted.
pub fn parse_series(list: &str) -> Result<Vec<String>> {
    // ---
    let mut series = Vec::new();
    for name in list.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        if !is_series_name(name) {
            bail!("Invalid series name {name:?} in DASH_SERIES");
        }
        if series.iter().any(|s| s == name) {
            bail!("Series {name:?} listed twice in DASH_SERIES");
        }
        series.push(name.to_string());
    }
    if series.is_empty() {
        bail!("DASH_SERIES must name at least one series");
    }
    Ok(series)
}

pub fn is_series_name(name: &str) -> bool {
    // ---
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
}

impl Config {
    /// Log the loaded configuration for debugging purposes.
    pub fn log_config(&self) {
        // ---
        tracing::info!("Configuration loaded:");
        tracing::info!("  REFRESH_INTERVAL : {:?}", self.refresh_interval);
        tracing::info!("  FETCH_TIMEOUT    : {:?}", self.fetch_timeout);
        tracing::info!("  STORE_CONFIG     : {}", self.store_config_path.display());
        tracing::info!("  ASSETS_DIR       : {}", self.assets_dir.display());
        tracing::info!("  DB_POOL_MAX      : {}", self.db_pool_max);
        tracing::info!("  BIND_ADDR        : {}", self.bind_addr);
        tracing::info!("  DASH_SERIES      : {}", self.series.join(","));
    }
}

// ---

/// Store credentials.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct StoreConfig {
    // ---
    pub host: String,
    pub user: String,
    pub password: String,
    #[serde(alias = "db")]
    pub database: String,
    #[serde(default = "default_store_port")]
    pub port: u16,
}

fn default_store_port() -> u16 {
    DEFAULT_STORE_PORT
}

impl StoreConfig {
    /// Read credentials from an INI style `key=value` file, then apply any
    /// `STORE_<KEY>` environment overrides.
    pub fn load(path: &std::path::Path) -> Result<Self> {
        // ---
        let file = config::File::from(path).format(config::FileFormat::Ini);
        Self::from_sources(file, config::Environment::with_prefix("STORE"))
            .with_context(|| format!("Failed to load store config from {}", path.display()))
    }

    fn from_sources<F, E>(file: F, env: E) -> Result<Self>
    where
        F: config::Source + Send + Sync + 'static,
        E: config::Source + Send + Sync + 'static,
    {
        // ---
        let settings = config::Config::builder()
            .add_source(file)
            .add_source(env)
            .build()?;
        Ok(settings.try_deserialize()?)
    }

    /// Log the credentials with the password masked.
    pub fn log_config(&self) {
        // ---
        tracing::info!("Store configured:");
        tracing::info!("  host     : {}:{}", self.host, self.port);
        tracing::info!("  user     : {}", self.user);
        tracing::info!("  password : ****");
        tracing::info!("  database : {}", self.database);
    }
}
