//! Error types for the data refresh pipeline.
//!
//! Two classes exist. [`SourceError`] means "no data this tick": the store
//! could not be reached, a query failed, the tick ran out of time or the
//! fetched image could not be written. The scheduler absorbs it by keeping
//! the last good snapshot. [`MalformedReading`] concerns a single row and
//! never leaves a fetch; the row is logged and skipped.
use std::{path::PathBuf, time::Duration};

use thiserror::Error;

// ---

/// A fetch could not produce data for this tick.
#[derive(Debug, Error)]
pub enum SourceError {
    // ---
    #[error("store unavailable: {0}")]
    Store(#[from] sqlx::Error),

    #[error("fetch timed out after {0:?}")]
    TimedOut(Duration),

    #[error("failed to persist image to {}: {source}", .path.display())]
    Persist {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid series name {0:?}")]
    InvalidSeries(String),
}

/// A single row did not have the expected shape.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("malformed row in `{table}` (id {id:?}): {reason}")]
pub struct MalformedReading {
    // ---
    pub table: String,
    pub id: Option<i64>,
    pub reason: String,
}

impl MalformedReading {
    // ---
    pub fn new(table: &str, id: Option<i64>, reason: impl Into<String>) -> Self {
        MalformedReading {
            table: table.to_string(),
            id,
            reason: reason.into(),
        }
    }
}
