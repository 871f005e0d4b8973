//! Trailing time windows and descriptive statistics.
//!
//! The window is anchored at the newest reading of the series itself, not at
//! wall-clock time: when the store lags behind, "the last 24 hours" still
//! means the 24 hours leading up to the newest data that exists.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::models::SeriesSet;

// ---

pub fn default_span() -> Duration {
    Duration::hours(24)
}

/// Readings strictly newer than `latest - span`, in their original order.
pub fn window(set: &SeriesSet, span: Duration) -> SeriesSet {
    // ---
    let Some(latest) = set.latest_timestamp() else {
        return SeriesSet::new();
    };
    let cutoff = latest - span;

    SeriesSet::from_unsorted(
        set.iter()
            .filter(|r| r.timestamp > cutoff)
            .cloned()
            .collect(),
    )
}

/// Summary of the values in a window.
///
/// Every field but `count` is `None` when there is nothing to describe;
/// `std` (sample standard deviation) additionally needs two values.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Statistics {
    // ---
    pub count: usize,
    pub mean: Option<f64>,
    pub std: Option<f64>,
    pub min: Option<f64>,
    pub p25: Option<f64>,
    pub p50: Option<f64>,
    pub p75: Option<f64>,
    pub max: Option<f64>,
}

impl Statistics {
    // ---
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }
}

pub fn statistics(set: &SeriesSet) -> Statistics {
    // ---
    let mut values: Vec<f64> = set.values().collect();
    if values.is_empty() {
        return Statistics::default();
    }
    values.sort_by(f64::total_cmp);

    let n = values.len();
    let mean = values.iter().sum::<f64>() / n as f64;
    let std = (n > 1).then(|| {
        let ss: f64 = values.iter().map(|v| (v - mean).powi(2)).sum();
        (ss / (n - 1) as f64).sqrt()
    });

    Statistics {
        count: n,
        mean: Some(mean),
        std,
        min: values.first().copied(),
        p25: Some(quantile(&values, 0.25)),
        p50: Some(quantile(&values, 0.50)),
        p75: Some(quantile(&values, 0.75)),
        max: values.last().copied(),
    }
}

/// Linear-interpolated quantile of sorted, non-empty `values`.
fn quantile(values: &[f64], q: f64) -> f64 {
    // ---
    let pos = q * (values.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    values[lo] + (values[hi] - values[lo]) * (pos - lo as f64)
}

/// Window bounds reported alongside statistics.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct WindowBounds {
    // ---
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl WindowBounds {
    // ---
    pub fn of(set: &SeriesSet) -> Option<Self> {
        Some(WindowBounds {
            start: set.first_timestamp()?,
            end: set.latest_timestamp()?,
        })
    }
}
