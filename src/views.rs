//! The pipelines behind each dashboard output.
//!
//! Every type here implements [`Refresh`]: one tick fetches from the
//! [`DataSource`], runs the merge/window/correlate steps the output needs and
//! returns a view for the presentation layer.
use std::{path::PathBuf, sync::Arc};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tracing::warn;

use crate::correlate::overlay;
use crate::error::SourceError;
use crate::merge::merge;
use crate::models::{BoundingBox, ImageKind, ImageRecord, SeriesSet, ThermalExtra};
use crate::scheduler::Refresh;
use crate::source::{fetch_and_persist_latest_image, DataSource};
use crate::window::{statistics, window, Statistics, WindowBounds};

// ---

/// Line/scatter chart over one or more series.
#[derive(Debug, Clone, Serialize)]
pub struct ChartView {
    // ---
    pub series: Vec<String>,
    pub readings: SeriesSet,
}

/// Rolling statistics text panel.
#[derive(Debug, Clone, Serialize)]
pub struct StatsView {
    // ---
    pub series: String,
    pub window: Option<WindowBounds>,
    pub statistics: Statistics,
}

/// Where the latest image was persisted and what it shows.
#[derive(Debug, Clone, Serialize)]
pub struct ImageMeta {
    // ---
    pub path: PathBuf,
    pub timestamp: DateTime<Utc>,
    pub size_bytes: usize,
    pub extra: Option<ThermalExtra>,
}

/// Image pane, with an overlay when one matches the image.
#[derive(Debug, Clone, Serialize)]
pub struct ImageView {
    // ---
    pub kind: ImageKind,
    pub image: Option<ImageMeta>,
    pub boxes: Vec<BoundingBox>,
}

impl ImageView {
    // ---
    fn new(kind: ImageKind, path: &std::path::Path, record: Option<&ImageRecord>) -> Self {
        ImageView {
            kind,
            image: record.map(|r| ImageMeta {
                path: path.to_path_buf(),
                timestamp: r.timestamp,
                size_bytes: r.bytes.len(),
                extra: r.extra,
            }),
            boxes: Vec::new(),
        }
    }
}

// ---

/// Chart of the given series, merged in the order listed.
pub struct SeriesChart {
    source: Arc<dyn DataSource>,
    series: Vec<String>,
}

impl SeriesChart {
    // ---
    pub fn new(source: Arc<dyn DataSource>, series: Vec<String>) -> Self {
        SeriesChart { source, series }
    }
}

#[async_trait]
impl Refresh for SeriesChart {
    type View = ChartView;

    async fn refresh(&self) -> Result<ChartView, SourceError> {
        // ---
        let mut fetched = Vec::with_capacity(self.series.len());
        for name in &self.series {
            fetched.push((name.as_str(), self.source.fetch_series(name).await?));
        }

        let readings = merge(fetched.iter().map(|(name, set)| (*name, set)));
        Ok(ChartView {
            series: self.series.clone(),
            readings,
        })
    }
}

/// Statistics over the trailing window of one series.
pub struct StatsPanel {
    source: Arc<dyn DataSource>,
    series: String,
    span: Duration,
}

impl StatsPanel {
    // ---
    pub fn new(source: Arc<dyn DataSource>, series: impl Into<String>, span: Duration) -> Self {
        StatsPanel {
            source,
            series: series.into(),
            span,
        }
    }
}

#[async_trait]
impl Refresh for StatsPanel {
    type View = StatsView;

    async fn refresh(&self) -> Result<StatsView, SourceError> {
        // ---
        let set = self.source.fetch_series(&self.series).await?;
        let recent = window(&set, self.span);

        Ok(StatsView {
            series: self.series.clone(),
            window: WindowBounds::of(&recent),
            statistics: statistics(&recent),
        })
    }
}

/// Latest thermal frame with its temperature range.
pub struct ThermalPane {
    source: Arc<dyn DataSource>,
    target: PathBuf,
}

impl ThermalPane {
    // ---
    pub fn new(source: Arc<dyn DataSource>, target: PathBuf) -> Self {
        ThermalPane { source, target }
    }
}

#[async_trait]
impl Refresh for ThermalPane {
    type View = ImageView;

    async fn refresh(&self) -> Result<ImageView, SourceError> {
        // ---
        let record =
            fetch_and_persist_latest_image(self.source.as_ref(), ImageKind::Thermal, &self.target)
                .await?;
        Ok(ImageView::new(ImageKind::Thermal, &self.target, record.as_ref()))
    }
}

/// Latest RGB frame with detection boxes drawn only for the matching frame.
pub struct RgbPane {
    source: Arc<dyn DataSource>,
    target: PathBuf,
}

impl RgbPane {
    // ---
    pub fn new(source: Arc<dyn DataSource>, target: PathBuf) -> Self {
        RgbPane { source, target }
    }
}

#[async_trait]
impl Refresh for RgbPane {
    type View = ImageView;

    async fn refresh(&self) -> Result<ImageView, SourceError> {
        // ---
        let (image, annotation) = tokio::join!(
            fetch_and_persist_latest_image(self.source.as_ref(), ImageKind::Rgb, &self.target),
            self.source.fetch_latest_annotation(),
        );

        let image = image?;
        // Without annotations the fresh frame is still worth showing, bare.
        let annotation = annotation.unwrap_or_else(|e| {
            warn!("Annotations unavailable, showing image without boxes: {}", e);
            None
        });

        let mut view = ImageView::new(ImageKind::Rgb, &self.target, image.as_ref());
        view.boxes = overlay(image.as_ref(), annotation.as_ref());
        Ok(view)
    }
}
