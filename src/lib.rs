//! Refresh and aggregation backend for the gas sensor and camera dashboard.
//!
//! The pipeline, leaf first:
//! - `source` – reads series, images and annotations from the store
//! - `merge` – combines named series into one time-ordered set
//! - `window` – trailing 24h windows and descriptive statistics
//! - `correlate` – releases detection boxes only for their own frame
//! - `scheduler` – runs each output on its own fixed-interval task
//! - `views` / `dashboard` – the concrete outputs and their registry
//! - `routes` – JSON read surface for the presentation layer
//!
//! Modules talk to each other through the re-exports below (EMBP), so a
//! module never needs to know where a sibling's types live.

mod config;
mod correlate;
mod dashboard;
mod error;
mod merge;
mod models;
mod routes;
mod scheduler;
mod source;
mod views;
mod window;

pub use config::{load_from_env, Config, StoreConfig};
pub use correlate::{correlate, overlay};
pub use dashboard::{Dashboard, SnapshotSource, MERGED_CHART, RGB_PANE, THERMAL_PANE};
pub use error::{MalformedReading, SourceError};
pub use merge::merge;
pub use models::{
    parse_boxes, AnnotationRecord, BoundingBox, ImageKind, ImageRecord, Reading, SeriesSet,
    ThermalExtra,
};
pub use routes::router;
pub use scheduler::{spawn, Refresh, RefreshState, Schedule, Snapshot};
pub use source::{fetch_and_persist_latest_image, DataSource, MySqlSource};
pub use views::{ChartView, ImageMeta, ImageView, StatsView};
pub use window::{default_span, statistics, window, Statistics, WindowBounds};
