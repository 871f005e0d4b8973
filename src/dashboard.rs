//! Dashboard wiring.
//!
//! Puts every output on its own scheduled task and keeps the receiving end
//! of each one, keyed by output name, for the read surface to serve.
use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use tokio::sync::watch;

use crate::config::Config;
use crate::models::ImageKind;
use crate::scheduler::{self, Refresh, RefreshState, Schedule, Snapshot};
use crate::source::DataSource;
use crate::views::{RgbPane, SeriesChart, StatsPanel, ThermalPane};
use crate::window::default_span;

// ---

pub const MERGED_CHART: &str = "gas_chart";
pub const THERMAL_PANE: &str = "thermal_image";
pub const RGB_PANE: &str = "rgb_image";

/// Type-erased view of one output's current snapshot.
pub trait SnapshotSource: Send + Sync {
    fn state(&self) -> RefreshState;
    fn to_json(&self) -> Value;
}

impl<V> SnapshotSource for watch::Receiver<Snapshot<V>>
where
    V: Serialize + Send + Sync,
{
    fn state(&self) -> RefreshState {
        self.borrow().state
    }

    fn to_json(&self) -> Value {
        serde_json::to_value(&*self.borrow()).unwrap_or(Value::Null)
    }
}

/// All outputs of the dashboard.
pub struct Dashboard {
    outputs: BTreeMap<String, Box<dyn SnapshotSource>>,
}

impl Dashboard {
    /// Start refreshing every output against `source`.
    ///
    /// Must be called from within a Tokio runtime. Output tasks run until
    /// the dashboard is dropped.
    pub fn start(cfg: &Config, source: Arc<dyn DataSource>) -> Self {
        // ---
        let schedule = Schedule {
            interval: cfg.refresh_interval,
            timeout: cfg.fetch_timeout,
        };
        let mut dash = Dashboard {
            outputs: BTreeMap::new(),
        };

        for name in &cfg.series {
            dash.add(
                format!("{name}_chart"),
                SeriesChart::new(source.clone(), vec![name.clone()]),
                schedule,
            );
            dash.add(
                format!("{name}_stats"),
                StatsPanel::new(source.clone(), name.as_str(), default_span()),
                schedule,
            );
        }
        dash.add(MERGED_CHART, SeriesChart::new(source.clone(), cfg.series.clone()), schedule);
        dash.add(
            THERMAL_PANE,
            ThermalPane::new(source.clone(), cfg.assets_dir.join(ImageKind::Thermal.file_name())),
            schedule,
        );
        dash.add(
            RGB_PANE,
            RgbPane::new(source, cfg.assets_dir.join(ImageKind::Rgb.file_name())),
            schedule,
        );

        tracing::info!(
            "Dashboard started with {} outputs every {:?}",
            dash.outputs.len(),
            schedule.interval
        );
        dash
    }

    fn add<R>(&mut self, name: impl Into<String>, output: R, schedule: Schedule)
    where
        R: Refresh,
        R::View: Serialize,
    {
        // ---
        let name = name.into();
        let (rx, _task) = scheduler::spawn(name.clone(), output, schedule);
        self.outputs.insert(name, Box::new(rx));
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.outputs.keys().map(String::as_str)
    }

    pub fn state(&self, name: &str) -> Option<RefreshState> {
        self.outputs.get(name).map(|o| o.state())
    }

    pub fn snapshot(&self, name: &str) -> Option<Value> {
        self.outputs.get(name).map(|o| o.to_json())
    }

    /// Every output's snapshot, keyed by name.
    pub fn snapshots(&self) -> Value {
        // ---
        Value::Object(
            self.outputs
                .iter()
                .map(|(name, o)| (name.clone(), o.to_json()))
                .collect(),
        )
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use crate::source::testing::MemorySource;
    use std::time::Duration;

    fn test_config() -> Config {
        // ---
        Config {
            refresh_interval: Duration::from_secs(1),
            fetch_timeout: Duration::from_secs(1),
            store_config_path: "unused.ini".into(),
            assets_dir: std::env::temp_dir()
                .join(format!("sensordash-dash-{}", std::process::id())),
            db_pool_max: 1,
            bind_addr: ([127, 0, 0, 1], 0).into(),
            series: vec!["methane".into(), "co2".into()],
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_outputs_are_registered() {
        // ---
        let dash = Dashboard::start(&test_config(), Arc::new(MemorySource::default()));
        let names: Vec<&str> = dash.names().collect();
        assert_eq!(
            names,
            vec![
                "co2_chart",
                "co2_stats",
                "gas_chart",
                "methane_chart",
                "methane_stats",
                "rgb_image",
                "thermal_image",
            ]
        );
        assert!(dash.snapshot("nope").is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_snapshots_become_ready() {
        // ---
        let dash = Dashboard::start(&test_config(), Arc::new(MemorySource::default()));

        for _ in 0..10 {
            if dash.names().all(|n| dash.state(n) == Some(RefreshState::Ready)) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }

        let stats = dash.snapshot("co2_stats").unwrap();
        assert_eq!(stats["state"], "ready");
        assert_eq!(stats["view"]["statistics"]["count"], 0);
        assert!(stats["view"]["statistics"]["mean"].is_null());

        let all = dash.snapshots();
        assert_eq!(all["rgb_image"]["view"]["image"], Value::Null);
    }
}
