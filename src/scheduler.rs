//! Per-output refresh scheduling.
//!
//! Each output (a chart, a stat panel, an image pane) gets its own task that
//! wakes on a fixed interval and re-runs its pipeline. Within one output the
//! ticks are strictly sequential: the next tick is not started before the
//! previous one has produced a view, failed or timed out. Outputs share no
//! state, so a slow store query for one never delays another.
//!
//! The result of every tick is published through a `watch` channel. Readers
//! always see a whole [`Snapshot`], and a failed tick keeps the last good
//! view in place rather than clearing it.
//!
//! ```text
//! Idle -> Fetching -> Ready
//!            ^  \---> Stale
//!            |         |
//!            +---------+   (next tick)
//! ```
use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::{
    sync::watch,
    task::JoinHandle,
    time::{self, MissedTickBehavior},
};
use tracing::{debug, info_span, warn, Instrument};

use crate::error::SourceError;

// ---

/// One output's fetch-and-transform pipeline.
#[async_trait]
pub trait Refresh: Send + Sync + 'static {
    type View: Send + Sync + 'static;

    async fn refresh(&self) -> Result<Self::View, SourceError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RefreshState {
    Idle,
    Fetching,
    Ready,
    Stale,
}

/// What the presentation layer sees for one output.
///
/// `view` is the result of the most recent successful tick and survives
/// `Fetching` and `Stale`.
#[derive(Debug, Serialize)]
pub struct Snapshot<V> {
    // ---
    pub state: RefreshState,
    pub view: Option<Arc<V>>,
    pub refreshed_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

impl<V> Clone for Snapshot<V> {
    fn clone(&self) -> Self {
        Snapshot {
            state: self.state,
            view: self.view.clone(),
            refreshed_at: self.refreshed_at,
            last_error: self.last_error.clone(),
        }
    }
}

impl<V> Snapshot<V> {
    // ---
    pub fn idle() -> Self {
        Snapshot {
            state: RefreshState::Idle,
            view: None,
            refreshed_at: None,
            last_error: None,
        }
    }
}

/// Tick cadence and per-tick time budget.
#[derive(Debug, Clone, Copy)]
pub struct Schedule {
    // ---
    pub interval: Duration,
    pub timeout: Duration,
}

/// Start refreshing `output` and return the receiving end of its snapshots.
///
/// The task stops once every receiver has been dropped.
pub fn spawn<R: Refresh>(
    name: impl Into<String>,
    output: R,
    schedule: Schedule,
) -> (watch::Receiver<Snapshot<R::View>>, JoinHandle<()>) {
    // ---
    let (tx, rx) = watch::channel(Snapshot::idle());
    let handle = tokio::spawn(run(name.into(), output, schedule, tx));
    (rx, handle)
}

async fn run<R: Refresh>(
    name: String,
    output: R,
    schedule: Schedule,
    tx: watch::Sender<Snapshot<R::View>>,
) {
    // ---
    let mut ticker = time::interval(schedule.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        if tx.is_closed() {
            debug!("No readers left for {}, stopping", name);
            break;
        }
        tick(&output, schedule.timeout, &tx)
            .instrument(info_span!("tick", output = %name))
            .await;
    }
}

async fn tick<R: Refresh>(output: &R, timeout: Duration, tx: &watch::Sender<Snapshot<R::View>>) {
    // ---
    tx.send_modify(|s| s.state = RefreshState::Fetching);

    let outcome = match time::timeout(timeout, output.refresh()).await {
        Ok(result) => result,
        Err(_) => Err(SourceError::TimedOut(timeout)),
    };

    match outcome {
        Ok(view) => {
            debug!("Refreshed");
            tx.send_modify(|s| {
                s.state = RefreshState::Ready;
                s.view = Some(Arc::new(view));
                s.refreshed_at = Some(Utc::now());
                s.last_error = None;
            });
        }
        Err(e) => {
            warn!("Refresh failed, keeping last view: {}", e);
            tx.send_modify(|s| {
                s.state = RefreshState::Stale;
                s.last_error = Some(e.to_string());
            });
        }
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Returns the call number; fails on the calls `fail` selects.
    struct Scripted {
        calls: Arc<AtomicUsize>,
        in_flight: Arc<AtomicUsize>,
        max_in_flight: Arc<AtomicUsize>,
        delay: Duration,
        fail: fn(usize) -> bool,
    }

    impl Scripted {
        fn new(delay: Duration, fail: fn(usize) -> bool) -> Self {
            Scripted {
                calls: Arc::default(),
                in_flight: Arc::default(),
                max_in_flight: Arc::default(),
                delay,
                fail,
            }
        }
    }

    #[async_trait]
    impl Refresh for Scripted {
        type View = usize;

        async fn refresh(&self) -> Result<usize, SourceError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            time::sleep(self.delay).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            if (self.fail)(n) {
                Err(SourceError::Store(sqlx::Error::PoolTimedOut))
            } else {
                Ok(n)
            }
        }
    }

    fn every_second() -> Schedule {
        Schedule {
            interval: Duration::from_secs(1),
            timeout: Duration::from_secs(1),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_tick_becomes_ready() {
        // ---
        let output = Scripted::new(Duration::ZERO, |_| false);
        let (mut rx, _task) = spawn("counter", output, every_second());
        assert_eq!(rx.borrow().state, RefreshState::Idle);

        let snap = rx
            .wait_for(|s| s.state == RefreshState::Ready)
            .await
            .unwrap()
            .clone();
        assert_eq!(snap.view.as_deref(), Some(&0));
        assert!(snap.refreshed_at.is_some());
        assert!(snap.last_error.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_keeps_last_view() {
        // ---
        let output = Scripted::new(Duration::ZERO, |n| n == 1);
        let (mut rx, _task) = spawn("flaky", output, every_second());

        rx.wait_for(|s| s.state == RefreshState::Ready).await.unwrap();
        let stale = rx
            .wait_for(|s| s.state == RefreshState::Stale)
            .await
            .unwrap()
            .clone();
        assert_eq!(stale.view.as_deref(), Some(&0));
        assert!(stale.last_error.unwrap().contains("store unavailable"));

        let recovered = rx
            .wait_for(|s| s.state == RefreshState::Ready)
            .await
            .unwrap()
            .clone();
        assert_eq!(recovered.view.as_deref(), Some(&2));
        assert!(recovered.last_error.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_before_any_data() {
        // ---
        let output = Scripted::new(Duration::ZERO, |_| true);
        let (mut rx, _task) = spawn("down", output, every_second());

        let snap = rx
            .wait_for(|s| s.state == RefreshState::Stale)
            .await
            .unwrap()
            .clone();
        assert!(snap.view.is_none());
        assert!(snap.refreshed_at.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_refresh_times_out() {
        // ---
        let schedule = Schedule {
            interval: Duration::from_secs(5),
            timeout: Duration::from_secs(2),
        };
        let output = Scripted::new(Duration::from_secs(10), |_| false);
        let (mut rx, _task) = spawn("slow", output, schedule);

        let snap = rx
            .wait_for(|s| s.state == RefreshState::Stale)
            .await
            .unwrap()
            .clone();
        assert_eq!(snap.last_error.as_deref(), Some("fetch timed out after 2s"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_ticks_never_overlap() {
        // ---
        // Each refresh outlasts the interval; ticks must still run one at a time.
        let output = Scripted::new(Duration::from_millis(2500), |_| false);
        let calls = output.calls.clone();
        let max_in_flight = output.max_in_flight.clone();
        let schedule = Schedule {
            interval: Duration::from_secs(1),
            timeout: Duration::from_secs(10),
        };
        let (mut rx, _task) = spawn("overlap", output, schedule);

        rx.wait_for(|s| s.view.as_deref() == Some(&3)).await.unwrap();
        assert!(calls.load(Ordering::SeqCst) >= 4);
        assert_eq!(max_in_flight.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_outputs_refresh_independently() {
        // ---
        let slow = Scripted::new(Duration::from_secs(30), |_| false);
        let fast = Scripted::new(Duration::ZERO, |_| false);
        let schedule = Schedule {
            interval: Duration::from_secs(1),
            timeout: Duration::from_secs(60),
        };
        let (slow_rx, _slow) = spawn("slow", slow, schedule);
        let (mut fast_rx, _fast) = spawn("fast", fast, schedule);

        fast_rx
            .wait_for(|s| s.view.as_deref() == Some(&5))
            .await
            .unwrap();
        assert_eq!(slow_rx.borrow().state, RefreshState::Fetching);
        assert!(slow_rx.borrow().view.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_task_stops_without_readers() {
        // ---
        let output = Scripted::new(Duration::ZERO, |_| false);
        let (rx, task) = spawn("orphan", output, every_second());
        drop(rx);
        time::timeout(Duration::from_secs(5), task)
            .await
            .expect("task should stop")
            .unwrap();
    }

    #[test]
    fn test_snapshot_json_shape() {
        // ---
        let snap = Snapshot {
            state: RefreshState::Stale,
            view: Some(Arc::new(7u32)),
            refreshed_at: None,
            last_error: Some("store unavailable".to_string()),
        };
        let json = serde_json::to_value(&snap).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "state": "stale",
                "view": 7,
                "refreshed_at": null,
                "last_error": "store unavailable"
            })
        );
    }
}
