//! Data source adapter.
//!
//! [`DataSource`] is the read side of the backing store: full scans of a
//! named series and the newest image or annotation row. [`MySqlSource`] is
//! the production adapter. [`fetch_and_persist_latest_image`] adds the one
//! write this pipeline performs, copying the newest blob to a fixed path for
//! the presentation layer to serve.
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use sqlx::{
    mysql::{MySqlConnectOptions, MySqlPoolOptions, MySqlRow},
    FromRow, MySqlPool,
};
use tracing::{debug, warn};

use crate::config::{is_series_name, StoreConfig};
use crate::error::{MalformedReading, SourceError};
use crate::models::{
    AnnotationRecord, ImageKind, ImageRecord, RawBoxesRow, RawImageRow, RawReadingRow, SeriesSet,
};

// ---

/// Read access to the sensor store.
///
/// `Ok(None)` from the latest-record methods means the table holds no usable
/// row; it is not an error.
#[async_trait]
pub trait DataSource: Send + Sync {
    /// All rows currently visible for the named series, oldest first.
    async fn fetch_series(&self, name: &str) -> Result<SeriesSet, SourceError>;

    /// The newest image of the given kind.
    async fn fetch_latest_image(
        &self,
        kind: ImageKind,
    ) -> Result<Option<ImageRecord>, SourceError>;

    /// The newest annotation set.
    async fn fetch_latest_annotation(&self) -> Result<Option<AnnotationRecord>, SourceError>;
}

/// Fetch the newest image of `kind` and write its bytes to `target`.
///
/// The blob lands in a sibling temporary file first and is renamed over
/// `target`, so readers of `target` only ever see a complete image. Nothing
/// is written when the table is empty.
pub async fn fetch_and_persist_latest_image(
    source: &dyn DataSource,
    kind: ImageKind,
    target: &Path,
) -> Result<Option<ImageRecord>, SourceError> {
    // ---
    let Some(record) = source.fetch_latest_image(kind).await? else {
        return Ok(None);
    };

    persist(&record.bytes, target).await?;
    debug!(
        "Persisted {} byte {:?} image from {} to {}",
        record.bytes.len(),
        kind,
        record.timestamp,
        target.display()
    );
    Ok(Some(record))
}

async fn persist(bytes: &[u8], target: &Path) -> Result<(), SourceError> {
    // ---
    let bytes = bytes.to_vec();
    let path = target.to_path_buf();
    let written = tokio::task::spawn_blocking(move || write_then_rename(&bytes, &path))
        .await
        .unwrap_or_else(|e| Err(io::Error::other(e)));

    written.map_err(|source| SourceError::Persist {
        path: target.to_path_buf(),
        source,
    })
}

/// Write and rename as one blocking unit. An abandoned tick can finish its
/// own write late, but never through another write's temporary file.
fn write_then_rename(bytes: &[u8], target: &Path) -> io::Result<()> {
    // ---
    if let Some(parent) = target.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }

    let tmp = temp_path(target);
    let written = std::fs::write(&tmp, bytes);
    let result = written.and_then(|()| std::fs::rename(&tmp, target));
    if result.is_err() {
        let _ = std::fs::remove_file(&tmp);
    }
    result
}

static TEMP_SEQ: AtomicU64 = AtomicU64::new(0);

/// `<target>.<pid>.<seq>.tmp`, unique per write.
fn temp_path(target: &Path) -> PathBuf {
    // ---
    let seq = TEMP_SEQ.fetch_add(1, Ordering::Relaxed);
    let mut name = target.as_os_str().to_owned();
    name.push(format!(".{}.{}.tmp", std::process::id(), seq));
    PathBuf::from(name)
}

// ---

/// MySQL backed [`DataSource`].
#[derive(Debug, Clone)]
pub struct MySqlSource {
    pool: MySqlPool,
}

impl MySqlSource {
    /// Build a lazily connecting pool; no connection is attempted until the
    /// first fetch, so an unreachable store surfaces as a tick failure.
    pub fn connect_lazy(
        store: &StoreConfig,
        max_connections: u32,
        acquire_timeout: std::time::Duration,
    ) -> Self {
        // ---
        let options = MySqlConnectOptions::new()
            .host(&store.host)
            .port(store.port)
            .username(&store.user)
            .password(&store.password)
            .database(&store.database);

        let pool = MySqlPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(acquire_timeout)
            .connect_lazy_with(options);

        MySqlSource { pool }
    }
}

/// Table holding the named series.
pub fn series_table(name: &str) -> Result<String, SourceError> {
    // ---
    if !is_series_name(name) {
        return Err(SourceError::InvalidSeries(name.to_string()));
    }
    Ok(format!("{name}_data"))
}

/// Rows read by the latest-record queries. The newest usable row wins, so a
/// malformed newest row falls back to an older one.
const NEWEST_ROWS: usize = 5;

fn decode_row<R, T>(
    row: &MySqlRow,
    table: &str,
    convert: impl Fn(&R) -> Result<T, MalformedReading>,
) -> Result<T, MalformedReading>
where
    R: for<'r> FromRow<'r, MySqlRow>,
{
    // ---
    R::from_row(row)
        .map_err(|e| MalformedReading::new(table, None, e.to_string()))
        .and_then(|raw| convert(&raw))
}

/// Decode every row, skipping (and logging) any that fail.
fn decode_rows<R, T>(
    rows: &[MySqlRow],
    table: &str,
    convert: impl Fn(&R) -> Result<T, MalformedReading>,
) -> Vec<T>
where
    R: for<'r> FromRow<'r, MySqlRow>,
{
    // ---
    skip_malformed(rows.iter().map(|r| decode_row::<R, T>(r, table, &convert)))
}

/// The first row, in query order, that decodes.
fn decode_first<R, T>(
    rows: &[MySqlRow],
    table: &str,
    convert: impl Fn(&R) -> Result<T, MalformedReading>,
) -> Option<T>
where
    R: for<'r> FromRow<'r, MySqlRow>,
{
    // ---
    first_usable(rows.iter().map(|r| decode_row::<R, T>(r, table, &convert)))
}

fn usable<T>(row: Result<T, MalformedReading>) -> Option<T> {
    match row {
        Ok(item) => Some(item),
        Err(e) => {
            warn!("Skipping row: {}", e);
            None
        }
    }
}

/// Keep the rows that decoded, in order.
fn skip_malformed<T>(rows: impl IntoIterator<Item = Result<T, MalformedReading>>) -> Vec<T> {
    rows.into_iter().filter_map(usable).collect()
}

/// Stop at the first row that decoded. Rows after it are never inspected.
fn first_usable<T>(rows: impl IntoIterator<Item = Result<T, MalformedReading>>) -> Option<T> {
    rows.into_iter().find_map(usable)
}

#[async_trait]
impl DataSource for MySqlSource {
    // ---
    async fn fetch_series(&self, name: &str) -> Result<SeriesSet, SourceError> {
        // ---
        let table = series_table(name)?;
        let query = format!(
            "SELECT CAST(id AS SIGNED) AS id, CAST(value AS CHAR) AS value, time \
             FROM `{table}` ORDER BY time ASC"
        );

        let rows = sqlx::query(&query).fetch_all(&self.pool).await?;
        let readings = decode_rows(&rows, &table, |raw: &RawReadingRow| {
            raw.to_reading(name, &table)
        });

        debug!("Fetched {} of {} rows from {}", readings.len(), rows.len(), table);
        Ok(SeriesSet::from_unsorted(readings))
    }

    async fn fetch_latest_image(
        &self,
        kind: ImageKind,
    ) -> Result<Option<ImageRecord>, SourceError> {
        // ---
        let query = match kind {
            ImageKind::Thermal => format!(
                "SELECT CAST(id AS SIGNED) AS id, image, time, \
                 CAST(min_temp AS SIGNED) AS min_temp, CAST(max_temp AS SIGNED) AS max_temp \
                 FROM `thermal_images` ORDER BY time DESC LIMIT {NEWEST_ROWS}"
            ),
            ImageKind::Rgb => format!(
                "SELECT CAST(id AS SIGNED) AS id, image, time \
                 FROM `rgb_images` ORDER BY time DESC LIMIT {NEWEST_ROWS}"
            ),
        };

        let rows = sqlx::query(&query).fetch_all(&self.pool).await?;
        Ok(decode_first(&rows, kind.table(), |raw: &RawImageRow| {
            raw.to_record(kind)
        }))
    }

    async fn fetch_latest_annotation(&self) -> Result<Option<AnnotationRecord>, SourceError> {
        // ---
        let query = format!(
            "SELECT CAST(id AS SIGNED) AS id, time, CAST(boxes AS CHAR) AS boxes \
             FROM `boxes` ORDER BY time DESC LIMIT {NEWEST_ROWS}"
        );

        let rows = sqlx::query(&query).fetch_all(&self.pool).await?;
        Ok(decode_first(&rows, "boxes", RawBoxesRow::to_annotation))
    }
}

// ---

#[cfg(test)]
pub(crate) mod testing {
    //! In-memory [`DataSource`] for pipeline tests.
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Mutex;

    use super::*;

    #[derive(Default)]
    pub struct MemorySource {
        pub series: Mutex<HashMap<String, SeriesSet>>,
        pub images: Mutex<HashMap<ImageKind, ImageRecord>>,
        pub annotation: Mutex<Option<AnnotationRecord>>,
        pub fail_series: AtomicBool,
        pub fail_images: AtomicBool,
        pub fail_annotation: AtomicBool,
        pub calls: AtomicUsize,
    }

    fn unavailable() -> SourceError {
        SourceError::Store(sqlx::Error::PoolTimedOut)
    }

    impl MemorySource {
        pub fn set_series(&self, name: &str, set: SeriesSet) {
            self.series.lock().unwrap().insert(name.to_string(), set);
        }

        pub fn set_image(&self, record: ImageRecord) {
            self.images.lock().unwrap().insert(record.kind, record);
        }

        pub fn set_annotation(&self, record: Option<AnnotationRecord>) {
            *self.annotation.lock().unwrap() = record;
        }
    }

    #[async_trait]
    impl DataSource for MemorySource {
        async fn fetch_series(&self, name: &str) -> Result<SeriesSet, SourceError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_series.load(Ordering::SeqCst) {
                return Err(unavailable());
            }
            Ok(self
                .series
                .lock()
                .unwrap()
                .get(name)
                .cloned()
                .unwrap_or_default())
        }

        async fn fetch_latest_image(
            &self,
            kind: ImageKind,
        ) -> Result<Option<ImageRecord>, SourceError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_images.load(Ordering::SeqCst) {
                return Err(unavailable());
            }
            Ok(self.images.lock().unwrap().get(&kind).cloned())
        }

        async fn fetch_latest_annotation(&self) -> Result<Option<AnnotationRecord>, SourceError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_annotation.load(Ordering::SeqCst) {
                return Err(unavailable());
            }
            Ok(self.annotation.lock().unwrap().clone())
        }
    }
}
