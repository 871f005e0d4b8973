//! Data models for the dashboard pipeline.
//!
//! The `Raw*Row` types mirror the store's tables column for column; their
//! conversion helpers turn one row into a typed record or a
//! [`MalformedReading`] describing why it could not be.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::MalformedReading;

// ---

/// Raw sensor units are hundredths of a Kelvin.
const THERMAL_SCALE: f64 = 0.01;
const KELVIN_OFFSET: f64 = 273.15;

/// One value of one named series.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Reading {
    // ---
    pub series_name: String,
    pub value: f64,
    pub timestamp: DateTime<Utc>,
}

impl Reading {
    // ---
    pub fn new(series_name: impl Into<String>, value: f64, timestamp: DateTime<Utc>) -> Self {
        Reading {
            series_name: series_name.into(),
            value,
            timestamp,
        }
    }
}

/// Readings ordered ascending by timestamp.
///
/// Equal timestamps keep the order in which they were supplied.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct SeriesSet(Vec<Reading>);

impl SeriesSet {
    // ---
    pub fn new() -> Self {
        SeriesSet(Vec::new())
    }

    /// Build a set from readings in any order (stable sort by timestamp).
    pub fn from_unsorted(mut readings: Vec<Reading>) -> Self {
        readings.sort_by_key(|r| r.timestamp);
        SeriesSet(readings)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Reading> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn first_timestamp(&self) -> Option<DateTime<Utc>> {
        self.0.iter().map(|r| r.timestamp).min()
    }

    pub fn latest_timestamp(&self) -> Option<DateTime<Utc>> {
        self.0.iter().map(|r| r.timestamp).max()
    }

    pub fn values(&self) -> impl Iterator<Item = f64> + '_ {
        self.0.iter().map(|r| r.value)
    }
}

impl<'a> IntoIterator for &'a SeriesSet {
    type Item = &'a Reading;
    type IntoIter = std::slice::Iter<'a, Reading>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// Which camera an image comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImageKind {
    Thermal,
    Rgb,
}

impl ImageKind {
    // ---
    pub fn table(self) -> &'static str {
        match self {
            ImageKind::Thermal => "thermal_images",
            ImageKind::Rgb => "rgb_images",
        }
    }

    /// File name the latest image of this kind is persisted under.
    pub fn file_name(self) -> &'static str {
        match self {
            ImageKind::Thermal => "thermal_image.jpg",
            ImageKind::Rgb => "rgb_image.jpg",
        }
    }
}

/// Temperature extremes of a thermal frame, in °C.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ThermalExtra {
    // ---
    pub min_temp_c: f64,
    pub max_temp_c: f64,
}

impl ThermalExtra {
    // ---
    pub fn from_raw(min_raw: i64, max_raw: i64) -> Self {
        ThermalExtra {
            min_temp_c: raw_to_celsius(min_raw),
            max_temp_c: raw_to_celsius(max_raw),
        }
    }
}

fn raw_to_celsius(raw: i64) -> f64 {
    raw as f64 * THERMAL_SCALE - KELVIN_OFFSET
}

/// The most recent image of one kind.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageRecord {
    // ---
    pub kind: ImageKind,
    pub bytes: Vec<u8>,
    pub timestamp: DateTime<Utc>,
    pub extra: Option<ThermalExtra>,
}

/// Detection box in source-image pixels, top-left origin.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BoundingBox {
    // ---
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl BoundingBox {
    // ---
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        BoundingBox {
            x,
            y,
            width,
            height,
        }
    }
}

/// The most recent set of detection boxes.
#[derive(Debug, Clone, PartialEq)]
pub struct AnnotationRecord {
    // ---
    pub timestamp: DateTime<Utc>,
    pub boxes: Vec<BoundingBox>,
}

// ---

/// Row of a `<series>_data` table, value read back as text.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct RawReadingRow {
    // ---
    pub id: Option<i64>,
    pub value: Option<String>,
    pub time: Option<NaiveDateTime>,
}

impl RawReadingRow {
    // ---
    pub fn to_reading(&self, series: &str, table: &str) -> Result<Reading, MalformedReading> {
        // ---
        let raw = self
            .value
            .as_deref()
            .ok_or_else(|| MalformedReading::new(table, self.id, "value is NULL"))?;
        let value = raw
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
            .ok_or_else(|| {
                MalformedReading::new(table, self.id, format!("value {raw:?} is not a number"))
            })?;
        let time = self
            .time
            .ok_or_else(|| MalformedReading::new(table, self.id, "time is NULL"))?;

        Ok(Reading::new(series, value, time.and_utc()))
    }
}

/// Row of `thermal_images` or `rgb_images`.
///
/// The RGB table has no temperature columns; they default to `None`.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct RawImageRow {
    // ---
    pub id: Option<i64>,
    pub image: Option<Vec<u8>>,
    pub time: Option<NaiveDateTime>,
    #[sqlx(default)]
    pub min_temp: Option<i64>,
    #[sqlx(default)]
    pub max_temp: Option<i64>,
}

impl RawImageRow {
    // ---
    pub fn to_record(&self, kind: ImageKind) -> Result<ImageRecord, MalformedReading> {
        // ---
        let table = kind.table();
        let bytes = self
            .image
            .clone()
            .ok_or_else(|| MalformedReading::new(table, self.id, "image is NULL"))?;
        let time = self
            .time
            .ok_or_else(|| MalformedReading::new(table, self.id, "time is NULL"))?;

        let extra = match (kind, self.min_temp, self.max_temp) {
            (ImageKind::Thermal, Some(min), Some(max)) => Some(ThermalExtra::from_raw(min, max)),
            _ => None,
        };

        Ok(ImageRecord {
            kind,
            bytes,
            timestamp: time.and_utc(),
            extra,
        })
    }
}

/// Row of the `boxes` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct RawBoxesRow {
    // ---
    pub id: Option<i64>,
    pub time: Option<NaiveDateTime>,
    pub boxes: Option<String>,
}

impl RawBoxesRow {
    // ---
    pub fn to_annotation(&self) -> Result<AnnotationRecord, MalformedReading> {
        // ---
        let time = self
            .time
            .ok_or_else(|| MalformedReading::new("boxes", self.id, "time is NULL"))?;
        let boxes = self
            .boxes
            .as_deref()
            .map(parse_boxes)
            .transpose()
            .map_err(|reason| MalformedReading::new("boxes", self.id, reason))?
            .unwrap_or_default();

        Ok(AnnotationRecord {
            timestamp: time.and_utc(),
            boxes,
        })
    }
}

/// Parse a serialized list of `(x, y, width, height)` tuples.
///
/// Accepts JSON arrays and Python-style tuple lists. A lone 4-tuple is a
/// one-box list.
pub fn parse_boxes(text: &str) -> Result<Vec<BoundingBox>, String> {
    // ---
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }

    let normalized: String = trimmed
        .chars()
        .map(|c| match c {
            '(' => '[',
            ')' => ']',
            other => other,
        })
        .collect();

    let tuples: Vec<[f64; 4]> = match serde_json::from_str::<Vec<[f64; 4]>>(&normalized) {
        Ok(list) => list,
        Err(list_err) => match serde_json::from_str::<[f64; 4]>(&normalized) {
            Ok(single) => vec![single],
            Err(_) => {
                return Err(format!("boxes {trimmed:?} are not a list of 4-tuples: {list_err}"))
            }
        },
    };

    Ok(tuples
        .into_iter()
        .map(|[x, y, w, h]| BoundingBox::new(x, y, w, h))
        .collect())
}
