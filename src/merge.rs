//! Series merger for multi-series charts.

use crate::models::{Reading, SeriesSet};

// ---

/// Combine named series into one time-ordered set.
///
/// Every reading is tagged with the name it was supplied under. Sources are
/// concatenated in the order given and then stably sorted, so readings with
/// equal timestamps keep per-source order and sources keep caller order.
/// Nothing is interpolated or resampled.
pub fn merge<'a, I>(sources: I) -> SeriesSet
where
    I: IntoIterator<Item = (&'a str, &'a SeriesSet)>,
{
    // ---
    let mut merged: Vec<Reading> = Vec::new();
    for (name, set) in sources {
        merged.extend(set.iter().map(|r| Reading {
            series_name: name.to_string(),
            ..r.clone()
        }));
    }
    SeriesSet::from_unsorted(merged)
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use chrono::{DateTime, Duration, TimeZone, Utc};

    fn t(minutes: i64) -> DateTime<Utc> {
        // ---
        Utc.with_ymd_and_hms(2022, 3, 22, 13, 0, 0).unwrap() + Duration::minutes(minutes)
    }

    fn series(name: &str, points: &[(i64, f64)]) -> SeriesSet {
        // ---
        SeriesSet::from_unsorted(
            points
                .iter()
                .map(|&(m, v)| Reading::new(name, v, t(m)))
                .collect(),
        )
    }

    #[test]
    fn test_merge_length_and_order() {
        // ---
        let methane = series("methane", &[(0, 1.0), (10, 2.0), (20, 3.0)]);
        let ammonia = series("ammonia", &[(5, 10.0), (15, 20.0)]);

        let merged = merge([("methane", &methane), ("ammonia", &ammonia)]);

        assert_eq!(merged.len(), methane.len() + ammonia.len());
        let times: Vec<_> = merged.iter().map(|r| r.timestamp).collect();
        let mut sorted = times.clone();
        sorted.sort();
        assert_eq!(times, sorted);

        let names: Vec<&str> = merged.iter().map(|r| r.series_name.as_str()).collect();
        assert_eq!(
            names,
            vec!["methane", "ammonia", "methane", "ammonia", "methane"]
        );
    }

    #[test]
    fn test_merge_tags_match_origin() {
        // ---
        let methane = series("methane", &[(0, 1.0), (1, 2.0)]);
        let co2 = series("co2", &[(0, 400.0)]);

        let merged = merge([("methane", &methane), ("co2", &co2)]);
        for reading in &merged {
            match reading.series_name.as_str() {
                "methane" => assert!(reading.value < 10.0),
                "co2" => assert_eq!(reading.value, 400.0),
                other => panic!("unexpected series {other}"),
            }
        }
    }

    #[test]
    fn test_merge_ties_follow_source_order() {
        // ---
        let methane = series("methane", &[(0, 1.0), (0, 2.0)]);
        let ammonia = series("ammonia", &[(0, 3.0)]);
        let co2 = series("co2", &[(0, 4.0)]);

        let merged = merge([("methane", &methane), ("ammonia", &ammonia), ("co2", &co2)]);
        let values: Vec<f64> = merged.values().collect();
        assert_eq!(values, vec![1.0, 2.0, 3.0, 4.0]);

        let reversed = merge([("co2", &co2), ("ammonia", &ammonia), ("methane", &methane)]);
        let values: Vec<f64> = reversed.values().collect();
        assert_eq!(values, vec![4.0, 3.0, 1.0, 2.0]);
    }

    #[test]
    fn test_merge_empty_sources() {
        // ---
        let empty = SeriesSet::new();
        let co2 = series("co2", &[(3, 400.0)]);

        assert!(merge([("methane", &empty), ("ammonia", &empty)]).is_empty());

        let merged = merge([("methane", &empty), ("co2", &co2)]);
        assert_eq!(merged.len(), 1);
        let only = merged.iter().next().unwrap();
        assert_eq!(only.series_name, "co2");
    }
}
