use crate::error::{ProcessingError, Result};
use crate::models::{floor_to, Frequency, HourlyRecord, Observation, Series, SECONDS_PER_HOUR};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

const SECONDS_PER_DAY: i64 = 24 * SECONDS_PER_HOUR;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregationStrategy {
    /// Sum of the readings falling in each hour
    PlainSum,
    /// Hourly sum rescaled by expected / observed sub-intervals
    NormalizedResample,
}

#[derive(Default)]
struct HourBucket {
    sum: f64,
    present: usize,
}

/// Sum readings per clock hour, skipping missing readings. An hour holding only missing
/// readings sums to zero.
pub fn aggregate_plain(series: &Series) -> Series {
    let mut buckets: BTreeMap<DateTime<Utc>, f64> = BTreeMap::new();
    for observation in &series.observations {
        let sum = buckets
            .entry(floor_to(observation.timestamp, SECONDS_PER_HOUR))
            .or_insert(0.0);
        if !observation.is_missing() {
            *sum += observation.value.unwrap_or_default();
        }
    }

    let observations = buckets
        .into_iter()
        .map(|(hour, sum)| Observation::new(hour, Some(sum)))
        .collect();
    Series::new(series.key.clone(), observations)
}

/// Hourly totals that compensate for partially observed hours.
///
/// Readings are first collapsed onto the native grid (bins anchored at midnight UTC of
/// the first day, duplicates summed). Each hour's total is then scaled by
/// `expected intervals / observed intervals`, so an hour with 2 of 4 quarter-hours
/// reported as `v` each yields `4v`. Hours with no observed interval are left out.
pub fn aggregate_normalized(series: &Series, frequency: Frequency) -> Series {
    let first = match series.observations.iter().map(|o| o.timestamp).min() {
        Some(first) => first,
        None => return Series::new(series.key.clone(), Vec::new()),
    };
    let origin = floor_to(first, SECONDS_PER_DAY);
    let step = frequency.seconds();

    let mut native: BTreeMap<i64, f64> = BTreeMap::new();
    for observation in series.observations.iter().filter(|o| !o.is_missing()) {
        let bin = (observation.timestamp - origin).num_seconds().div_euclid(step);
        *native.entry(bin).or_insert(0.0) += observation.value.unwrap_or_default();
    }

    let mut hours: BTreeMap<DateTime<Utc>, HourBucket> = BTreeMap::new();
    for (bin, sum) in native {
        let bin_start = origin + frequency.duration() * bin as i32;
        let bucket = hours
            .entry(floor_to(bin_start, SECONDS_PER_HOUR))
            .or_default();
        bucket.sum += sum;
        bucket.present += 1;
    }

    let expected = frequency.intervals_per_hour() as f64;
    let observations = hours
        .into_iter()
        .map(|(hour, bucket)| {
            Observation::new(hour, Some(bucket.sum * expected / bucket.present as f64))
        })
        .collect();
    Series::new(series.key.clone(), observations)
}

/// Aggregate one series with the chosen strategy. The normalized strategy needs the
/// series' estimated frequency.
pub fn aggregate_hourly(
    series: &Series,
    frequency: Option<Frequency>,
    strategy: AggregationStrategy,
) -> Result<Series> {
    match strategy {
        AggregationStrategy::PlainSum => Ok(aggregate_plain(series)),
        AggregationStrategy::NormalizedResample => match frequency {
            Some(frequency) => Ok(aggregate_normalized(series, frequency)),
            None => Err(ProcessingError::InsufficientData { got: series.len() }),
        },
    }
}

/// Flatten hourly series back into one table, series after series
pub fn to_hourly_records(series: &[Series]) -> Vec<HourlyRecord> {
    series
        .iter()
        .flat_map(|s| {
            s.observations.iter().map(move |o| HourlyRecord {
                hour: o.timestamp,
                key: s.key.clone(),
                value: o.value,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{EnergyType, SeriesKey};
    use chrono::{Duration, TimeZone};

    fn at(minute: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap() + Duration::minutes(minute)
    }

    fn series(points: &[(i64, Option<f64>)]) -> Series {
        Series::new(
            SeriesKey::new("HU", EnergyType::Load, None),
            points.iter().map(|(m, v)| Observation::new(at(*m), *v)).collect(),
        )
    }

    fn quarter_hour() -> Frequency {
        Frequency::from_minutes(15).unwrap()
    }

    #[test]
    fn test_plain_sum_per_hour() {
        let s = series(&[
            (0, Some(1.0)),
            (15, Some(2.0)),
            (30, None),
            (45, Some(3.0)),
            (60, Some(10.0)),
        ]);
        let hourly = aggregate_plain(&s);
        assert_eq!(hourly.len(), 2);
        assert_eq!(hourly.observations[0], Observation::new(at(0), Some(6.0)));
        assert_eq!(hourly.observations[1], Observation::new(at(60), Some(10.0)));
    }

    #[test]
    fn test_plain_sum_all_missing_hour_is_zero() {
        let s = series(&[(0, Some(1.0)), (60, None), (75, None), (120, Some(2.0))]);
        let hourly = aggregate_plain(&s);
        assert_eq!(hourly.len(), 3);
        assert_eq!(hourly.observations[1], Observation::new(at(60), Some(0.0)));
        assert_eq!(hourly.observations[2].value, Some(2.0));
    }

    #[test]
    fn test_normalized_scales_partial_hour() {
        let v = 7.5;
        let s = series(&[
            (0, Some(1.0)),
            (15, Some(1.0)),
            (30, Some(1.0)),
            (45, Some(1.0)),
            (60, Some(v)),
            (90, Some(v)),
        ]);
        let hourly = aggregate_normalized(&s, quarter_hour());
        assert_eq!(hourly.observations[0].value, Some(4.0));
        assert_eq!(hourly.observations[1].value, Some(4.0 * v));
    }

    #[test]
    fn test_normalized_skips_unobserved_hours() {
        let s = series(&[
            (0, Some(1.0)),
            (60, None),
            (75, None),
            (90, None),
            (105, None),
            (120, Some(2.0)),
        ]);
        let hourly = aggregate_normalized(&s, quarter_hour());
        let hours: Vec<_> = hourly.observations.iter().map(|o| o.timestamp).collect();
        assert_eq!(hours, vec![at(0), at(120)]);
        assert_eq!(hourly.observations[0].value, Some(4.0));
    }

    #[test]
    fn test_normalized_sums_duplicates_into_one_interval() {
        let s = series(&[(0, Some(1.0)), (0, Some(2.0)), (15, Some(3.0))]);
        let hourly = aggregate_normalized(&s, quarter_hour());
        // Two observed intervals totalling 6, scaled by 4 / 2
        assert_eq!(hourly.observations[0].value, Some(12.0));
    }

    #[test]
    fn test_normalized_half_hour_frequency() {
        let s = series(&[(0, Some(3.0)), (30, Some(5.0)), (60, Some(4.0))]);
        let hourly = aggregate_normalized(&s, Frequency::from_minutes(30).unwrap());
        assert_eq!(hourly.observations[0].value, Some(8.0));
        assert_eq!(hourly.observations[1].value, Some(8.0));
    }

    #[test]
    fn test_normalized_requires_frequency() {
        let s = series(&[(0, Some(1.0))]);
        assert!(matches!(
            aggregate_hourly(&s, None, AggregationStrategy::NormalizedResample),
            Err(ProcessingError::InsufficientData { .. })
        ));
        assert!(aggregate_hourly(&s, None, AggregationStrategy::PlainSum).is_ok());
    }

    #[test]
    fn test_records_keep_series_keys() {
        let mut a = series(&[(0, Some(1.0))]);
        a.key = SeriesKey::new("DE", EnergyType::Generation, Some("B16"));
        let mut b = series(&[(0, Some(2.0)), (60, Some(3.0))]);
        b.key = SeriesKey::new("DE", EnergyType::Generation, Some("B19"));

        let records = to_hourly_records(&[a, b]);
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].key.energy_subtype.as_deref(), Some("B16"));
        assert_eq!(records[2].key.energy_subtype.as_deref(), Some("B19"));
        assert_eq!(records[2].hour, at(60));
    }
}
