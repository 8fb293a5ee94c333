use crate::models::{Frequency, Observation, Series};
use chrono::{DateTime, Utc};
use log::warn;
use std::collections::HashMap;

/// Expand a series onto the regular grid `[first, last]` spaced by `frequency`.
///
/// Instants absent from the input get a missing marker. Readings that do not fall on the
/// grid are dropped, so the output spacing is exact. A series with fewer than two
/// readings is returned unchanged.
pub fn fill_gaps(series: &Series, frequency: Frequency) -> Series {
    let (start, end) = match (
        series.observations.iter().map(|o| o.timestamp).min(),
        series.observations.iter().map(|o| o.timestamp).max(),
    ) {
        (Some(start), Some(end)) if series.len() > 1 => (start, end),
        _ => return series.clone(),
    };

    let known: HashMap<DateTime<Utc>, Option<f64>> = series
        .observations
        .iter()
        .map(|o| (o.timestamp, o.value))
        .collect();

    let step = frequency.duration();
    let mut observations = Vec::new();
    let mut on_grid = 0;
    let mut current = start;
    while current <= end {
        let value = match known.get(&current) {
            Some(value) => {
                on_grid += 1;
                *value
            }
            None => None,
        };
        observations.push(Observation::new(current, value));
        current = current + step;
    }

    let off_grid = known.len() - on_grid;
    if off_grid > 0 {
        warn!(
            "{}: {} readings are not aligned to the {} grid and were dropped",
            series.key, off_grid, frequency
        );
    }

    Series::new(series.key.clone(), observations)
}
