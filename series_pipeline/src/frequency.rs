use crate::error::{ProcessingError, Result};
use crate::models::Frequency;
use chrono::{DateTime, Utc};
use std::collections::HashMap;

/// Estimate the sampling interval of a series as the most common gap between
/// consecutive timestamps.
///
/// Upstream intervals are constant apart from occasional outages, so the mode is the
/// native frequency where the mean would be dragged upwards by every gap. Ties go to
/// the interval seen first in timestamp order.
pub fn estimate_frequency(timestamps: &[DateTime<Utc>]) -> Result<Frequency> {
    let mut sorted = timestamps.to_vec();
    sorted.sort_unstable();
    sorted.dedup();

    if sorted.len() < 2 {
        return Err(ProcessingError::InsufficientData { got: sorted.len() });
    }

    let mut counts: Vec<(i64, usize)> = Vec::new();
    let mut slots: HashMap<i64, usize> = HashMap::new();
    for pair in sorted.windows(2) {
        let delta = (pair[1] - pair[0]).num_seconds();
        if delta <= 0 {
            continue;
        }
        match slots.get(&delta) {
            Some(&slot) => counts[slot].1 += 1,
            None => {
                slots.insert(delta, counts.len());
                counts.push((delta, 1));
            }
        }
    }

    let mut best: Option<(i64, usize)> = None;
    for &(delta, count) in &counts {
        match best {
            Some((_, best_count)) if count <= best_count => {}
            _ => best = Some((delta, count)),
        }
    }

    best.and_then(|(delta, _)| Frequency::from_seconds(delta))
        .ok_or(ProcessingError::InsufficientData { got: sorted.len() })
}
