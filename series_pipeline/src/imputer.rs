use crate::models::Series;

fn is_present(value: Option<f64>) -> bool {
    value.map_or(false, |v| !v.is_nan())
}

/// Positional linear interpolation over missing slots, clamped to the nearest known value
/// at both edges. Present values are never touched. Returns the number of slots filled.
pub fn interpolate_linear(values: &mut [Option<f64>]) -> usize {
    let known: Vec<usize> = values
        .iter()
        .enumerate()
        .filter(|(_, v)| is_present(**v))
        .map(|(i, _)| i)
        .collect();

    let (first, last) = match (known.first(), known.last()) {
        (Some(&first), Some(&last)) => (first, last),
        _ => return 0,
    };

    let mut filled = 0;
    let head = values[first];
    for slot in values.iter_mut().take(first) {
        *slot = head;
        filled += 1;
    }
    let tail = values[last];
    for slot in values.iter_mut().skip(last + 1) {
        *slot = tail;
        filled += 1;
    }

    for pair in known.windows(2) {
        let (left, right) = (pair[0], pair[1]);
        if right - left < 2 {
            continue;
        }
        if let (Some(a), Some(b)) = (values[left], values[right]) {
            let span = (right - left) as f64;
            for i in left + 1..right {
                values[i] = Some(a + (b - a) * (i - left) as f64 / span);
                filled += 1;
            }
        }
    }

    filled
}

/// Fill every missing reading of a series by linear interpolation between its neighbours.
/// Returns how many readings were imputed.
pub fn impute_missing(series: &mut Series) -> usize {
    let mut values: Vec<Option<f64>> = series.observations.iter().map(|o| o.value).collect();
    let filled = interpolate_linear(&mut values);
    for (observation, value) in series.observations.iter_mut().zip(values) {
        observation.value = value;
    }
    filled
}

/// Replace zero readings, treated as sensor dropouts, by interpolating between the
/// surrounding non-zero readings.
///
/// Readings that were already missing stay missing: they are masked before interpolation
/// and restored afterwards. A series without any non-zero reading is left unchanged.
///
/// Returns how many zero readings were replaced. The count is what the report shows as
/// "Zero values corrected", a proxy for the corrected magnitude: the summed value of the
/// replaced zeros is always 0 and carries no information.
pub fn interpolate_zeros(series: &mut Series) -> usize {
    let zeros_before = series.zero_count();
    if zeros_before == 0 {
        return 0;
    }

    let originally_missing: Vec<bool> = series.observations.iter().map(|o| o.is_missing()).collect();
    let mut values: Vec<Option<f64>> = series
        .observations
        .iter()
        .map(|o| if o.value == Some(0.0) { None } else { o.value })
        .collect();

    if !values.iter().any(|v| is_present(*v)) {
        return 0;
    }

    interpolate_linear(&mut values);

    for ((observation, value), missing) in series
        .observations
        .iter_mut()
        .zip(values)
        .zip(originally_missing)
    {
        observation.value = if missing { None } else { value };
    }

    zeros_before - series.zero_count()
}
