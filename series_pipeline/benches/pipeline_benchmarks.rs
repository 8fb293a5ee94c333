use chrono::{Duration, TimeZone, Utc};
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use series_pipeline::aggregator::{aggregate_normalized, aggregate_plain};
use series_pipeline::frequency::estimate_frequency;
use series_pipeline::gap_filler::fill_gaps;
use series_pipeline::imputer::{impute_missing, interpolate_zeros};
use series_pipeline::{EnergyType, Frequency, Observation, Series, SeriesKey};

/// A year of quarter-hour readings with a dropout every 97th slot and a zero every 89th
fn synthetic_year() -> Series {
    let base = Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap();
    let observations = (0..365 * 96)
        .map(|i: i64| {
            let value = if i % 97 == 0 {
                None
            } else if i % 89 == 0 {
                Some(0.0)
            } else {
                Some(100.0 + (i % 96) as f64)
            };
            Observation::new(base + Duration::minutes(15 * i), value)
        })
        .collect();
    Series::new(SeriesKey::new("HU", EnergyType::Load, None), observations)
}

fn benchmark_frequency(c: &mut Criterion) {
    let timestamps = synthetic_year().timestamps();
    c.bench_function("estimate_frequency", |b| {
        b.iter(|| black_box(estimate_frequency(&timestamps)))
    });
}

fn benchmark_gap_fill_and_impute(c: &mut Criterion) {
    let mut sparse = synthetic_year();
    sparse.observations.retain(|o| o.value.is_some());
    let frequency = Frequency::from_minutes(15).unwrap();

    c.bench_function("fill_gaps_and_impute", |b| {
        b.iter(|| {
            let mut filled = fill_gaps(&sparse, frequency);
            black_box(impute_missing(&mut filled))
        })
    });

    let series = synthetic_year();
    c.bench_function("interpolate_zeros", |b| {
        b.iter(|| {
            let mut s = series.clone();
            black_box(interpolate_zeros(&mut s))
        })
    });
}

fn benchmark_aggregation(c: &mut Criterion) {
    let series = synthetic_year();
    let frequency = Frequency::from_minutes(15).unwrap();

    c.bench_function("aggregate_plain", |b| {
        b.iter(|| black_box(aggregate_plain(&series)))
    });
    c.bench_function("aggregate_normalized", |b| {
        b.iter(|| black_box(aggregate_normalized(&series, frequency)))
    });
}

criterion_group!(
    benches,
    benchmark_frequency,
    benchmark_gap_fill_and_impute,
    benchmark_aggregation
);
criterion_main!(benches);
