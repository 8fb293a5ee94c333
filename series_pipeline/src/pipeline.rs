use crate::aggregator::{aggregate_hourly, to_hourly_records, AggregationStrategy};
use crate::data_loader::{
    filter_green_energy, normalize_columns, partition_series, CanonicalRow, RawSeries, SeriesLoader,
};
use crate::error::{ProcessingError, Result};
use crate::frequency::estimate_frequency;
use crate::gap_filler::fill_gaps;
use crate::imputer::{impute_missing, interpolate_zeros};
use crate::merger::{write_processed, InterimMerger};
use crate::models::{format_timestamp, EnergyType, Frequency, HourlyRecord, Mode, Series, REGIONS};
use crate::statistics::{CountKind, StatisticsTracker};
use log::{debug, info, warn};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

pub const RAW_REPORT_TITLE: &str = "Data Processing Report";
pub const INTERIM_REPORT_TITLE: &str = "Interim Data Processing Report";

/// One step of the raw -> interim transform, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Load,
    Normalize,
    FilterGreen,
    EstimateFrequency,
    FillGaps,
    ImputeMissing,
    InterpolateZeros,
    Aggregate(AggregationStrategy),
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Load => f.write_str("load"),
            Stage::Normalize => f.write_str("normalize columns"),
            Stage::FilterGreen => f.write_str("filter green energy"),
            Stage::EstimateFrequency => f.write_str("estimate frequency"),
            Stage::FillGaps => f.write_str("fill gaps"),
            Stage::ImputeMissing => f.write_str("impute missing values"),
            Stage::InterpolateZeros => f.write_str("interpolate zeros"),
            Stage::Aggregate(AggregationStrategy::PlainSum) => f.write_str("hourly sum"),
            Stage::Aggregate(AggregationStrategy::NormalizedResample) => {
                f.write_str("normalized hourly resample")
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub mode: Mode,
    pub fill_time_series_gaps: bool,
    pub impute_missing_values: bool,
    pub account_for_missing_intervals: bool,
    pub interpolate_zeros: bool,
    pub parallel: bool,
    pub regions: Vec<String>,
    pub energy_types: Vec<EnergyType>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            mode: Mode::Train,
            fill_time_series_gaps: false,
            impute_missing_values: false,
            account_for_missing_intervals: false,
            interpolate_zeros: false,
            parallel: false,
            regions: REGIONS.iter().map(|r| r.to_string()).collect(),
            energy_types: EnergyType::ALL.to_vec(),
        }
    }
}

impl PipelineConfig {
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    pub fn aggregation_strategy(&self) -> AggregationStrategy {
        if self.account_for_missing_intervals {
            AggregationStrategy::NormalizedResample
        } else {
            AggregationStrategy::PlainSum
        }
    }

    /// The active stages for one energy type. Disabled stages are left out entirely.
    pub fn stages(&self, energy_type: EnergyType) -> Vec<Stage> {
        let mut stages = vec![Stage::Load, Stage::Normalize];
        if energy_type.has_subtype() {
            stages.push(Stage::FilterGreen);
        }
        stages.push(Stage::EstimateFrequency);
        if self.fill_time_series_gaps {
            stages.push(Stage::FillGaps);
        }
        if self.impute_missing_values {
            stages.push(Stage::ImputeMissing);
        }
        if self.interpolate_zeros {
            stages.push(Stage::InterpolateZeros);
        }
        stages.push(Stage::Aggregate(self.aggregation_strategy()));
        stages
    }

    /// (region, type) jobs in processing order
    pub fn jobs(&self) -> Vec<(String, EnergyType)> {
        self.regions
            .iter()
            .flat_map(|region| self.energy_types.iter().map(move |t| (region.clone(), *t)))
            .collect()
    }
}

/// Directory layout under a data root and a reports root.
#[derive(Debug, Clone)]
pub struct DataPaths {
    pub data_dir: PathBuf,
    pub reports_dir: PathBuf,
}

impl DataPaths {
    pub fn new(data_dir: impl Into<PathBuf>, reports_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            reports_dir: reports_dir.into(),
        }
    }

    pub fn raw_root(&self) -> PathBuf {
        self.data_dir.join("raw")
    }

    pub fn interim_dir(&self, mode: Mode) -> PathBuf {
        self.data_dir.join("interim").join(mode.as_str())
    }

    pub fn interim_file(&self, mode: Mode, region: &str, energy_type: EnergyType) -> PathBuf {
        self.interim_dir(mode)
            .join(format!("{}_{}.csv", region, energy_type))
    }

    pub fn processed_file(&self, mode: Mode) -> PathBuf {
        self.data_dir
            .join("processed")
            .join(format!("{}.csv", mode))
    }

    pub fn raw_report(&self, mode: Mode) -> PathBuf {
        self.reports_dir
            .join(format!("{}_data_processing_report.txt", mode))
    }

    pub fn interim_report(&self, mode: Mode) -> PathBuf {
        self.reports_dir
            .join(format!("{}_interim_data_processing_report.txt", mode))
    }
}

/// Progress callbacks for long runs. Implementations must be shareable across workers.
pub trait ProgressObserver: Sync {
    fn phase_started(&self, _total: usize) {}
    fn series_started(&self, _label: &str) {}
    fn series_finished(&self, _label: &str) {}
}

pub struct NoProgress;

impl ProgressObserver for NoProgress {}

/// Working state of one (region, type) job as it moves through the stages.
struct SeriesTable {
    energy_type: EnergyType,
    region: String,
    raw: Option<RawSeries>,
    rows: Vec<CanonicalRow>,
    series: Vec<(Series, Option<Frequency>)>,
    hourly: Vec<HourlyRecord>,
}

impl SeriesTable {
    fn new(energy_type: EnergyType, region: &str) -> Self {
        Self {
            energy_type,
            region: region.to_string(),
            raw: None,
            rows: Vec::new(),
            series: Vec::new(),
            hourly: Vec::new(),
        }
    }

    fn label(&self) -> String {
        format!("{}_{}", self.energy_type, self.region)
    }

    fn series_rows(&self) -> usize {
        self.series.iter().map(|(s, _)| s.len()).sum()
    }

    fn missing(&self) -> usize {
        self.series.iter().map(|(s, _)| s.missing_count()).sum()
    }
}

pub struct RawDataProcessor<'a> {
    config: &'a PipelineConfig,
    paths: &'a DataPaths,
    loader: SeriesLoader,
    observer: &'a dyn ProgressObserver,
}

impl<'a> RawDataProcessor<'a> {
    pub fn new(
        config: &'a PipelineConfig,
        paths: &'a DataPaths,
        observer: &'a dyn ProgressObserver,
    ) -> Result<Self> {
        Ok(Self {
            config,
            paths,
            loader: SeriesLoader::new(&paths.raw_root(), config.mode)?,
            observer,
        })
    }

    /// Runs every configured (region, type) job and writes one interim file per job.
    ///
    /// In parallel mode each job records into its own tracker; the trackers are merged in
    /// job order once all jobs have returned. Statistics of jobs that completed are kept
    /// in `stats` even when another job fails.
    pub fn process_all(&self, stats: &mut StatisticsTracker) -> Result<Vec<PathBuf>> {
        let jobs = self.config.jobs();
        self.observer.phase_started(jobs.len());
        info!(
            "Processing {} raw series for {} ({} stages max)",
            jobs.len(),
            self.config.mode,
            self.config.stages(EnergyType::Generation).len()
        );

        if !self.config.parallel {
            let mut written = Vec::with_capacity(jobs.len());
            for (region, energy_type) in &jobs {
                written.push(self.process_one(*energy_type, region, stats)?);
            }
            return Ok(written);
        }

        let results: Vec<(StatisticsTracker, Result<PathBuf>)> = jobs
            .par_iter()
            .map(|(region, energy_type)| {
                let mut local = StatisticsTracker::new();
                let result = self.process_one(*energy_type, region, &mut local);
                (local, result)
            })
            .collect();

        let mut written = Vec::with_capacity(results.len());
        let mut first_error = None;
        for (local, result) in results {
            stats.merge(local);
            match result {
                Ok(path) => written.push(path),
                Err(e) => {
                    if first_error.is_none() {
                        first_error = Some(e);
                    }
                }
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(written),
        }
    }

    /// Transforms one (region, type) pair and writes its interim file
    pub fn process_one(
        &self,
        energy_type: EnergyType,
        region: &str,
        stats: &mut StatisticsTracker,
    ) -> Result<PathBuf> {
        let label = format!("{}_{}", energy_type, region);
        self.observer.series_started(&label);

        let records = self
            .transform(energy_type, region, stats)
            .map_err(|e| e.in_series(label.clone()))?;
        let path = self.paths.interim_file(self.config.mode, region, energy_type);
        write_interim(&path, energy_type, &records).map_err(|e| e.in_series(label.clone()))?;

        info!("Saved {} ({} hourly rows)", path.display(), records.len());
        self.observer.series_finished(&label);
        Ok(path)
    }

    /// Walks the configured stage list over one (region, type) pair
    pub fn transform(
        &self,
        energy_type: EnergyType,
        region: &str,
        stats: &mut StatisticsTracker,
    ) -> Result<Vec<HourlyRecord>> {
        let mut table = SeriesTable::new(energy_type, region);
        for stage in self.config.stages(energy_type) {
            debug!("{}: {}", table.label(), stage);
            self.run_stage(&mut table, stage, stats)?;
        }
        Ok(table.hourly)
    }

    fn run_stage(
        &self,
        table: &mut SeriesTable,
        stage: Stage,
        stats: &mut StatisticsTracker,
    ) -> Result<()> {
        let (energy_type, region) = (table.energy_type, table.region.clone());
        match stage {
            Stage::Load => {
                let raw = self.loader.load(energy_type, &region)?;
                stats.update_count(energy_type, &region, CountKind::Original, raw.rows.len());
                table.raw = Some(raw);
            }
            Stage::Normalize => {
                if let Some(raw) = table.raw.take() {
                    table.rows = normalize_columns(raw)?;
                }
            }
            Stage::FilterGreen => {
                let before = table.rows.len();
                table.rows = filter_green_energy(std::mem::take(&mut table.rows));
                let delta = table.rows.len() as i64 - before as i64;
                if delta != 0 {
                    stats.log_reason(energy_type, &region, "Filtered non-green energy", delta);
                }
            }
            Stage::EstimateFrequency => {
                let before = table.rows.len();
                let (series, merged) =
                    partition_series(std::mem::take(&mut table.rows), energy_type, &region);
                if merged > 0 {
                    stats.log_reason(
                        energy_type,
                        &region,
                        "Merged duplicate timestamps",
                        -(merged as i64),
                    );
                }
                debug!("{}: {} rows in {} series", table.label(), before, series.len());

                table.series = series
                    .into_iter()
                    .map(|s| {
                        let frequency = match estimate_frequency(&s.timestamps()) {
                            Ok(frequency) => {
                                stats.record_frequency(
                                    energy_type,
                                    &region,
                                    &frequency_label(&s),
                                    frequency,
                                );
                                Some(frequency)
                            }
                            Err(e) => {
                                warn!("{}: {}", s.key, e);
                                None
                            }
                        };
                        (s, frequency)
                    })
                    .collect();
            }
            Stage::FillGaps => {
                let before = table.series_rows();
                for (series, frequency) in table.series.iter_mut() {
                    if let Some(frequency) = frequency {
                        *series = fill_gaps(series, *frequency);
                    }
                }
                let delta = table.series_rows() as i64 - before as i64;
                if delta != 0 {
                    stats.log_reason(energy_type, &region, "Filled time series gaps", delta);
                }
            }
            Stage::ImputeMissing => {
                let before = table.missing();
                for (series, _) in table.series.iter_mut() {
                    impute_missing(series);
                }
                let imputed = before.saturating_sub(table.missing());
                stats.update_count(energy_type, &region, CountKind::Imputed, imputed);
                if imputed > 0 {
                    stats.log_reason(energy_type, &region, "Imputed missing values", imputed as i64);
                }
            }
            Stage::InterpolateZeros => {
                let corrected: usize = table
                    .series
                    .iter_mut()
                    .map(|(series, _)| interpolate_zeros(series))
                    .sum();
                stats.update_count(energy_type, &region, CountKind::ZeroCorrected, corrected);
                if corrected > 0 {
                    stats.log_reason(
                        energy_type,
                        &region,
                        "Interpolated zero values",
                        corrected as i64,
                    );
                }
            }
            Stage::Aggregate(strategy) => {
                let before = table.series_rows();
                let hourly = table
                    .series
                    .iter()
                    .map(|(series, frequency)| {
                        aggregate_hourly(series, *frequency, strategy)
                            .map_err(|e| e.in_series(series.key.to_string()))
                    })
                    .collect::<Result<Vec<Series>>>()?;
                table.hourly = to_hourly_records(&hourly);

                let after = table.hourly.len();
                stats.update_count(energy_type, &region, CountKind::Processed, after);
                let delta = after as i64 - before as i64;
                if delta != 0 {
                    stats.log_reason(energy_type, &region, "Aggregated to hourly", delta);
                }
            }
        }
        Ok(())
    }
}

fn frequency_label(series: &Series) -> String {
    series
        .key
        .energy_subtype
        .clone()
        .unwrap_or_else(|| series.key.energy_type.to_string())
}

fn format_value(value: Option<f64>) -> String {
    match value {
        Some(v) if !v.is_nan() => v.to_string(),
        _ => String::new(),
    }
}

/// Writes `timestamp,[energy_subtype,]value`; a missing value is an empty field
pub fn write_interim(path: &Path, energy_type: EnergyType, records: &[HourlyRecord]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut writer = csv::Writer::from_path(path)?;
    if energy_type.has_subtype() {
        writer.write_record(["timestamp", "energy_subtype", "value"])?;
        for record in records {
            writer.write_record([
                format_timestamp(&record.hour),
                record.key.energy_subtype.clone().unwrap_or_default(),
                format_value(record.value),
            ])?;
        }
    } else {
        writer.write_record(["timestamp", "value"])?;
        for record in records {
            writer.write_record([format_timestamp(&record.hour), format_value(record.value)])?;
        }
    }
    writer.flush()?;
    Ok(())
}

/// Merges the interim files of one mode into the processed table
pub struct InterimDataProcessor<'a> {
    config: &'a PipelineConfig,
    paths: &'a DataPaths,
}

impl<'a> InterimDataProcessor<'a> {
    pub fn new(config: &'a PipelineConfig, paths: &'a DataPaths) -> Self {
        Self { config, paths }
    }

    pub fn process(&self, stats: &mut StatisticsTracker) -> Result<PathBuf> {
        let interim_dir = self.paths.interim_dir(self.config.mode);
        if !interim_dir.is_dir() {
            return Err(ProcessingError::MissingInput {
                pattern: interim_dir.display().to_string(),
            });
        }

        let merger = InterimMerger::new(&interim_dir)?;
        let mut merged = merger.merge(stats)?;
        let path = self.paths.processed_file(self.config.mode);
        write_processed(&mut merged, &path)?;
        Ok(path)
    }
}
