use anyhow::{bail, Context, Result};
use clap::{Parser, ValueEnum};
use log::info;
use series_pipeline::pipeline::{INTERIM_REPORT_TITLE, RAW_REPORT_TITLE};
use series_pipeline::{
    DataPaths, InterimDataProcessor, Mode, PipelineConfig, RawDataProcessor, StatisticsTracker,
};
use std::path::PathBuf;

mod progress;

use progress::BarProgress;

#[derive(Parser, Debug)]
#[command(name = "energy_data_processor")]
#[command(about = "Turn raw ENTSO-E load and generation exports into an hourly forecasting dataset")]
struct Args {
    /// Transform raw files into per-(region, type) interim files
    #[arg(long)]
    process_raw_data: bool,

    /// Merge interim files into the processed table
    #[arg(long)]
    process_interim_data: bool,

    /// Dataset split to process
    #[arg(short, long, value_enum)]
    mode: Option<ModeArg>,

    /// Expand every series onto its native time grid
    #[arg(long)]
    fill_time_series_gaps: bool,

    /// Linearly interpolate missing values
    #[arg(long)]
    impute_missing_values: bool,

    /// Scale hourly sums by expected / observed sub-intervals
    #[arg(long)]
    account_for_missing_intervals: bool,

    /// Treat zero readings as dropouts and interpolate them
    #[arg(long)]
    interpolate_zeros: bool,

    /// Root of the raw/, interim/ and processed/ directories
    #[arg(long, default_value = "data")]
    data_dir: PathBuf,

    /// Where the statistics reports are written
    #[arg(long, default_value = "reports")]
    reports_dir: PathBuf,

    /// JSON pipeline configuration; flags given on the command line take precedence
    #[arg(long)]
    config: Option<PathBuf>,

    /// Regions to process, comma separated
    #[arg(long, value_delimiter = ',')]
    regions: Option<Vec<String>>,

    /// Process (region, type) pairs concurrently
    #[arg(long)]
    parallel: bool,

    /// Worker threads (defaults to the number of CPUs)
    #[arg(short, long)]
    jobs: Option<usize>,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum ModeArg {
    Train,
    Validation,
}

impl From<ModeArg> for Mode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Train => Mode::Train,
            ModeArg::Validation => Mode::Validation,
        }
    }
}

fn build_config(args: &Args) -> Result<PipelineConfig> {
    let mut config = match &args.config {
        Some(path) => PipelineConfig::from_json_file(path)
            .with_context(|| format!("Failed to load configuration from {}", path.display()))?,
        None => PipelineConfig::default(),
    };

    if let Some(mode) = args.mode {
        config.mode = mode.into();
    }
    config.fill_time_series_gaps |= args.fill_time_series_gaps;
    config.impute_missing_values |= args.impute_missing_values;
    config.account_for_missing_intervals |= args.account_for_missing_intervals;
    config.interpolate_zeros |= args.interpolate_zeros;
    config.parallel |= args.parallel;
    if let Some(regions) = &args.regions {
        config.regions = regions.clone();
    }
    Ok(config)
}

fn process_raw_data(config: &PipelineConfig, paths: &DataPaths) -> Result<()> {
    info!("Processing raw data for {}", config.mode);
    let progress = BarProgress::new();
    let mut stats = StatisticsTracker::new();

    let outcome = RawDataProcessor::new(config, paths, &progress)
        .and_then(|processor| processor.process_all(&mut stats));
    progress.finish();

    // Report whatever completed, even if a series failed
    stats.display(RAW_REPORT_TITLE);
    let report = paths.raw_report(config.mode);
    stats
        .write_report(&report, RAW_REPORT_TITLE)
        .with_context(|| format!("Failed to write {}", report.display()))?;

    let written = outcome.context("Raw data processing failed")?;
    info!("Wrote {} interim files", written.len());
    Ok(())
}

fn process_interim_data(config: &PipelineConfig, paths: &DataPaths) -> Result<()> {
    info!("Merging interim data for {}", config.mode);
    let mut stats = StatisticsTracker::new();

    let outcome = InterimDataProcessor::new(config, paths).process(&mut stats);

    stats.display(INTERIM_REPORT_TITLE);
    let report = paths.interim_report(config.mode);
    stats
        .write_report(&report, INTERIM_REPORT_TITLE)
        .with_context(|| format!("Failed to write {}", report.display()))?;

    let processed = outcome.context("Interim data processing failed")?;
    info!("Processed dataset at {}", processed.display());
    Ok(())
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    if !args.process_raw_data && !args.process_interim_data {
        bail!("Nothing to do: pass --process-raw-data and/or --process-interim-data");
    }

    rayon::ThreadPoolBuilder::new()
        .num_threads(args.jobs.unwrap_or_else(num_cpus::get))
        .build_global()
        .context("Failed to configure the worker pool")?;

    let config = build_config(&args)?;
    let paths = DataPaths::new(&args.data_dir, &args.reports_dir);
    info!(
        "Mode {} with {} worker threads, stages: {}",
        config.mode,
        rayon::current_num_threads(),
        config
            .stages(series_pipeline::EnergyType::Generation)
            .iter()
            .map(|s| s.to_string())
            .collect::<Vec<_>>()
            .join(" -> ")
    );

    if args.process_raw_data {
        process_raw_data(&config, &paths)?;
    }
    if args.process_interim_data {
        process_interim_data(&config, &paths)?;
    }

    info!("Done");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_flags_build_config() {
        let args = Args::try_parse_from([
            "energy_data_processor",
            "--process-raw-data",
            "--mode",
            "validation",
            "--fill-time-series-gaps",
            "--regions",
            "HU,DE",
        ])
        .unwrap();
        let config = build_config(&args).unwrap();

        assert_eq!(config.mode, Mode::Validation);
        assert!(config.fill_time_series_gaps);
        assert!(!config.impute_missing_values);
        assert_eq!(config.regions, vec!["HU".to_string(), "DE".to_string()]);
    }

    #[test]
    fn test_flags_override_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pipeline.json");
        fs::write(&path, r#"{"mode": "validation", "interpolate_zeros": true}"#).unwrap();

        let args = Args::try_parse_from([
            "energy_data_processor",
            "--process-interim-data",
            "--config",
            path.to_str().unwrap(),
            "--mode",
            "train",
            "--parallel",
        ])
        .unwrap();
        let config = build_config(&args).unwrap();

        assert_eq!(config.mode, Mode::Train);
        assert!(config.interpolate_zeros);
        assert!(config.parallel);
    }

    #[test]
    fn test_end_to_end_run() {
        let dir = tempfile::tempdir().unwrap();
        let raw = dir.path().join("data").join("raw").join("train");
        fs::create_dir_all(&raw).unwrap();
        let mut body = "StartTime,EndTime,AreaID,UnitName,Load\n".to_string();
        for hour in 0..3 {
            body.push_str(&format!(
                "2023-01-01T{:02}:00+00:00Z,2023-01-01T{:02}:00+00:00Z,10YHU,MAW,{}\n",
                hour,
                hour + 1,
                hour * 10
            ));
        }
        fs::write(raw.join("load_HU.csv"), body).unwrap();

        let config = PipelineConfig {
            regions: vec!["HU".to_string()],
            energy_types: vec![series_pipeline::EnergyType::Load],
            ..PipelineConfig::default()
        };
        let paths = DataPaths::new(dir.path().join("data"), dir.path().join("reports"));

        process_raw_data(&config, &paths).unwrap();
        process_interim_data(&config, &paths).unwrap();

        assert!(paths.raw_report(Mode::Train).exists());
        assert!(paths.interim_report(Mode::Train).exists());
        let processed = fs::read_to_string(paths.processed_file(Mode::Train)).unwrap();
        assert_eq!(processed.lines().count(), 4);
    }
}
