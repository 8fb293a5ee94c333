use crate::error::{ProcessingError, Result};
use crate::models::EnergyType;
use crate::statistics::StatisticsTracker;
use glob::{glob, Pattern};
use log::info;
use polars::prelude::*;
use regex::Regex;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

const INTERIM_NAME_PATTERN: &str = r"^([A-Za-z]+)_(gen|load)\.csv$";

/// Joins the per-(region, type) interim files of one mode into the wide processed table.
pub struct InterimMerger {
    interim_dir: PathBuf,
    file_name: Regex,
}

impl InterimMerger {
    pub fn new(interim_dir: &Path) -> Result<Self> {
        Ok(Self {
            interim_dir: interim_dir.to_path_buf(),
            file_name: Regex::new(INTERIM_NAME_PATTERN)?,
        })
    }

    fn file_pattern(&self) -> String {
        format!("{}/*.csv", Pattern::escape(&self.interim_dir.to_string_lossy()))
    }

    /// Interim files in name order, which fixes the column order of the merged table
    pub fn interim_files(&self) -> Result<Vec<PathBuf>> {
        let mut files = Vec::new();
        for entry in glob(&self.file_pattern())? {
            files.push(entry?);
        }
        files.sort();
        Ok(files)
    }

    /// `HU_gen.csv` -> ("HU", Generation)
    pub fn parse_file_name(&self, path: &Path) -> Result<(String, EnergyType)> {
        let name_error = || ProcessingError::InterimName {
            file: path.to_path_buf(),
        };
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(name_error)?;
        let caps = self.file_name.captures(name).ok_or_else(name_error)?;
        let energy_type = caps[2].parse::<EnergyType>().map_err(|_| name_error())?;
        Ok((caps[1].to_string(), energy_type))
    }

    /// Reads one interim file and reduces it to `[timestamp, {region}_{type}]`.
    pub fn prepare(&self, path: &Path, stats: &mut StatisticsTracker) -> Result<DataFrame> {
        let (region, energy_type) = self.parse_file_name(path)?;
        let column = format!("{}_{}", region, energy_type);

        let df = read_interim(path)?;
        let before = df.shape();

        let prepared = match energy_type {
            EnergyType::Generation => green_total(&df, &column)?,
            EnergyType::Load => {
                let mut selected = df.select(["timestamp", "value"])?;
                selected.rename("value", &column)?;
                selected
            }
        };

        let file = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        stats.update_file_stats(&file, before, prepared.shape());
        info!("{}: {:?} -> {:?}", file, before, prepared.shape());
        Ok(prepared)
    }

    /// Outer-joins every interim file on `timestamp` and sorts the result ascending.
    /// The row set is the union of all timestamps, absent series read as null.
    pub fn merge(&self, stats: &mut StatisticsTracker) -> Result<DataFrame> {
        let files = self.interim_files()?;
        if files.is_empty() {
            return Err(ProcessingError::MissingInput {
                pattern: self.file_pattern(),
            });
        }

        let mut merged: Option<DataFrame> = None;
        for file in &files {
            let prepared = self.prepare(file, stats)?;
            merged = Some(match merged {
                None => prepared,
                Some(acc) => acc.outer_join(&prepared, ["timestamp"], ["timestamp"])?,
            });
        }

        let merged = match merged {
            Some(df) => df.sort(["timestamp"], false, false)?,
            None => DataFrame::default(),
        };
        stats.update_merged_stats(merged.shape());
        info!("Merged {} interim files into {:?}", files.len(), merged.shape());
        Ok(merged)
    }
}

fn read_interim(path: &Path) -> Result<DataFrame> {
    let mut schema_overrides = Schema::new();
    schema_overrides.with_column("timestamp".into(), DataType::Utf8);
    schema_overrides.with_column("value".into(), DataType::Float64);

    let df = CsvReader::new(fs::File::open(path)?)
        .has_header(true)
        .with_dtypes(Some(Arc::new(schema_overrides)))
        .finish()?;
    Ok(df)
}

/// Sums the green subtypes of a long generation table per timestamp, skipping missing
/// values. A timestamp where every subtype is missing sums to zero.
fn green_total(df: &DataFrame, column: &str) -> Result<DataFrame> {
    let timestamps = df.column("timestamp")?.utf8()?;
    let values = df.column("value")?.f64()?;

    let mut totals: BTreeMap<String, f64> = BTreeMap::new();
    for (timestamp, value) in timestamps.into_iter().zip(values.into_iter()) {
        let Some(timestamp) = timestamp else { continue };
        let sum = totals.entry(timestamp.to_string()).or_insert(0.0);
        if let Some(v) = value.filter(|v| !v.is_nan()) {
            *sum += v;
        }
    }

    let (hours, sums): (Vec<String>, Vec<f64>) = totals.into_iter().unzip();
    let df = DataFrame::new(vec![
        Series::new("timestamp", hours),
        Series::new(column, sums),
    ])?;
    Ok(df)
}

/// Writes the processed table, creating its directory first
pub fn write_processed(df: &mut DataFrame, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut file = fs::File::create(path)?;
    CsvWriter::new(&mut file).has_header(true).finish(df)?;
    info!("Processed data saved to {} {:?}", path.display(), df.shape());
    Ok(())
}
