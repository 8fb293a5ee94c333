use crate::error::{ProcessingError, Result};
use crate::models::{EnergyType, Mode, Observation, Series, SeriesKey, GREEN_ENERGY};
use chrono::{DateTime, Utc};
use glob::{glob, Pattern};
use log::{debug, info, warn};
use regex::Regex;
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

/// Raw StartTime values look like `2023-01-01T00:15+00:00Z`
const START_TIME_PATTERN: &str = r"^\d{4}-\d{2}-\d{2}T\d{2}:\d{2}\+00:00Z$";
const START_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M%:z";

/// One row of a raw source file. Generation files carry `PsrType` and `quantity`,
/// load files carry `Load`.
#[derive(Debug, Clone, Deserialize)]
pub struct RawRecord {
    #[serde(rename = "StartTime")]
    pub start_time: String,
    #[serde(rename = "EndTime", default)]
    pub end_time: Option<String>,
    #[serde(rename = "AreaID", default)]
    pub area_id: Option<String>,
    #[serde(rename = "UnitName", default)]
    pub unit_name: Option<String>,
    #[serde(rename = "PsrType", default)]
    pub psr_type: Option<String>,
    #[serde(rename = "quantity", alias = "Load", default)]
    pub value: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RawRow {
    pub timestamp: DateTime<Utc>,
    pub unit: Option<String>,
    pub energy_subtype: Option<String>,
    pub value: Option<f64>,
}

/// Every raw row found for one (energy type, region) pair.
#[derive(Debug, Clone)]
pub struct RawSeries {
    pub energy_type: EnergyType,
    pub region: String,
    pub rows: Vec<RawRow>,
    pub files: Vec<PathBuf>,
    pub dropped_without_area: usize,
}

impl RawSeries {
    pub fn label(&self) -> String {
        format!("{}_{}", self.energy_type, self.region)
    }
}

/// Row in the canonical `{timestamp, [energy_subtype,] value}` schema.
#[derive(Debug, Clone, PartialEq)]
pub struct CanonicalRow {
    pub timestamp: DateTime<Utc>,
    pub energy_subtype: Option<String>,
    pub value: Option<f64>,
}

pub struct SeriesLoader {
    raw_dir: PathBuf,
    start_time: Regex,
}

impl SeriesLoader {
    /// Loader over `{raw_root}/{mode}/`
    pub fn new(raw_root: &Path, mode: Mode) -> Result<Self> {
        Ok(Self {
            raw_dir: raw_root.join(mode.as_str()),
            start_time: Regex::new(START_TIME_PATTERN)?,
        })
    }

    pub fn raw_dir(&self) -> &Path {
        &self.raw_dir
    }

    fn file_pattern(&self, energy_type: EnergyType, region: &str) -> String {
        let dir = Pattern::escape(&self.raw_dir.to_string_lossy());
        format!("{}/{}_{}*.csv", dir, energy_type, region)
    }

    /// Raw files whose name starts with `{type}_{region}`, in name order
    pub fn matching_files(&self, energy_type: EnergyType, region: &str) -> Result<Vec<PathBuf>> {
        let pattern = self.file_pattern(energy_type, region);
        let mut files = Vec::new();
        for entry in glob(&pattern)? {
            files.push(entry?);
        }
        files.sort();
        Ok(files)
    }

    /// Read and concatenate every raw file of one (type, region) pair.
    ///
    /// Any StartTime outside the expected convention aborts the whole pair. Rows without
    /// an area identifier are dropped here and are not reported as data loss.
    pub fn load(&self, energy_type: EnergyType, region: &str) -> Result<RawSeries> {
        let files = self.matching_files(energy_type, region)?;
        if files.is_empty() {
            return Err(ProcessingError::MissingInput {
                pattern: self.file_pattern(energy_type, region),
            });
        }

        let mut rows = Vec::new();
        let mut dropped_without_area = 0;

        for file in &files {
            let records = self.read_file(file)?;
            info!("Loading {}, {} rows", file.display(), records.len());

            for record in records {
                let timestamp = self.parse_start_time(file, &record.start_time)?;
                let has_area = record
                    .area_id
                    .as_deref()
                    .map_or(false, |area| !area.trim().is_empty());
                if !has_area {
                    dropped_without_area += 1;
                    continue;
                }
                rows.push(RawRow {
                    timestamp,
                    unit: record.unit_name,
                    energy_subtype: record.psr_type,
                    value: record.value,
                });
            }
        }

        if dropped_without_area > 0 {
            warn!(
                "{}_{}: dropped {} rows without an area identifier",
                energy_type, region, dropped_without_area
            );
        }

        Ok(RawSeries {
            energy_type,
            region: region.to_string(),
            rows,
            files,
            dropped_without_area,
        })
    }

    fn read_file(&self, path: &Path) -> Result<Vec<RawRecord>> {
        let mut reader = csv::Reader::from_path(path)?;
        let mut records = Vec::new();
        for result in reader.deserialize::<RawRecord>() {
            records.push(result?);
        }
        Ok(records)
    }

    fn parse_start_time(&self, file: &Path, value: &str) -> Result<DateTime<Utc>> {
        let format_error = || ProcessingError::Format {
            file: file.to_path_buf(),
            value: value.to_string(),
        };
        if !self.start_time.is_match(value) {
            return Err(format_error());
        }
        let trimmed = value.strip_suffix('Z').ok_or_else(format_error)?;
        DateTime::parse_from_str(trimmed, START_TIME_FORMAT)
            .map(|ts| ts.with_timezone(&Utc))
            .map_err(|_| format_error())
    }
}

/// Reduce raw rows to the canonical schema, requiring a single unit across the series
pub fn normalize_columns(raw: RawSeries) -> Result<Vec<CanonicalRow>> {
    let units: BTreeSet<String> = raw
        .rows
        .iter()
        .map(|row| row.unit.clone().unwrap_or_default())
        .collect();
    if units.len() != 1 {
        return Err(ProcessingError::UnitMismatch {
            series: raw.label(),
            units: units.into_iter().collect(),
        });
    }

    let keep_subtype = raw.energy_type.has_subtype();
    Ok(raw
        .rows
        .into_iter()
        .map(|row| CanonicalRow {
            timestamp: row.timestamp,
            energy_subtype: if keep_subtype { row.energy_subtype } else { None },
            value: row.value,
        })
        .collect())
}

pub fn is_green_energy(subtype: &str) -> bool {
    GREEN_ENERGY.iter().any(|code| *code == subtype)
}

/// Keep generation rows whose production type is on the green-energy allow-list
pub fn filter_green_energy(rows: Vec<CanonicalRow>) -> Vec<CanonicalRow> {
    rows.into_iter()
        .filter(|row| row.energy_subtype.as_deref().map_or(false, is_green_energy))
        .collect()
}

/// Split canonical rows into one timestamp-ordered series per subtype.
///
/// Readings reported twice for the same instant are summed. Returns the series in subtype
/// order together with the number of rows folded away.
pub fn partition_series(
    rows: Vec<CanonicalRow>,
    energy_type: EnergyType,
    region: &str,
) -> (Vec<Series>, usize) {
    let total = rows.len();
    let mut groups: BTreeMap<Option<String>, BTreeMap<DateTime<Utc>, Option<f64>>> = BTreeMap::new();

    for row in rows {
        let slot = groups
            .entry(row.energy_subtype)
            .or_default()
            .entry(row.timestamp)
            .or_insert(None);
        *slot = match (*slot, row.value) {
            (Some(a), Some(b)) => Some(a + b),
            (a, b) => a.or(b),
        };
    }

    let series: Vec<Series> = groups
        .into_iter()
        .map(|(subtype, points)| {
            let key = SeriesKey::new(region, energy_type, subtype.as_deref());
            let observations = points
                .into_iter()
                .map(|(timestamp, value)| Observation::new(timestamp, value))
                .collect();
            Series::new(key, observations)
        })
        .collect();

    let unique: usize = series.iter().map(Series::len).sum();
    debug!(
        "{}_{}: {} series, {} duplicate rows merged",
        energy_type,
        region,
        series.len(),
        total - unique
    );
    (series, total - unique)
}
