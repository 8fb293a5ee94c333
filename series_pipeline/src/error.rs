use polars::prelude::PolarsError;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProcessingError {
    #[error("{file}: StartTime '{value}' does not follow the YYYY-MM-DDTHH:MM+00:00Z convention")]
    Format { file: PathBuf, value: String },

    #[error("{series}: expected exactly one unit, found {units:?}")]
    UnitMismatch { series: String, units: Vec<String> },

    #[error("frequency estimation needs at least 2 distinct timestamps, got {got}")]
    InsufficientData { got: usize },

    #[error("no raw files match '{pattern}'")]
    MissingInput { pattern: String },

    #[error("{file}: interim file names must look like '<region>_<type>.csv'")]
    InterimName { file: PathBuf },

    #[error("{series}: {source}")]
    Series {
        series: String,
        #[source]
        source: Box<ProcessingError>,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Polars error: {0}")]
    Polars(#[from] PolarsError),

    #[error("invalid file pattern: {0}")]
    Pattern(#[from] glob::PatternError),

    #[error("cannot read directory entry: {0}")]
    Glob(#[from] glob::GlobError),

    #[error("invalid regular expression: {0}")]
    Regex(#[from] regex::Error),

    #[error("invalid configuration: {0}")]
    Config(#[from] serde_json::Error),
}

impl ProcessingError {
    /// Attaches the series label to an error raised inside a per-series stage
    pub fn in_series(self, series: impl Into<String>) -> Self {
        match self {
            already @ ProcessingError::Series { .. } => already,
            other => ProcessingError::Series {
                series: series.into(),
                source: Box::new(other),
            },
        }
    }

    /// The innermost error, skipping series context
    pub fn root(&self) -> &ProcessingError {
        match self {
            ProcessingError::Series { source, .. } => source.root(),
            other => other,
        }
    }
}

pub type Result<T> = std::result::Result<T, ProcessingError>;
