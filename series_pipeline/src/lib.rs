pub mod models;
pub mod error;
pub mod data_loader;
pub mod frequency;
pub mod gap_filler;
pub mod imputer;
pub mod aggregator;
pub mod merger;
pub mod statistics;
pub mod pipeline;

pub use aggregator::AggregationStrategy;
pub use data_loader::SeriesLoader;
pub use error::{ProcessingError, Result};
pub use merger::InterimMerger;
pub use models::{EnergyType, Frequency, Mode, Observation, Series, SeriesKey};
pub use pipeline::{
    DataPaths, InterimDataProcessor, NoProgress, PipelineConfig, ProgressObserver, RawDataProcessor,
    Stage,
};
pub use statistics::StatisticsTracker;
