use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Bidding-zone regions processed on every run, in processing order.
pub const REGIONS: [&str; 9] = ["HU", "IT", "PO", "SP", "UK", "DE", "DK", "SE", "NE"];

/// ENTSO-E production types counted as green energy.
pub const GREEN_ENERGY: [&str; 10] = [
    "B01", // Biomass
    "B09", // Geothermal
    "B10", // Hydro pumped storage
    "B11", // Hydro run-of-river and poundage
    "B12", // Hydro water reservoir
    "B13", // Marine
    "B15", // Other renewable
    "B16", // Solar
    "B18", // Wind offshore
    "B19", // Wind onshore
];

pub const SECONDS_PER_HOUR: i64 = 3600;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum EnergyType {
    #[serde(rename = "gen")]
    Generation,
    #[serde(rename = "load")]
    Load,
}

impl EnergyType {
    pub const ALL: [EnergyType; 2] = [EnergyType::Generation, EnergyType::Load];

    pub fn as_str(&self) -> &'static str {
        match self {
            EnergyType::Generation => "gen",
            EnergyType::Load => "load",
        }
    }

    /// Generation readings carry a production type, load readings do not
    pub fn has_subtype(&self) -> bool {
        matches!(self, EnergyType::Generation)
    }
}

impl fmt::Display for EnergyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EnergyType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "gen" => Ok(EnergyType::Generation),
            "load" => Ok(EnergyType::Load),
            other => Err(format!("unknown energy type '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    #[default]
    Train,
    Validation,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Train => "train",
            Mode::Validation => "validation",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Mode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "train" => Ok(Mode::Train),
            "validation" => Ok(Mode::Validation),
            other => Err(format!("unknown mode '{}'", other)),
        }
    }
}

/// Identifies one series: region, energy type and (generation only) production type.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SeriesKey {
    pub region: String,
    pub energy_type: EnergyType,
    pub energy_subtype: Option<String>,
}

impl SeriesKey {
    pub fn new(region: &str, energy_type: EnergyType, energy_subtype: Option<&str>) -> Self {
        Self {
            region: region.to_string(),
            energy_type,
            energy_subtype: energy_subtype.map(str::to_string),
        }
    }

    /// Column name used for this series in the processed table
    pub fn column_name(&self) -> String {
        format!("{}_{}", self.region, self.energy_type)
    }
}

impl fmt::Display for SeriesKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.energy_subtype {
            Some(subtype) => write!(f, "{}_{}/{}", self.energy_type, self.region, subtype),
            None => write!(f, "{}_{}", self.energy_type, self.region),
        }
    }
}

/// One reading. `None` is the missing marker, distinct from a measured zero.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Observation {
    pub timestamp: DateTime<Utc>,
    pub value: Option<f64>,
}

impl Observation {
    pub fn new(timestamp: DateTime<Utc>, value: Option<f64>) -> Self {
        Self { timestamp, value }
    }

    pub fn is_missing(&self) -> bool {
        self.value.map_or(true, f64::is_nan)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Series {
    pub key: SeriesKey,
    pub observations: Vec<Observation>,
}

impl Series {
    pub fn new(key: SeriesKey, observations: Vec<Observation>) -> Self {
        Self { key, observations }
    }

    pub fn len(&self) -> usize {
        self.observations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observations.is_empty()
    }

    pub fn timestamps(&self) -> Vec<DateTime<Utc>> {
        self.observations.iter().map(|o| o.timestamp).collect()
    }

    pub fn missing_count(&self) -> usize {
        self.observations.iter().filter(|o| o.is_missing()).count()
    }

    pub fn zero_count(&self) -> usize {
        self.observations
            .iter()
            .filter(|o| o.value == Some(0.0))
            .count()
    }
}

/// Native sampling interval of a series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Frequency(Duration);

impl Frequency {
    /// Returns `None` for non-positive intervals
    pub fn from_seconds(seconds: i64) -> Option<Self> {
        if seconds > 0 {
            Some(Self(Duration::seconds(seconds)))
        } else {
            None
        }
    }

    pub fn from_minutes(minutes: i64) -> Option<Self> {
        Self::from_seconds(minutes * 60)
    }

    pub fn duration(&self) -> Duration {
        self.0
    }

    pub fn seconds(&self) -> i64 {
        self.0.num_seconds()
    }

    /// Sub-intervals a fully observed hour contains (4 for 15 minutes, 2 for 30 minutes).
    /// Intervals of an hour or longer count as one.
    pub fn intervals_per_hour(&self) -> usize {
        (SECONDS_PER_HOUR / self.seconds()).max(1) as usize
    }
}

impl fmt::Display for Frequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let secs = self.seconds();
        if secs % SECONDS_PER_HOUR == 0 {
            write!(f, "{}h", secs / SECONDS_PER_HOUR)
        } else if secs % 60 == 0 {
            write!(f, "{}min", secs / 60)
        } else {
            write!(f, "{}s", secs)
        }
    }
}

/// One aggregated hour of one series.
#[derive(Debug, Clone, PartialEq)]
pub struct HourlyRecord {
    pub hour: DateTime<Utc>,
    pub key: SeriesKey,
    pub value: Option<f64>,
}

/// Timestamp layout shared by the interim and processed files
pub fn format_timestamp(timestamp: &DateTime<Utc>) -> String {
    timestamp.format("%Y-%m-%d %H:%M:%S%:z").to_string()
}

/// Floors a timestamp onto a multiple of `period_seconds` since the Unix epoch
pub fn floor_to(timestamp: DateTime<Utc>, period_seconds: i64) -> DateTime<Utc> {
    let rem = timestamp.timestamp().rem_euclid(period_seconds);
    timestamp
        - Duration::seconds(rem)
        - Duration::nanoseconds(timestamp.timestamp_subsec_nanos() as i64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_intervals_per_hour() {
        assert_eq!(Frequency::from_minutes(15).unwrap().intervals_per_hour(), 4);
        assert_eq!(Frequency::from_minutes(30).unwrap().intervals_per_hour(), 2);
        assert_eq!(Frequency::from_minutes(60).unwrap().intervals_per_hour(), 1);
        assert_eq!(Frequency::from_minutes(120).unwrap().intervals_per_hour(), 1);
        assert!(Frequency::from_seconds(0).is_none());
    }

    #[test]
    fn test_frequency_display() {
        assert_eq!(Frequency::from_minutes(15).unwrap().to_string(), "15min");
        assert_eq!(Frequency::from_minutes(60).unwrap().to_string(), "1h");
        assert_eq!(Frequency::from_seconds(90).unwrap().to_string(), "90s");
    }

    #[test]
    fn test_floor_to_hour() {
        let ts = Utc.with_ymd_and_hms(2023, 1, 1, 10, 45, 0).unwrap();
        assert_eq!(
            floor_to(ts, SECONDS_PER_HOUR),
            Utc.with_ymd_and_hms(2023, 1, 1, 10, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_series_key_names() {
        let key = SeriesKey::new("HU", EnergyType::Generation, Some("B16"));
        assert_eq!(key.to_string(), "gen_HU/B16");
        assert_eq!(key.column_name(), "HU_gen");
        assert_eq!("load".parse::<EnergyType>().unwrap(), EnergyType::Load);
        assert_eq!("validation".parse::<Mode>().unwrap(), Mode::Validation);
    }

    #[test]
    fn test_timestamp_format() {
        let ts = Utc.with_ymd_and_hms(2023, 1, 1, 5, 0, 0).unwrap();
        assert_eq!(format_timestamp(&ts), "2023-01-01 05:00:00+00:00");
    }
}
