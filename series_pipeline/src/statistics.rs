use crate::error::Result;
use crate::models::{EnergyType, Frequency};
use log::info;
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::Path;

/// Row-count change or value fill attributed to a named stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReasonEvent {
    pub reason: String,
    pub delta: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CountKind {
    Original,
    Processed,
    Imputed,
    ZeroCorrected,
}

/// Counters for one (energy type, region) section of the report.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatisticsRecord {
    pub original_count: Option<usize>,
    pub processed_count: Option<usize>,
    pub imputed_count: usize,
    pub zero_corrected_count: usize,
    pub estimated_frequencies: Vec<(String, Frequency)>,
    pub reasons: Vec<ReasonEvent>,
}

impl StatisticsRecord {
    fn absorb(&mut self, other: StatisticsRecord) {
        if other.original_count.is_some() {
            self.original_count = other.original_count;
        }
        if other.processed_count.is_some() {
            self.processed_count = other.processed_count;
        }
        self.imputed_count += other.imputed_count;
        self.zero_corrected_count += other.zero_corrected_count;
        self.estimated_frequencies.extend(other.estimated_frequencies);
        self.reasons.extend(other.reasons);
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileShape {
    pub file: String,
    pub before: (usize, usize),
    pub after: (usize, usize),
}

/// Append-only record of every count and row-delta observed during one phase of a run.
///
/// Sections are keyed by (energy type, region) and rendered in key order, so the report
/// does not depend on the order in which series finished. Within a section, reasons keep
/// the order they were logged in.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatisticsTracker {
    sections: BTreeMap<(EnergyType, String), StatisticsRecord>,
    files: Vec<FileShape>,
    merged_shape: Option<(usize, usize)>,
}

impl StatisticsTracker {
    pub fn new() -> Self {
        Self::default()
    }

    fn section(&mut self, energy_type: EnergyType, region: &str) -> &mut StatisticsRecord {
        self.sections
            .entry((energy_type, region.to_string()))
            .or_default()
    }

    /// Original and processed counts are overwritten, imputed and zero-corrected counts accumulate
    pub fn update_count(&mut self, energy_type: EnergyType, region: &str, kind: CountKind, count: usize) {
        let record = self.section(energy_type, region);
        match kind {
            CountKind::Original => record.original_count = Some(count),
            CountKind::Processed => record.processed_count = Some(count),
            CountKind::Imputed => record.imputed_count += count,
            CountKind::ZeroCorrected => record.zero_corrected_count += count,
        }
    }

    pub fn log_reason(&mut self, energy_type: EnergyType, region: &str, reason: &str, delta: i64) {
        self.section(energy_type, region).reasons.push(ReasonEvent {
            reason: reason.to_string(),
            delta,
        });
    }

    pub fn record_frequency(
        &mut self,
        energy_type: EnergyType,
        region: &str,
        series: &str,
        frequency: Frequency,
    ) {
        self.section(energy_type, region)
            .estimated_frequencies
            .push((series.to_string(), frequency));
    }

    pub fn update_file_stats(&mut self, file: &str, before: (usize, usize), after: (usize, usize)) {
        self.files.push(FileShape {
            file: file.to_string(),
            before,
            after,
        });
    }

    pub fn update_merged_stats(&mut self, shape: (usize, usize)) {
        self.merged_shape = Some(shape);
    }

    pub fn record(&self, energy_type: EnergyType, region: &str) -> Option<&StatisticsRecord> {
        self.sections.get(&(energy_type, region.to_string()))
    }

    pub fn files(&self) -> &[FileShape] {
        &self.files
    }

    pub fn merged_shape(&self) -> Option<(usize, usize)> {
        self.merged_shape
    }

    pub fn is_empty(&self) -> bool {
        self.sections.is_empty() && self.files.is_empty() && self.merged_shape.is_none()
    }

    /// Folds a worker-local tracker into this one, keeping per-section event order
    pub fn merge(&mut self, other: StatisticsTracker) {
        for (key, record) in other.sections {
            self.sections.entry(key).or_default().absorb(record);
        }
        self.files.extend(other.files);
        if other.merged_shape.is_some() {
            self.merged_shape = other.merged_shape;
        }
    }

    /// Report view for `title`; formatting it renders the full report text
    pub fn report<'a>(&'a self, title: &'a str) -> ReportView<'a> {
        ReportView {
            tracker: self,
            title,
        }
    }

    pub fn render_report(&self, title: &str) -> String {
        self.report(title).to_string()
    }

    /// Echoes the report through the logger
    pub fn display(&self, title: &str) {
        for line in self.render_report(title).lines() {
            info!("{}", line);
        }
    }

    pub fn write_report(&self, path: &Path, title: &str) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, self.render_report(title))?;
        info!("Report written to {}", path.display());
        Ok(())
    }
}

pub struct ReportView<'a> {
    tracker: &'a StatisticsTracker,
    title: &'a str,
}

impl fmt::Display for ReportView<'_> {
    fn fmt(&self, out: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (tracker, title) = (self.tracker, self.title);
        writeln!(out, "{}", title)?;
        writeln!(out, "{}", "=".repeat(60))?;

        for ((energy_type, region), record) in &tracker.sections {
            writeln!(out)?;
            writeln!(out, "Energy type: {} | Region: {}", energy_type, region)?;
            writeln!(out, "  Original count:        {}", fmt_count(record.original_count))?;
            writeln!(out, "  Processed count:       {}", fmt_count(record.processed_count))?;
            writeln!(out, "  Imputed values:        {}", record.imputed_count)?;
            writeln!(out, "  Zero values corrected: {}", record.zero_corrected_count)?;
            if !record.estimated_frequencies.is_empty() {
                let freqs: Vec<String> = record
                    .estimated_frequencies
                    .iter()
                    .map(|(series, freq)| format!("{}={}", series, freq))
                    .collect();
                writeln!(out, "  Estimated frequency:   {}", freqs.join(", "))?;
            }
            writeln!(out, "  Reasons:")?;
            if record.reasons.is_empty() {
                writeln!(out, "    (none)")?;
            }
            for event in &record.reasons {
                writeln!(out, "    - {}: {:+}", event.reason, event.delta)?;
            }
        }

        if !tracker.files.is_empty() {
            writeln!(out)?;
            writeln!(out, "Interim files:")?;
            for shape in &tracker.files {
                writeln!(
                    out,
                    "  {}: {} rows x {} columns -> {} rows x {} columns",
                    shape.file, shape.before.0, shape.before.1, shape.after.0, shape.after.1
                )?;
            }
        }

        if let Some((rows, cols)) = tracker.merged_shape {
            writeln!(out)?;
            writeln!(out, "Merged table: {} rows x {} columns", rows, cols)?;
        }

        Ok(())
    }
}

fn fmt_count(count: Option<usize>) -> String {
    count.map_or_else(|| "n/a".to_string(), |c| c.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_tracker() -> StatisticsTracker {
        let mut stats = StatisticsTracker::new();
        stats.update_count(EnergyType::Load, "HU", CountKind::Original, 96);
        stats.log_reason(EnergyType::Load, "HU", "Filled time series gaps", 4);
        stats.update_count(EnergyType::Load, "HU", CountKind::Imputed, 4);
        stats.log_reason(EnergyType::Load, "HU", "Imputed missing values", 4);
        stats.update_count(EnergyType::Load, "HU", CountKind::Processed, 24);
        stats.log_reason(EnergyType::Load, "HU", "Aggregated to hourly", -76);
        stats
    }

    #[test]
    fn test_report_is_deterministic() {
        let stats = sample_tracker();
        let first = stats.render_report("Data Processing Report");
        let second = sample_tracker().render_report("Data Processing Report");
        assert_eq!(first, second);
        assert!(first.contains("Energy type: load | Region: HU"));
        assert!(first.contains("    - Filled time series gaps: +4"));
        assert!(first.contains("    - Aggregated to hourly: -76"));
        assert!(first.contains("  Processed count:       24"));
    }

    #[test]
    fn test_counts_overwrite_or_accumulate() {
        let mut stats = StatisticsTracker::new();
        stats.update_count(EnergyType::Generation, "SP", CountKind::Processed, 10);
        stats.update_count(EnergyType::Generation, "SP", CountKind::Processed, 7);
        stats.update_count(EnergyType::Generation, "SP", CountKind::Imputed, 2);
        stats.update_count(EnergyType::Generation, "SP", CountKind::Imputed, 3);

        let record = stats.record(EnergyType::Generation, "SP").unwrap();
        assert_eq!(record.processed_count, Some(7));
        assert_eq!(record.imputed_count, 5);
        assert_eq!(record.original_count, None);
    }

    #[test]
    fn test_merge_keeps_per_section_order() {
        let mut global = StatisticsTracker::new();
        global.log_reason(EnergyType::Load, "HU", "first", -1);

        let mut worker = StatisticsTracker::new();
        worker.log_reason(EnergyType::Load, "IT", "other region", 3);
        worker.log_reason(EnergyType::Load, "HU", "second", 2);
        worker.update_count(EnergyType::Load, "HU", CountKind::Original, 12);
        global.merge(worker);

        let hu = global.record(EnergyType::Load, "HU").unwrap();
        let reasons: Vec<&str> = hu.reasons.iter().map(|r| r.reason.as_str()).collect();
        assert_eq!(reasons, vec!["first", "second"]);
        assert_eq!(hu.original_count, Some(12));
        assert_eq!(global.record(EnergyType::Load, "IT").unwrap().reasons.len(), 1);
    }

    #[test]
    fn test_sections_render_in_key_order() {
        let mut stats = StatisticsTracker::new();
        stats.update_count(EnergyType::Load, "SP", CountKind::Original, 1);
        stats.update_count(EnergyType::Generation, "SP", CountKind::Original, 1);
        stats.update_count(EnergyType::Load, "HU", CountKind::Original, 1);
        let report = stats.render_report("Report");

        let gen_sp = report.find("Energy type: gen | Region: SP").unwrap();
        let load_hu = report.find("Energy type: load | Region: HU").unwrap();
        let load_sp = report.find("Energy type: load | Region: SP").unwrap();
        assert!(gen_sp < load_hu && load_hu < load_sp);
    }

    #[test]
    fn test_file_and_merged_summary() {
        let mut stats = StatisticsTracker::new();
        stats.update_file_stats("HU_gen.csv", (48, 3), (24, 2));
        stats.update_merged_stats((30, 3));
        let report = stats.render_report("Interim Data Processing Report");
        assert!(report.contains("HU_gen.csv: 48 rows x 3 columns -> 24 rows x 2 columns"));
        assert!(report.contains("Merged table: 30 rows x 3 columns"));
    }

    #[test]
    fn test_report_view_formats_like_render() {
        let stats = sample_tracker();
        let formatted = format!("{}", stats.report("Data Processing Report"));
        assert_eq!(formatted, stats.render_report("Data Processing Report"));
        assert!(formatted.starts_with("Data Processing Report\n"));
    }

    #[test]
    fn test_write_report() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reports").join("train_data_processing_report.txt");
        let stats = sample_tracker();
        stats.write_report(&path, "Data Processing Report").unwrap();
        let written = fs::read_to_string(&path).unwrap();
        assert_eq!(written, stats.render_report("Data Processing Report"));
    }
}
