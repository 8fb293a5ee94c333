use indicatif::{ProgressBar, ProgressStyle};
use series_pipeline::ProgressObserver;

/// Progress bar over the (region, type) jobs of one phase
pub struct BarProgress {
    bar: ProgressBar,
}

impl BarProgress {
    pub fn new() -> Self {
        let bar = ProgressBar::new(0);
        bar.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar()),
        );
        Self { bar }
    }

    pub fn finish(&self) {
        self.bar.finish_with_message("done");
    }
}

impl ProgressObserver for BarProgress {
    fn phase_started(&self, total: usize) {
        self.bar.set_length(total as u64);
    }

    fn series_started(&self, label: &str) {
        self.bar.set_message(label.to_string());
    }

    fn series_finished(&self, _label: &str) {
        self.bar.inc(1);
    }
}
