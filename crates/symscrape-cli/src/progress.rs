use indicatif::{ProgressBar, ProgressStyle};
use std::path::Path;
use std::time::Duration;
use symscrape_core::{ProgressReporter, RunPhase};

const TICKS: &str = "⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏";

/// CLI progress reporter using an indicatif progress bar.
///
/// The job total grows while the walk is still running, so the bar length is
/// bumped on every submission.
pub struct CliReporter {
    bar: ProgressBar,
}

impl CliReporter {
    pub fn new() -> Self {
        let style = ProgressStyle::with_template(
            "  {spinner:.cyan} {msg} [{bar:30.cyan/dim}] {pos}/{len} jobs",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("━╸─")
        .tick_chars(TICKS);

        let bar = ProgressBar::new(0);
        bar.set_style(style);
        Self { bar }
    }
}

impl ProgressReporter for CliReporter {
    fn on_phase(&self, phase: RunPhase) {
        match phase {
            RunPhase::Walking => {
                self.bar.set_message("Scanning");
                self.bar.enable_steady_tick(Duration::from_millis(80));
            }
            RunPhase::Dispatching => self.bar.set_message("Dumping"),
            RunPhase::Draining => self.bar.set_message("Finishing"),
            RunPhase::Idle | RunPhase::Done => {}
        }
    }

    fn on_candidate(&self, candidates: usize, _path: &Path) {
        if self.bar.length() == Some(0) {
            self.bar.set_message(format!("Scanning ({} binaries)", candidates));
        }
    }

    fn on_job_submitted(&self, submitted: usize) {
        self.bar.set_length(submitted as u64);
    }

    fn on_job_complete(&self, done: usize, _submitted: usize) {
        self.bar.set_position(done as u64);
    }

    fn on_complete(&self, accepted: usize, duration_secs: f64) {
        self.bar.finish_and_clear();
        eprintln!(
            "  \x1b[32m✓\x1b[0m Dump complete: {} new symbol files in {:.2}s",
            accepted, duration_secs
        );
    }
}
