//! Terminal progress reporting with indicatif.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use harvester_core::{ProgressReporter, RunSummary};
use harvester_shared::{FetchOutcome, Index};
use indicatif::{ProgressBar, ProgressStyle};

/// Spinner during discovery, then a bar with throughput while downloading.
pub(crate) struct CliProgress {
    bar: ProgressBar,
    started: Instant,
    bytes: AtomicU64,
}

impl CliProgress {
    pub(crate) fn new() -> Self {
        let bar = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::with_template("{spinner:.cyan} {msg}") {
            bar.set_style(
                style.tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
            );
        }
        bar.enable_steady_tick(Duration::from_millis(80));
        Self {
            bar,
            started: Instant::now(),
            bytes: AtomicU64::new(0),
        }
    }

    /// Silent reporter for `--stdout` runs where the terminal belongs to the artifact.
    pub(crate) fn hidden() -> Self {
        Self {
            bar: ProgressBar::hidden(),
            started: Instant::now(),
            bytes: AtomicU64::new(0),
        }
    }
}

/// Average throughput in KB/s.
fn kb_per_sec(bytes: u64, elapsed: Duration) -> f64 {
    let secs = elapsed.as_secs_f64();
    if secs > 0.0 {
        bytes as f64 / 1024.0 / secs
    } else {
        0.0
    }
}

impl ProgressReporter for CliProgress {
    fn phase(&self, name: &str) {
        self.bar.set_message(name.to_string());
    }

    fn discovered(&self, total: u32) {
        if total == 0 {
            return;
        }
        self.bar.set_length(u64::from(total));
        self.bar.set_position(0);
        if let Ok(style) = ProgressStyle::with_template(
            "{spinner:.cyan} {msg} [{bar:30.cyan/blue}] {pos}/{len} ETA {eta}",
        ) {
            self.bar.set_style(style.progress_chars("=> "));
        }
    }

    fn document_completed(
        &self,
        _index: Index,
        outcome: &FetchOutcome,
        completed: usize,
        _total: usize,
    ) {
        if let Some(text) = outcome.text() {
            self.bytes.fetch_add(text.len() as u64, Ordering::Relaxed);
        }
        let speed = kb_per_sec(self.bytes.load(Ordering::Relaxed), self.started.elapsed());
        self.bar.set_position(completed as u64);
        self.bar
            .set_message(format!("Downloading reports ({speed:.2} KB/s)"));
    }

    fn done(&self, _summary: &RunSummary) {
        self.bar.finish_and_clear();
    }
}
