//! Progress feedback for long-running export phases
//!
//! [`ProgressTracker`] counts batches as they are fetched. [`Spinner`] is a
//! busy indicator for phases with no measurable progress (size check,
//! merge); it clears itself when dropped, so early returns and `?` errors
//! never leave it on screen.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use indicatif::{ProgressBar, ProgressStyle};

/// Progress tracker for batch fetching
///
/// Tracks fetched batches and rows, and optionally displays a progress bar
/// with the running row total.
pub struct ProgressTracker {
    /// Batches completed so far
    completed: AtomicU64,
    /// Rows received so far
    rows: AtomicU64,
    /// Start time of the operation
    start_time: Instant,
    /// Progress bar (optional, can be disabled)
    bar: Option<ProgressBar>,
}

impl ProgressTracker {
    /// Create a new progress tracker
    ///
    /// # Arguments
    /// * `total_batches` - Number of batches that will be fetched
    /// * `enable_bar` - Whether to display a progress bar
    pub fn new(total_batches: u64, enable_bar: bool) -> Self {
        let bar = enable_bar.then(|| {
            let bar = ProgressBar::new(total_batches);
            if let Ok(style) = ProgressStyle::default_bar()
                .template("{spinner:.green} [{bar:40.cyan/blue}] batch {pos}/{len} {msg}")
            {
                bar.set_style(style.progress_chars("#>-"));
            }
            bar
        });

        Self {
            completed: AtomicU64::new(0),
            rows: AtomicU64::new(0),
            start_time: Instant::now(),
            bar,
        }
    }

    /// Tracker that records counts without drawing anything
    pub fn hidden() -> Self {
        Self::new(0, false)
    }

    /// Record one finished batch
    ///
    /// # Arguments
    /// * `label` - Batch window, shown next to the bar
    /// * `rows` - Rows the batch returned
    pub fn batch_done(&self, label: &str, rows: u64) {
        let completed = self.completed.fetch_add(1, Ordering::Relaxed) + 1;
        let total_rows = self.rows.fetch_add(rows, Ordering::Relaxed) + rows;

        if let Some(ref bar) = self.bar {
            bar.set_position(completed);
            let elapsed = self.start_time.elapsed().as_secs_f64();
            if elapsed > 0.0 {
                bar.set_message(format!(
                    "{label} ({total_rows} rows, {:.1} batches/sec)",
                    completed as f64 / elapsed
                ));
            } else {
                bar.set_message(format!("{label} ({total_rows} rows)"));
            }
        }
    }

    pub fn completed(&self) -> u64 {
        self.completed.load(Ordering::Relaxed)
    }

    pub fn rows(&self) -> u64 {
        self.rows.load(Ordering::Relaxed)
    }

    /// Finish and clear the progress bar
    pub fn finish(&self) {
        if let Some(ref bar) = self.bar {
            bar.finish_and_clear();
        }
    }
}

/// Scoped busy indicator
pub struct Spinner {
    bar: Option<ProgressBar>,
}

impl Spinner {
    /// Start a spinner with a message, or a no-op guard when disabled
    pub fn start(message: &str, enabled: bool) -> Self {
        let bar = enabled.then(|| {
            let bar = ProgressBar::new_spinner();
            if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.green} {msg}") {
                bar.set_style(style);
            }
            bar.set_message(message.to_string());
            bar.enable_steady_tick(Duration::from_millis(100));
            bar
        });
        Self { bar }
    }

    pub fn is_active(&self) -> bool {
        self.bar.as_ref().is_some_and(|b| !b.is_finished())
    }
}

impl Drop for Spinner {
    fn drop(&mut self) {
        if let Some(bar) = self.bar.take() {
            bar.finish_and_clear();
        }
    }
}
