use std::sync::Mutex;
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use udb_core::core::events::ProgressSink;

fn count_style() -> ProgressStyle {
    ProgressStyle::with_template("{spinner:.green} {msg} [{bar:40.cyan/blue}] {pos}/{len} seg ({eta})")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("=> ")
}

fn bytes_style() -> ProgressStyle {
    ProgressStyle::with_template(
        "{spinner:.green} {msg} [{bar:40.green/white}] {bytes}/{total_bytes} @ {bytes_per_sec}",
    )
    .unwrap_or_else(|_| ProgressStyle::default_bar())
    .progress_chars("=> ")
}

/// Terminal progress bar for the bulk stage of a job. One bar at a time;
/// `start` replaces whatever bar was showing.
pub struct TerminalProgress {
    bar: Mutex<Option<ProgressBar>>,
    disabled: bool,
}

impl TerminalProgress {
    pub fn new() -> Self {
        Self {
            bar: Mutex::new(None),
            disabled: false,
        }
    }

    pub fn new_disabled() -> Self {
        Self {
            bar: Mutex::new(None),
            disabled: true,
        }
    }

    fn with_bar(&self, f: impl FnOnce(&ProgressBar)) {
        let guard = self.bar.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(bar) = guard.as_ref() {
            f(bar);
        }
    }
}

impl Default for TerminalProgress {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressSink for TerminalProgress {
    fn start(&self, label: &str, total: u64) {
        if self.disabled {
            return;
        }
        let bar = if total == 0 {
            ProgressBar::new_spinner()
        } else {
            let bar = ProgressBar::new(total);
            bar.set_style(if label == "segments" {
                count_style()
            } else {
                bytes_style()
            });
            bar
        };
        bar.set_message(label.to_string());
        bar.enable_steady_tick(Duration::from_millis(200));

        let mut guard = self.bar.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(old) = guard.replace(bar) {
            old.finish_and_clear();
        }
    }

    fn advance(&self, delta: u64, _message: &str) {
        self.with_bar(|bar| bar.inc(delta));
    }

    fn finish(&self) {
        let mut guard = self.bar.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(bar) = guard.take() {
            bar.finish_and_clear();
        }
    }
}
