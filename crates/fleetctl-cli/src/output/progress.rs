//! Progress indicators for long-running operations (model pulls).

use indicatif::{ProgressBar as IndicatifProgressBar, ProgressStyle as IndicatifStyle};
use std::time::Duration;

/// Progress bar wrapper for CLI operations.
pub struct ProgressBar {
    inner: IndicatifProgressBar,
}

impl ProgressBar {
    /// Create a new spinner for indeterminate operations (manifest pull,
    /// polling loops).
    pub fn new_spinner(message: &str) -> Self {
        let pb = IndicatifProgressBar::new_spinner();
        pb.enable_steady_tick(Duration::from_millis(100));
        pb.set_style(
            IndicatifStyle::default_spinner()
                .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"])
                .template("{spinner:.green} {msg}")
                .unwrap(),
        );
        pb.set_message(message.to_string());
        Self { inner: pb }
    }

    /// Create a new progress bar for a layer with a known byte total.
    pub fn new(length: u64, message: &str) -> Self {
        let pb = IndicatifProgressBar::new(length);
        pb.set_style(
            IndicatifStyle::default_bar()
                .template("{spinner:.green} [{bar:40.cyan/blue}] {bytes}/{total_bytes} {msg}")
                .unwrap()
                .progress_chars("=>-"),
        );
        pb.set_message(message.to_string());
        Self { inner: pb }
    }

    pub fn set_message(&self, message: impl Into<String>) {
        self.inner.set_message(message.into());
    }

    pub fn set_position(&self, pos: u64) {
        self.inner.set_position(pos);
    }

    pub fn set_length(&self, len: u64) {
        self.inner.set_length(len);
    }

    pub fn finish_with_message(&self, message: impl Into<String>) {
        self.inner.finish_with_message(message.into());
    }

    pub fn abandon_with_message(&self, message: impl Into<String>) {
        self.inner.abandon_with_message(message.into());
    }
}

impl Drop for ProgressBar {
    fn drop(&mut self) {
        self.inner.finish_and_clear();
    }
}
