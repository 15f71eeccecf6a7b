//! Progress tracking for corpus embedding and index builds.

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::time::Duration;

/// Create a styled progress bar counting embedded documents.
pub fn create_progress_bar(total: u64, message: &str) -> ProgressBar {
    let pb = ProgressBar::new(total);
    let style = ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("#>-");
    pb.set_style(style);
    pb.set_message(message.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

/// Create a spinner for indeterminate progress, such as k-means training.
pub fn create_spinner(message: &str) -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    let style = ProgressStyle::default_spinner()
        .template("{spinner:.green} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
        .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]);
    spinner.set_style(style);
    spinner.set_message(message.to_string());
    spinner.enable_steady_tick(Duration::from_millis(80));
    spinner
}

/// Embedding progress that draws only when asked to.
///
/// Wraps the bar so the build path can report `(done, total)` without
/// caring whether output is a terminal or `--quiet` was passed.
pub struct EmbedProgress {
    bar: ProgressBar,
}

impl EmbedProgress {
    pub fn new(total: usize, visible: bool) -> Self {
        let bar = create_progress_bar(total as u64, "embedding documents");
        if !visible {
            bar.set_draw_target(ProgressDrawTarget::hidden());
        }
        Self { bar }
    }

    /// Record that `done` of `total` documents are embedded.
    pub fn update(&self, done: usize, total: usize) {
        self.bar.set_length(total as u64);
        self.bar.set_position(done as u64);
    }

    pub fn finish_with_message(&self, message: &str) {
        self.bar.finish_with_message(message.to_string());
    }

    pub fn position(&self) -> u64 {
        self.bar.position()
    }
}

/// Helper to display a temporary spinner during an operation.
pub fn with_spinner<F, T>(message: &str, visible: bool, operation: F) -> T
where
    F: FnOnce() -> T,
{
    let spinner = create_spinner(message);
    if !visible {
        spinner.set_draw_target(ProgressDrawTarget::hidden());
    }
    let result = operation();
    spinner.finish_and_clear();
    result
}
