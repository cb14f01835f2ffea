//! Output formatting and progress indicators
//!
//! This module provides utilities for displaying progress bars,
//! status lines and errors. Machine-readable output goes to stdout,
//! everything else to stderr.

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::io::IsTerminal;
use std::sync::OnceLock;

static OUTPUT: OnceLock<OutputConfig> = OnceLock::new();

/// Global output settings derived from `-v`, `-q` and `--json`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OutputConfig {
    pub quiet: bool,
    pub json: bool,
    pub verbose: u8,
}

impl OutputConfig {
    pub fn new(quiet: bool, json: bool, verbose: u8) -> Self {
        Self {
            quiet,
            json,
            verbose,
        }
    }

    /// Make this configuration visible to [`OutputConfig::current`]
    pub fn apply_global(self) {
        let _ = OUTPUT.set(self);
    }

    /// The configuration applied at startup (defaults if none was applied)
    pub fn current() -> Self {
        OUTPUT.get().copied().unwrap_or_default()
    }

    /// Default `tracing` filter directive for this verbosity
    pub fn log_level(&self) -> &'static str {
        match (self.quiet, self.verbose) {
            (true, _) => "error",
            (false, 0) => "warn",
            (false, 1) => "info",
            (false, _) => "debug",
        }
    }

    /// True if progress bars and status lines should be drawn
    pub fn show_progress(&self) -> bool {
        !self.quiet && !self.json
    }
}

/// Create a progress bar for build steps
pub fn create_build_bar(total: u64) -> ProgressBar {
    let config = OutputConfig::current();
    if !config.show_progress() || !std::io::stderr().is_terminal() {
        return ProgressBar::with_draw_target(Some(total), ProgressDrawTarget::hidden());
    }
    let pb = ProgressBar::new(total);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} images ({msg})")
            .expect("Invalid progress bar template")
            .progress_chars("█▓▒░"),
    );
    pb
}

/// Print a status line to stderr unless quiet or in JSON mode
pub fn print_status(prefix: &str, message: &str) {
    if OutputConfig::current().show_progress() {
        eprintln!("{prefix} {message}");
    }
}

/// Print an error and its causes to stderr as `error: <context>: <cause>`
pub fn display_error(error: &anyhow::Error) {
    if OutputConfig::current().json {
        eprintln!("{}", serde_json::json!({ "error": format!("{error:#}") }));
        return;
    }
    eprintln!("{} error: {error:#}", status::ERROR);
}

/// Status message prefixes
pub mod status {
    /// Success prefix (green checkmark)
    pub const SUCCESS: &str = "✓";

    /// Error prefix (red X)
    pub const ERROR: &str = "✗";

    /// Warning prefix (yellow triangle)
    pub const WARNING: &str = "⚠";
}
