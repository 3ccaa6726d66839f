//! Progress reporting for multi-module operations.

use indicatif::{ProgressBar, ProgressStyle};

/// How much the CLI should print while working.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Verbosity {
    /// --quiet: errors only, no progress
    Quiet,
    /// Default: status messages + progress bars
    #[default]
    Normal,
    /// --verbose: debug logs, no progress bars
    Verbose,
}

/// Progress bar wrapper that stays silent when it would get in the way.
///
/// The bar is shared by reference across rayon workers; `ProgressBar`
/// is internally synchronized.
pub struct Progress {
    pb: Option<ProgressBar>,
}

impl Progress {
    /// Create a progress bar over `total` items.
    ///
    /// No bar is drawn for quiet/verbose runs, JSON output, or a single item.
    pub fn new(total: u64, message: &str, verbosity: Verbosity, json: bool) -> Self {
        let pb = if verbosity != Verbosity::Normal || json || total <= 1 {
            None
        } else {
            let pb = ProgressBar::new(total);
            if let Ok(style) = ProgressStyle::default_bar()
                .template("{spinner:.green} {msg} [{bar:40.cyan/blue}] {pos}/{len}")
            {
                pb.set_style(style.progress_chars("#>-"));
            }
            pb.set_message(message.to_string());
            Some(pb)
        };

        Progress { pb }
    }

    /// A progress reporter that never draws.
    pub fn hidden() -> Self {
        Progress { pb: None }
    }

    /// Record one finished item.
    pub fn inc(&self) {
        if let Some(pb) = &self.pb {
            pb.inc(1);
        }
    }

    /// Clear the bar once all work is done.
    pub fn finish(&self) {
        if let Some(pb) = &self.pb {
            pb.finish_and_clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_bar_when_not_interactive() {
        assert!(Progress::new(10, "checking", Verbosity::Quiet, false).pb.is_none());
        assert!(Progress::new(10, "checking", Verbosity::Verbose, false).pb.is_none());
        assert!(Progress::new(10, "checking", Verbosity::Normal, true).pb.is_none());
        assert!(Progress::new(1, "checking", Verbosity::Normal, false).pb.is_none());
    }

    #[test]
    fn test_bar_for_many_items() {
        let progress = Progress::new(3, "checking", Verbosity::Normal, false);
        assert!(progress.pb.is_some());
        progress.inc();
        progress.finish();
    }
}
