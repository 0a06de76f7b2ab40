//! Observers for the lifecycle of a single poll.

use crate::errors::AutomationError;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Hooks invoked by [`crate::Poller`] while it drives one poll.
///
/// Every hook defaults to doing nothing. Implementations should not panic;
/// the poller catches it if they do, but the hook's work is lost.
pub trait Tracker<T>: Send + Sync {
    fn on_start(&self) {}

    /// Called before each attempt, `attempt` counts from 1
    fn on_each(&self, _attempt: usize) {}

    fn on_success(&self, _value: &T, _elapsed: Duration, _attempts: usize) {}

    fn on_error(&self, _cause: &AutomationError, _elapsed: Duration, _attempts: usize) {}
}

/// Tracker for callers that do not care about progress
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopTracker;

impl<T> Tracker<T> for NoopTracker {}

/// Tracker that reports progress through `tracing`
#[derive(Debug, Clone)]
pub struct LogTracker {
    label: String,
    verbose: bool,
}

impl LogTracker {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            verbose: false,
        }
    }

    /// Report every attempt at `info` instead of `debug`
    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }
}

impl<T> Tracker<T> for LogTracker {
    fn on_start(&self) {
        debug!(label = %self.label, "Poll started");
    }

    fn on_each(&self, attempt: usize) {
        if self.verbose {
            info!(label = %self.label, attempt, "Poll attempt");
        } else {
            debug!(label = %self.label, attempt, "Poll attempt");
        }
    }

    fn on_success(&self, _value: &T, elapsed: Duration, attempts: usize) {
        info!(
            label = %self.label,
            attempts,
            elapsed_ms = elapsed.as_millis() as u64,
            "Poll succeeded"
        );
    }

    fn on_error(&self, cause: &AutomationError, elapsed: Duration, attempts: usize) {
        warn!(
            label = %self.label,
            attempts,
            elapsed_ms = elapsed.as_millis() as u64,
            error = %cause,
            "Poll failed"
        );
    }
}
