//! Bounded retry over time.
//!
//! A [`Poller`] keeps re-evaluating an attempt until it yields a value or
//! fails hard. It gives up once the [`PollSpec`] deadline passes. Waiting between attempts is the
//! only suspension point and never blocks the runtime's worker.

use crate::errors::AutomationError;
use crate::tracker::{LogTracker, Tracker};
use futures::FutureExt;
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{instrument, trace, warn};

/// Default deadline for one poll
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Default spacing between attempts
pub const DEFAULT_PERIOD: Duration = Duration::from_millis(200);

/// Timing of one poll. `timeout >= period > 0` always holds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollSpec {
    timeout: Duration,
    period: Duration,
    label: String,
}

impl PollSpec {
    pub fn new(
        timeout: Duration,
        period: Duration,
        label: impl Into<String>,
    ) -> Result<Self, AutomationError> {
        let label = label.into();
        if period.is_zero() {
            return Err(AutomationError::InvalidArgument(format!(
                "poll '{label}': period must be greater than zero"
            )));
        }
        if timeout < period {
            return Err(AutomationError::InvalidArgument(format!(
                "poll '{label}': timeout {timeout:?} is shorter than period {period:?}"
            )));
        }
        Ok(Self {
            timeout,
            period,
            label,
        })
    }

    /// A spec with the default timing
    pub fn with_label(label: impl Into<String>) -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            period: DEFAULT_PERIOD,
            label: label.into(),
        }
    }

    /// Same period, timeout multiplied by `factor` (at least 1).
    /// Saturates at [`Duration::MAX`].
    pub fn scaled(&self, factor: u32) -> Self {
        Self {
            timeout: self.timeout.saturating_mul(factor.max(1)),
            period: self.period,
            label: self.label.clone(),
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    pub fn label(&self) -> &str {
        &self.label
    }
}

/// What a single attempt observed
#[derive(Debug, Clone, PartialEq)]
pub enum AttemptResult<T> {
    Found(T),
    /// Not there yet; try again if time remains
    NotYet,
    /// Hard stop, no further attempts
    Failed(AutomationError),
}

impl<T> From<Option<T>> for AttemptResult<T> {
    fn from(value: Option<T>) -> Self {
        match value {
            Some(v) => AttemptResult::Found(v),
            None => AttemptResult::NotYet,
        }
    }
}

impl<T> From<Result<Option<T>, AutomationError>> for AttemptResult<T> {
    fn from(value: Result<Option<T>, AutomationError>) -> Self {
        match value {
            Ok(v) => v.into(),
            Err(e) => AttemptResult::Failed(e),
        }
    }
}

/// Terminal state of one poll
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome<T> {
    Success {
        value: T,
        elapsed: Duration,
        attempts: usize,
    },
    TimedOut {
        elapsed: Duration,
        attempts: usize,
    },
    Error {
        cause: AutomationError,
        elapsed: Duration,
        attempts: usize,
    },
}

impl<T> Outcome<T> {
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success { .. })
    }

    pub fn attempts(&self) -> usize {
        match self {
            Outcome::Success { attempts, .. }
            | Outcome::TimedOut { attempts, .. }
            | Outcome::Error { attempts, .. } => *attempts,
        }
    }

    pub fn elapsed(&self) -> Duration {
        match self {
            Outcome::Success { elapsed, .. }
            | Outcome::TimedOut { elapsed, .. }
            | Outcome::Error { elapsed, .. } => *elapsed,
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Outcome<U> {
        match self {
            Outcome::Success {
                value,
                elapsed,
                attempts,
            } => Outcome::Success {
                value: f(value),
                elapsed,
                attempts,
            },
            Outcome::TimedOut { elapsed, attempts } => Outcome::TimedOut { elapsed, attempts },
            Outcome::Error {
                cause,
                elapsed,
                attempts,
            } => Outcome::Error {
                cause,
                elapsed,
                attempts,
            },
        }
    }

    /// Collapse into a `Result`; a timeout becomes [`AutomationError::Timeout`]
    pub fn into_result(self) -> Result<T, AutomationError> {
        match self {
            Outcome::Success { value, .. } => Ok(value),
            Outcome::TimedOut { elapsed, attempts } => Err(AutomationError::Timeout(format!(
                "gave up after {attempts} attempts in {elapsed:?}"
            ))),
            Outcome::Error { cause, .. } => Err(cause),
        }
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// Run a tracker hook, swallowing any panic it raises
fn guarded(label: &str, hook: &str, f: impl FnOnce()) {
    if let Err(payload) = std::panic::catch_unwind(AssertUnwindSafe(f)) {
        warn!(
            label,
            hook,
            panic = %panic_message(payload),
            "Tracker hook panicked"
        );
    }
}

/// The bounded-retry engine. Cheap to copy; holds no per-poll state.
#[derive(Debug, Clone, Copy, Default)]
pub struct Poller {
    verbose: bool,
}

impl Poller {
    pub fn new() -> Self {
        Self::default()
    }

    /// Log every attempt at `info` when using the logged variants
    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Invoke `attempt` until it yields a value or fails, giving up when `spec`
    /// expires.
    ///
    /// Attempts are spaced one full period apart. When the next attempt would
    /// start past the deadline, the poll sleeps out the time left and reports
    /// [`Outcome::TimedOut`] without trying again. An attempt in flight at the
    /// deadline is allowed to finish.
    /// Panics raised by `attempt` or by the tracker never escape: the former
    /// end the poll with [`Outcome::Error`], the latter are logged.
    #[instrument(level = "debug", skip_all, fields(label = %spec.label()))]
    pub async fn poll<T, F, Fut>(
        &self,
        spec: &PollSpec,
        tracker: &dyn Tracker<T>,
        mut attempt: F,
    ) -> Outcome<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = AttemptResult<T>>,
    {
        let label = spec.label();
        let start = Instant::now();
        guarded(label, "on_start", || tracker.on_start());

        let mut attempts = 0usize;
        loop {
            attempts += 1;
            guarded(label, "on_each", || tracker.on_each(attempts));

            let result = match std::panic::catch_unwind(AssertUnwindSafe(|| attempt())) {
                Ok(fut) => AssertUnwindSafe(fut)
                    .catch_unwind()
                    .await
                    .unwrap_or_else(|payload| {
                        AttemptResult::Failed(AutomationError::Internal(format!(
                            "attempt panicked: {}",
                            panic_message(payload)
                        )))
                    }),
                Err(payload) => AttemptResult::Failed(AutomationError::Internal(format!(
                    "attempt panicked: {}",
                    panic_message(payload)
                ))),
            };
            let elapsed = start.elapsed();

            match result {
                AttemptResult::Found(value) => {
                    guarded(label, "on_success", || {
                        tracker.on_success(&value, elapsed, attempts)
                    });
                    return Outcome::Success {
                        value,
                        elapsed,
                        attempts,
                    };
                }
                AttemptResult::Failed(cause) => {
                    guarded(label, "on_error", || tracker.on_error(&cause, elapsed, attempts));
                    return Outcome::Error {
                        cause,
                        elapsed,
                        attempts,
                    };
                }
                AttemptResult::NotYet => {
                    let remaining = spec.timeout().saturating_sub(elapsed);
                    if remaining < spec.period() {
                        // No room for another attempt; run out the clock
                        tokio::time::sleep(remaining).await;
                        let elapsed = start.elapsed();
                        let cause = AutomationError::Timeout(format!(
                            "'{label}' not satisfied after {attempts} attempts in {elapsed:?}"
                        ));
                        guarded(label, "on_error", || tracker.on_error(&cause, elapsed, attempts));
                        return Outcome::TimedOut { elapsed, attempts };
                    }
                    trace!(
                        attempts,
                        wait_ms = spec.period().as_millis() as u64,
                        "Not yet, waiting"
                    );
                    tokio::time::sleep(spec.period()).await;
                }
            }
        }
    }

    /// Boolean variant of [`Poller::poll`]: `true` ends the poll, `false` retries
    pub async fn poll_check<F, Fut>(
        &self,
        spec: &PollSpec,
        tracker: &dyn Tracker<bool>,
        mut check: F,
    ) -> Outcome<bool>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = bool>,
    {
        self.poll(spec, tracker, || {
            let fut = check();
            async move {
                if fut.await {
                    AttemptResult::Found(true)
                } else {
                    AttemptResult::NotYet
                }
            }
        })
        .await
    }

    /// [`Poller::poll`] with a [`LogTracker`] named after the spec label
    pub async fn logged<T, F, Fut>(&self, spec: &PollSpec, attempt: F) -> Outcome<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = AttemptResult<T>>,
    {
        let tracker = LogTracker::new(spec.label()).verbose(self.verbose);
        self.poll(spec, &tracker, attempt).await
    }

    /// [`Poller::poll_check`] with a [`LogTracker`] named after the spec label
    pub async fn check_logged<F, Fut>(&self, spec: &PollSpec, check: F) -> Outcome<bool>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = bool>,
    {
        let tracker = LogTracker::new(spec.label()).verbose(self.verbose);
        self.poll_check(spec, &tracker, check).await
    }
}
