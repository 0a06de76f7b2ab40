use super::init_tracing;
use crate::poller::{AttemptResult, Outcome, PollSpec, Poller, DEFAULT_PERIOD, DEFAULT_TIMEOUT};
use crate::tracker::{NoopTracker, Tracker};
use crate::AutomationError;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

#[derive(Default)]
struct CountingTracker {
    starts: AtomicUsize,
    each: Mutex<Vec<usize>>,
    successes: AtomicUsize,
    errors: Mutex<Vec<String>>,
}

impl<T> Tracker<T> for CountingTracker {
    fn on_start(&self) {
        self.starts.fetch_add(1, Ordering::SeqCst);
    }

    fn on_each(&self, attempt: usize) {
        self.each.lock().unwrap().push(attempt);
    }

    fn on_success(&self, _value: &T, _elapsed: Duration, _attempts: usize) {
        self.successes.fetch_add(1, Ordering::SeqCst);
    }

    fn on_error(&self, cause: &AutomationError, _elapsed: Duration, _attempts: usize) {
        self.errors.lock().unwrap().push(cause.to_string());
    }
}

struct PanickingTracker;

impl<T> Tracker<T> for PanickingTracker {
    fn on_each(&self, _attempt: usize) {
        panic!("tracker exploded");
    }
}

fn spec(timeout_ms: u64, period_ms: u64) -> PollSpec {
    PollSpec::new(
        Duration::from_millis(timeout_ms),
        Duration::from_millis(period_ms),
        "test poll",
    )
    .unwrap()
}

#[test]
fn test_poll_spec_rejects_timeout_shorter_than_period() {
    let err = PollSpec::new(Duration::from_millis(100), Duration::from_millis(200), "bad").unwrap_err();
    assert!(matches!(err, AutomationError::InvalidArgument(_)), "{err:?}");
}

#[test]
fn test_poll_spec_rejects_zero_period() {
    let err = PollSpec::new(Duration::from_secs(1), Duration::ZERO, "bad").unwrap_err();
    assert!(matches!(err, AutomationError::InvalidArgument(_)));
}

#[test]
fn test_poll_spec_accepts_equal_timeout_and_period() {
    let spec = spec(200, 200);
    assert_eq!(spec.timeout(), spec.period());
}

#[test]
fn test_poll_spec_defaults_and_scaling() {
    let spec = PollSpec::with_label("launch");
    assert_eq!(spec.timeout(), DEFAULT_TIMEOUT);
    assert_eq!(spec.period(), DEFAULT_PERIOD);

    let slow = spec.scaled(2);
    assert_eq!(slow.timeout(), DEFAULT_TIMEOUT * 2);
    assert_eq!(slow.period(), DEFAULT_PERIOD);
    assert_eq!(slow.label(), "launch");
    assert_eq!(spec.scaled(0).timeout(), DEFAULT_TIMEOUT);
}

#[tokio::test(start_paused = true)]
async fn test_always_not_yet_times_out() {
    init_tracing();
    let spec = spec(1000, 200);
    let tracker = CountingTracker::default();

    let outcome: Outcome<()> = Poller::new()
        .poll(&spec, &tracker, || async { AttemptResult::NotYet })
        .await;

    let Outcome::TimedOut { elapsed, attempts } = outcome else {
        panic!("expected a timeout, got {outcome:?}");
    };
    assert!(elapsed >= spec.timeout(), "elapsed {elapsed:?}");
    assert!(elapsed <= spec.timeout() + spec.period(), "elapsed {elapsed:?}");
    assert_eq!(attempts, 6);

    assert_eq!(tracker.starts.load(Ordering::SeqCst), 1);
    assert_eq!(tracker.each.lock().unwrap().len(), attempts);
    assert_eq!(tracker.successes.load(Ordering::SeqCst), 0);
    let errors = tracker.errors.lock().unwrap();
    assert_eq!(errors.len(), 1);
    assert!(errors[0].contains("timed out"), "{}", errors[0]);
}

#[test]
fn test_scaling_saturates_instead_of_overflowing() {
    let spec = PollSpec::new(Duration::MAX, Duration::from_secs(1), "forever").unwrap();
    assert_eq!(spec.scaled(2).timeout(), Duration::MAX);
}

#[tokio::test(start_paused = true)]
async fn test_attempts_keep_full_period_spacing_near_deadline() {
    let spec = spec(1000, 300);
    let start = tokio::time::Instant::now();
    let stamps = Mutex::new(Vec::new());

    let outcome: Outcome<()> = Poller::new()
        .poll(&spec, &NoopTracker, || {
            stamps.lock().unwrap().push(start.elapsed().as_millis() as u64);
            async { AttemptResult::NotYet }
        })
        .await;

    assert_eq!(*stamps.lock().unwrap(), vec![0, 300, 600, 900]);
    let Outcome::TimedOut { elapsed, attempts } = outcome else {
        panic!("expected a timeout, got {outcome:?}");
    };
    assert_eq!(attempts, 4);
    assert_eq!(elapsed, Duration::from_millis(1000));
}

#[tokio::test(start_paused = true)]
async fn test_found_on_third_attempt() {
    let spec = spec(1000, 200);
    let tracker = CountingTracker::default();
    let calls = AtomicUsize::new(0);

    let outcome = Poller::new()
        .poll(&spec, &tracker, || {
            let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
            async move {
                if n == 3 {
                    AttemptResult::Found("ready")
                } else {
                    AttemptResult::NotYet
                }
            }
        })
        .await;

    match outcome {
        Outcome::Success {
            value,
            elapsed,
            attempts,
        } => {
            assert_eq!(value, "ready");
            assert_eq!(attempts, 3);
            assert!(elapsed >= Duration::from_millis(400), "elapsed {elapsed:?}");
            assert!(elapsed < spec.timeout());
        }
        other => panic!("expected success, got {other:?}"),
    }
    assert_eq!(*tracker.each.lock().unwrap(), vec![1, 2, 3]);
    assert_eq!(tracker.successes.load(Ordering::SeqCst), 1);
    assert!(tracker.errors.lock().unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_failure_on_first_attempt_stops_immediately() {
    let spec = spec(1000, 200);
    let tracker = CountingTracker::default();
    let calls = AtomicUsize::new(0);

    let outcome: Outcome<()> = Poller::new()
        .poll(&spec, &tracker, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async {
                AttemptResult::Failed(AutomationError::ElementDetached("gone".to_string()))
            }
        })
        .await;

    match outcome {
        Outcome::Error {
            cause,
            elapsed,
            attempts,
        } => {
            assert!(cause.is_structural());
            assert_eq!(attempts, 1);
            assert!(elapsed < spec.period(), "no wait expected, got {elapsed:?}");
        }
        other => panic!("expected error, got {other:?}"),
    }
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(tracker.errors.lock().unwrap().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_panicking_attempt_becomes_internal_error() {
    let spec = spec(1000, 200);
    let explode = true;

    let outcome: Outcome<()> = Poller::new()
        .poll(&spec, &NoopTracker, || async move {
            if explode {
                panic!("attempt exploded");
            }
            AttemptResult::NotYet
        })
        .await;

    match outcome {
        Outcome::Error { cause, attempts, .. } => {
            assert_eq!(attempts, 1);
            match cause {
                AutomationError::Internal(msg) => assert!(msg.contains("attempt exploded"), "{msg}"),
                other => panic!("expected internal error, got {other:?}"),
            }
        }
        other => panic!("expected error, got {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn test_panicking_tracker_does_not_abort_poll() {
    let spec = spec(1000, 200);
    let calls = AtomicUsize::new(0);

    let outcome = Poller::new()
        .poll(&spec, &PanickingTracker, || {
            let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
            async move { AttemptResult::from((n == 2).then_some(n)) }
        })
        .await;

    assert_eq!(outcome.attempts(), 2);
    assert_eq!(outcome.into_result().unwrap(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_poll_check_maps_booleans() {
    let spec = spec(600, 200);
    let calls = AtomicUsize::new(0);

    let outcome = Poller::new()
        .check_logged(&spec, || {
            let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
            async move { n >= 2 }
        })
        .await;
    assert!(outcome.is_success());
    assert_eq!(outcome.attempts(), 2);

    let never = Poller::new()
        .verbose(true)
        .check_logged(&spec, || async { false })
        .await;
    assert!(matches!(never, Outcome::TimedOut { .. }));
    assert!(matches!(
        never.into_result(),
        Err(AutomationError::Timeout(_))
    ));
}

#[tokio::test(start_paused = true)]
async fn test_outcome_map_keeps_counters() {
    let spec = spec(400, 200);
    let outcome = Poller::new()
        .logged(&spec, || async { AttemptResult::Found(21) })
        .await
        .map(|v| v * 2);

    assert_eq!(outcome.attempts(), 1);
    assert_eq!(outcome.elapsed(), Duration::ZERO);
    assert_eq!(outcome.into_result().unwrap(), 42);
}
