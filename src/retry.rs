// ABOUTME: Bounded retry with exponential backoff and jitter.
// ABOUTME: Failures are classified retryable or terminal by a caller-supplied classifier.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// How many times to attempt an operation and how long to wait in between.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts including the first one.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_backoff_base", with = "humantime_serde")]
    pub backoff_base: Duration,

    #[serde(default = "default_max_delay", with = "humantime_serde")]
    pub max_delay: Duration,
}

fn default_max_attempts() -> u32 {
    3
}

fn default_backoff_base() -> Duration {
    Duration::from_secs(2)
}

fn default_max_delay() -> Duration {
    Duration::from_secs(60)
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            backoff_base: default_backoff_base(),
            max_delay: default_max_delay(),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, backoff_base: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts,
            backoff_base,
            max_delay,
        }
    }

    /// A policy that runs the operation exactly once.
    pub fn once() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Delay before retrying after failed `attempt` (1-based):
    /// `backoff_base * 2^(attempt-1) * jitter`, capped at `max_delay`.
    pub fn delay_for(&self, attempt: u32, jitter: f64) -> Duration {
        let exponent = attempt.saturating_sub(1).min(62) as i32;
        let secs = self.backoff_base.as_secs_f64() * 2f64.powi(exponent) * jitter;
        let max = self.max_delay.as_secs_f64();
        if !secs.is_finite() || secs >= max {
            self.max_delay
        } else {
            Duration::from_secs_f64(secs.max(0.0))
        }
    }

    /// `delay_for` with jitter drawn uniformly from `[0.5, 1.5)`.
    pub fn jittered_delay(&self, attempt: u32) -> Duration {
        let jitter = rand::thread_rng().gen_range(0.5..1.5);
        self.delay_for(attempt, jitter)
    }
}

/// Whether a failure is worth another attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    Retryable,
    Terminal,
}

/// Decides whether a failure of type `E` may be retried.
pub trait FailureClassifier<E> {
    fn classify(&self, error: &E) -> FailureClass;
}

impl<E, F> FailureClassifier<E> for F
where
    F: Fn(&E) -> FailureClass,
{
    fn classify(&self, error: &E) -> FailureClass {
        self(error)
    }
}

/// Result of a retried operation.
#[derive(Debug)]
pub struct RetryOutcome<T, E> {
    /// Success value, or the last failure observed.
    pub result: Result<T, E>,
    /// Number of times the operation was invoked.
    pub attempts: u32,
    /// A backoff sleep was interrupted by cancellation.
    pub cancelled: bool,
}

/// Run `op` until it succeeds, fails terminally, or `policy.max_attempts` is
/// reached. `op` receives the 1-based attempt number.
///
/// Cancellation observed during a backoff sleep stops retrying immediately;
/// the last failure is returned with `cancelled` set.
pub async fn run_with_retry<T, E, C, F, Fut>(
    policy: &RetryPolicy,
    classifier: &C,
    cancel: &CancellationToken,
    mut op: F,
) -> RetryOutcome<T, E>
where
    C: FailureClassifier<E> + ?Sized,
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        attempt += 1;
        let error = match op(attempt).await {
            Ok(value) => {
                return RetryOutcome {
                    result: Ok(value),
                    attempts: attempt,
                    cancelled: false,
                };
            }
            Err(error) => error,
        };

        let class = classifier.classify(&error);
        if class == FailureClass::Terminal || attempt >= max_attempts {
            if class == FailureClass::Retryable {
                tracing::warn!("Giving up after {} attempt(s): {}", attempt, error);
            }
            return RetryOutcome {
                result: Err(error),
                attempts: attempt,
                cancelled: false,
            };
        }

        let delay = policy.jittered_delay(attempt);
        tracing::warn!(
            "Attempt {}/{} failed: {}; retrying in {:.1}s",
            attempt,
            max_attempts,
            error,
            delay.as_secs_f64()
        );

        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = cancel.cancelled() => {
                return RetryOutcome {
                    result: Err(error),
                    attempts: attempt,
                    cancelled: true,
                };
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy::new(max_attempts, Duration::from_millis(1), Duration::from_millis(5))
    }

    #[test]
    fn delay_doubles_per_attempt() {
        let policy = RetryPolicy::new(5, Duration::from_secs(1), Duration::from_secs(60));
        assert_eq!(policy.delay_for(1, 1.0), Duration::from_secs(1));
        assert_eq!(policy.delay_for(2, 1.0), Duration::from_secs(2));
        assert_eq!(policy.delay_for(3, 1.0), Duration::from_secs(4));
        assert_eq!(policy.delay_for(3, 0.5), Duration::from_secs(2));
    }

    #[test]
    fn delay_is_capped() {
        let policy = RetryPolicy::new(50, Duration::from_secs(1), Duration::from_secs(10));
        assert_eq!(policy.delay_for(10, 1.0), Duration::from_secs(10));
        assert_eq!(policy.delay_for(u32::MAX, 1.5), Duration::from_secs(10));
    }

    #[test]
    fn policy_parses_humantime_durations() {
        let policy: RetryPolicy =
            serde_yaml::from_str("max_attempts: 4\nbackoff_base: 500ms\nmax_delay: 30s\n").unwrap();
        assert_eq!(policy.max_attempts, 4);
        assert_eq!(policy.backoff_base, Duration::from_millis(500));
        assert_eq!(policy.max_delay, Duration::from_secs(30));
    }

    #[tokio::test]
    async fn succeeds_after_transient_failures() {
        let calls = AtomicU32::new(0);
        let outcome = run_with_retry(
            &fast_policy(5),
            &|_: &String| FailureClass::Retryable,
            &CancellationToken::new(),
            |attempt| {
                calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if attempt < 3 {
                        Err(format!("flaky {attempt}"))
                    } else {
                        Ok(attempt)
                    }
                }
            },
        )
        .await;

        assert_eq!(outcome.result.unwrap(), 3);
        assert_eq!(outcome.attempts, 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn terminal_failure_runs_exactly_once() {
        let calls = AtomicU32::new(0);
        let outcome: RetryOutcome<(), String> = run_with_retry(
            &fast_policy(10),
            &|_: &String| FailureClass::Terminal,
            &CancellationToken::new(),
            |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err("malformed config".to_string()) }
            },
        )
        .await;

        assert_eq!(outcome.attempts, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(outcome.result.unwrap_err(), "malformed config");
    }

    #[tokio::test]
    async fn surfaces_last_failure_when_exhausted() {
        let outcome: RetryOutcome<(), String> = run_with_retry(
            &fast_policy(3),
            &|_: &String| FailureClass::Retryable,
            &CancellationToken::new(),
            |attempt| async move { Err(format!("failure {attempt}")) },
        )
        .await;

        assert_eq!(outcome.attempts, 3);
        assert_eq!(outcome.result.unwrap_err(), "failure 3");
        assert!(!outcome.cancelled);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_interrupts_backoff() {
        let policy = RetryPolicy::new(5, Duration::from_secs(60), Duration::from_secs(600));
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            trigger.cancel();
        });

        let started = tokio::time::Instant::now();
        let outcome: RetryOutcome<(), String> = run_with_retry(
            &policy,
            &|_: &String| FailureClass::Retryable,
            &cancel,
            |_| async { Err("unavailable".to_string()) },
        )
        .await;

        assert!(outcome.cancelled);
        assert_eq!(outcome.attempts, 1);
        assert!(started.elapsed() < Duration::from_secs(30));
    }
}
