//! Exponential backoff with jitter, in unbounded and time-boxed flavors.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use thiserror::Error;
use tokio::sync::broadcast;
use tokio::time::Instant;

/// Outcome of a single attempt under [`BackoffPolicy`].
///
/// `Done` is terminal: the value is returned to the caller immediately,
/// whether it represents success or a final failure response. `Retry` feeds
/// the backoff loop.
#[derive(Debug)]
pub enum Attempt<T, E> {
    Done(T),
    Retry(E),
}

/// Why a retry loop gave up.
#[derive(Debug, Error)]
pub enum RetryError<E: std::fmt::Debug + std::fmt::Display> {
    /// The elapsed-time budget ran out; carries the last observed failure.
    #[error("{0}")]
    Exhausted(E),

    /// The budget ran out while an attempt was still in flight.
    #[error("retry budget exhausted while an attempt was in flight")]
    TimedOut,

    /// Shutdown was signalled while retrying.
    #[error("shutdown in progress")]
    ShuttingDown,
}

/// Retry policy: exponentially growing, jittered delays between attempts,
/// optionally bounded by a wall-clock budget.
#[derive(Debug, Clone)]
pub struct BackoffPolicy {
    base_ms: u64,
    max_ms: u64,
    max_elapsed: Option<Duration>,
}

impl BackoffPolicy {
    /// Policy for session acquisition: no elapsed-time bound, delays grow
    /// from 500ms up to 30s.
    pub fn unbounded() -> Self {
        Self {
            base_ms: 500,
            max_ms: 30_000,
            max_elapsed: None,
        }
    }

    /// Policy for request forwarding: delays grow from 100ms up to 2s, and
    /// the whole run must finish within `budget`.
    pub fn time_boxed(budget: Duration) -> Self {
        Self {
            base_ms: 100,
            max_ms: 2_000,
            max_elapsed: Some(budget),
        }
    }

    /// Run `op` until it returns [`Attempt::Done`] or the budget runs out.
    ///
    /// An attempt still in flight when the budget expires is abandoned and
    /// the last retryable failure (if any) is returned.
    pub async fn run<T, E, F, Fut>(&self, mut op: F) -> Result<T, RetryError<E>>
    where
        E: std::fmt::Debug + std::fmt::Display,
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Attempt<T, E>>,
    {
        let started = Instant::now();
        let mut last_err: Option<E> = None;
        let mut attempt: u32 = 0;

        loop {
            let outcome = match self.max_elapsed {
                Some(budget) => {
                    let remaining = budget.saturating_sub(started.elapsed());
                    match tokio::time::timeout(remaining, op(attempt)).await {
                        Ok(outcome) => outcome,
                        Err(_) => {
                            return Err(match last_err {
                                Some(err) => RetryError::Exhausted(err),
                                None => RetryError::TimedOut,
                            });
                        }
                    }
                }
                None => op(attempt).await,
            };

            match outcome {
                Attempt::Done(value) => return Ok(value),
                Attempt::Retry(err) => {
                    attempt += 1;
                    let delay = calculate_backoff(attempt, self.base_ms, self.max_ms);
                    if let Some(budget) = self.max_elapsed {
                        if started.elapsed() + delay >= budget {
                            return Err(RetryError::Exhausted(err));
                        }
                    }
                    last_err = Some(err);
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    /// Like [`run`](Self::run), but aborts with [`RetryError::ShuttingDown`]
    /// as soon as the shutdown broadcast fires, whether an attempt is in
    /// flight or the loop is waiting out a delay.
    ///
    /// Used by the unbounded session-acquisition path, which would otherwise
    /// retry forever against a backend that never accepts the login.
    pub async fn run_until_shutdown<T, E, F, Fut>(
        &self,
        shutdown: &mut broadcast::Receiver<()>,
        mut op: F,
    ) -> Result<T, RetryError<E>>
    where
        E: std::fmt::Debug + std::fmt::Display,
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Attempt<T, E>>,
    {
        let started = Instant::now();
        let mut attempt: u32 = 0;

        loop {
            let outcome = tokio::select! {
                outcome = op(attempt) => outcome,
                _ = shutdown.recv() => return Err(RetryError::ShuttingDown),
            };

            match outcome {
                Attempt::Done(value) => return Ok(value),
                Attempt::Retry(err) => {
                    attempt += 1;
                    let delay = calculate_backoff(attempt, self.base_ms, self.max_ms);
                    if let Some(budget) = self.max_elapsed {
                        if started.elapsed() + delay >= budget {
                            return Err(RetryError::Exhausted(err));
                        }
                    }
                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {}
                        _ = shutdown.recv() => return Err(RetryError::ShuttingDown),
                    }
                }
            }
        }
    }
}

/// Calculate exponential backoff delay with jitter.
pub fn calculate_backoff(attempt: u32, base_ms: u64, max_ms: u64) -> Duration {
    if attempt == 0 {
        return Duration::from_millis(0);
    }

    let exponential_base = 2u64.saturating_pow(attempt - 1);
    let delay_ms = base_ms.saturating_mul(exponential_base);
    let capped_delay = delay_ms.min(max_ms);

    // Apply jitter (0 to 10% of the delay)
    let jitter_range = capped_delay / 10;
    let jitter = if jitter_range > 0 {
        rand::thread_rng().gen_range(0..jitter_range)
    } else {
        0
    };

    Duration::from_millis(capped_delay + jitter)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn backoff_grows_exponentially_and_is_capped() {
        let b1 = calculate_backoff(1, 100, 2000);
        assert!(b1.as_millis() >= 100);

        let b2 = calculate_backoff(2, 100, 2000);
        assert!(b2.as_millis() >= 200);

        let max = calculate_backoff(10, 100, 1000);
        assert!(max.as_millis() >= 1000);
        assert!(max.as_millis() <= 1100);
    }

    #[tokio::test]
    async fn done_is_terminal_on_first_attempt() {
        let calls = AtomicU32::new(0);
        let policy = BackoffPolicy::time_boxed(Duration::from_secs(1));

        let result: Result<u32, RetryError<String>> = policy
            .run(|_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Attempt::Done(7) }
            })
            .await;

        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn retries_until_done() {
        let calls = AtomicU32::new(0);
        let policy = BackoffPolicy {
            base_ms: 1,
            max_ms: 5,
            max_elapsed: Some(Duration::from_secs(2)),
        };

        let result: Result<&str, RetryError<String>> = policy
            .run(|_| {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Attempt::Retry("not yet".to_string())
                    } else {
                        Attempt::Done("ok")
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), "ok");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn exhaustion_returns_last_failure() {
        let policy = BackoffPolicy {
            base_ms: 10,
            max_ms: 20,
            max_elapsed: Some(Duration::from_millis(100)),
        };

        let result: Result<(), RetryError<String>> = policy
            .run(|attempt| async move { Attempt::Retry(format!("failure {}", attempt)) })
            .await;

        match result {
            Err(RetryError::Exhausted(msg)) => assert!(msg.starts_with("failure")),
            other => panic!("expected exhaustion, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn in_flight_attempt_is_abandoned_at_the_deadline() {
        let policy = BackoffPolicy::time_boxed(Duration::from_millis(50));

        let result: Result<(), RetryError<String>> = policy
            .run(|_| async {
                tokio::time::sleep(Duration::from_secs(30)).await;
                Attempt::Done(())
            })
            .await;

        assert!(matches!(result, Err(RetryError::TimedOut)));
    }

    #[tokio::test]
    async fn shutdown_aborts_an_unbounded_run() {
        let (tx, mut rx) = broadcast::channel(1);
        let policy = BackoffPolicy::unbounded();

        tx.send(()).unwrap();
        let result: Result<(), RetryError<String>> = policy
            .run_until_shutdown(&mut rx, |_| async {
                Attempt::Retry("still down".to_string())
            })
            .await;

        assert!(matches!(result, Err(RetryError::ShuttingDown)));
    }
}
