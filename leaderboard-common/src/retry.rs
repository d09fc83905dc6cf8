use std::fmt;
use std::future::Future;
use std::time;

use thiserror::Error;
use tracing::warn;

/// The outcome of an operation that `RetryPolicy::retry` gave up on.
#[derive(Error, Debug)]
pub enum RetryError<E> {
    #[error("still failing after {attempts} attempts: {error}")]
    Exhausted { attempts: u32, error: E },
    #[error("{error}")]
    Fatal { attempts: u32, error: E },
}

impl<E> RetryError<E> {
    /// Number of times the operation was attempted before giving up.
    pub fn attempts(&self) -> u32 {
        match self {
            RetryError::Exhausted { attempts, .. } | RetryError::Fatal { attempts, .. } => *attempts,
        }
    }
}

#[derive(Copy, Clone, Debug)]
/// The retry policy used to decide whether, and after how long, a failed operation is attempted again.
pub struct RetryPolicy {
    /// Coefficient to multiply initial_interval with for every past attempt.
    backoff_coefficient: u32,
    /// The backoff interval for the first retry.
    initial_interval: time::Duration,
    /// The maximum possible backoff between retries.
    maximum_interval: Option<time::Duration>,
    /// How many consecutive retryable failures are retried before giving up.
    max_retries: u32,
}

impl RetryPolicy {
    pub fn new(
        backoff_coefficient: u32,
        initial_interval: time::Duration,
        maximum_interval: Option<time::Duration>,
        max_retries: u32,
    ) -> Self {
        Self {
            backoff_coefficient,
            initial_interval,
            maximum_interval,
            max_retries,
        }
    }

    pub fn build(backoff_coefficient: u32, initial_interval: time::Duration) -> RetryPolicyBuilder {
        RetryPolicyBuilder::new(backoff_coefficient, initial_interval)
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Calculate the time to wait before the next attempt, given how many retries already happened.
    pub fn time_until_next_retry(&self, attempt: u32) -> time::Duration {
        let candidate_interval = self
            .backoff_coefficient
            .checked_pow(attempt)
            .and_then(|factor| self.initial_interval.checked_mul(factor))
            .unwrap_or(time::Duration::MAX);

        match self.maximum_interval {
            Some(max_interval) => std::cmp::min(candidate_interval, max_interval),
            None => candidate_interval,
        }
    }

    /// Run `operation` until it succeeds, fails with an error `is_retryable` rejects, or fails
    /// with a retryable error more than `max_retries` times in a row.
    ///
    /// Every retry sleeps for `time_until_next_retry(attempt)` first, with `attempt` starting at 0.
    /// `operation_name` only labels logs and metrics.
    pub async fn retry<T, E, F, Fut, P>(
        &self,
        operation_name: &'static str,
        mut operation: F,
        is_retryable: P,
    ) -> Result<T, RetryError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        P: Fn(&E) -> bool,
        E: fmt::Display,
    {
        let mut attempt: u32 = 0;

        loop {
            match operation().await {
                Ok(value) => return Ok(value),
                Err(error) if is_retryable(&error) => {
                    if attempt >= self.max_retries {
                        return Err(RetryError::Exhausted {
                            attempts: attempt + 1,
                            error,
                        });
                    }

                    let delay = self.time_until_next_retry(attempt);
                    metrics::counter!("retry_backoffs_total", "operation" => operation_name)
                        .increment(1);
                    warn!(
                        operation = operation_name,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        "retryable failure, backing off: {}",
                        error
                    );

                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(error) => {
                    return Err(RetryError::Fatal {
                        attempts: attempt + 1,
                        error,
                    })
                }
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            backoff_coefficient: 2,
            initial_interval: time::Duration::from_secs(1),
            maximum_interval: None,
            max_retries: 5,
        }
    }
}

pub struct RetryPolicyBuilder {
    backoff_coefficient: u32,
    initial_interval: time::Duration,
    maximum_interval: Option<time::Duration>,
    max_retries: u32,
}

impl RetryPolicyBuilder {
    pub fn new(backoff_coefficient: u32, initial_interval: time::Duration) -> Self {
        Self {
            backoff_coefficient,
            initial_interval,
            maximum_interval: None,
            max_retries: RetryPolicy::default().max_retries,
        }
    }

    pub fn maximum_interval(mut self, interval: Option<time::Duration>) -> Self {
        self.maximum_interval = interval;
        self
    }

    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Provide a `RetryPolicy` according to build parameters provided thus far.
    pub fn provide(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.backoff_coefficient,
            self.initial_interval,
            self.maximum_interval,
            self.max_retries,
        )
    }
}
