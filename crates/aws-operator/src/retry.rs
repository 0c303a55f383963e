//! Bounded exponential backoff with jitter.
//!
//! A [`RetryPolicy`] is bounded by a number of attempts, by the total time spent, or by both.
//! A policy without any bound retries until the operation succeeds.

use std::{fmt::Display, future::Future, time::Duration};

use backoff::{ExponentialBackoff, ExponentialBackoffBuilder, backoff::Backoff};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Number of attempts the retry middleware makes per call.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Each delay is randomized to between 0.5x and 1.5x of the current interval.
const RANDOMIZATION_FACTOR: f64 = 0.5;

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RetryPolicy {
    /// Maximum number of attempts, including the first one.
    pub max_attempts: Option<u32>,

    /// Maximum time spent, including the time between attempts.
    #[serde(with = "optional_duration")]
    pub max_elapsed: Option<Duration>,

    #[serde(with = "crate::duration")]
    pub initial_delay: Duration,

    #[serde(with = "crate::duration")]
    pub max_delay: Duration,

    /// Growth factor of the delay between attempts, at least 1.
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: Some(DEFAULT_MAX_ATTEMPTS),
            max_elapsed: None,
            initial_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(5),
            multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    pub fn with_max_attempts(max_attempts: u32) -> Self {
        Self {
            max_attempts: Some(max_attempts),
            ..Self::default()
        }
    }

    /// A policy bounded only by the time spent.
    pub fn with_max_elapsed(max_elapsed: Duration) -> Self {
        Self {
            max_attempts: None,
            max_elapsed: Some(max_elapsed),
            ..Self::default()
        }
    }

    pub fn initial_delay(mut self, initial_delay: Duration) -> Self {
        self.initial_delay = initial_delay;
        self
    }

    pub fn max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = max_delay;
        self
    }

    /// The delays between attempts. The clock of [`RetryPolicy::max_elapsed`] starts here.
    fn backoff_strategy(&self) -> ExponentialBackoff {
        ExponentialBackoffBuilder::new()
            .with_initial_interval(self.initial_delay)
            .with_max_interval(self.max_delay)
            .with_multiplier(self.multiplier)
            .with_randomization_factor(RANDOMIZATION_FACTOR)
            .with_max_elapsed_time(self.max_elapsed)
            .build()
    }

    /// Runs `operation` until it succeeds or the policy is exhausted, in which case the last
    /// error is returned.
    pub async fn retry<F, Fut, T, E>(&self, operation_name: &str, mut operation: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
    {
        let mut backoff_strategy = self.backoff_strategy();
        let mut attempt = 0u32;

        loop {
            attempt += 1;

            let error = match operation().await {
                Ok(value) => {
                    if attempt > 1 {
                        debug!(
                            operation = operation_name,
                            attempt, "operation succeeded after retrying"
                        );
                    }
                    return Ok(value);
                }
                Err(error) => error,
            };

            // `None` once the time budget is spent
            let delay = if self.max_attempts.is_some_and(|max| attempt >= max) {
                None
            } else {
                backoff_strategy.next_backoff()
            };

            let Some(delay) = delay else {
                warn!(
                    operation = operation_name,
                    attempt,
                    error = %error,
                    "operation failed, giving up"
                );
                return Err(error);
            };

            debug!(
                operation = operation_name,
                attempt,
                error = %error,
                delay_ms = delay.as_millis(),
                "operation failed, retrying"
            );
            tokio::time::sleep(delay).await;
        }
    }
}

mod optional_duration {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(duration: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match duration {
            Some(duration) => crate::duration::serialize(duration, serializer),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        struct Wrapper(#[serde(with = "crate::duration")] Duration);

        let wrapper = Option::<Wrapper>::deserialize(deserializer)?;
        Ok(wrapper.map(|Wrapper(duration)| duration))
    }
}
