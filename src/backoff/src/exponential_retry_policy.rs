// Copyright 2026 Google LLC
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     https://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Truncated exponential backoff with bounded jitter.
//!
//! This is the policy used for almost every remote call a worker makes. The
//! delay before retry `n` is `initial_interval * backoff_coefficient^(n-1)`,
//! truncated at `maximum_interval`. The policy stops once the retry count
//! exceeds `maximum_attempts`, or once the loop has run for longer than
//! `expiration_interval`.
//!
//! # Example
//! ```
//! # use durable_backoff::exponential_retry_policy::*;
//! # use durable_backoff::retry_policy::*;
//! use std::time::Duration;
//!
//! let policy = ExponentialRetryPolicyBuilder::new()
//!     .with_initial_interval(Duration::from_millis(100))
//!     .with_maximum_interval(Duration::from_secs(5))
//!     .with_maximum_attempts(10)
//!     .build()?;
//! let next = policy.compute_next_delay(1, Duration::ZERO);
//! assert!(next.delay().is_some_and(|d| d <= Duration::from_millis(100)));
//! # Ok::<(), Error>(())
//! ```

use crate::retry_policy::{NextDelay, RetryPolicy};
use std::time::Duration;

const DEFAULT_INITIAL_INTERVAL: Duration = Duration::from_secs(1);
const DEFAULT_BACKOFF_COEFFICIENT: f64 = 2.0;
const DEFAULT_EXPIRATION_INTERVAL: Duration = Duration::from_secs(60);
const DEFAULT_JITTER: f64 = 0.2;

/// The error type for exponential retry policy creation.
#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum Error {
    #[error("the backoff coefficient ({0}) should be > 1.0")]
    InvalidBackoffCoefficient(f64),
    #[error("the initial interval ({0:?}) should be greater than zero")]
    InvalidInitialInterval(Duration),
    #[error(
        "the maximum interval ({maximum:?}) should be greater than or equal to the initial interval ({initial:?})"
    )]
    EmptyRange {
        maximum: Duration,
        initial: Duration,
    },
    #[error("the jitter fraction ({0}) should be in the [0.0, 1.0] range")]
    InvalidJitter(f64),
}

/// A builder for [ExponentialRetryPolicy].
#[derive(Clone, Debug)]
pub struct ExponentialRetryPolicyBuilder {
    initial_interval: Duration,
    backoff_coefficient: f64,
    maximum_interval: Option<Duration>,
    maximum_attempts: u32,
    expiration_interval: Duration,
    jitter: f64,
}

impl ExponentialRetryPolicyBuilder {
    /// Creates a builder with the default parameters.
    ///
    /// The defaults are a one second initial interval, doubling on each
    /// retry, no maximum interval, no attempt limit, and a one minute
    /// expiration.
    pub fn new() -> Self {
        Self {
            initial_interval: DEFAULT_INITIAL_INTERVAL,
            backoff_coefficient: DEFAULT_BACKOFF_COEFFICIENT,
            maximum_interval: None,
            maximum_attempts: 0,
            expiration_interval: DEFAULT_EXPIRATION_INTERVAL,
            jitter: DEFAULT_JITTER,
        }
    }

    /// Change the delay before the first retry.
    pub fn with_initial_interval<V: Into<Duration>>(mut self, v: V) -> Self {
        self.initial_interval = v.into();
        self
    }

    /// Change the growth factor between consecutive delays.
    pub fn with_backoff_coefficient<V: Into<f64>>(mut self, v: V) -> Self {
        self.backoff_coefficient = v.into();
        self
    }

    /// Cap the delay between retries.
    pub fn with_maximum_interval<V: Into<Duration>>(mut self, v: V) -> Self {
        self.maximum_interval = Some(v.into());
        self
    }

    /// Limit the number of retries. Zero means unlimited.
    pub fn with_maximum_attempts(mut self, v: u32) -> Self {
        self.maximum_attempts = v;
        self
    }

    /// Limit the total time spent retrying. [Duration::ZERO] means unlimited.
    pub fn with_expiration_interval<V: Into<Duration>>(mut self, v: V) -> Self {
        self.expiration_interval = v.into();
        self
    }

    /// Change the fraction of the delay subject to randomization.
    ///
    /// With a fraction `j` the delay is drawn from `[d * (1 - j), d]`. Zero
    /// disables jitter.
    pub fn with_jitter<V: Into<f64>>(mut self, v: V) -> Self {
        self.jitter = v.into();
        self
    }

    /// Creates a new exponential retry policy.
    ///
    /// # Example
    /// ```
    /// # use durable_backoff::exponential_retry_policy::*;
    /// use std::time::Duration;
    /// let r = ExponentialRetryPolicyBuilder::new()
    ///     .with_backoff_coefficient(0.5)
    ///     .build();
    /// assert!(matches!(r, Err(Error::InvalidBackoffCoefficient(_))));
    /// ```
    pub fn build(self) -> Result<ExponentialRetryPolicy, Error> {
        if self.backoff_coefficient.is_nan() || self.backoff_coefficient <= 1.0 {
            return Err(Error::InvalidBackoffCoefficient(self.backoff_coefficient));
        }
        if self.initial_interval.is_zero() {
            return Err(Error::InvalidInitialInterval(self.initial_interval));
        }
        if let Some(maximum) = self.maximum_interval {
            if maximum < self.initial_interval {
                return Err(Error::EmptyRange {
                    maximum,
                    initial: self.initial_interval,
                });
            }
        }
        if !(0.0..=1.0).contains(&self.jitter) {
            return Err(Error::InvalidJitter(self.jitter));
        }
        Ok(ExponentialRetryPolicy {
            initial_interval: self.initial_interval,
            backoff_coefficient: self.backoff_coefficient,
            maximum_interval: self.maximum_interval,
            maximum_attempts: self.maximum_attempts,
            expiration_interval: Some(self.expiration_interval).filter(|d| !d.is_zero()),
            jitter: self.jitter,
        })
    }

    /// Creates a new exponential retry policy clamping the parameters towards
    /// valid values.
    ///
    /// The initial interval is clamped to be at least one millisecond. The
    /// maximum interval, if set, is clamped to be at least the initial
    /// interval. The backoff coefficient is clamped to the `[1.1, 32.0]`
    /// range and the jitter fraction to `[0.0, 1.0]`. A NaN coefficient or
    /// jitter is replaced by its default.
    ///
    /// # Example
    /// ```
    /// # use durable_backoff::exponential_retry_policy::*;
    /// use std::time::Duration;
    /// let policy = ExponentialRetryPolicyBuilder::new()
    ///     .with_initial_interval(Duration::ZERO)
    ///     .with_backoff_coefficient(0.5)
    ///     .clamp();
    /// assert_eq!(policy.initial_interval(), Duration::from_millis(1));
    /// assert_eq!(policy.backoff_coefficient(), 1.1);
    /// ```
    pub fn clamp(self) -> ExponentialRetryPolicy {
        let backoff_coefficient = if self.backoff_coefficient.is_nan() {
            DEFAULT_BACKOFF_COEFFICIENT
        } else {
            self.backoff_coefficient.clamp(1.1, 32.0)
        };
        let jitter = if self.jitter.is_nan() {
            DEFAULT_JITTER
        } else {
            self.jitter.clamp(0.0, 1.0)
        };
        let initial_interval = std::cmp::max(self.initial_interval, Duration::from_millis(1));
        let maximum_interval = self
            .maximum_interval
            .map(|m| std::cmp::max(m, initial_interval));
        ExponentialRetryPolicy {
            initial_interval,
            backoff_coefficient,
            maximum_interval,
            maximum_attempts: self.maximum_attempts,
            expiration_interval: Some(self.expiration_interval).filter(|d| !d.is_zero()),
            jitter,
        }
    }
}

impl Default for ExponentialRetryPolicyBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Implements truncated exponential backoff.
///
/// Create instances with [ExponentialRetryPolicyBuilder]. The policy is an
/// immutable value, safe to share across threads.
#[derive(Clone, Debug)]
pub struct ExponentialRetryPolicy {
    initial_interval: Duration,
    backoff_coefficient: f64,
    maximum_interval: Option<Duration>,
    maximum_attempts: u32,
    expiration_interval: Option<Duration>,
    jitter: f64,
}

impl ExponentialRetryPolicy {
    pub fn initial_interval(&self) -> Duration {
        self.initial_interval
    }

    pub fn backoff_coefficient(&self) -> f64 {
        self.backoff_coefficient
    }

    pub fn maximum_interval(&self) -> Option<Duration> {
        self.maximum_interval
    }

    pub fn maximum_attempts(&self) -> u32 {
        self.maximum_attempts
    }

    pub fn expiration_interval(&self) -> Option<Duration> {
        self.expiration_interval
    }

    // The delay before jitter.
    fn delay(&self, attempt: u32, elapsed: Duration) -> NextDelay {
        if self.maximum_attempts > 0 && attempt > self.maximum_attempts {
            return NextDelay::Stop;
        }
        let remaining = match self.expiration_interval {
            Some(expiration) if elapsed >= expiration => return NextDelay::Stop,
            Some(expiration) => Some(expiration - elapsed),
            None => None,
        };

        let exp = std::cmp::min(i32::MAX as u32, attempt.max(1)) as i32 - 1;
        let scaling = self.backoff_coefficient.powi(exp);
        let delay = Duration::try_from_secs_f64(self.initial_interval.as_secs_f64() * scaling)
            .unwrap_or(Duration::MAX);
        let delay = match self.maximum_interval {
            Some(maximum) => std::cmp::min(delay, maximum),
            None => delay,
        };
        match remaining {
            // Not enough time left for even the shortest delay.
            Some(r) if r < self.initial_interval => NextDelay::Stop,
            Some(r) => NextDelay::Wait(std::cmp::min(delay, r)),
            None => NextDelay::Wait(delay),
        }
    }

    fn delay_with_jitter(
        &self,
        attempt: u32,
        elapsed: Duration,
        rng: &mut impl rand::Rng,
    ) -> NextDelay {
        match self.delay(attempt, elapsed) {
            NextDelay::Wait(d) if self.jitter > 0.0 && !d.is_zero() => {
                // `mul_f64` panics if the product rounds above `Duration::MAX`.
                let lower = Duration::try_from_secs_f64(d.as_secs_f64() * (1.0 - self.jitter))
                    .map_or(d, |lower| std::cmp::min(lower, d));
                NextDelay::Wait(rng.random_range(lower..=d))
            }
            next => next,
        }
    }
}

impl Default for ExponentialRetryPolicy {
    fn default() -> Self {
        Self {
            initial_interval: DEFAULT_INITIAL_INTERVAL,
            backoff_coefficient: DEFAULT_BACKOFF_COEFFICIENT,
            maximum_interval: None,
            maximum_attempts: 0,
            expiration_interval: Some(DEFAULT_EXPIRATION_INTERVAL),
            jitter: DEFAULT_JITTER,
        }
    }
}

impl RetryPolicy for ExponentialRetryPolicy {
    fn compute_next_delay(&self, attempt: u32, elapsed: Duration) -> NextDelay {
        self.delay_with_jitter(attempt, elapsed, &mut rand::rng())
    }
}
