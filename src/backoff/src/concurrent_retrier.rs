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

//! A backoff clock shared by many concurrent callers.
//!
//! A worker typically runs several pollers against the same endpoint. If the
//! endpoint starts failing, every poller should slow down, and once any poller
//! succeeds they should all resume at full speed. Each poller reports its
//! outcome with [ConcurrentRetrier::failed] or [ConcurrentRetrier::succeeded]
//! and asks [ConcurrentRetrier::throttle_duration] how long to wait before its
//! next call.
//!
//! Typically applications create one retrier per remote operation and share
//! it, wrapped in an `Arc`, across all the tasks issuing that operation.
//!
//! # Example
//! ```
//! # use durable_backoff::concurrent_retrier::ConcurrentRetrier;
//! # use durable_backoff::exponential_retry_policy::ExponentialRetryPolicyBuilder;
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! let policy = ExponentialRetryPolicyBuilder::new()
//!     .with_initial_interval(Duration::from_millis(100))
//!     .with_maximum_interval(Duration::from_secs(10))
//!     .build()?;
//! let retrier = Arc::new(ConcurrentRetrier::new(Arc::new(policy)));
//! assert_eq!(retrier.throttle_duration(), None);
//! retrier.failed();
//! assert!(retrier.throttle_duration().is_some());
//! retrier.succeeded();
//! assert_eq!(retrier.throttle_duration(), None);
//! # Ok::<(), durable_backoff::exponential_retry_policy::Error>(())
//! ```

use crate::retry::Cancelled;
use crate::retry_policy::{NextDelay, RetryPolicy};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Default)]
struct FailureState {
    failure_count: u64,
    // When the current run of failures started. Reset on success.
    first_failure: Option<Instant>,
}

/// Converts a shared, rolling failure count into a backoff delay.
#[derive(Debug)]
pub struct ConcurrentRetrier {
    policy: Arc<dyn RetryPolicy>,
    state: Mutex<FailureState>,
}

impl ConcurrentRetrier {
    pub fn new(policy: Arc<dyn RetryPolicy>) -> Self {
        Self {
            policy,
            state: Mutex::new(FailureState::default()),
        }
    }

    /// Records a failure.
    pub fn failed(&self) {
        let mut state = self.state.lock().expect("retrier state lock is poisoned");
        state.failure_count = state.failure_count.saturating_add(1);
        state.first_failure.get_or_insert_with(Instant::now);
    }

    /// Records a success, resetting the failure count for all callers.
    pub fn succeeded(&self) {
        let mut state = self.state.lock().expect("retrier state lock is poisoned");
        *state = FailureState::default();
    }

    /// The number of failures since the last success.
    pub fn failure_count(&self) -> u64 {
        self.state
            .lock()
            .expect("retrier state lock is poisoned")
            .failure_count
    }

    /// Returns how long the caller should wait before its next attempt.
    ///
    /// Returns `None` if there are no recorded failures, or if the retry
    /// policy has stopped. This function never sleeps.
    pub fn throttle_duration(&self) -> Option<Duration> {
        let state = self.state.lock().expect("retrier state lock is poisoned");
        if state.failure_count == 0 {
            return None;
        }
        let attempt = u32::try_from(state.failure_count).unwrap_or(u32::MAX);
        let elapsed = state
            .first_failure
            .map(|t| t.elapsed())
            .unwrap_or_default();
        match self.policy.compute_next_delay(attempt, elapsed) {
            NextDelay::Wait(d) => Some(d),
            NextDelay::Stop => None,
        }
    }

    /// Waits for [throttle_duration][Self::throttle_duration], unless `cancel`
    /// fires first.
    pub async fn throttle(&self, cancel: &CancellationToken) -> Result<(), Cancelled> {
        match self.throttle_duration() {
            None => Ok(()),
            Some(delay) => crate::retry::sleep(cancel, delay).await,
        }
    }
}
