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

//! Defines the trait implemented by all retry policies.
//!
//! A retry policy is a pure function of the attempt count and the time spent
//! so far. It holds no per-loop state, so a single instance can be shared by
//! any number of concurrent retry loops, and by the
//! [ConcurrentRetrier][crate::concurrent_retrier::ConcurrentRetrier].

use std::time::Duration;

/// The decision returned by a [RetryPolicy].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NextDelay {
    /// Wait for the given duration, then try again.
    Wait(Duration),
    /// Stop retrying.
    Stop,
}

impl NextDelay {
    /// Returns the delay, or `None` if the policy stopped.
    pub fn delay(&self) -> Option<Duration> {
        match self {
            Self::Wait(d) => Some(*d),
            Self::Stop => None,
        }
    }

    pub fn is_stop(&self) -> bool {
        matches!(self, Self::Stop)
    }
}

/// Defines the trait implemented by all retry policies.
///
/// Implementations must be `Send` and `Sync` because policies are shared
/// between tasks, typically as `Arc<dyn RetryPolicy>`.
pub trait RetryPolicy: Send + Sync + std::fmt::Debug {
    /// Computes the delay before the next attempt.
    ///
    /// # Parameters
    /// * `attempt` - the 1-based number of the retry being scheduled. The
    ///   initial call is never delayed, so this is `1` after the first failure.
    /// * `elapsed` - the time since the first attempt started.
    fn compute_next_delay(&self, attempt: u32, elapsed: Duration) -> NextDelay;
}

impl<P> RetryPolicy for std::sync::Arc<P>
where
    P: RetryPolicy + ?Sized,
{
    fn compute_next_delay(&self, attempt: u32, elapsed: Duration) -> NextDelay {
        (**self).compute_next_delay(attempt, elapsed)
    }
}
