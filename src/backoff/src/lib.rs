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

//! Retry and backoff helpers for durable workflow workers.
//!
//! Workers talk to a remote orchestration service over an unreliable network.
//! Every remote call (long-polls, task completion reports, sticky resets) may
//! fail transiently, and a worker running many concurrent pollers against a
//! failing endpoint must slow down as a whole instead of hammering it.
//!
//! This crate provides the pieces used to build that behavior:
//!
//! * [RetryPolicy][retry_policy::RetryPolicy] turns an attempt count and the
//!   elapsed time into either a delay or a decision to stop.
//!   [ExponentialRetryPolicy][exponential_retry_policy::ExponentialRetryPolicy]
//!   is the common implementation.
//! * [retry][retry::retry] drives an async operation until it succeeds, the
//!   policy gives up, the error is not retryable, or the caller cancels.
//! * [ConcurrentRetrier][concurrent_retrier::ConcurrentRetrier] shares one
//!   backoff clock across many concurrent callers of the same operation.
//!
//! # Example
//! ```
//! # use durable_backoff::exponential_retry_policy::ExponentialRetryPolicyBuilder;
//! # use durable_backoff::retry::retry;
//! # use tokio_util::sync::CancellationToken;
//! use std::time::Duration;
//!
//! # tokio_test::block_on(async {
//! let policy = ExponentialRetryPolicyBuilder::new()
//!     .with_initial_interval(Duration::from_millis(1))
//!     .with_maximum_attempts(3)
//!     .build()?;
//! let cancel = CancellationToken::new();
//! let value = retry(&cancel, || async { Ok::<_, std::io::Error>(42) }, &policy, None).await?;
//! assert_eq!(value, 42);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! # });
//! ```

pub mod concurrent_retrier;
pub mod exponential_retry_policy;
pub mod retry;
pub mod retry_policy;
