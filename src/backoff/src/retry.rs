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

//! The retry driver.
//!
//! [retry] calls an operation until (1) it succeeds, (2) it returns an error
//! the caller considers non-retryable, (3) the retry policy stops, or (4) the
//! caller cancels the loop. In between attempts it waits for the delay
//! prescribed by the policy. That wait is the only point where the loop
//! blocks, and it always yields to cancellation.

use crate::retry_policy::{NextDelay, RetryPolicy};
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// The loop was cancelled before the operation succeeded.
#[derive(thiserror::Error, Clone, Copy, Debug, PartialEq, Eq)]
#[error("the retry loop was cancelled")]
pub struct Cancelled;

/// The terminal error of a retry loop.
///
/// There is exactly one terminal error per loop. When the operation's own
/// error stops the loop (it is not retryable, or the policy is exhausted)
/// that error is returned unchanged, so callers see the real failure cause.
#[derive(Debug)]
pub enum Error<E> {
    /// The last error returned by the operation.
    Operation(E),
    /// The cancellation token fired while waiting between attempts.
    Cancelled(Cancelled),
}

impl<E> Error<E> {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled(_))
    }

    /// Returns the operation error, if the loop stopped because of one.
    pub fn operation(&self) -> Option<&E> {
        match self {
            Self::Operation(e) => Some(e),
            Self::Cancelled(_) => None,
        }
    }

    /// Consumes the error, returning the operation error if there was one.
    pub fn into_operation(self) -> Option<E> {
        match self {
            Self::Operation(e) => Some(e),
            Self::Cancelled(_) => None,
        }
    }
}

impl<E> From<Cancelled> for Error<E> {
    fn from(value: Cancelled) -> Self {
        Self::Cancelled(value)
    }
}

impl<E: std::fmt::Display> std::fmt::Display for Error<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Operation(e) => std::fmt::Display::fmt(e, f),
            Self::Cancelled(c) => std::fmt::Display::fmt(c, f),
        }
    }
}

impl<E> std::error::Error for Error<E>
where
    E: std::error::Error + 'static,
{
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Operation(e) => e.source(),
            Self::Cancelled(_) => None,
        }
    }
}

/// Retries `operation` according to `policy`.
///
/// If `is_retryable` is provided and returns `false` for an error, the loop
/// stops immediately with that error. Without a predicate every error is
/// retried until the policy stops.
///
/// # Example
/// ```
/// # use durable_backoff::exponential_retry_policy::ExponentialRetryPolicyBuilder;
/// # use durable_backoff::retry::retry;
/// # use tokio_util::sync::CancellationToken;
/// # use std::time::Duration;
/// # tokio_test::block_on(async {
/// let policy = ExponentialRetryPolicyBuilder::new()
///     .with_initial_interval(Duration::from_millis(1))
///     .build()?;
/// let is_retryable = |e: &std::io::Error| e.kind() == std::io::ErrorKind::TimedOut;
/// let err = retry(
///     &CancellationToken::new(),
///     || async { Err::<(), _>(std::io::Error::other("permanent")) },
///     &policy,
///     Some(&is_retryable),
/// )
/// .await
/// .expect_err("non-retryable errors stop the loop");
/// assert!(!err.is_cancelled());
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// # });
/// ```
pub async fn retry<F, Fut, T, E, P>(
    cancel: &CancellationToken,
    operation: F,
    policy: &P,
    is_retryable: Option<&(dyn Fn(&E) -> bool + Send + Sync)>,
) -> Result<T, Error<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    P: RetryPolicy + ?Sized,
{
    retry_with_callback(cancel, operation, policy, is_retryable, |_, _, _| {}).await
}

/// Retries `operation` according to `policy`, with a callback for retries.
///
/// The `on_retry` callback is called before each wait with the attempt
/// number, the error that triggered the retry, and the delay.
pub async fn retry_with_callback<F, Fut, T, E, P, C>(
    cancel: &CancellationToken,
    mut operation: F,
    policy: &P,
    is_retryable: Option<&(dyn Fn(&E) -> bool + Send + Sync)>,
    mut on_retry: C,
) -> Result<T, Error<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    P: RetryPolicy + ?Sized,
    C: FnMut(u32, &E, Duration),
{
    let loop_start = Instant::now();
    let mut attempt: u32 = 0;
    loop {
        let error = match operation().await {
            Ok(v) => return Ok(v),
            Err(e) => e,
        };
        if is_retryable.is_some_and(|f| !f(&error)) {
            return Err(Error::Operation(error));
        }
        attempt = attempt.saturating_add(1);
        let delay = match policy.compute_next_delay(attempt, loop_start.elapsed()) {
            NextDelay::Stop => return Err(Error::Operation(error)),
            NextDelay::Wait(d) => d,
        };
        on_retry(attempt, &error, delay);
        tracing::debug!(attempt, ?delay, "retrying operation");
        sleep(cancel, delay).await?;
    }
}

/// Waits for `delay`, returning early if `cancel` fires.
pub(crate) async fn sleep(cancel: &CancellationToken, delay: Duration) -> Result<(), Cancelled> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(Cancelled),
        _ = tokio::time::sleep(delay) => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exponential_retry_policy::ExponentialRetryPolicyBuilder;
    use crate::retry_policy::tests::MockRetryPolicy;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};
    use test_case::test_case;

    #[derive(thiserror::Error, Debug, PartialEq)]
    #[error("some error {0}")]
    struct SomeError(u32);

    const SUCCEED_ON_ATTEMPT: u32 = 5;

    // Fails with `SomeError(n)` on call `n` until `SUCCEED_ON_ATTEMPT`.
    fn counting_operation(
        calls: Arc<AtomicU32>,
    ) -> impl FnMut() -> std::future::Ready<Result<u32, SomeError>> {
        move || {
            let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
            if n == SUCCEED_ON_ATTEMPT {
                std::future::ready(Ok(n))
            } else {
                std::future::ready(Err(SomeError(n)))
            }
        }
    }

    fn test_policy(maximum_attempts: u32) -> crate::exponential_retry_policy::ExponentialRetryPolicy {
        ExponentialRetryPolicyBuilder::new()
            .with_initial_interval(Duration::from_millis(1))
            .with_maximum_interval(Duration::from_millis(5))
            .with_maximum_attempts(maximum_attempts)
            .build()
            .expect("hard-coded values are valid")
    }

    fn always(_: &SomeError) -> bool {
        true
    }

    fn never(_: &SomeError) -> bool {
        false
    }

    #[test_case(2 * SUCCEED_ON_ATTEMPT, None, false, SUCCEED_ON_ATTEMPT; "success")]
    #[test_case(3, None, true, 4; "too many tries")]
    #[test_case(2 * SUCCEED_ON_ATTEMPT, Some(always as fn(&SomeError) -> bool), false, SUCCEED_ON_ATTEMPT; "success with always retry")]
    #[test_case(2 * SUCCEED_ON_ATTEMPT, Some(never as fn(&SomeError) -> bool), true, 1; "never retry")]
    #[tokio::test(start_paused = true)]
    async fn attempts(
        maximum_attempts: u32,
        predicate: Option<fn(&SomeError) -> bool>,
        should_error: bool,
        expected_calls: u32,
    ) {
        let calls = Arc::new(AtomicU32::new(0));
        let policy = test_policy(maximum_attempts);
        let is_retryable = predicate
            .as_ref()
            .map(|f| f as &(dyn Fn(&SomeError) -> bool + Send + Sync));
        let result = retry(
            &CancellationToken::new(),
            counting_operation(calls.clone()),
            &policy,
            is_retryable,
        )
        .await;
        assert_eq!(result.is_err(), should_error, "{result:?}");
        assert_eq!(calls.load(Ordering::SeqCst), expected_calls);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_returns_last_error() {
        let calls = Arc::new(AtomicU32::new(0));
        let err = retry(
            &CancellationToken::new(),
            counting_operation(calls.clone()),
            &test_policy(3),
            None,
        )
        .await
        .expect_err("policy should be exhausted");
        assert_eq!(err.operation(), Some(&SomeError(4)));
        assert!(!err.is_cancelled(), "{err:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn non_retryable_returns_first_error() {
        let calls = Arc::new(AtomicU32::new(0));
        let err = retry(
            &CancellationToken::new(),
            counting_operation(calls.clone()),
            &test_policy(0),
            Some(&never),
        )
        .await
        .expect_err("non-retryable errors stop the loop");
        assert_eq!(err.into_operation(), Some(SomeError(1)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_during_wait() {
        let calls = Arc::new(AtomicU32::new(0));
        let policy = ExponentialRetryPolicyBuilder::new()
            .with_initial_interval(Duration::from_millis(10))
            .with_maximum_interval(Duration::from_millis(50))
            .with_maximum_attempts(10)
            .build()
            .expect("hard-coded values are valid");
        let cancel = CancellationToken::new();
        let canceller = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            canceller.cancel();
        });

        let start = Instant::now();
        let operation = {
            let calls = calls.clone();
            move || {
                calls.fetch_add(1, Ordering::SeqCst);
                std::future::ready(Err::<(), _>(SomeError(0)))
            }
        };
        let err = retry(&cancel, operation, &policy, None)
            .await
            .expect_err("the loop should be cancelled");
        assert!(err.is_cancelled(), "{err:?}");
        assert_eq!(start.elapsed(), Duration::from_millis(50));
        let calls = calls.load(Ordering::SeqCst);
        assert!((2..10).contains(&calls), "calls={calls}");
    }

    #[tokio::test(start_paused = true)]
    async fn already_cancelled_does_not_wait() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let start = Instant::now();
        let calls = Arc::new(AtomicU32::new(0));
        let err = retry(&cancel, counting_operation(calls.clone()), &test_policy(10), None)
            .await
            .expect_err("the loop should be cancelled");
        assert!(err.is_cancelled(), "{err:?}");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn waits_for_policy_delays() -> anyhow::Result<()> {
        let mut seq = mockall::Sequence::new();
        let mut policy = MockRetryPolicy::new();
        for (attempt, delay) in [(1_u32, 100_u64), (2, 200), (3, 400), (4, 800)] {
            policy
                .expect_compute_next_delay()
                .once()
                .in_sequence(&mut seq)
                .withf(move |a, _| *a == attempt)
                .return_const(NextDelay::Wait(Duration::from_millis(delay)));
        }

        let start = Instant::now();
        let calls = Arc::new(AtomicU32::new(0));
        let mut retries = Vec::new();
        let value = retry_with_callback(
            &CancellationToken::new(),
            counting_operation(calls.clone()),
            &policy,
            None,
            |attempt, e, delay| retries.push((attempt, e.0, delay)),
        )
        .await?;
        assert_eq!(value, SUCCEED_ON_ATTEMPT);
        assert_eq!(start.elapsed(), Duration::from_millis(1500));
        assert_eq!(
            retries,
            vec![
                (1, 1, Duration::from_millis(100)),
                (2, 2, Duration::from_millis(200)),
                (3, 3, Duration::from_millis(400)),
                (4, 4, Duration::from_millis(800)),
            ]
        );
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn elapsed_time_reaches_policy() {
        let mut seq = mockall::Sequence::new();
        let mut policy = MockRetryPolicy::new();
        policy
            .expect_compute_next_delay()
            .once()
            .in_sequence(&mut seq)
            .withf(|_, elapsed| *elapsed == Duration::ZERO)
            .return_const(NextDelay::Wait(Duration::from_secs(3)));
        policy
            .expect_compute_next_delay()
            .once()
            .in_sequence(&mut seq)
            .withf(|_, elapsed| *elapsed == Duration::from_secs(3))
            .return_const(NextDelay::Stop);

        let result = retry(
            &CancellationToken::new(),
            || std::future::ready(Err::<(), _>(SomeError(0))),
            &policy,
            None,
        )
        .await;
        assert!(matches!(result, Err(Error::Operation(SomeError(0)))), "{result:?}");
    }

    #[test]
    fn error_display() {
        let e = Error::Operation(SomeError(3));
        assert_eq!(e.to_string(), "some error 3");
        let e = Error::<SomeError>::from(Cancelled);
        assert_eq!(e.to_string(), "the retry loop was cancelled");
    }
}
