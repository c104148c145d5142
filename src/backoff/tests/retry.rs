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

//! Verify the retry helpers are usable from outside the crate, and that they
//! compose: a loop driven by `retry` feeding a shared `ConcurrentRetrier`.

#[cfg(test)]
mod tests {
    use durable_backoff::concurrent_retrier::ConcurrentRetrier;
    use durable_backoff::exponential_retry_policy::ExponentialRetryPolicyBuilder;
    use durable_backoff::retry::{Error, retry};
    use durable_backoff::retry_policy::RetryPolicy;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;
    use tokio::time::Instant;
    use tokio_util::sync::CancellationToken;

    type Result = anyhow::Result<()>;

    #[tokio::test(start_paused = true)]
    async fn success_before_exhaustion() -> Result {
        let policy = ExponentialRetryPolicyBuilder::new()
            .with_initial_interval(Duration::from_millis(1))
            .with_maximum_interval(Duration::from_millis(5))
            .with_maximum_attempts(10)
            .build()?;
        let calls = AtomicU32::new(0);
        let op = || async {
            if calls.fetch_add(1, Ordering::SeqCst) < 4 {
                return Err(std::io::Error::other("transient"));
            }
            Ok("done")
        };
        let got = retry(&CancellationToken::new(), op, &policy, None).await?;
        assert_eq!(got, "done");
        assert_eq!(calls.load(Ordering::SeqCst), 5);
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_stops_loop() -> Result {
        let policy = ExponentialRetryPolicyBuilder::new()
            .with_initial_interval(Duration::from_secs(1))
            .with_maximum_interval(Duration::from_secs(1))
            .with_expiration_interval(Duration::from_secs(10))
            .with_jitter(0.0)
            .build()?;
        let start = Instant::now();
        let calls = AtomicU32::new(0);
        let op = || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err::<(), _>(std::io::Error::other("always fails"))
        };
        let err = retry(&CancellationToken::new(), op, &policy, None)
            .await
            .expect_err("the policy should expire");
        assert!(!err.is_cancelled(), "{err:?}");
        assert!(matches!(err, Error::Operation(_)), "{err:?}");
        assert_eq!(start.elapsed(), Duration::from_secs(10));
        assert_eq!(calls.load(Ordering::SeqCst), 11);
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn success_stops_later_throttling() -> Result {
        let policy: Arc<dyn RetryPolicy> = Arc::new(
            ExponentialRetryPolicyBuilder::new()
                .with_initial_interval(Duration::from_millis(100))
                .with_maximum_interval(Duration::from_secs(1))
                .with_expiration_interval(Duration::ZERO)
                .build()?,
        );
        let retrier = Arc::new(ConcurrentRetrier::new(policy));
        for _ in 0..5 {
            retrier.failed();
        }
        let d = retrier.throttle_duration();
        assert!(
            d.is_some_and(|d| d <= Duration::from_secs(1)),
            "{d:?}"
        );

        // A caller already waiting keeps its delay.
        let cancel = CancellationToken::new();
        let sleeper = {
            let retrier = retrier.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move {
                let start = Instant::now();
                retrier.throttle(&cancel).await.map(|_| start.elapsed())
            })
        };
        tokio::task::yield_now().await;

        // Callers throttling after the success do not wait.
        retrier.succeeded();
        assert_eq!(retrier.throttle_duration(), None);
        let start = Instant::now();
        for _ in 0..4 {
            retrier.throttle(&cancel).await?;
        }
        assert_eq!(start.elapsed(), Duration::ZERO);

        let slept = sleeper.await??;
        assert!(
            slept > Duration::ZERO && slept <= Duration::from_secs(1),
            "{slept:?}"
        );
        Ok(())
    }
}
