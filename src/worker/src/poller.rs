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

//! Polls decision tasks and keeps their executions in the sticky cache.
//!
//! A [DecisionPoller] runs a fixed number of poll loops. All the loops share
//! a [ConcurrentRetrier], so when the service starts failing every loop
//! backs off together, and a single success releases them all.

use crate::cache::WorkflowExecutionCache;
use crate::execution::{CachedExecution, ExecutionKey};
use crate::{Error, ServiceError};
use durable_backoff::concurrent_retrier::ConcurrentRetrier;
use durable_backoff::exponential_retry_policy::ExponentialRetryPolicyBuilder;
use durable_backoff::retry::{self, retry_with_callback};
use durable_backoff::retry_policy::RetryPolicy;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

const DEFAULT_POLLERS: usize = 2;

/// A decision task returned by the service.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DecisionTask {
    /// The execution this task belongs to.
    pub execution: ExecutionKey,
    /// The task list the task was polled from.
    pub task_list: String,
    /// Opaque token used to respond to the task.
    pub task_token: Vec<u8>,
    /// If `true` the task carries the full execution history.
    pub from_start: bool,
}

/// Long-polls the service for decision tasks.
#[async_trait::async_trait]
pub trait DecisionTaskService: std::fmt::Debug + Send + Sync {
    /// Returns the next task, or `None` if the long poll expired empty.
    async fn poll_for_decision_task(
        &self,
        task_list: &str,
    ) -> Result<Option<DecisionTask>, ServiceError>;
}

/// The outcome of processing a decision task.
#[derive(Debug)]
pub enum Decision<S> {
    /// The execution continues, keep its state cached.
    Sticky(Arc<S>),
    /// The execution is closed, drop its state.
    Completed,
}

/// Processes decision tasks.
///
/// `cached` is the state kept from the previous task of the same execution,
/// if any. It is never provided for tasks carrying the full history.
#[async_trait::async_trait]
pub trait DecisionHandler: Send + Sync {
    type State: CachedExecution;

    async fn handle(
        &self,
        task: &DecisionTask,
        cached: Option<Arc<Self::State>>,
    ) -> Result<Decision<Self::State>, ServiceError>;
}

/// Configuration for [DecisionPoller].
#[derive(Clone, Debug)]
pub struct PollerOptions {
    /// The task list to poll. Must not be empty.
    pub task_list: String,
    /// The number of concurrent poll loops. Must be greater than zero.
    pub pollers: usize,
    /// Retries transient errors within a single poll.
    pub poll_retry: Arc<dyn RetryPolicy>,
    /// Throttles all the poll loops after failed polls.
    ///
    /// If this policy stops, the loops poll without delay until the next
    /// success. Prefer policies without an expiration or attempt limit.
    pub backpressure: Arc<dyn RetryPolicy>,
}

impl Default for PollerOptions {
    fn default() -> Self {
        let poll_retry = ExponentialRetryPolicyBuilder::new()
            .with_initial_interval(Duration::from_millis(200))
            .with_maximum_interval(Duration::from_secs(10))
            .clamp();
        let backpressure = ExponentialRetryPolicyBuilder::new()
            .with_initial_interval(Duration::from_secs(1))
            .with_maximum_interval(Duration::from_secs(60))
            .with_expiration_interval(Duration::ZERO)
            .clamp();
        Self {
            task_list: String::new(),
            pollers: DEFAULT_POLLERS,
            poll_retry: Arc::new(poll_retry),
            backpressure: Arc::new(backpressure),
        }
    }
}

/// Runs the poll loops for a task list.
#[derive(Debug)]
pub struct DecisionPoller<S, H>
where
    H: DecisionHandler,
{
    service: Arc<S>,
    handler: Arc<H>,
    cache: Arc<WorkflowExecutionCache<H::State>>,
    retrier: ConcurrentRetrier,
    options: PollerOptions,
}

impl<S, H> DecisionPoller<S, H>
where
    S: DecisionTaskService + 'static,
    H: DecisionHandler + 'static,
{
    pub fn new(
        service: Arc<S>,
        handler: Arc<H>,
        cache: Arc<WorkflowExecutionCache<H::State>>,
        options: PollerOptions,
    ) -> Result<Self, Error> {
        if options.task_list.is_empty() {
            return Err(Error::EmptyTaskList);
        }
        if options.pollers == 0 {
            return Err(Error::NoPollers);
        }
        let retrier = ConcurrentRetrier::new(options.backpressure.clone());
        Ok(Self {
            service,
            handler,
            cache,
            retrier,
            options,
        })
    }

    /// Runs the poll loops until `shutdown` is cancelled.
    ///
    /// On return all the loops have stopped and the cache is cleared.
    pub async fn run(self, shutdown: CancellationToken) {
        tracing::info!(
            task_list = %self.options.task_list,
            pollers = self.options.pollers,
            "starting decision pollers"
        );
        let poller = Arc::new(self);
        let mut loops = JoinSet::new();
        for id in 0..poller.options.pollers {
            let poller = poller.clone();
            let shutdown = shutdown.clone();
            loops.spawn(async move { poller.poll_loop(id, shutdown).await });
        }
        while let Some(r) = loops.join_next().await {
            if let Err(e) = r {
                tracing::error!("decision poll loop failed: {e}");
            }
        }
        poller.cache.clear();
        tracing::info!(task_list = %poller.options.task_list, "stopped decision pollers");
    }

    async fn poll_loop(&self, id: usize, shutdown: CancellationToken) {
        let is_retryable = ServiceError::is_transient;
        loop {
            if self.retrier.throttle(&shutdown).await.is_err() {
                break;
            }
            let poll = retry_with_callback(
                &shutdown,
                || self.service.poll_for_decision_task(&self.options.task_list),
                &self.options.poll_retry,
                Some(&is_retryable),
                |attempt, e, delay| {
                    tracing::debug!(poller = id, attempt, ?delay, "retrying decision task poll: {e}")
                },
            );
            let result = tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                r = poll => r,
            };
            let task = match result {
                Ok(task) => {
                    self.retrier.succeeded();
                    task
                }
                Err(retry::Error::Cancelled(_)) => break,
                Err(retry::Error::Operation(e)) => {
                    self.retrier.failed();
                    tracing::warn!(
                        poller = id,
                        failures = self.retrier.failure_count(),
                        "cannot poll for decision tasks: {e}"
                    );
                    continue;
                }
            };
            if let Some(task) = task {
                self.process(task).await;
            }
        }
        tracing::debug!(poller = id, "decision poll loop stopped");
    }

    async fn process(&self, task: DecisionTask) {
        let key = task.execution.clone();
        let mut cached = self.cache.get(&key);
        if cached.is_some() && task.from_start {
            tracing::warn!(
                execution = %key,
                "received the full history for a cached execution, discarding the cached state"
            );
            self.cache.remove(&key);
            cached = None;
        }
        match self.handler.handle(&task, cached).await {
            Ok(Decision::Sticky(state)) => {
                self.cache.put(key, state, task.task_list);
            }
            Ok(Decision::Completed) => {
                self.cache.remove(&key);
            }
            Err(e) => {
                tracing::warn!(execution = %key, "cannot process decision task: {e}");
                self.cache.remove(&key);
            }
        }
    }
}
