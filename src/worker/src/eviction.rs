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

//! Notifies the workflow service about evicted executions.
//!
//! A worker that keeps an execution in its cache receives that execution's
//! decision tasks on a sticky task list. When the execution is evicted the
//! worker must tell the service to reset stickiness, otherwise the next
//! decision task waits in a queue nobody polls until it times out.
//!
//! The cache never calls the service directly. Evictions are queued on an
//! unbounded channel and a single background task dispatches them, one call
//! at a time, in the order they were queued.

use crate::ServiceError;
use crate::execution::ExecutionKey;
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::mpsc::{UnboundedSender, unbounded_channel};
use tokio::task::JoinHandle;
use tokio::time::Duration;

/// An execution removed from the cache to make room for another.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Eviction {
    /// The evicted execution.
    pub key: ExecutionKey,
    /// The task list the execution was polled from.
    pub task_list: String,
    /// The cache generation of the evicted entry.
    ///
    /// Generations increase with every insertion into the cache. They let
    /// the service, or a test, order notifications for the same execution.
    pub generation: u64,
}

/// Resets the sticky task list of evicted executions.
///
/// Implementations call the workflow service. Errors are logged by the
/// dispatcher and never reach the code that caused the eviction.
#[async_trait::async_trait]
pub trait StickyResetter: std::fmt::Debug + Send + Sync {
    async fn reset_sticky_execution(&self, eviction: &Eviction) -> Result<(), ServiceError>;
}

/// Starts the task dispatching evictions on `runtime`.
///
/// Returns the sender for queueing evictions and a handle to the task. The
/// dispatcher exits once all the senders are dropped and the queue is
/// drained. `is_stale` is consulted right before each call, notifications it
/// flags are dropped. A call taking longer than `reset_timeout` is abandoned,
/// so one unresponsive call cannot hold back the rest of the queue.
pub(crate) fn spawn<F>(
    runtime: &Handle,
    resetter: Arc<dyn StickyResetter>,
    reset_timeout: Duration,
    is_stale: F,
) -> (UnboundedSender<Eviction>, JoinHandle<()>)
where
    F: Fn(&Eviction) -> bool + Send + 'static,
{
    let (eviction_tx, mut eviction_rx) = unbounded_channel::<Eviction>();
    let handle = runtime.spawn(async move {
        while let Some(eviction) = eviction_rx.recv().await {
            if is_stale(&eviction) {
                tracing::debug!(
                    execution = %eviction.key,
                    generation = eviction.generation,
                    "skipping sticky reset, the execution was cached again"
                );
                continue;
            }
            reset(resetter.as_ref(), &eviction, reset_timeout).await;
        }
        tracing::debug!("eviction dispatcher stopped");
    });
    (eviction_tx, handle)
}

async fn reset(resetter: &dyn StickyResetter, eviction: &Eviction, reset_timeout: Duration) {
    let call = resetter.reset_sticky_execution(eviction);
    match tokio::time::timeout(reset_timeout, call).await {
        Ok(Ok(())) => tracing::debug!(
            execution = %eviction.key,
            task_list = %eviction.task_list,
            "reset sticky execution"
        ),
        Ok(Err(e)) => tracing::warn!(
            execution = %eviction.key,
            task_list = %eviction.task_list,
            "cannot reset sticky execution: {e}"
        ),
        Err(_) => tracing::warn!(
            execution = %eviction.key,
            task_list = %eviction.task_list,
            timeout = ?reset_timeout,
            "cannot reset sticky execution: the call timed out"
        ),
    }
}
