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

use crate::Error;

/// Identifies a single run of a workflow.
///
/// Both the workflow id and the run id are required. Keys are compared by
/// value, two keys with the same ids refer to the same execution.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ExecutionKey {
    workflow_id: String,
    run_id: String,
}

impl ExecutionKey {
    /// Creates a new key.
    ///
    /// # Example
    /// ```
    /// # use durable_worker::execution::ExecutionKey;
    /// let key = ExecutionKey::new("order-123", "run-1")?;
    /// assert_eq!(key.to_string(), "order-123/run-1");
    /// assert!(ExecutionKey::new("order-123", "").is_err());
    /// # Ok::<(), durable_worker::Error>(())
    /// ```
    pub fn new<W, R>(workflow_id: W, run_id: R) -> Result<Self, Error>
    where
        W: Into<String>,
        R: Into<String>,
    {
        let workflow_id = workflow_id.into();
        let run_id = run_id.into();
        if workflow_id.is_empty() {
            return Err(Error::EmptyExecutionField("workflow id"));
        }
        if run_id.is_empty() {
            return Err(Error::EmptyExecutionField("run id"));
        }
        Ok(Self {
            workflow_id,
            run_id,
        })
    }

    pub fn workflow_id(&self) -> &str {
        &self.workflow_id
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }
}

impl std::fmt::Display for ExecutionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.workflow_id, self.run_id)
    }
}

/// The in-memory state of a workflow execution held by the cache.
///
/// The cache owns the lifecycle of this state. When an entry leaves the
/// cache (evicted, removed, replaced, or cleared) the cache calls
/// [dispose][CachedExecution::dispose] exactly once, after releasing its
/// internal lock. Implementations should release any resources (timers,
/// coroutines, buffered history) in `dispose`. Other holders of the same
/// `Arc` may still observe the state afterwards.
pub trait CachedExecution: Send + Sync + 'static {
    fn dispose(&self);
}
