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

//! Sticky execution caching for durable workflow workers.
//!
//! A worker that just processed a decision task for an execution keeps the
//! execution state in memory. The service then routes the next decision task
//! for that execution to the same worker (the execution is "sticky"), which
//! resumes from the cached state instead of replaying the whole history.
//!
//! Memory is bounded. [WorkflowExecutionCache][cache::WorkflowExecutionCache]
//! evicts the least recently used execution when full and notifies the
//! service through a [StickyResetter][eviction::StickyResetter], so the
//! execution's next task goes to any worker.
//!
//! [DecisionPoller][poller::DecisionPoller] ties the cache to the service: it
//! runs the poll loops, hands tasks and cached state to a
//! [DecisionHandler][poller::DecisionHandler], and backs off all poll loops
//! together using [durable_backoff].

pub mod cache;
mod error;
pub mod eviction;
pub mod execution;
pub mod poller;

pub use error::{Error, ServiceError};
