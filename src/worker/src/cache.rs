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

//! A bounded LRU cache of workflow executions.
//!
//! Workers keep the state of recently processed executions in memory, so the
//! next decision task for the same execution can reuse it instead of
//! replaying the full history. The cache is bounded, inserting into a full
//! cache evicts the least recently used execution. Each eviction is queued
//! for a background task that asks the service to reset the execution's
//! sticky task list.
//!
//! Only evictions trigger a reset. Executions explicitly removed, replaced,
//! or cleared are assumed to be handled by the caller.

use crate::Error;
use crate::eviction::{self, Eviction, StickyResetter};
use crate::execution::{CachedExecution, ExecutionKey};
use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;
use tokio::sync::mpsc::UnboundedSender;

const DEFAULT_CAPACITY: usize = 10_000;
const DEFAULT_RESET_TIMEOUT: Duration = Duration::from_secs(10);

/// Configuration for [WorkflowExecutionCache].
#[derive(Clone, Debug)]
pub struct CacheOptions {
    /// The maximum number of cached executions. Must be greater than zero.
    pub capacity: usize,
    /// How long to wait for each sticky reset call. Must be greater than
    /// zero. Calls that take longer are abandoned and logged.
    pub reset_timeout: Duration,
}

impl Default for CacheOptions {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
            reset_timeout: DEFAULT_RESET_TIMEOUT,
        }
    }
}

struct Entry<V> {
    state: Arc<V>,
    task_list: String,
    generation: u64,
}

struct Inner<V> {
    entries: LruCache<ExecutionKey, Entry<V>>,
    next_generation: u64,
}

/// A bounded, thread-safe cache of workflow execution state.
///
/// All operations are synchronous and never wait on the service. The cache
/// must be created inside a tokio runtime, it spawns the task that delivers
/// sticky resets.
///
/// # Example
/// ```
/// # use durable_worker::cache::{CacheOptions, WorkflowExecutionCache};
/// # use durable_worker::eviction::{Eviction, StickyResetter};
/// # use durable_worker::execution::{CachedExecution, ExecutionKey};
/// # use durable_worker::ServiceError;
/// # use std::sync::Arc;
/// # #[derive(Debug)]
/// # struct Service;
/// # #[async_trait::async_trait]
/// # impl StickyResetter for Service {
/// #     async fn reset_sticky_execution(&self, _: &Eviction) -> Result<(), ServiceError> { Ok(()) }
/// # }
/// struct State;
/// impl CachedExecution for State {
///     fn dispose(&self) {}
/// }
/// # tokio_test::block_on(async {
/// let options = CacheOptions {
///     capacity: 1,
///     ..Default::default()
/// };
/// let cache = WorkflowExecutionCache::new(options, Arc::new(Service))?;
/// let a = ExecutionKey::new("wf-a", "run")?;
/// let b = ExecutionKey::new("wf-b", "run")?;
/// cache.put(a.clone(), Arc::new(State), "task-list");
/// let evicted = cache.put(b.clone(), Arc::new(State), "task-list");
/// assert_eq!(evicted, Some(a));
/// assert!(cache.get(&b).is_some());
/// # Ok::<(), durable_worker::Error>(())
/// # });
/// ```
pub struct WorkflowExecutionCache<V>
where
    V: CachedExecution,
{
    inner: Arc<Mutex<Inner<V>>>,
    eviction_tx: UnboundedSender<Eviction>,
}

impl<V> WorkflowExecutionCache<V>
where
    V: CachedExecution,
{
    /// Creates a cache and starts its eviction dispatcher.
    ///
    /// Fails if `options.capacity` or `options.reset_timeout` is zero, or if
    /// called outside a tokio runtime.
    pub fn new(options: CacheOptions, resetter: Arc<dyn StickyResetter>) -> Result<Self, Error> {
        let capacity = NonZeroUsize::new(options.capacity).ok_or(Error::ZeroCapacity)?;
        if options.reset_timeout.is_zero() {
            return Err(Error::ZeroResetTimeout);
        }
        let runtime = tokio::runtime::Handle::try_current().map_err(Error::NoRuntime)?;
        let inner = Arc::new(Mutex::new(Inner {
            entries: LruCache::new(capacity),
            next_generation: 0,
        }));
        let weak = Arc::downgrade(&inner);
        // The dispatcher is detached, it drains the queue and exits once the
        // cache is dropped.
        let (eviction_tx, _dispatcher) =
            eviction::spawn(&runtime, resetter, options.reset_timeout, move |eviction| {
                is_stale(&weak, eviction)
            });
        tracing::debug!(capacity = capacity.get(), "created workflow execution cache");
        Ok(Self { inner, eviction_tx })
    }

    /// Returns the cached state for `key`, marking it most recently used.
    pub fn get(&self, key: &ExecutionKey) -> Option<Arc<V>> {
        let mut inner = self.lock();
        inner.entries.get(key).map(|e| e.state.clone())
    }

    /// Inserts or replaces the state for `key`.
    ///
    /// If the cache is full the least recently used execution is evicted, a
    /// sticky reset is queued for it, and its key is returned. Replacing an
    /// existing entry with a different state disposes the old state.
    pub fn put<T>(&self, key: ExecutionKey, state: Arc<V>, task_list: T) -> Option<ExecutionKey>
    where
        T: Into<String>,
    {
        let (released, evicted) = {
            let mut inner = self.lock();
            inner.next_generation += 1;
            let entry = Entry {
                state: state.clone(),
                task_list: task_list.into(),
                generation: inner.next_generation,
            };
            match inner.entries.push(key.clone(), entry) {
                None => (None, None),
                Some((k, old)) if k == key => (old.release(&state), None),
                Some((k, old)) => {
                    tracing::debug!(
                        execution = %k,
                        generation = old.generation,
                        "evicted workflow execution"
                    );
                    // Queue under the lock, so notifications follow the
                    // eviction order.
                    let eviction = Eviction {
                        key: k.clone(),
                        task_list: old.task_list.clone(),
                        generation: old.generation,
                    };
                    if self.eviction_tx.send(eviction).is_err() {
                        tracing::warn!(execution = %k, "eviction dispatcher is not running");
                    }
                    (old.release(&state), Some(k))
                }
            }
        };
        if let Some(state) = released {
            state.dispose();
        }
        evicted
    }

    /// Removes the state for `key`, returning `true` if it was cached.
    ///
    /// The removed state is disposed. No sticky reset is sent.
    pub fn remove(&self, key: &ExecutionKey) -> bool {
        let removed = self.lock().entries.pop(key);
        match removed {
            Some(entry) => {
                entry.state.dispose();
                true
            }
            None => false,
        }
    }

    /// Removes and disposes all the cached executions.
    pub fn clear(&self) {
        let removed = drain(&mut self.lock());
        tracing::debug!(count = removed.len(), "cleared workflow execution cache");
        removed.iter().for_each(|e| e.state.dispose());
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.lock().entries.cap().get()
    }

    /// Returns `true` if `key` is cached, without changing its recency.
    pub fn contains(&self, key: &ExecutionKey) -> bool {
        self.lock().entries.contains(key)
    }

    fn lock(&self) -> MutexGuard<'_, Inner<V>> {
        self.inner
            .lock()
            .expect("workflow execution cache lock is poisoned")
    }
}

impl<V> Entry<V> {
    // Returns the state to dispose, unless it is still cached as `current`.
    fn release(self, current: &Arc<V>) -> Option<Arc<V>> {
        (!Arc::ptr_eq(&self.state, current)).then_some(self.state)
    }
}

impl<V> Drop for WorkflowExecutionCache<V>
where
    V: CachedExecution,
{
    fn drop(&mut self) {
        // Do not panic in drop if another thread poisoned the lock.
        let removed = match self.inner.lock() {
            Ok(mut inner) => drain(&mut inner),
            Err(_) => Vec::new(),
        };
        removed.iter().for_each(|e| e.state.dispose());
    }
}

impl<V> std::fmt::Debug for WorkflowExecutionCache<V>
where
    V: CachedExecution,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let (len, capacity) = match self.inner.lock() {
            Ok(inner) => (inner.entries.len(), inner.entries.cap().get()),
            Err(_) => (0, 0),
        };
        f.debug_struct("WorkflowExecutionCache")
            .field("len", &len)
            .field("capacity", &capacity)
            .finish()
    }
}

fn drain<V>(inner: &mut Inner<V>) -> Vec<Entry<V>> {
    let mut removed = Vec::with_capacity(inner.entries.len());
    while let Some((_, entry)) = inner.entries.pop_lru() {
        removed.push(entry);
    }
    removed
}

// An eviction is stale if the execution was inserted again after it was
// evicted. The newer entry owns the sticky task list now.
fn is_stale<V>(inner: &Weak<Mutex<Inner<V>>>, eviction: &Eviction) -> bool {
    let Some(inner) = inner.upgrade() else {
        return false;
    };
    let Ok(inner) = inner.lock() else {
        return false;
    };
    inner
        .entries
        .peek(&eviction.key)
        .is_some_and(|e| e.generation > eviction.generation)
}
