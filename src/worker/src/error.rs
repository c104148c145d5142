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

//! Errors for the durable workflow worker.

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Represents a configuration or usage error in the worker components.
#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// An execution key was created with an empty workflow or run id.
    #[error("the {0} of a workflow execution must not be empty")]
    EmptyExecutionField(&'static str),

    /// The execution cache was configured with no room for executions.
    #[error("the workflow execution cache capacity must be greater than zero")]
    ZeroCapacity,

    /// The execution cache was configured to abandon sticky resets
    /// immediately.
    #[error("the sticky reset timeout must be greater than zero")]
    ZeroResetTimeout,

    /// The execution cache was created outside a tokio runtime.
    ///
    /// The cache runs a background task to notify the service about evicted
    /// executions.
    #[error("the workflow execution cache must be created inside a tokio runtime")]
    NoRuntime(#[source] tokio::runtime::TryCurrentError),

    /// A decision poller was configured without a task list.
    #[error("the decision poller requires a task list name")]
    EmptyTaskList,

    /// A decision poller was configured with no poll loops.
    #[error("the decision poller requires at least one poll loop")]
    NoPollers,
}

/// An error returned by the workflow service.
///
/// The worker does not interpret service errors beyond their transient flag.
/// Transient errors are retried by the poll loops, permanent errors are
/// reported and count as failures for backpressure.
#[derive(Debug)]
pub struct ServiceError {
    transient: bool,
    source: BoxError,
}

impl ServiceError {
    /// Creates an error for a condition that may clear up on its own.
    pub fn transient<T: Into<BoxError>>(source: T) -> Self {
        Self {
            transient: true,
            source: source.into(),
        }
    }

    /// Creates an error for a condition that retrying will not fix.
    pub fn permanent<T: Into<BoxError>>(source: T) -> Self {
        Self {
            transient: false,
            source: source.into(),
        }
    }

    pub fn is_transient(&self) -> bool {
        self.transient
    }
}

impl std::fmt::Display for ServiceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = if self.transient {
            "transient"
        } else {
            "permanent"
        };
        write!(f, "the workflow service returned a {kind} error: {}", self.source)
    }
}

impl std::error::Error for ServiceError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(self.source.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn service_error() {
        let e = ServiceError::transient("unavailable");
        assert!(e.is_transient(), "{e:?}");
        assert!(e.to_string().contains("transient"), "{e}");
        assert!(e.to_string().contains("unavailable"), "{e}");
        assert_eq!(e.source().map(|s| s.to_string()).as_deref(), Some("unavailable"));

        let e = ServiceError::permanent(std::io::Error::other("denied"));
        assert!(!e.is_transient(), "{e:?}");
        assert!(e.to_string().contains("permanent"), "{e}");
        let source = e
            .source()
            .and_then(|s| s.downcast_ref::<std::io::Error>())
            .expect("source is the io::Error");
        assert_eq!(source.to_string(), "denied");
    }

    #[test]
    fn error_display() {
        let e = Error::EmptyExecutionField("run id");
        assert!(e.to_string().contains("run id"), "{e}");
        let e = Error::ZeroCapacity;
        assert!(e.to_string().contains("greater than zero"), "{e}");
    }
}
