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

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::{Event, Level, Subscriber, field};
use tracing_subscriber::{Layer, layer::Context, prelude::*};

/// A tracing event recorded by [EventCapture].
#[derive(Clone, Debug, PartialEq)]
pub struct CapturedEvent {
    pub level: Level,
    /// The formatted message of the event.
    pub message: String,
    /// The remaining fields, formatted with their `Debug` representation.
    pub fields: HashMap<String, String>,
}

struct EventVisitor<'a>(&'a mut HashMap<String, String>);

impl field::Visit for EventVisitor<'_> {
    fn record_str(&mut self, field: &field::Field, value: &str) {
        self.0.insert(field.name().to_string(), value.to_string());
    }

    fn record_debug(&mut self, field: &field::Field, value: &dyn std::fmt::Debug) {
        self.0.insert(field.name().to_string(), format!("{value:?}"));
    }
}

/// A tracing layer capturing events, for tests that assert on logs.
///
/// The layer is installed as the default subscriber for the current thread
/// only, so tests running in parallel do not see each other's events.
///
/// # Example
/// ```
/// use durable_test_utils::event_capture::EventCapture;
///
/// let (capture, _guard) = EventCapture::install();
/// tracing::warn!(execution = "wf/run", "cannot reset sticky execution");
/// let events = capture.at_level(tracing::Level::WARN);
/// assert_eq!(events.len(), 1);
/// assert_eq!(events[0].message, "cannot reset sticky execution");
/// assert_eq!(events[0].fields.get("execution").map(String::as_str), Some("wf/run"));
/// ```
#[derive(Clone, Debug, Default)]
pub struct EventCapture {
    events: Arc<Mutex<Vec<CapturedEvent>>>,
}

impl EventCapture {
    /// Installs a new capture layer for the current thread.
    ///
    /// Events are captured while the returned guard is in scope.
    pub fn install() -> (Self, tracing::subscriber::DefaultGuard) {
        let capture = Self::default();
        let subscriber = tracing_subscriber::registry().with(capture.clone());
        let guard = tracing::subscriber::set_default(subscriber);
        (capture, guard)
    }

    /// Returns all the events captured so far.
    pub fn events(&self) -> Vec<CapturedEvent> {
        self.events.lock().unwrap().clone()
    }

    /// Returns the events captured so far with the given level.
    pub fn at_level(&self, level: Level) -> Vec<CapturedEvent> {
        self.events()
            .into_iter()
            .filter(|e| e.level == level)
            .collect()
    }
}

impl<S> Layer<S> for EventCapture
where
    S: Subscriber,
{
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let mut fields = HashMap::new();
        event.record(&mut EventVisitor(&mut fields));
        let message = fields.remove("message").unwrap_or_default();
        self.events.lock().unwrap().push(CapturedEvent {
            level: *event.metadata().level(),
            message,
            fields,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn captures_events() {
        let (capture, _guard) = EventCapture::install();
        tracing::debug!(attempt = 3, "retrying");
        tracing::warn!(key = %"wf/run", "failed: {}", "denied");

        let events = capture.events();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].level, Level::DEBUG);
        assert_eq!(events[0].message, "retrying");
        assert_eq!(events[0].fields.get("attempt").map(String::as_str), Some("3"));

        let warnings = capture.at_level(Level::WARN);
        assert_eq!(
            warnings,
            vec![CapturedEvent {
                level: Level::WARN,
                message: "failed: denied".to_string(),
                fields: HashMap::from([("key".to_string(), "wf/run".to_string())]),
            }]
        );
    }

    #[test]
    fn scoped_to_guard() {
        let (capture, guard) = EventCapture::install();
        tracing::info!("captured");
        drop(guard);
        tracing::info!("not captured");
        assert_eq!(capture.events().len(), 1);
    }
}
