//! Capturing and inspecting log output in tests.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::{
    collections::HashMap,
    io::Write,
    sync::{Arc, Mutex},
};
use tracing::Level;
use tracing_subscriber::fmt::MakeWriter;

/// Captures the JSON log lines written while a weather test runs, so the
/// test can check which events the backend, cache or breaker emitted.
///
/// Hand the watcher to `tracing_subscriber` as its writer; lines are parsed
/// lazily, the next time the test asks about them.
#[derive(Default)]
pub struct LogWatcher {
    /// Bytes written by the subscriber that have not been parsed yet. May end
    /// in the middle of a line.
    buf: Arc<Mutex<Vec<u8>>>,

    /// Every complete line parsed so far, oldest first.
    events: Vec<TracingJsonEvent>,
}

impl LogWatcher {
    /// All events captured so far.
    pub fn events(&mut self) -> std::slice::Iter<TracingJsonEvent> {
        self.convert_events();
        self.events.iter()
    }

    /// Whether any captured event satisfies `predicate`.
    ///
    /// ```no_run
    /// # use merino_integration_tests::LogWatcher;
    /// # let mut log_watcher = LogWatcher::default();
    /// assert!(log_watcher.has(|event| event.field_contains("location_key", "49569_PC")));
    /// ```
    #[must_use = "wrap LogWatcher::has in assert!() to check the logs"]
    pub fn has<F>(&mut self, predicate: F) -> bool
    where
        F: FnMut(&TracingJsonEvent) -> bool,
    {
        self.events().any(predicate)
    }

    /// Whether an event with this `type` field was logged, such as
    /// `weather.location.exhausted` or `pathfinder.learned`.
    #[must_use = "wrap LogWatcher::has_type in assert!() to check the logs"]
    pub fn has_type(&mut self, event_type: &str) -> bool {
        self.has(|event| event.is_type(event_type))
    }

    /// Parse every complete line waiting in the buffer. A trailing partial
    /// line stays buffered until the subscriber finishes writing it.
    fn convert_events(&mut self) {
        let mut buf = self.buf.lock().expect("log buffer mutex was poisoned");
        let complete = match buf.iter().rposition(|byte| *byte == b'\n') {
            Some(last_newline) => last_newline + 1,
            None => return,
        };

        let lines: Vec<u8> = buf.drain(..complete).collect();
        let text = String::from_utf8(lines).expect("log output was not utf8");
        for line in text.lines().filter(|line| !line.trim().is_empty()) {
            let event = serde_json::from_str(line)
                .unwrap_or_else(|error| panic!("log line is not a JSON event ({}): {}", error, line));
            self.events.push(event);
        }
    }
}

impl MakeWriter for LogWatcher {
    type Writer = LogWatcherWriter;

    fn make_writer(&self) -> Self::Writer {
        LogWatcherWriter {
            buf: self.buf.clone(),
        }
    }
}

/// The writer handed to the subscriber. It appends to the buffer of the
/// [`LogWatcher`] it came from, which the test keeps.
#[derive(Clone)]
pub struct LogWatcherWriter {
    /// Shared with the watcher.
    buf: Arc<Mutex<Vec<u8>>>,
}

impl Write for LogWatcherWriter {
    fn write(&mut self, new_bytes: &[u8]) -> std::io::Result<usize> {
        let mut buf = self
            .buf
            .lock()
            .map_err(|error| std::io::Error::new(std::io::ErrorKind::Other, error.to_string()))?;
        buf.extend_from_slice(new_bytes);
        Ok(new_bytes.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

/// One line of the subscriber's JSON output.
#[derive(Debug, Deserialize, Serialize)]
pub struct TracingJsonEvent {
    /// Fields of the event, such as `type`, `message` and `country`.
    pub fields: HashMap<String, Value>,
    /// Severity.
    #[serde(with = "serde_with::rust::display_fromstr")]
    pub level: Level,
    /// The module that logged the event, such as `merino_weather::pathfinder`.
    pub target: String,
    /// When the event was logged, as formatted by the subscriber.
    pub timestamp: String,
}

impl TracingJsonEvent {
    /// Whether the string field `field_name` contains `pat`. Missing and
    /// non-string fields never match.
    pub fn field_contains(&self, field_name: &str, pat: &str) -> bool {
        self.field_str(field_name)
            .map_or(false, |value| value.contains(pat))
    }

    /// Whether the `type` field is exactly `event_type`.
    pub fn is_type(&self, event_type: &str) -> bool {
        self.field_str("type") == Some(event_type)
    }

    /// The value of a string field.
    fn field_str(&self, field_name: &str) -> Option<&str> {
        self.fields.get(field_name).and_then(Value::as_str)
    }
}
