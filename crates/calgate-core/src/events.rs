//! Structured event logging.
//!
//! Log events are JSON objects emitted one per line through `tracing`.
//! Every event carries at least `timestamp`, `application`, and `log_type`;
//! callers add whatever fields describe the event. Emission never fails:
//! values that cannot be represented as JSON are stringified instead.

use std::fmt::Debug;

use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::Level;

/// A structured log event under construction.
///
/// Field insertion order is not preserved; consumers key on field names.
#[derive(Debug, Clone, Default)]
pub struct Event {
    fields: Map<String, Value>,
}

impl Event {
    /// Creates an empty event.
    pub fn new() -> Self {
        Self { fields: Map::new() }
    }

    /// Creates an event with a `message` field.
    pub fn message(text: impl Into<String>) -> Self {
        Self::new().with("message", text.into())
    }

    /// Adds a field to the event.
    ///
    /// A value that fails JSON conversion is replaced by its `Debug`
    /// rendering rather than aborting emission.
    pub fn with(mut self, key: impl Into<String>, value: impl Serialize + Debug) -> Self {
        let value = match serde_json::to_value(&value) {
            Ok(v) => v,
            Err(_) => Value::String(format!("{value:?}")),
        };
        self.fields.insert(key.into(), value);
        self
    }

    fn into_fields(self) -> Map<String, Value> {
        self.fields
    }
}

/// Severity-leveled JSON event logger.
///
/// Each logger carries an application name and a log type that are stamped
/// onto every event it emits (unless the event already sets them).
#[derive(Debug, Clone)]
pub struct EventLogger {
    name: String,
    application: String,
    log_type: String,
}

impl EventLogger {
    /// Creates a logger for the given component.
    pub fn new(
        name: impl Into<String>,
        application: impl Into<String>,
        log_type: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            application: application.into(),
            log_type: log_type.into(),
        }
    }

    /// Emits an event at ERROR level.
    pub fn error(&self, event: Event) {
        self.log(Level::ERROR, event);
    }

    /// Emits an event at WARN level.
    pub fn warn(&self, event: Event) {
        self.log(Level::WARN, event);
    }

    /// Emits an event at INFO level.
    pub fn info(&self, event: Event) {
        self.log(Level::INFO, event);
    }

    /// Emits an event at DEBUG level.
    pub fn debug(&self, event: Event) {
        self.log(Level::DEBUG, event);
    }

    /// Formats the event and emits it at the given level.
    pub fn log(&self, level: Level, event: Event) {
        let line = self.format_event(event);
        match level {
            Level::ERROR => tracing::error!(logger = %self.name, "{line}"),
            Level::WARN => tracing::warn!(logger = %self.name, "{line}"),
            Level::INFO => tracing::info!(logger = %self.name, "{line}"),
            Level::DEBUG => tracing::debug!(logger = %self.name, "{line}"),
            Level::TRACE => tracing::trace!(logger = %self.name, "{line}"),
        }
    }

    /// Renders the event as a single-line JSON object, filling in
    /// `timestamp`, `application`, and `log_type` when absent.
    fn format_event(&self, event: Event) -> String {
        let mut fields = event.into_fields();
        fields.entry("timestamp").or_insert_with(|| {
            Value::String(Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true))
        });
        fields
            .entry("application")
            .or_insert_with(|| Value::String(self.application.clone()));
        fields
            .entry("log_type")
            .or_insert_with(|| Value::String(self.log_type.clone()));
        Value::Object(fields).to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::DateTime;
    use std::collections::HashMap;

    fn test_logger() -> EventLogger {
        EventLogger::new("test-logger", "calgate", "test")
    }

    #[test]
    fn message_event_carries_standard_fields() {
        let line = test_logger().format_event(Event::message("x"));
        let parsed: Value = serde_json::from_str(&line).unwrap();

        assert_eq!(parsed["message"], "x");
        assert_eq!(parsed["application"], "calgate");
        assert_eq!(parsed["log_type"], "test");
        assert!(parsed["timestamp"].is_string());
    }

    #[test]
    fn timestamp_is_iso_8601_utc() {
        let line = test_logger().format_event(Event::new());
        let parsed: Value = serde_json::from_str(&line).unwrap();
        let timestamp = parsed["timestamp"].as_str().unwrap();
        assert!(DateTime::parse_from_rfc3339(timestamp).is_ok());
        assert!(timestamp.ends_with('Z'));
    }

    #[test]
    fn output_is_a_single_line() {
        let line = test_logger().format_event(
            Event::message("multi\nline")
                .with("detail", "a\nb")
                .with("count", 3),
        );
        assert!(!line.contains('\n'));
        assert!(serde_json::from_str::<Value>(&line).is_ok());
    }

    #[test]
    fn caller_fields_are_not_overwritten() {
        let line = test_logger().format_event(
            Event::message("x")
                .with("timestamp", "2025-04-01T00:00:00Z")
                .with("application", "other-app"),
        );
        let parsed: Value = serde_json::from_str(&line).unwrap();
        assert_eq!(parsed["timestamp"], "2025-04-01T00:00:00Z");
        assert_eq!(parsed["application"], "other-app");
    }

    #[test]
    fn unsupported_values_are_stringified() {
        // Tuple keys cannot become JSON object keys; the Debug rendering
        // is used instead of failing.
        let mut weird: HashMap<(u8, u8), u8> = HashMap::new();
        weird.insert((1, 2), 3);

        let line = test_logger().format_event(Event::new().with("weird", weird));
        let parsed: Value = serde_json::from_str(&line).unwrap();
        assert!(parsed["weird"].is_string());
        assert!(parsed["weird"].as_str().unwrap().contains('3'));
    }

    #[test]
    fn structured_values_pass_through() {
        let line = test_logger().format_event(
            Event::message("query failed")
                .with("calendar_id", "primary")
                .with("attempts", 4)
                .with("scopes", vec!["a", "b"]),
        );
        let parsed: Value = serde_json::from_str(&line).unwrap();
        assert_eq!(parsed["calendar_id"], "primary");
        assert_eq!(parsed["attempts"], 4);
        assert_eq!(parsed["scopes"], serde_json::json!(["a", "b"]));
    }
}
