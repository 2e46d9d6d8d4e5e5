//! Structured logger adapters.
//!
//! `JsonLogger` writes one JSON object per line to a `LogSink`.
//! `TracingLogger` forwards events to the `tracing` facade so hosts that
//! install a subscriber see reporter events next to their own.

use crate::log_sink::LogSink;
use profiler_reporter_ports::{LogEvent, LogFields, LogLevel, LoggerPort};
use profiler_reporter_shared::{REDACTED, is_secret_key};
use serde_json::Value;
use std::sync::Arc;

/// `tracing` target used for forwarded events.
pub const TRACING_TARGET: &str = "profiler_reporter";

/// JSON logger emitting one line per event.
#[derive(Clone)]
pub struct JsonLogger {
    sink: Arc<dyn LogSink>,
    base_fields: LogFields,
    min_level: LogLevel,
}

impl JsonLogger {
    /// Create a JSON logger backed by the provided sink.
    #[must_use]
    pub fn new(sink: Arc<dyn LogSink>) -> Self {
        Self {
            sink,
            base_fields: LogFields::new(),
            min_level: LogLevel::Info,
        }
    }

    /// Set base fields applied to every event.
    #[must_use]
    pub fn with_base_fields(mut self, fields: LogFields) -> Self {
        self.base_fields = fields;
        self
    }

    /// Set the minimum log level.
    #[must_use]
    pub const fn with_min_level(mut self, level: LogLevel) -> Self {
        self.min_level = level;
        self
    }
}

impl LoggerPort for JsonLogger {
    fn log(&self, event: LogEvent) {
        if event.level < self.min_level {
            return;
        }

        let fields = merged_fields(&self.base_fields, event.fields);
        let mut payload = serde_json::Map::new();
        payload.insert(
            "timestampMs".to_string(),
            Value::from(chrono::Utc::now().timestamp_millis()),
        );
        payload.insert("level".to_string(), Value::from(event.level.as_str()));
        payload.insert("event".to_string(), Value::from(event.event.as_ref()));
        payload.insert("message".to_string(), Value::from(event.message.as_ref()));
        if !fields.is_empty() {
            payload.insert("fields".to_string(), fields_to_json(&fields));
        }
        if let Some(mut error) = event.error {
            redact_value(&mut error);
            payload.insert("error".to_string(), error);
        }

        let line = serde_json::to_string(&Value::Object(payload)).map_or_else(
            |_| {
                "{\"timestampMs\":0,\"level\":\"error\",\"event\":\"logger.serialize_failed\",\"message\":\"log serialization failed\"}\n"
                    .to_string()
            },
            |mut encoded| {
                encoded.push('\n');
                encoded
            },
        );
        self.sink.write_line(&line);
    }

    fn child(&self, fields: LogFields) -> Box<dyn LoggerPort> {
        Box::new(Self {
            sink: Arc::clone(&self.sink),
            base_fields: merged_fields(&self.base_fields, Some(fields)),
            min_level: self.min_level,
        })
    }
}

/// Logger forwarding events to `tracing`.
///
/// Level filtering is left to the installed subscriber.
#[derive(Debug, Clone, Default)]
pub struct TracingLogger {
    base_fields: LogFields,
}

impl TracingLogger {
    /// Create a logger with no base fields.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl LoggerPort for TracingLogger {
    fn log(&self, event: LogEvent) {
        let mut fields = merged_fields(&self.base_fields, event.fields);
        if let Some(mut error) = event.error {
            redact_value(&mut error);
            fields.insert("error".into(), error);
        }
        let fields = fields_to_json(&fields);
        let name = event.event.as_ref();
        let message = event.message.as_ref();

        match event.level {
            LogLevel::Debug => {
                tracing::debug!(target: TRACING_TARGET, event = name, fields = %fields, "{message}");
            },
            LogLevel::Info => {
                tracing::info!(target: TRACING_TARGET, event = name, fields = %fields, "{message}");
            },
            LogLevel::Warn => {
                tracing::warn!(target: TRACING_TARGET, event = name, fields = %fields, "{message}");
            },
            LogLevel::Error => {
                tracing::error!(target: TRACING_TARGET, event = name, fields = %fields, "{message}");
            },
        }
    }

    fn child(&self, fields: LogFields) -> Box<dyn LoggerPort> {
        Box::new(Self {
            base_fields: merged_fields(&self.base_fields, Some(fields)),
        })
    }
}

fn merged_fields(base: &LogFields, extra: Option<LogFields>) -> LogFields {
    let mut fields = base.clone();
    if let Some(extra) = extra {
        fields.extend(extra);
    }
    for (key, value) in &mut fields {
        if is_secret_key(key) {
            *value = Value::String(REDACTED.to_string());
        } else {
            redact_value(value);
        }
    }
    fields
}

fn fields_to_json(fields: &LogFields) -> Value {
    Value::Object(
        fields
            .iter()
            .map(|(key, value)| (key.to_string(), value.clone()))
            .collect(),
    )
}

fn redact_value(value: &mut Value) {
    match value {
        Value::Object(map) => {
            for (key, nested) in map.iter_mut() {
                if is_secret_key(key) {
                    *nested = Value::String(REDACTED.to_string());
                } else {
                    redact_value(nested);
                }
            }
        },
        Value::Array(items) => {
            for item in items {
                redact_value(item);
            }
        },
        _ => {},
    }
}
