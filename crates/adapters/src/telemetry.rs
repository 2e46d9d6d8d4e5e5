//! JSON-lines telemetry client for local runs.
//!
//! Each trace becomes one JSON object on the sink. Nothing is buffered, so
//! `flush` has no work to do.

use crate::log_sink::LogSink;
use profiler_reporter_ports::{
    BoxFuture, TelemetryClientFactory, TelemetryClientPort, TraceTelemetry,
};
use profiler_reporter_shared::{ErrorCode, ErrorEnvelope, Result, SecretString, mask_secret};
use serde_json::Value;
use std::sync::Arc;

/// Telemetry client writing traces as JSON lines.
#[derive(Clone)]
pub struct JsonTraceClient {
    sink: Arc<dyn LogSink>,
    masked_key: Box<str>,
}

impl JsonTraceClient {
    /// Create a client bound to a credential.
    #[must_use]
    pub fn new(sink: Arc<dyn LogSink>, credential: &SecretString) -> Self {
        Self {
            sink,
            masked_key: mask_secret(credential.expose()).into_boxed_str(),
        }
    }
}

impl TelemetryClientPort for JsonTraceClient {
    fn track_trace(&self, trace: TraceTelemetry) -> Result<()> {
        let properties: serde_json::Map<String, Value> = trace
            .properties
            .into_iter()
            .map(|(key, value)| (key, Value::String(value)))
            .collect();

        let mut payload = serde_json::Map::new();
        payload.insert("type".to_string(), Value::from("trace"));
        payload.insert(
            "timestampMs".to_string(),
            Value::from(chrono::Utc::now().timestamp_millis()),
        );
        payload.insert("iKey".to_string(), Value::from(self.masked_key.as_ref()));
        payload.insert("message".to_string(), Value::from(trace.message.as_ref()));
        payload.insert("severity".to_string(), Value::from(trace.severity.as_str()));
        payload.insert(
            "severityLevel".to_string(),
            Value::from(trace.severity.as_i32()),
        );
        payload.insert("properties".to_string(), Value::Object(properties));

        let mut line = serde_json::to_string(&Value::Object(payload)).map_err(|error| {
            ErrorEnvelope::invariant(
                ErrorCode::new("telemetry", "serialize_failed"),
                format!("failed to serialize trace: {error}"),
            )
        })?;
        line.push('\n');
        self.sink.write_line(&line);
        Ok(())
    }

    fn flush(&self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async { Ok(()) })
    }
}

/// Factory producing `JsonTraceClient`s that share one sink.
#[derive(Clone)]
pub struct JsonTraceClientFactory {
    sink: Arc<dyn LogSink>,
}

impl JsonTraceClientFactory {
    /// Create a factory writing to the provided sink.
    #[must_use]
    pub fn new(sink: Arc<dyn LogSink>) -> Self {
        Self { sink }
    }
}

impl TelemetryClientFactory for JsonTraceClientFactory {
    fn connect(&self, credential: &SecretString) -> Result<Arc<dyn TelemetryClientPort>> {
        if credential.is_empty() {
            return Err(ErrorEnvelope::expected(
                ErrorCode::invalid_input(),
                "instrumentation key must be non-empty",
            ));
        }
        Ok(Arc::new(JsonTraceClient::new(Arc::clone(&self.sink), credential)))
    }
}
