//! Application Insights HTTP telemetry client.
//!
//! Traces are buffered in memory as ingestion envelopes and POSTed as one JSON
//! array per batch. A batch goes out when the buffer reaches the configured
//! size, on every tick of a background interval, and on `flush`. Sends are
//! serialized, so a `flush` returns only after any in-flight batch finished.
//! Delivery is attempted once; a failed batch is dropped. Background failures
//! are logged, `flush` failures are returned.

use profiler_reporter_config::AppInsightsSettings;
use profiler_reporter_ports::{
    BoxFuture, FlattenedMetrics, LoggerPort, TelemetryClientFactory, TelemetryClientPort,
    TraceTelemetry, log_fields,
};
use profiler_reporter_shared::{ErrorClass, ErrorCode, ErrorEnvelope, Result, SecretString};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

const ENVELOPE_NAME_PREFIX: &str = "Microsoft.ApplicationInsights.";
const MESSAGE_ENVELOPE_SUFFIX: &str = ".Message";
const MESSAGE_BASE_TYPE: &str = "MessageData";
const MESSAGE_DATA_VERSION: u8 = 2;
const SDK_VERSION_TAG: &str = "ai.internal.sdkVersion";

/// Buffer capacity, in batches. Older traces are dropped past it.
const PENDING_BATCHES: usize = 4;

struct ClientShared {
    client: reqwest::Client,
    endpoint: Box<str>,
    instrumentation_key: SecretString,
    buffer: Mutex<Vec<TelemetryEnvelope>>,
    send_lock: tokio::sync::Mutex<()>,
    max_batch_size: usize,
    dropped: AtomicU64,
    logger: Option<Arc<dyn LoggerPort>>,
}

impl ClientShared {
    fn capacity(&self) -> usize {
        self.max_batch_size.saturating_mul(PENDING_BATCHES)
    }

    /// Buffer one envelope. Returns true when a batch is ready to send.
    fn push(&self, envelope: TelemetryEnvelope) -> bool {
        let mut buffer = self.buffer.lock().unwrap_or_else(PoisonError::into_inner);
        buffer.push(envelope);
        let excess = buffer.len().saturating_sub(self.capacity());
        if excess > 0 {
            buffer.drain(..excess);
            self.dropped
                .fetch_add(u64::try_from(excess).unwrap_or(u64::MAX), Ordering::Relaxed);
        }
        buffer.len() >= self.max_batch_size
    }

    fn take_pending(&self) -> Vec<TelemetryEnvelope> {
        std::mem::take(&mut *self.buffer.lock().unwrap_or_else(PoisonError::into_inner))
    }

    async fn send_pending(&self) -> Result<()> {
        let _sending = self.send_lock.lock().await;
        let batch = self.take_pending();
        if batch.is_empty() {
            return Ok(());
        }
        self.send(&batch).await
    }

    async fn send_in_background(&self, trigger: &'static str) {
        let Err(error) = self.send_pending().await else {
            return;
        };
        if let Some(logger) = &self.logger {
            logger.warn(
                "appinsights.send_failed",
                "background send to Application Insights failed",
                Some(log_fields([
                    ("trigger", Value::from(trigger)),
                    ("error", serde_json::to_value(&error).unwrap_or(Value::Null)),
                ])),
            );
        }
    }

    async fn send(&self, batch: &[TelemetryEnvelope]) -> Result<()> {
        let response = self
            .client
            .post(self.endpoint.as_ref())
            .json(batch)
            .send()
            .await
            .map_err(|error| map_reqwest_error(&error))?;

        let status = response.status();
        let payload = response
            .bytes()
            .await
            .map_err(|error| map_reqwest_error(&error))?;

        if status == StatusCode::OK {
            return Ok(());
        }
        if status == StatusCode::PARTIAL_CONTENT {
            return Err(map_partial_rejection(&payload, batch.len()));
        }
        Err(map_http_error(status, &payload))
    }
}

/// Buffered Application Insights client bound to one instrumentation key.
///
/// Dropping the client stops its background sender; traces still buffered
/// are lost unless `flush` ran first.
pub struct AppInsightsHttpClient {
    shared: Arc<ClientShared>,
    sender: Option<JoinHandle<()>>,
}

impl AppInsightsHttpClient {
    /// Number of traces waiting for the next send.
    pub fn pending(&self) -> usize {
        self.shared
            .buffer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Number of traces discarded because the buffer was full.
    pub fn dropped(&self) -> u64 {
        self.shared.dropped.load(Ordering::Relaxed)
    }

    /// Returns true when a background interval sender is running.
    pub const fn has_background_sender(&self) -> bool {
        self.sender.is_some()
    }

    fn spawn_batch_send(&self) {
        let Ok(runtime) = Handle::try_current() else {
            return;
        };
        let shared = Arc::clone(&self.shared);
        runtime.spawn(async move { shared.send_in_background("batch_size").await });
    }
}

impl TelemetryClientPort for AppInsightsHttpClient {
    fn track_trace(&self, trace: TraceTelemetry) -> Result<()> {
        let envelope = TelemetryEnvelope::message(self.shared.instrumentation_key.expose(), trace);
        if self.shared.push(envelope) {
            self.spawn_batch_send();
        }
        Ok(())
    }

    fn flush(&self) -> BoxFuture<'_, Result<()>> {
        Box::pin(self.shared.send_pending())
    }
}

impl Drop for AppInsightsHttpClient {
    fn drop(&mut self) {
        if let Some(sender) = self.sender.take() {
            sender.abort();
        }
    }
}

fn spawn_interval_sender(shared: &Arc<ClientShared>, period: Duration) -> Option<JoinHandle<()>> {
    let runtime = Handle::try_current().ok()?;
    let weak: Weak<ClientShared> = Arc::downgrade(shared);
    Some(runtime.spawn(async move {
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let Some(shared) = weak.upgrade() else {
                break;
            };
            shared.send_in_background("interval").await;
        }
    }))
}

/// Creates `AppInsightsHttpClient`s sharing one HTTP connection pool.
#[derive(Clone)]
pub struct AppInsightsHttpClientFactory {
    client: reqwest::Client,
    endpoint: Box<str>,
    send_interval: Duration,
    max_batch_size: usize,
    logger: Option<Arc<dyn LoggerPort>>,
}

impl AppInsightsHttpClientFactory {
    /// Build the HTTP client from settings.
    pub fn new(settings: &AppInsightsSettings) -> Result<Self> {
        if settings.timeout.is_zero() {
            return Err(ErrorEnvelope::expected(
                ErrorCode::invalid_input(),
                "timeout must be greater than zero",
            ));
        }
        if settings.send_interval.is_zero() || settings.max_batch_size == 0 {
            return Err(ErrorEnvelope::expected(
                ErrorCode::invalid_input(),
                "send interval and batch size must be greater than zero",
            ));
        }
        let client = reqwest::Client::builder()
            .timeout(settings.timeout)
            .build()
            .map_err(|error| {
                ErrorEnvelope::unexpected(
                    ErrorCode::new("appinsights", "client_init_failed"),
                    format!("failed to build Application Insights client: {error}"),
                    ErrorClass::NonRetriable,
                )
            })?;
        Ok(Self {
            client,
            endpoint: settings.endpoint.clone(),
            send_interval: settings.send_interval,
            max_batch_size: settings.max_batch_size,
            logger: None,
        })
    }

    /// Log background send failures to `logger`.
    #[must_use]
    pub fn with_logger(mut self, logger: Arc<dyn LoggerPort>) -> Self {
        self.logger = Some(logger);
        self
    }

    /// Open a concrete client, keeping access to its buffer.
    ///
    /// The interval sender starts only when called inside a Tokio runtime.
    pub fn connect_http(&self, credential: &SecretString) -> Result<AppInsightsHttpClient> {
        validate_instrumentation_key(credential)?;
        let shared = Arc::new(ClientShared {
            client: self.client.clone(),
            endpoint: self.endpoint.clone(),
            instrumentation_key: credential.clone(),
            buffer: Mutex::new(Vec::new()),
            send_lock: tokio::sync::Mutex::new(()),
            max_batch_size: self.max_batch_size,
            dropped: AtomicU64::new(0),
            logger: self.logger.clone(),
        });
        let sender = spawn_interval_sender(&shared, self.send_interval);
        Ok(AppInsightsHttpClient { shared, sender })
    }
}

impl TelemetryClientFactory for AppInsightsHttpClientFactory {
    fn connect(&self, credential: &SecretString) -> Result<Arc<dyn TelemetryClientPort>> {
        Ok(Arc::new(self.connect_http(credential)?))
    }
}

fn validate_instrumentation_key(credential: &SecretString) -> Result<()> {
    let key = credential.expose();
    if key.is_empty() {
        return Err(ErrorEnvelope::expected(
            ErrorCode::new("appinsights", "invalid_instrumentation_key"),
            "instrumentation key must be non-empty",
        ));
    }
    if key.chars().any(char::is_whitespace) {
        return Err(ErrorEnvelope::expected(
            ErrorCode::new("appinsights", "invalid_instrumentation_key"),
            "instrumentation key must not contain whitespace",
        )
        .with_metadata("masked", credential.masked()));
    }
    Ok(())
}

#[derive(Debug, Clone, Serialize)]
struct TelemetryEnvelope {
    name: String,
    time: String,
    #[serde(rename = "iKey")]
    i_key: String,
    tags: BTreeMap<&'static str, String>,
    data: EnvelopeData,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct EnvelopeData {
    base_type: &'static str,
    base_data: MessageData,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct MessageData {
    ver: u8,
    message: Box<str>,
    severity_level: i32,
    properties: FlattenedMetrics,
}

impl TelemetryEnvelope {
    fn message(instrumentation_key: &str, trace: TraceTelemetry) -> Self {
        let compact_key: String = instrumentation_key.chars().filter(|c| *c != '-').collect();
        let mut tags = BTreeMap::new();
        tags.insert(
            SDK_VERSION_TAG,
            format!("rust:{}", env!("CARGO_PKG_VERSION")),
        );
        Self {
            name: format!("{ENVELOPE_NAME_PREFIX}{compact_key}{MESSAGE_ENVELOPE_SUFFIX}"),
            time: chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
            i_key: instrumentation_key.to_string(),
            tags,
            data: EnvelopeData {
                base_type: MESSAGE_BASE_TYPE,
                base_data: MessageData {
                    ver: MESSAGE_DATA_VERSION,
                    message: trace.message,
                    severity_level: trace.severity.as_i32(),
                    properties: trace.properties,
                },
            },
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct IngestionResponse {
    items_received: usize,
    items_accepted: usize,
    errors: Vec<IngestionItemError>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct IngestionItemError {
    status_code: u16,
    message: String,
}

fn map_reqwest_error(error: &reqwest::Error) -> ErrorEnvelope {
    if error.is_timeout() {
        return ErrorEnvelope::unexpected(
            ErrorCode::timeout(),
            "Application Insights request timed out",
            ErrorClass::Retriable,
        );
    }
    if error.is_connect() {
        return ErrorEnvelope::unexpected(
            ErrorCode::io(),
            format!("Application Insights connection failed: {error}"),
            ErrorClass::Retriable,
        );
    }
    ErrorEnvelope::unexpected(
        ErrorCode::new("appinsights", "request_failed"),
        format!("Application Insights request failed: {error}"),
        ErrorClass::NonRetriable,
    )
}

fn map_partial_rejection(payload: &[u8], sent: usize) -> ErrorEnvelope {
    let response: IngestionResponse = serde_json::from_slice(payload).unwrap_or_default();
    let mut envelope = ErrorEnvelope::unexpected(
        ErrorCode::new("appinsights", "partial_rejection"),
        format!(
            "Application Insights accepted {} of {sent} items",
            response.items_accepted
        ),
        ErrorClass::NonRetriable,
    )
    .with_metadata("items_received", response.items_received.to_string())
    .with_metadata("items_accepted", response.items_accepted.to_string());
    if let Some(first) = response.errors.first() {
        envelope = envelope
            .with_metadata("first_error_status", first.status_code.to_string())
            .with_metadata("first_error_message", first.message.clone());
    }
    envelope.with_metadata("status", StatusCode::PARTIAL_CONTENT.as_u16().to_string())
}

fn map_http_error(status: StatusCode, payload: &[u8]) -> ErrorEnvelope {
    let detail = serde_json::from_slice::<IngestionResponse>(payload)
        .ok()
        .and_then(|response| response.errors.into_iter().next())
        .map(|error| error.message)
        .filter(|message| !message.is_empty())
        .unwrap_or_else(|| format!("Application Insights request failed with status {status}"));

    let envelope = match status.as_u16() {
        400 => ErrorEnvelope::expected(ErrorCode::invalid_input(), detail),
        401 | 403 => ErrorEnvelope::expected(ErrorCode::permission_denied(), detail),
        408 => ErrorEnvelope::unexpected(ErrorCode::timeout(), detail, ErrorClass::Retriable),
        // 439 is the ingestion service's daily quota throttle.
        429 | 439 => ErrorEnvelope::unexpected(
            ErrorCode::new("core", "rate_limited"),
            detail,
            ErrorClass::Retriable,
        ),
        _ if status.is_server_error() => ErrorEnvelope::unexpected(
            ErrorCode::new("core", "dependency_unavailable"),
            detail,
            ErrorClass::Retriable,
        ),
        _ => ErrorEnvelope::unexpected(
            ErrorCode::new("appinsights", "http_error"),
            detail,
            ErrorClass::NonRetriable,
        ),
    };
    envelope.with_metadata("status", status.as_u16().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use profiler_reporter_ports::SeverityLevel;

    fn trace() -> TraceTelemetry {
        let mut properties = FlattenedMetrics::new();
        properties.insert("hosts".to_string(), "a,b,c".to_string());
        TraceTelemetry::information("cluster metrics", properties)
    }

    #[test]
    fn message_envelope_matches_ingestion_schema() -> std::result::Result<(), serde_json::Error> {
        let envelope = TelemetryEnvelope::message("0f8fad5b-d9cb-469f", trace());
        let value = serde_json::to_value(&envelope)?;

        assert_eq!(
            value.get("name").and_then(serde_json::Value::as_str),
            Some("Microsoft.ApplicationInsights.0f8fad5bd9cb469f.Message")
        );
        assert_eq!(
            value.get("iKey").and_then(serde_json::Value::as_str),
            Some("0f8fad5b-d9cb-469f")
        );
        assert_eq!(
            value.pointer("/data/baseType").and_then(serde_json::Value::as_str),
            Some("MessageData")
        );
        assert_eq!(
            value.pointer("/data/baseData/ver").and_then(serde_json::Value::as_u64),
            Some(2)
        );
        assert_eq!(
            value.pointer("/data/baseData/severityLevel").and_then(serde_json::Value::as_i64),
            Some(i64::from(SeverityLevel::Information.as_i32()))
        );
        assert_eq!(
            value
                .pointer("/data/baseData/properties/hosts")
                .and_then(serde_json::Value::as_str),
            Some("a,b,c")
        );
        assert!(
            value
                .get("time")
                .and_then(serde_json::Value::as_str)
                .is_some_and(|time| time.ends_with('Z'))
        );
        Ok(())
    }

    #[test]
    fn full_buffer_drops_oldest_traces() -> Result<()> {
        let settings = AppInsightsSettings::default().with_send_policy(Duration::from_secs(60), 2);
        let factory = AppInsightsHttpClientFactory::new(&settings)?;
        let client = factory.connect_http(&SecretString::new("abc123"))?;
        assert!(!client.has_background_sender());

        for _ in 0..10 {
            client.track_trace(trace())?;
        }
        assert_eq!(client.pending(), 2 * PENDING_BATCHES);
        assert_eq!(client.dropped(), 2);
        Ok(())
    }

    #[test]
    fn malformed_keys_are_rejected() {
        let empty = validate_instrumentation_key(&SecretString::new(""));
        assert!(empty.is_err_and(|error| error.has_code("appinsights", "invalid_instrumentation_key")));

        let spaced = validate_instrumentation_key(&SecretString::new("abc 123"));
        assert!(spaced.is_err());

        assert!(validate_instrumentation_key(&SecretString::new("abc123")).is_ok());
    }

    #[test]
    fn http_errors_map_by_status() {
        let throttled = map_http_error(StatusCode::TOO_MANY_REQUESTS, b"");
        assert!(throttled.has_code("core", "rate_limited"));
        assert!(throttled.class.is_retriable());

        let rejected = map_http_error(
            StatusCode::BAD_REQUEST,
            br#"{"itemsReceived":1,"itemsAccepted":0,"errors":[{"index":0,"statusCode":400,"message":"Invalid instrumentation key"}]}"#,
        );
        assert!(rejected.has_code("core", "invalid_input"));
        assert_eq!(rejected.message, "Invalid instrumentation key");
        assert_eq!(rejected.metadata.get("status").map(String::as_str), Some("400"));
    }
}
