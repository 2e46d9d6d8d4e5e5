//! Reporter lifecycle tests against a recording telemetry client.

use profiler_reporter_adapters::{AppInsightsReporter, JsonLogger, MemoryLogSink, ReporterStatus};
use profiler_reporter_config::AppInsightsSettings;
use profiler_reporter_domain::{
    INSTRUMENTATION_KEY_ARGUMENT, MetricScalar, MetricValue, MetricsSnapshot, ReporterArguments,
    SeverityLevel, TraceTelemetry,
};
use profiler_reporter_ports::{
    BoxFuture, LogLevel, ReporterPort, TelemetryClientFactory, TelemetryClientPort,
};
use profiler_reporter_shared::{ErrorCode, ErrorEnvelope, Result, SecretString};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Default)]
struct RecordingClient {
    traces: Mutex<Vec<TraceTelemetry>>,
    flushes: Mutex<usize>,
}

impl RecordingClient {
    fn traces(&self) -> Vec<TraceTelemetry> {
        self.traces.lock().map(|traces| traces.clone()).unwrap_or_default()
    }

    fn flushes(&self) -> usize {
        self.flushes.lock().map(|count| *count).unwrap_or_default()
    }
}

impl TelemetryClientPort for RecordingClient {
    fn track_trace(&self, trace: TraceTelemetry) -> Result<()> {
        if let Ok(mut traces) = self.traces.lock() {
            traces.push(trace);
        }
        Ok(())
    }

    fn flush(&self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            if let Ok(mut count) = self.flushes.lock() {
                *count += 1;
            }
            Ok(())
        })
    }
}

#[derive(Default)]
struct RecordingFactory {
    clients: Mutex<Vec<(String, Arc<RecordingClient>)>>,
}

impl RecordingFactory {
    fn client_for(&self, key: &str) -> Option<Arc<RecordingClient>> {
        self.clients.lock().ok().and_then(|clients| {
            clients
                .iter()
                .rev()
                .find(|(credential, _)| credential == key)
                .map(|(_, client)| Arc::clone(client))
        })
    }

    fn connect_count(&self) -> usize {
        self.clients.lock().map(|clients| clients.len()).unwrap_or_default()
    }
}

impl TelemetryClientFactory for RecordingFactory {
    fn connect(&self, credential: &SecretString) -> Result<Arc<dyn TelemetryClientPort>> {
        if credential.expose() == "reject-me" {
            return Err(ErrorEnvelope::expected(
                ErrorCode::new("appinsights", "invalid_instrumentation_key"),
                "rejected",
            ));
        }
        let client = Arc::new(RecordingClient::default());
        if let Ok(mut clients) = self.clients.lock() {
            clients.push((credential.expose().to_string(), Arc::clone(&client)));
        }
        Ok(client)
    }
}

struct Harness {
    factory: Arc<RecordingFactory>,
    sink: Arc<MemoryLogSink>,
    reporter: AppInsightsReporter,
}

fn harness(close_grace: Duration) -> Harness {
    let factory = Arc::new(RecordingFactory::default());
    let sink = Arc::new(MemoryLogSink::default());
    let logger = JsonLogger::new(sink.clone()).with_min_level(LogLevel::Debug);
    let reporter = AppInsightsReporter::new(
        factory.clone(),
        Arc::new(logger),
        AppInsightsSettings::default().with_close_grace(close_grace),
    );
    Harness {
        factory,
        sink,
        reporter,
    }
}

fn key_arguments(key: &str) -> ReporterArguments {
    ReporterArguments::new().with(INSTRUMENTATION_KEY_ARGUMENT, key)
}

fn disk_snapshot() -> MetricsSnapshot {
    let disk = |name: &str, used: i64| {
        [
            ("name".to_string(), MetricScalar::from(name)),
            ("used".to_string(), MetricScalar::from(used)),
        ]
        .into_iter()
        .collect()
    };
    MetricsSnapshot::new()
        .with("epochMillis", MetricScalar::from(1_700_000_000_000_i64))
        .with(
            "disks",
            MetricValue::Records(vec![disk("disk 1", 10), disk("disk 2", 20)]),
        )
}

#[tokio::test]
async fn report_before_configuration_fails() {
    let harness = harness(Duration::ZERO);
    assert_eq!(harness.reporter.status().await, ReporterStatus::NotConfigured);

    let error = harness
        .reporter
        .report("CpuAndMemory", &disk_snapshot())
        .await
        .err();
    assert!(error.is_some_and(|error| error.has_code("reporter", "not_configured")));
    assert_eq!(harness.factory.connect_count(), 0);
}

#[tokio::test]
async fn configured_key_routes_reports_to_its_client() -> Result<()> {
    let harness = harness(Duration::ZERO);
    harness.reporter.update_arguments(&key_arguments("abc123")).await?;
    harness.reporter.report("CpuAndMemory", &disk_snapshot()).await?;

    let client = harness
        .factory
        .client_for("abc123")
        .ok_or_else(|| ErrorEnvelope::expected(ErrorCode::not_found(), "client missing"))?;
    let traces = client.traces();
    assert_eq!(traces.len(), 1);
    let trace = traces.first().ok_or_else(|| {
        ErrorEnvelope::expected(ErrorCode::not_found(), "trace missing")
    })?;
    assert_eq!(&*trace.message, "cluster metrics");
    assert_eq!(trace.severity, SeverityLevel::Information);
    assert_eq!(
        trace.properties.get("disks-disk1-used").map(String::as_str),
        Some("10")
    );
    assert_eq!(
        trace.properties.get("disks-disk2-used").map(String::as_str),
        Some("20")
    );
    assert_eq!(
        trace.properties.get("epochMillis").map(String::as_str),
        Some("1700000000000")
    );
    Ok(())
}

#[tokio::test]
async fn malformed_and_unrelated_arguments_are_ignored() -> Result<()> {
    let harness = harness(Duration::ZERO);
    let arguments: ReporterArguments = [
        ("", vec!["abc123".to_string()]),
        (INSTRUMENTATION_KEY_ARGUMENT, Vec::new()),
        ("influxdb.host", vec!["localhost".to_string()]),
    ]
    .into_iter()
    .collect();
    harness.reporter.update_arguments(&arguments).await?;

    let empty_value = key_arguments("");
    harness.reporter.update_arguments(&empty_value).await?;

    assert_eq!(harness.reporter.status().await, ReporterStatus::NotConfigured);
    assert_eq!(harness.factory.connect_count(), 0);
    Ok(())
}

#[tokio::test]
async fn reconfiguration_flushes_and_replaces_the_client() -> Result<()> {
    let harness = harness(Duration::ZERO);
    harness.reporter.update_arguments(&key_arguments("first-key")).await?;
    harness.reporter.report("Stacktrace", &disk_snapshot()).await?;
    harness.reporter.update_arguments(&key_arguments("second-key")).await?;
    harness.reporter.report("Stacktrace", &disk_snapshot()).await?;

    let first = harness.factory.client_for("first-key");
    let second = harness.factory.client_for("second-key");
    assert!(first.as_ref().is_some_and(|client| client.traces().len() == 1));
    assert!(first.is_some_and(|client| client.flushes() == 1));
    assert!(second.as_ref().is_some_and(|client| client.traces().len() == 1));
    assert!(second.is_some_and(|client| client.flushes() == 0));
    Ok(())
}

#[tokio::test]
async fn rejected_key_keeps_previous_client() -> Result<()> {
    let harness = harness(Duration::ZERO);
    harness.reporter.update_arguments(&key_arguments("good-key")).await?;

    let error = harness
        .reporter
        .update_arguments(&key_arguments("reject-me"))
        .await
        .err();
    assert!(error.is_some_and(|error| error.has_code("appinsights", "invalid_instrumentation_key")));

    harness.reporter.report("Stacktrace", &disk_snapshot()).await?;
    assert!(
        harness
            .factory
            .client_for("good-key")
            .is_some_and(|client| client.traces().len() == 1)
    );
    Ok(())
}

#[tokio::test]
async fn null_metric_fails_without_sending() -> Result<()> {
    let harness = harness(Duration::ZERO);
    harness.reporter.update_arguments(&key_arguments("abc123")).await?;

    let snapshot = disk_snapshot().with("role", MetricScalar::Null);
    let error = harness.reporter.report("CpuAndMemory", &snapshot).await.err();
    assert!(error.as_ref().is_some_and(|error| error.has_code("domain", "null_metric_value")));
    assert_eq!(
        error.and_then(|error| error.metadata.get("profiler").cloned()),
        Some("CpuAndMemory".to_string())
    );
    assert!(
        harness
            .factory
            .client_for("abc123")
            .is_some_and(|client| client.traces().is_empty())
    );
    Ok(())
}

#[tokio::test]
async fn close_flushes_waits_and_invalidates() -> Result<()> {
    let grace = Duration::from_millis(30);
    let harness = harness(grace);
    harness.reporter.update_arguments(&key_arguments("abc123")).await?;
    harness.reporter.report("CpuAndMemory", &disk_snapshot()).await?;

    let started = tokio::time::Instant::now();
    harness.reporter.close().await?;
    assert!(started.elapsed() >= grace);
    assert_eq!(harness.reporter.status().await, ReporterStatus::Closed);
    assert!(
        harness
            .factory
            .client_for("abc123")
            .is_some_and(|client| client.flushes() == 1)
    );

    let second_close = harness.reporter.close().await.err();
    assert!(second_close.is_some_and(|error| error.has_code("reporter", "closed")));

    let late_report = harness.reporter.report("CpuAndMemory", &disk_snapshot()).await.err();
    assert!(late_report.is_some_and(|error| error.has_code("reporter", "closed")));

    let late_update = harness.reporter.update_arguments(&key_arguments("other")).await.err();
    assert!(late_update.is_some_and(|error| error.has_code("reporter", "closed")));
    Ok(())
}

#[tokio::test]
async fn report_during_close_grace_sees_closed_reporter() -> Result<()> {
    let harness = Arc::new(harness(Duration::from_millis(200)));
    harness.reporter.update_arguments(&key_arguments("abc123")).await?;
    harness.reporter.report("CpuAndMemory", &disk_snapshot()).await?;

    let closing = {
        let harness = Arc::clone(&harness);
        tokio::spawn(async move { harness.reporter.close().await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;

    let during_grace = harness.reporter.report("CpuAndMemory", &disk_snapshot()).await.err();
    assert!(during_grace.is_some_and(|error| error.has_code("reporter", "closed")));

    closing.await.map_err(|error| {
        ErrorEnvelope::expected(ErrorCode::internal(), error.to_string())
    })??;

    let client = harness
        .factory
        .client_for("abc123")
        .ok_or_else(|| ErrorEnvelope::expected(ErrorCode::not_found(), "client missing"))?;
    assert_eq!(client.flushes(), 1);
    assert_eq!(client.traces().len(), 1);
    Ok(())
}

#[tokio::test]
async fn raw_metrics_are_logged_as_json() -> Result<()> {
    let harness = harness(Duration::ZERO);
    harness.reporter.update_arguments(&key_arguments("abc123")).await?;
    harness.reporter.report("CpuAndMemory", &disk_snapshot()).await?;

    let raw_disks = harness
        .sink
        .take()
        .iter()
        .filter_map(|line| serde_json::from_str::<serde_json::Value>(line.trim()).ok())
        .find(|payload| {
            payload.get("event").and_then(serde_json::Value::as_str) == Some("reporter.raw_metric")
                && payload.pointer("/fields/metric").and_then(serde_json::Value::as_str)
                    == Some("disks")
        })
        .ok_or_else(|| ErrorEnvelope::expected(ErrorCode::not_found(), "raw metric missing"))?;
    assert_eq!(
        raw_disks.pointer("/fields/value"),
        Some(&serde_json::json!([
            {"name": "disk 1", "used": 10},
            {"name": "disk 2", "used": 20}
        ]))
    );
    Ok(())
}

#[tokio::test]
async fn credential_never_appears_in_logs() -> Result<()> {
    let key = "0f8fad5b-d9cb-469f-a165-70867728950e";
    let harness = harness(Duration::ZERO);
    harness.reporter.update_arguments(&key_arguments(key)).await?;
    harness.reporter.report("CpuAndMemory", &disk_snapshot()).await?;
    harness.reporter.close().await?;

    let lines = harness.sink.take();
    assert!(lines.iter().any(|line| line.contains("reporter.client_initialized")));
    assert!(lines.iter().any(|line| line.contains("****950e")));
    assert!(lines.iter().any(|line| line.contains("reporter.formatted_metric")));
    assert!(lines.iter().all(|line| !line.contains(key)));
    Ok(())
}

#[tokio::test]
async fn concurrent_reports_share_the_client() -> Result<()> {
    let harness = Arc::new(harness(Duration::ZERO));
    harness.reporter.update_arguments(&key_arguments("abc123")).await?;

    let mut tasks = Vec::new();
    for _ in 0..8 {
        let harness = Arc::clone(&harness);
        tasks.push(tokio::spawn(async move {
            harness.reporter.report("CpuAndMemory", &disk_snapshot()).await
        }));
    }
    for task in tasks {
        task.await.map_err(|error| {
            ErrorEnvelope::expected(ErrorCode::internal(), error.to_string())
        })??;
    }

    assert!(
        harness
            .factory
            .client_for("abc123")
            .is_some_and(|client| client.traces().len() == 8)
    );
    Ok(())
}
