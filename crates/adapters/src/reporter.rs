//! Application Insights metrics reporter.
//!
//! Lifecycle:
//! - constructed `NotConfigured` unless a credential is supplied
//! - `update_arguments` with `appinsights.instrumentationkey` connects a client,
//!   replacing any previous one; the replaced client is flushed, not closed
//! - `report` flattens a snapshot and buffers one trace on the live client
//! - `close` flushes, waits the grace period, then invalidates the client
//!
//! The client handle sits behind an async `RwLock`: `report` reads, while
//! `update_arguments` and `close` write. `close` holds the write lock for the
//! whole flush and grace wait.

use profiler_reporter_config::AppInsightsSettings;
use profiler_reporter_domain::{INSTRUMENTATION_KEY_ARGUMENT, flatten_metrics};
use profiler_reporter_ports::{
    BoxFuture, LoggerPort, MetricsSnapshot, ReporterArguments, ReporterPort,
    TelemetryClientFactory, TelemetryClientPort, TraceTelemetry, log_fields,
};
use profiler_reporter_shared::{ErrorCode, ErrorEnvelope, Result, SecretString};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Observable reporter state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReporterStatus {
    /// No credential has been supplied yet.
    NotConfigured,
    /// A client is live.
    Active,
    /// `close` has run; the reporter is unusable.
    Closed,
}

impl ReporterStatus {
    /// Stable name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NotConfigured => "not_configured",
            Self::Active => "active",
            Self::Closed => "closed",
        }
    }
}

impl fmt::Display for ReporterStatus {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

enum ClientState {
    NotConfigured,
    Active {
        client: Arc<dyn TelemetryClientPort>,
        credential: SecretString,
    },
    Closed,
}

impl ClientState {
    const fn status(&self) -> ReporterStatus {
        match self {
            Self::NotConfigured => ReporterStatus::NotConfigured,
            Self::Active { .. } => ReporterStatus::Active,
            Self::Closed => ReporterStatus::Closed,
        }
    }
}

/// Reporter forwarding flattened profiler metrics to Application Insights.
pub struct AppInsightsReporter {
    factory: Arc<dyn TelemetryClientFactory>,
    logger: Arc<dyn LoggerPort>,
    settings: AppInsightsSettings,
    state: RwLock<ClientState>,
}

impl AppInsightsReporter {
    /// Create an unconfigured reporter. `report` fails until a credential arrives.
    #[must_use]
    pub fn new(
        factory: Arc<dyn TelemetryClientFactory>,
        logger: Arc<dyn LoggerPort>,
        settings: AppInsightsSettings,
    ) -> Self {
        Self {
            factory,
            logger,
            settings,
            state: RwLock::new(ClientState::NotConfigured),
        }
    }

    /// Create a reporter connected with `credential`.
    pub fn with_credential(
        factory: Arc<dyn TelemetryClientFactory>,
        logger: Arc<dyn LoggerPort>,
        settings: AppInsightsSettings,
        credential: SecretString,
    ) -> Result<Self> {
        let client = factory.connect(&credential)?;
        let reporter = Self {
            factory,
            logger,
            settings,
            state: RwLock::new(ClientState::Active {
                client,
                credential: credential.clone(),
            }),
        };
        reporter.log_client_initialized(&credential);
        Ok(reporter)
    }

    /// Build an HTTP-backed reporter from host arguments.
    ///
    /// `appinsights.*` settings are read once here; the credential, when
    /// present, connects immediately.
    #[cfg(feature = "appinsights")]
    pub async fn from_arguments(
        arguments: &ReporterArguments,
        logger: Arc<dyn LoggerPort>,
    ) -> Result<Self> {
        let settings = AppInsightsSettings::from_arguments(arguments)?;
        let factory = crate::appinsights::AppInsightsHttpClientFactory::new(&settings)?
            .with_logger(Arc::clone(&logger));
        let reporter = Self::new(Arc::new(factory), logger, settings);
        reporter.update_arguments(arguments).await?;
        Ok(reporter)
    }

    /// Current lifecycle state.
    pub async fn status(&self) -> ReporterStatus {
        self.state.read().await.status()
    }

    /// Settings in effect.
    #[must_use]
    pub const fn settings(&self) -> &AppInsightsSettings {
        &self.settings
    }

    async fn report_snapshot(&self, profiler_name: &str, metrics: &MetricsSnapshot) -> Result<()> {
        let state = self.state.read().await;
        let ClientState::Active { client, .. } = &*state else {
            return Err(unavailable_error(state.status(), "report"));
        };

        self.logger.debug(
            "reporter.report",
            "profiler metrics received",
            Some(log_fields([
                ("profiler", Value::from(profiler_name)),
                ("metricCount", Value::from(metrics.len())),
            ])),
        );
        for (name, value) in metrics.iter() {
            self.logger.debug(
                "reporter.raw_metric",
                "raw metric",
                Some(log_fields([
                    ("metric", Value::from(name.as_str())),
                    ("value", serde_json::to_value(value).unwrap_or(Value::Null)),
                ])),
            );
        }

        let formatted = flatten_metrics(metrics).map_err(|error| {
            ErrorEnvelope::from(error).with_metadata("profiler", profiler_name)
        })?;
        for (name, value) in &formatted {
            self.logger.debug(
                "reporter.formatted_metric",
                "formatted metric",
                Some(log_fields([
                    ("metric", name.as_str()),
                    ("value", value.as_str()),
                ])),
            );
        }

        client.track_trace(TraceTelemetry::information(
            self.settings.trace_message.clone(),
            formatted,
        ))
    }

    async fn apply_arguments(&self, arguments: &ReporterArguments) -> Result<()> {
        let Some(raw_key) = arguments.first_value(INSTRUMENTATION_KEY_ARGUMENT) else {
            return Ok(());
        };
        let credential = SecretString::new(raw_key);

        let mut state = self.state.write().await;
        if matches!(&*state, ClientState::Closed) {
            return Err(unavailable_error(ReporterStatus::Closed, "update_arguments"));
        }
        if matches!(&*state, ClientState::Active { credential: current, .. } if *current == credential)
        {
            return Ok(());
        }

        let client = self.factory.connect(&credential)?;
        self.log_client_initialized(&credential);
        let previous = std::mem::replace(&mut *state, ClientState::Active { client, credential });
        drop(state);

        // Reports already route to the new client; drain what the old one holds.
        if let ClientState::Active { client: previous, .. } = previous {
            if let Err(error) = previous.flush().await {
                self.logger.warn(
                    "reporter.flush_failed",
                    "flushing the replaced telemetry client failed",
                    Some(log_fields([(
                        "error",
                        serde_json::to_value(&error).unwrap_or(Value::Null),
                    )])),
                );
            }
        }
        Ok(())
    }

    async fn close_client(&self) -> Result<()> {
        let mut state = self.state.write().await;
        let previous = std::mem::replace(&mut *state, ClientState::Closed);
        let client = match previous {
            ClientState::Active { client, .. } => client,
            ClientState::NotConfigured => {
                self.logger
                    .info("reporter.close", "reporter closed before configuration", None);
                return Ok(());
            },
            ClientState::Closed => {
                return Err(unavailable_error(ReporterStatus::Closed, "close"));
            },
        };

        let flushed = client.flush().await;
        if let Err(error) = &flushed {
            self.logger.error(
                "reporter.flush_failed",
                "final flush failed",
                None,
                serde_json::to_value(error).ok(),
            );
        }
        tokio::time::sleep(self.settings.close_grace).await;
        drop(client);

        let grace_ms = u64::try_from(self.settings.close_grace.as_millis()).unwrap_or(u64::MAX);
        self.logger.info(
            "reporter.close",
            "telemetry client closed",
            Some(log_fields([("graceMs", Value::from(grace_ms))])),
        );
        flushed
    }

    fn log_client_initialized(&self, credential: &SecretString) {
        self.logger.info(
            "reporter.client_initialized",
            &format!(
                "initializing telemetry client with instrumentation key {}",
                credential.masked()
            ),
            None,
        );
    }
}

impl ReporterPort for AppInsightsReporter {
    fn report<'a>(
        &'a self,
        profiler_name: &'a str,
        metrics: &'a MetricsSnapshot,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(self.report_snapshot(profiler_name, metrics))
    }

    fn update_arguments<'a>(
        &'a self,
        arguments: &'a ReporterArguments,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(self.apply_arguments(arguments))
    }

    fn close(&self) -> BoxFuture<'_, Result<()>> {
        Box::pin(self.close_client())
    }
}

fn unavailable_error(status: ReporterStatus, operation: &'static str) -> ErrorEnvelope {
    let envelope = match status {
        ReporterStatus::Closed => ErrorEnvelope::invariant(
            ErrorCode::new("reporter", "closed"),
            "reporter is closed",
        ),
        ReporterStatus::NotConfigured | ReporterStatus::Active => ErrorEnvelope::expected(
            ErrorCode::new("reporter", "not_configured"),
            "reporter has no instrumentation key",
        ),
    };
    envelope.with_metadata("operation", operation)
}
