//! # profiler-reporter-adapters
//!
//! Adapter implementations for ports: the Application Insights reporter,
//! telemetry clients, and structured loggers.
//! This crate depends on `ports`, `config`, `domain`, and `shared`.

/// Application Insights HTTP telemetry client.
#[cfg(feature = "appinsights")]
pub mod appinsights;

pub mod log_sink;
pub mod logger;
pub mod reporter;
pub mod telemetry;

#[cfg(feature = "appinsights")]
pub use appinsights::{AppInsightsHttpClient, AppInsightsHttpClientFactory};
pub use log_sink::{LogSink, MemoryLogSink, StderrLogSink};
pub use logger::{JsonLogger, TRACING_TARGET, TracingLogger};
pub use reporter::{AppInsightsReporter, ReporterStatus};
pub use telemetry::{JsonTraceClient, JsonTraceClientFactory};

/// Returns the adapters crate version.
#[must_use]
pub const fn adapters_crate_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
