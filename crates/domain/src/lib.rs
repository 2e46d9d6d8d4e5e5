//! # profiler-reporter-domain
//!
//! Domain model for reporting profiler metrics:
//!
//! - **Metrics** - `MetricsSnapshot`, `MetricValue`, `MetricScalar`
//! - **Flattening** - nested snapshot to flat string properties
//! - **Telemetry** - `TraceTelemetry`, `SeverityLevel`
//! - **Arguments** - `ReporterArguments` supplied by the host agent
//!
//! ## Dependency Rules
//!
//! - Depends only on `shared` crate
//! - No infrastructure or adapter dependencies
//! - Pure domain logic with no I/O

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]

// Re-export shared types for convenience
pub use profiler_reporter_shared::shared_crate_version;

// =============================================================================
// DOMAIN MODULES
// =============================================================================

pub mod arguments;
pub mod flatten;
pub mod metrics;
pub mod telemetry;

pub use arguments::{
    CLOSE_GRACE_MS_ARGUMENT, ENDPOINT_ARGUMENT, INSTRUMENTATION_KEY_ARGUMENT,
    MAX_BATCH_SIZE_ARGUMENT, ReporterArguments, SEND_INTERVAL_MS_ARGUMENT, TIMEOUT_MS_ARGUMENT,
};
pub use flatten::{FlattenError, GROUP_FIELD_SUFFIX, LIST_SEPARATOR, flatten_metrics};
pub use metrics::{
    FlattenedMetrics, MetricGroup, MetricRecord, MetricScalar, MetricShapeError, MetricValue,
    MetricsSnapshot, RECORD_NAME_FIELD,
};
pub use telemetry::{DEFAULT_TRACE_MESSAGE, SeverityLevel, TraceTelemetry};

/// Returns the domain crate version.
#[must_use]
pub const fn domain_crate_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

// =============================================================================
// TESTS
// =============================================================================
