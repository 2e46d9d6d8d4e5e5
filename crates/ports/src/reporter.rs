//! Metrics reporter boundary contract.

use crate::BoxFuture;
use profiler_reporter_domain::{MetricsSnapshot, ReporterArguments};
use profiler_reporter_shared::Result;

/// Boundary contract for a pluggable metrics output.
pub trait ReporterPort: Send + Sync {
    /// Flatten a snapshot and forward it as one trace.
    ///
    /// Fails when no live client exists or when the snapshot holds a null value.
    fn report<'a>(
        &'a self,
        profiler_name: &'a str,
        metrics: &'a MetricsSnapshot,
    ) -> BoxFuture<'a, Result<()>>;

    /// Apply host arguments. Unrelated or malformed entries are ignored.
    fn update_arguments<'a>(&'a self, arguments: &'a ReporterArguments)
    -> BoxFuture<'a, Result<()>>;

    /// Flush buffered telemetry, wait for delivery, then invalidate the handle.
    ///
    /// A second call fails.
    fn close(&self) -> BoxFuture<'_, Result<()>>;
}
