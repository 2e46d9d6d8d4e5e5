//! # profiler-reporter-ports
//!
//! Port traits for the profiler-reporter hexagonal architecture.
//!
//! This crate defines the interfaces between the domain and infrastructure
//! layers. It depends only on `domain` and `shared`.

use std::future::Future;
use std::pin::Pin;

/// Boxed future used by port traits.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Returns the ports crate version.
#[must_use]
pub const fn ports_crate_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

pub mod logger;
pub mod reporter;
pub mod telemetry;

pub use logger::*;
pub use reporter::*;
pub use telemetry::*;

// Re-export selected domain types used in port signatures, so adapter crates
// can implement ports without directly depending on `profiler-reporter-domain`.
pub use profiler_reporter_domain::{
    FlattenedMetrics, MetricsSnapshot, ReporterArguments, SeverityLevel, TraceTelemetry,
};
