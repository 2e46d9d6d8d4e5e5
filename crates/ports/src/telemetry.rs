//! Telemetry backend boundary contract.

use crate::BoxFuture;
use profiler_reporter_domain::TraceTelemetry;
use profiler_reporter_shared::{Result, SecretString};
use std::sync::Arc;

/// Client session bound to one backend credential.
pub trait TelemetryClientPort: Send + Sync {
    /// Buffer one trace for delivery.
    fn track_trace(&self, trace: TraceTelemetry) -> Result<()>;

    /// Deliver everything buffered so far.
    fn flush(&self) -> BoxFuture<'_, Result<()>>;
}

/// Creates client sessions for a credential.
pub trait TelemetryClientFactory: Send + Sync {
    /// Open a session. Invalid credentials fail here.
    fn connect(&self, credential: &SecretString) -> Result<Arc<dyn TelemetryClientPort>>;
}
