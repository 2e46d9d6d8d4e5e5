//! Trace telemetry sent to the backend.

use crate::metrics::FlattenedMetrics;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Message attached to every metrics trace.
pub const DEFAULT_TRACE_MESSAGE: &str = "cluster metrics";

/// Trace severity, numbered the way Application Insights numbers it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SeverityLevel {
    /// Verbose.
    Verbose,
    /// Information.
    Information,
    /// Warning.
    Warning,
    /// Error.
    Error,
    /// Critical.
    Critical,
}

impl SeverityLevel {
    /// Numeric level used on the wire.
    #[must_use]
    pub const fn as_i32(self) -> i32 {
        match self {
            Self::Verbose => 0,
            Self::Information => 1,
            Self::Warning => 2,
            Self::Error => 3,
            Self::Critical => 4,
        }
    }

    /// Stable name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Verbose => "Verbose",
            Self::Information => "Information",
            Self::Warning => "Warning",
            Self::Error => "Error",
            Self::Critical => "Critical",
        }
    }
}

impl fmt::Display for SeverityLevel {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// One trace event with string-valued properties.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceTelemetry {
    /// Event label.
    pub message: Box<str>,
    /// Severity.
    pub severity: SeverityLevel,
    /// Property bag.
    pub properties: FlattenedMetrics,
}

impl TraceTelemetry {
    /// Informational trace carrying flattened metrics.
    pub fn information(message: impl Into<Box<str>>, properties: FlattenedMetrics) -> Self {
        Self {
            message: message.into(),
            severity: SeverityLevel::Information,
            properties,
        }
    }
}
