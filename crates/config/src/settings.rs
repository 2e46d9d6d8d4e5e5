//! Application Insights client settings.

use profiler_reporter_domain::{
    CLOSE_GRACE_MS_ARGUMENT, DEFAULT_TRACE_MESSAGE, ENDPOINT_ARGUMENT, MAX_BATCH_SIZE_ARGUMENT,
    ReporterArguments, SEND_INTERVAL_MS_ARGUMENT, TIMEOUT_MS_ARGUMENT,
};
use profiler_reporter_shared::{ErrorCode, ErrorEnvelope};
use std::fmt;
use std::time::Duration;
use url::Url;

/// Default ingestion endpoint.
pub const DEFAULT_ENDPOINT: &str = "https://dc.services.visualstudio.com/v2/track";
/// Default HTTP request timeout.
pub const DEFAULT_TIMEOUT_MS: u64 = 10_000;
/// Default wait after the final flush.
pub const DEFAULT_CLOSE_GRACE_MS: u64 = 5_000;
/// Default interval between background sends.
pub const DEFAULT_SEND_INTERVAL_MS: u64 = 5_000;
/// Default number of buffered traces that triggers a send.
pub const DEFAULT_MAX_BATCH_SIZE: usize = 500;

const MAX_TIMEOUT_MS: u64 = 600_000;
const MAX_CLOSE_GRACE_MS: u64 = 60_000;
const MIN_SEND_INTERVAL_MS: u64 = 10;
const MAX_SEND_INTERVAL_MS: u64 = 600_000;
const MAX_BATCH_SIZE_LIMIT: u64 = 10_000;

/// Settings for the Application Insights reporter and its HTTP client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppInsightsSettings {
    /// Ingestion endpoint, an absolute http(s) URL.
    pub endpoint: Box<str>,
    /// Per-request timeout.
    pub timeout: Duration,
    /// Wait after the final flush on close.
    pub close_grace: Duration,
    /// Message attached to every trace.
    pub trace_message: Box<str>,
    /// Interval between background sends of buffered traces.
    pub send_interval: Duration,
    /// Buffered trace count that triggers an immediate send.
    pub max_batch_size: usize,
}

impl Default for AppInsightsSettings {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.into(),
            timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
            close_grace: Duration::from_millis(DEFAULT_CLOSE_GRACE_MS),
            trace_message: DEFAULT_TRACE_MESSAGE.into(),
            send_interval: Duration::from_millis(DEFAULT_SEND_INTERVAL_MS),
            max_batch_size: DEFAULT_MAX_BATCH_SIZE,
        }
    }
}

impl AppInsightsSettings {
    /// Defaults overridden by `appinsights.*` arguments.
    pub fn from_arguments(arguments: &ReporterArguments) -> Result<Self, SettingsError> {
        let mut settings = Self::default();

        if let Some(raw) = arguments.first_value(ENDPOINT_ARGUMENT) {
            settings.endpoint = parse_endpoint(raw)?;
        }
        if let Some(raw) = arguments.first_value(TIMEOUT_MS_ARGUMENT) {
            let millis = parse_millis(TIMEOUT_MS_ARGUMENT, raw, 1, MAX_TIMEOUT_MS)?;
            settings.timeout = Duration::from_millis(millis);
        }
        if let Some(raw) = arguments.first_value(CLOSE_GRACE_MS_ARGUMENT) {
            let millis = parse_millis(CLOSE_GRACE_MS_ARGUMENT, raw, 0, MAX_CLOSE_GRACE_MS)?;
            settings.close_grace = Duration::from_millis(millis);
        }
        if let Some(raw) = arguments.first_value(SEND_INTERVAL_MS_ARGUMENT) {
            let millis = parse_millis(
                SEND_INTERVAL_MS_ARGUMENT,
                raw,
                MIN_SEND_INTERVAL_MS,
                MAX_SEND_INTERVAL_MS,
            )?;
            settings.send_interval = Duration::from_millis(millis);
        }
        if let Some(raw) = arguments.first_value(MAX_BATCH_SIZE_ARGUMENT) {
            settings.max_batch_size = parse_count(MAX_BATCH_SIZE_ARGUMENT, raw, MAX_BATCH_SIZE_LIMIT)?;
        }

        Ok(settings)
    }

    /// Replace the close grace period.
    #[must_use]
    pub const fn with_close_grace(mut self, close_grace: Duration) -> Self {
        self.close_grace = close_grace;
        self
    }

    /// Replace the background send policy.
    #[must_use]
    pub const fn with_send_policy(mut self, send_interval: Duration, max_batch_size: usize) -> Self {
        self.send_interval = send_interval;
        self.max_batch_size = max_batch_size;
        self
    }

    /// Replace the ingestion endpoint.
    pub fn with_endpoint(mut self, endpoint: &str) -> Result<Self, SettingsError> {
        self.endpoint = parse_endpoint(endpoint)?;
        Ok(self)
    }
}

/// Invalid `appinsights.*` argument values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SettingsError {
    /// Endpoint is not an absolute http(s) URL.
    InvalidEndpoint {
        /// Raw input value.
        value: String,
    },
    /// Millisecond argument is not an integer in range.
    InvalidMillis {
        /// Argument name.
        argument: &'static str,
        /// Raw input value.
        value: String,
        /// Inclusive minimum.
        min: u64,
        /// Inclusive maximum.
        max: u64,
    },
    /// Count argument is not a positive integer in range.
    InvalidCount {
        /// Argument name.
        argument: &'static str,
        /// Raw input value.
        value: String,
        /// Inclusive maximum.
        max: u64,
    },
}

impl fmt::Display for SettingsError {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidEndpoint { .. } => {
                formatter.write_str("appinsights.endpoint must be an http or https URL")
            },
            Self::InvalidMillis {
                argument, min, max, ..
            } => write!(formatter, "{argument} must be an integer between {min} and {max}"),
            Self::InvalidCount { argument, max, .. } => {
                write!(formatter, "{argument} must be an integer between 1 and {max}")
            },
        }
    }
}

impl std::error::Error for SettingsError {}

impl From<SettingsError> for ErrorEnvelope {
    fn from(error: SettingsError) -> Self {
        let message = error.to_string();
        match error {
            SettingsError::InvalidEndpoint { value } => {
                Self::expected(ErrorCode::new("config", "invalid_endpoint"), message)
                    .with_metadata("value", value)
            },
            SettingsError::InvalidMillis {
                argument, value, ..
            } => Self::expected(ErrorCode::new("config", "invalid_duration"), message)
                .with_metadata("argument", argument)
                .with_metadata("value", value),
            SettingsError::InvalidCount {
                argument, value, ..
            } => Self::expected(ErrorCode::new("config", "invalid_count"), message)
                .with_metadata("argument", argument)
                .with_metadata("value", value),
        }
    }
}

fn parse_endpoint(raw: &str) -> Result<Box<str>, SettingsError> {
    let invalid = || SettingsError::InvalidEndpoint {
        value: raw.to_string(),
    };
    let url = Url::parse(raw.trim()).map_err(|_| invalid())?;
    match url.scheme() {
        "http" | "https" if url.has_host() => Ok(url.as_str().into()),
        _ => Err(invalid()),
    }
}

fn parse_millis(
    argument: &'static str,
    raw: &str,
    min: u64,
    max: u64,
) -> Result<u64, SettingsError> {
    raw.trim()
        .parse::<u64>()
        .ok()
        .filter(|value| (min..=max).contains(value))
        .ok_or_else(|| SettingsError::InvalidMillis {
            argument,
            value: raw.to_string(),
            min,
            max,
        })
}

fn parse_count(argument: &'static str, raw: &str, max: u64) -> Result<usize, SettingsError> {
    raw.trim()
        .parse::<u64>()
        .ok()
        .filter(|value| (1..=max).contains(value))
        .and_then(|value| usize::try_from(value).ok())
        .ok_or_else(|| SettingsError::InvalidCount {
            argument,
            value: raw.to_string(),
            max,
        })
}
