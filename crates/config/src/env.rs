//! Environment variable parsing and env-to-arguments merging.
//!
//! Env parsing is strict: a variable that is present but blank fails instead
//! of silently clearing the argument it overrides.

use profiler_reporter_domain::{INSTRUMENTATION_KEY_ARGUMENT, ReporterArguments};
use profiler_reporter_shared::{ErrorCode, ErrorEnvelope, SecretString};
use std::collections::BTreeMap;
use std::fmt;

/// Env var: Application Insights instrumentation key (secret).
pub const ENV_INSTRUMENTATION_KEY: &str = "APPINSIGHTS_INSTRUMENTATIONKEY";

/// Parsed env overrides.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReporterEnv {
    /// Instrumentation key override.
    pub instrumentation_key: Option<SecretString>,
}

impl ReporterEnv {
    /// Parse env overrides from a key/value map (useful for tests and fixtures).
    pub fn from_map(map: &BTreeMap<String, String>) -> Result<Self, EnvParseError> {
        Ok(Self {
            instrumentation_key: parse_optional_secret(map, ENV_INSTRUMENTATION_KEY)?,
        })
    }

    /// Parse env overrides from the current process environment.
    pub fn from_std_env() -> Result<Self, EnvParseError> {
        let mut map = BTreeMap::new();
        if let Ok(value) = std::env::var(ENV_INSTRUMENTATION_KEY) {
            map.insert(ENV_INSTRUMENTATION_KEY.to_string(), value);
        }
        Self::from_map(&map)
    }

    /// Returns true when no override is set.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.instrumentation_key.is_none()
    }
}

/// Apply env overrides on top of file arguments. Env wins.
#[must_use]
pub fn apply_env_overrides(mut arguments: ReporterArguments, env: &ReporterEnv) -> ReporterArguments {
    if let Some(key) = &env.instrumentation_key {
        arguments.insert(
            INSTRUMENTATION_KEY_ARGUMENT,
            vec![key.expose().to_string()],
        );
    }
    arguments
}

/// Validation failures when parsing env variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnvParseError {
    /// A secret env var was present but empty after trimming.
    EmptySecret {
        /// Env var name.
        var: &'static str,
    },
}

impl fmt::Display for EnvParseError {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptySecret { var } => write!(formatter, "{var} must be non-empty"),
        }
    }
}

impl std::error::Error for EnvParseError {}

impl From<EnvParseError> for ErrorEnvelope {
    fn from(error: EnvParseError) -> Self {
        let message = error.to_string();
        match error {
            EnvParseError::EmptySecret { var } => {
                Self::expected(ErrorCode::new("config", "empty_env_var"), message)
                    .with_metadata("env_var", var)
            },
        }
    }
}

fn parse_optional_secret(
    map: &BTreeMap<String, String>,
    var: &'static str,
) -> Result<Option<SecretString>, EnvParseError> {
    let Some(raw) = map.get(var) else {
        return Ok(None);
    };

    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(EnvParseError::EmptySecret { var });
    }

    Ok(Some(SecretString::new(trimmed.to_owned())))
}
