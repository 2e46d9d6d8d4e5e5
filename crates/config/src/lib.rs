//! # profiler-reporter-config
//!
//! Reporter argument loading, env overrides, and Application Insights
//! settings. This crate depends on `domain` and `shared` only.

/// Environment variable parsing and merging.
pub mod env;
/// Argument loading helpers (file + env).
pub mod load;
/// Application Insights settings.
pub mod settings;

pub use env::{ENV_INSTRUMENTATION_KEY, EnvParseError, ReporterEnv, apply_env_overrides};
pub use load::{
    ArgumentsError, ArgumentsFormat, load_arguments_from_path, load_arguments_from_sources,
    load_arguments_std_env, parse_arguments,
};
pub use settings::{
    AppInsightsSettings, DEFAULT_CLOSE_GRACE_MS, DEFAULT_ENDPOINT, DEFAULT_MAX_BATCH_SIZE,
    DEFAULT_SEND_INTERVAL_MS, DEFAULT_TIMEOUT_MS, SettingsError,
};

/// Returns the config crate version.
#[must_use]
pub const fn config_crate_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::*;
    use profiler_reporter_domain::domain_crate_version;
    use profiler_reporter_shared::shared_crate_version;

    #[test]
    fn config_crate_compiles() {
        let version = config_crate_version();
        assert!(!version.is_empty());
    }

    #[test]
    fn config_can_use_domain_and_shared() {
        let domain_version = domain_crate_version();
        let shared_version = shared_crate_version();

        assert!(!domain_version.is_empty());
        assert!(!shared_version.is_empty());
    }
}
