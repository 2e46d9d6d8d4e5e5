//! Reporter argument loading (file + env).
//!
//! Argument files are free-form documents. Nested mappings collapse into
//! dotted keys so that
//!
//! ```yaml
//! appinsights:
//!   instrumentationkey: abc123
//! ```
//!
//! yields `appinsights.instrumentationkey = ["abc123"]`.

use crate::{ReporterEnv, apply_env_overrides};
use profiler_reporter_domain::ReporterArguments;
use profiler_reporter_shared::{ErrorCode, ErrorEnvelope};
use serde_json::Value;
use std::fmt;
use std::path::Path;

const KEY_SEPARATOR: char = '.';

/// Supported argument file formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgumentsFormat {
    /// YAML (`.yaml`, `.yml`).
    Yaml,
    /// JSON (`.json`).
    Json,
    /// TOML (`.toml`).
    Toml,
}

impl ArgumentsFormat {
    /// Detect the format from a file extension.
    pub fn from_path(path: &Path) -> Result<Self, ArgumentsError> {
        let ext = path
            .extension()
            .and_then(|value| value.to_str())
            .map(str::to_ascii_lowercase);
        match ext.as_deref() {
            Some("yaml" | "yml") => Ok(Self::Yaml),
            Some("json") => Ok(Self::Json),
            Some("toml") => Ok(Self::Toml),
            other => Err(ArgumentsError::UnsupportedFormat {
                extension: other.unwrap_or_default().to_string(),
            }),
        }
    }

    /// Lowercase format name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Yaml => "yaml",
            Self::Json => "json",
            Self::Toml => "toml",
        }
    }
}

/// Failures while loading reporter arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArgumentsError {
    /// The file could not be read.
    Io {
        /// File path.
        path: String,
        /// I/O error kind.
        kind: std::io::ErrorKind,
        /// I/O error message.
        message: String,
    },
    /// The file extension is not a supported format.
    UnsupportedFormat {
        /// Lowercased extension, empty when missing.
        extension: String,
    },
    /// The document did not parse.
    Invalid {
        /// Document format.
        format: ArgumentsFormat,
        /// Parser message.
        message: String,
    },
    /// The document root is not a mapping.
    NotAMapping {
        /// Document format.
        format: ArgumentsFormat,
    },
}

impl ArgumentsError {
    fn error_code(&self) -> ErrorCode {
        match self {
            Self::Io { kind, .. } => match kind {
                std::io::ErrorKind::NotFound => ErrorCode::new("config", "arguments_file_not_found"),
                std::io::ErrorKind::PermissionDenied => {
                    ErrorCode::new("config", "arguments_file_permission_denied")
                },
                _ => ErrorCode::new("config", "arguments_file_io"),
            },
            Self::UnsupportedFormat { .. } => ErrorCode::new("config", "unsupported_format"),
            Self::Invalid { format, .. } => match format {
                ArgumentsFormat::Yaml => ErrorCode::new("config", "invalid_yaml"),
                ArgumentsFormat::Json => ErrorCode::new("config", "invalid_json"),
                ArgumentsFormat::Toml => ErrorCode::new("config", "invalid_toml"),
            },
            Self::NotAMapping { .. } => ErrorCode::new("config", "arguments_not_mapping"),
        }
    }
}

impl fmt::Display for ArgumentsError {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io { message, .. } => write!(formatter, "failed to read arguments file: {message}"),
            Self::UnsupportedFormat { .. } => {
                formatter.write_str("unsupported arguments format; use .yaml, .yml, .json or .toml")
            },
            Self::Invalid { format, message } => {
                write!(formatter, "invalid arguments {}: {message}", format.as_str())
            },
            Self::NotAMapping { format } => {
                write!(formatter, "arguments {} root must be a mapping", format.as_str())
            },
        }
    }
}

impl std::error::Error for ArgumentsError {}

impl From<ArgumentsError> for ErrorEnvelope {
    fn from(error: ArgumentsError) -> Self {
        let envelope = Self::expected(error.error_code(), error.to_string());
        match error {
            ArgumentsError::Io { path, .. } => envelope.with_metadata("path", path),
            ArgumentsError::UnsupportedFormat { extension } => {
                envelope.with_metadata("extension", extension)
            },
            ArgumentsError::Invalid { format, .. } | ArgumentsError::NotAMapping { format } => {
                envelope.with_metadata("format", format.as_str())
            },
        }
    }
}

/// Parse an argument document.
pub fn parse_arguments(
    input: &str,
    format: ArgumentsFormat,
) -> Result<ReporterArguments, ArgumentsError> {
    if format == ArgumentsFormat::Yaml && input.trim().is_empty() {
        return Ok(ReporterArguments::new());
    }
    let invalid = |message: String| ArgumentsError::Invalid { format, message };
    let document: Value = match format {
        ArgumentsFormat::Yaml => {
            serde_yaml_ng::from_str(input).map_err(|error| invalid(error.to_string()))?
        },
        ArgumentsFormat::Json => {
            serde_json::from_str(input).map_err(|error| invalid(error.to_string()))?
        },
        ArgumentsFormat::Toml => {
            toml::from_str(input).map_err(|error| invalid(error.to_string()))?
        },
    };

    match document {
        // `~` or a comment-only YAML document.
        Value::Null => Ok(ReporterArguments::new()),
        Value::Object(entries) => {
            let mut arguments = ReporterArguments::new();
            for (key, value) in entries {
                collect_entry(&mut arguments, key, value);
            }
            Ok(arguments)
        },
        _ => Err(ArgumentsError::NotAMapping { format }),
    }
}

/// Load arguments from an optional document, then apply env overrides.
pub fn load_arguments_from_sources(
    document: Option<(&str, ArgumentsFormat)>,
    env: &ReporterEnv,
) -> Result<ReporterArguments, ErrorEnvelope> {
    let arguments = match document {
        None => ReporterArguments::new(),
        Some((input, format)) => parse_arguments(input, format)?,
    };
    Ok(apply_env_overrides(arguments, env))
}

/// Load arguments from an optional file path, then apply env overrides.
pub fn load_arguments_from_path(
    path: Option<&Path>,
    env: &ReporterEnv,
) -> Result<ReporterArguments, ErrorEnvelope> {
    let arguments = match path {
        None => ReporterArguments::new(),
        Some(path) => {
            let format = ArgumentsFormat::from_path(path)?;
            let text = read_arguments_file(path)?;
            parse_arguments(&text, format)?
        },
    };
    Ok(apply_env_overrides(arguments, env))
}

/// Load arguments from an optional file path and the process environment.
pub fn load_arguments_std_env(path: Option<&Path>) -> Result<ReporterArguments, ErrorEnvelope> {
    let env = ReporterEnv::from_std_env()?;
    load_arguments_from_path(path, &env)
}

fn read_arguments_file(path: &Path) -> Result<String, ArgumentsError> {
    std::fs::read_to_string(path).map_err(|error| ArgumentsError::Io {
        path: path.to_string_lossy().to_string(),
        kind: error.kind(),
        message: error.to_string(),
    })
}

fn collect_entry(arguments: &mut ReporterArguments, key: String, value: Value) {
    match value {
        Value::Object(children) => {
            for (child, value) in children {
                collect_entry(arguments, format!("{key}{KEY_SEPARATOR}{child}"), value);
            }
        },
        Value::Array(items) => {
            let values = items
                .into_iter()
                .filter(|item| !item.is_null())
                .map(render_value)
                .collect();
            arguments.insert(key, values);
        },
        Value::Null => arguments.insert(key, Vec::new()),
        scalar => arguments.insert(key, vec![render_value(scalar)]),
    }
}

fn render_value(value: Value) -> String {
    match value {
        Value::String(text) => text,
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use profiler_reporter_domain::INSTRUMENTATION_KEY_ARGUMENT;
    use profiler_reporter_shared::SecretString;

    #[test]
    fn nested_yaml_collapses_into_dotted_keys() -> Result<(), ArgumentsError> {
        let yaml = "\
appinsights:
  instrumentationkey: abc123
  timeoutms: 2500
reporters:
  - appinsights
  - console
sampling: ~
";
        let arguments = parse_arguments(yaml, ArgumentsFormat::Yaml)?;
        assert_eq!(arguments.first_value(INSTRUMENTATION_KEY_ARGUMENT), Some("abc123"));
        assert_eq!(arguments.first_value("appinsights.timeoutms"), Some("2500"));
        assert_eq!(
            arguments.values("reporters"),
            Some(&["appinsights".to_string(), "console".to_string()][..])
        );
        assert_eq!(arguments.values("sampling"), Some(&[] as &[String]));
        assert_eq!(arguments.first_value("sampling"), None);
        Ok(())
    }

    #[test]
    fn json_and_toml_documents_flatten_the_same_way() -> Result<(), ArgumentsError> {
        let json = r#"{"appinsights": {"instrumentationkey": "abc123", "closegracems": 0}}"#;
        let toml = "[appinsights]\ninstrumentationkey = \"abc123\"\nclosegracems = 0\n";

        let from_json = parse_arguments(json, ArgumentsFormat::Json)?;
        let from_toml = parse_arguments(toml, ArgumentsFormat::Toml)?;
        assert_eq!(from_json, from_toml);
        assert_eq!(from_json.first_value("appinsights.closegracems"), Some("0"));
        Ok(())
    }

    #[test]
    fn empty_yaml_document_yields_no_arguments() -> Result<(), ArgumentsError> {
        assert!(parse_arguments("", ArgumentsFormat::Yaml)?.is_empty());
        Ok(())
    }

    #[test]
    fn non_mapping_root_is_rejected() {
        let error = parse_arguments("- a\n- b\n", ArgumentsFormat::Yaml).err();
        assert_eq!(
            error,
            Some(ArgumentsError::NotAMapping {
                format: ArgumentsFormat::Yaml
            })
        );
    }

    #[test]
    fn malformed_documents_map_to_format_codes() -> Result<(), Box<dyn std::error::Error>> {
        let error = parse_arguments("{ \"a\": ", ArgumentsFormat::Json)
            .err()
            .ok_or_else(|| std::io::Error::other("expected json error"))?;
        let envelope: ErrorEnvelope = error.into();
        assert_eq!(envelope.code, ErrorCode::new("config", "invalid_json"));
        assert_eq!(envelope.metadata.get("format").map(String::as_str), Some("json"));
        Ok(())
    }

    #[test]
    fn format_detection_uses_extension() {
        assert_eq!(
            ArgumentsFormat::from_path(Path::new("agent.YML")),
            Ok(ArgumentsFormat::Yaml)
        );
        assert_eq!(
            ArgumentsFormat::from_path(Path::new("agent.toml")),
            Ok(ArgumentsFormat::Toml)
        );
        assert_eq!(
            ArgumentsFormat::from_path(Path::new("agent")),
            Err(ArgumentsError::UnsupportedFormat {
                extension: String::new()
            })
        );
    }

    #[test]
    fn env_wins_over_document() -> Result<(), ErrorEnvelope> {
        let env = ReporterEnv {
            instrumentation_key: Some(SecretString::new("from-env")),
        };
        let arguments = load_arguments_from_sources(
            Some(("appinsights:\n  instrumentationkey: from-file\n", ArgumentsFormat::Yaml)),
            &env,
        )?;
        assert_eq!(arguments.first_value(INSTRUMENTATION_KEY_ARGUMENT), Some("from-env"));
        Ok(())
    }
}
