//! Secret detection and redaction utilities.
//!
//! Credentials such as the Application Insights instrumentation key must never
//! reach logs or error metadata in clear text.

/// The redacted placeholder string.
pub const REDACTED: &str = "[REDACTED]";

const MASK_VISIBLE_SUFFIX: usize = 4;

/// Checks if a key/variable name likely refers to a secret.
///
/// # Examples
///
/// ```
/// use profiler_reporter_shared::is_secret_key;
///
/// assert!(is_secret_key("appinsights.instrumentationkey"));
/// assert!(is_secret_key("APPINSIGHTS_INSTRUMENTATIONKEY"));
/// assert!(!is_secret_key("appinsights.endpoint"));
/// ```
pub fn is_secret_key(key: &str) -> bool {
    let key = key.to_ascii_uppercase();
    key.contains("KEY")
        || key.contains("TOKEN")
        || key.contains("SECRET")
        || key.contains("PASSWORD")
        || key.contains("CREDENTIAL")
        || key.contains("AUTH")
}

/// Masks a secret for diagnostics, keeping only the last four characters.
///
/// Short secrets are fully masked.
///
/// # Examples
///
/// ```
/// use profiler_reporter_shared::mask_secret;
///
/// assert_eq!(mask_secret("0f8fad5b-d9cb-469f"), "****469f");
/// assert_eq!(mask_secret("abc"), "****");
/// ```
pub fn mask_secret(value: &str) -> String {
    let count = value.chars().count();
    if count <= MASK_VISIBLE_SUFFIX * 2 {
        return "****".to_string();
    }
    let suffix: String = value.chars().skip(count - MASK_VISIBLE_SUFFIX).collect();
    format!("****{suffix}")
}

/// A secret string wrapper that redacts on Display/Debug.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct SecretString(Box<str>);

impl SecretString {
    /// Wrap a secret value.
    pub fn new(value: impl Into<Box<str>>) -> Self {
        Self(value.into())
    }

    /// Borrow the underlying secret.
    pub fn expose(&self) -> &str {
        &self.0
    }

    /// Masked form safe for logs.
    pub fn masked(&self) -> String {
        mask_secret(&self.0)
    }

    /// Returns true when the secret is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl std::fmt::Debug for SecretString {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter.write_str(REDACTED)
    }
}

impl std::fmt::Display for SecretString {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter.write_str(REDACTED)
    }
}

impl From<&str> for SecretString {
    fn from(value: &str) -> Self {
        Self(value.into())
    }
}

impl From<String> for SecretString {
    fn from(value: String) -> Self {
        Self(value.into_boxed_str())
    }
}
