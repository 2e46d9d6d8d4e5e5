//! Reporter arguments: string keys mapped to lists of strings.
//!
//! Host agents pass every configured option through the same map, so most
//! keys are unrelated to any given reporter. Only the first element of each
//! list is meaningful.

use profiler_reporter_shared::{REDACTED, is_secret_key};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Argument carrying the Application Insights instrumentation key.
pub const INSTRUMENTATION_KEY_ARGUMENT: &str = "appinsights.instrumentationkey";
/// Argument overriding the ingestion endpoint.
pub const ENDPOINT_ARGUMENT: &str = "appinsights.endpoint";
/// Argument overriding the HTTP request timeout, in milliseconds.
pub const TIMEOUT_MS_ARGUMENT: &str = "appinsights.timeoutms";
/// Argument overriding the close grace period, in milliseconds.
pub const CLOSE_GRACE_MS_ARGUMENT: &str = "appinsights.closegracems";
/// Argument overriding the background send interval, in milliseconds.
pub const SEND_INTERVAL_MS_ARGUMENT: &str = "appinsights.sendintervalms";
/// Argument overriding the number of buffered traces that triggers a send.
pub const MAX_BATCH_SIZE_ARGUMENT: &str = "appinsights.maxbatchsize";

/// Reporter arguments keyed by option name.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReporterArguments(BTreeMap<String, Vec<String>>);

impl ReporterArguments {
    /// Create an empty argument map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the values for a key.
    pub fn insert(&mut self, key: impl Into<String>, values: Vec<String>) {
        self.0.insert(key.into(), values);
    }

    /// Builder-style insert of a single value.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(key, vec![value.into()]);
        self
    }

    /// Raw values for a key.
    #[must_use]
    pub fn values(&self, key: &str) -> Option<&[String]> {
        self.0.get(key).map(Vec::as_slice)
    }

    /// First value for a key when the key and the value are both non-empty.
    #[must_use]
    pub fn first_value(&self, key: &str) -> Option<&str> {
        if key.is_empty() {
            return None;
        }
        self.0
            .get(key)
            .and_then(|values| values.first())
            .map(String::as_str)
            .filter(|value| !value.is_empty())
    }

    /// Copy every entry of `other` over this map. Entries in `other` win.
    pub fn merge(&mut self, other: Self) {
        self.0.extend(other.0);
    }

    /// Iterate entries in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Vec<String>)> {
        self.0.iter()
    }

    /// Number of keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true when no keys are present.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for ReporterArguments {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = formatter.debug_map();
        for (key, values) in &self.0 {
            if is_secret_key(key) {
                map.entry(key, &REDACTED);
            } else {
                map.entry(key, values);
            }
        }
        map.finish()
    }
}

impl<K: Into<String>> FromIterator<(K, Vec<String>)> for ReporterArguments {
    fn from_iter<I: IntoIterator<Item = (K, Vec<String>)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(key, values)| (key.into(), values)).collect())
    }
}

impl From<BTreeMap<String, Vec<String>>> for ReporterArguments {
    fn from(map: BTreeMap<String, Vec<String>>) -> Self {
        Self(map)
    }
}
