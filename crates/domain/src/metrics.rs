//! Metric values produced by a profiler for one reporting cycle.
//!
//! Profilers hand over loosely-typed, possibly nested values. They are modeled
//! here as a closed set of shapes so the flattener never inspects types at
//! runtime:
//!
//! - a single scalar,
//! - a list of scalars,
//! - a list of records (sub-metrics, each optionally carrying a `name`),
//! - a two-level mapping of groups.

use profiler_reporter_shared::{ErrorCode, ErrorEnvelope};
use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};
use std::collections::BTreeMap;
use std::fmt;

/// Field that labels a record inside a list of records.
pub const RECORD_NAME_FIELD: &str = "name";

/// Flat property bag produced by flattening a snapshot.
pub type FlattenedMetrics = BTreeMap<String, String>;

/// One record inside a list of records.
pub type MetricRecord = BTreeMap<String, MetricScalar>;

/// A single stringifiable metric value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetricScalar {
    /// Missing value. Fatal when flattened, except inside a text list.
    Null,
    /// Boolean flag.
    Bool(bool),
    /// Integer or floating point number.
    Number(Number),
    /// Free text.
    Text(Box<str>),
}

impl MetricScalar {
    /// Build a text scalar.
    pub fn text(value: impl Into<Box<str>>) -> Self {
        Self::Text(value.into())
    }

    /// Returns true for [`MetricScalar::Null`].
    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Borrow the text payload, if any.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(value) => Some(value),
            _ => None,
        }
    }

    fn from_json(value: Value) -> Self {
        match value {
            Value::Null => Self::Null,
            Value::Bool(flag) => Self::Bool(flag),
            Value::Number(number) => Self::Number(number),
            Value::String(text) => Self::Text(text.into_boxed_str()),
            nested @ (Value::Array(_) | Value::Object(_)) => Self::Text(nested.to_string().into()),
        }
    }
}

impl fmt::Display for MetricScalar {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => formatter.write_str("null"),
            Self::Bool(flag) => write!(formatter, "{flag}"),
            Self::Number(number) => write!(formatter, "{number}"),
            Self::Text(text) => formatter.write_str(text),
        }
    }
}

impl From<&str> for MetricScalar {
    fn from(value: &str) -> Self {
        Self::Text(value.into())
    }
}

impl From<String> for MetricScalar {
    fn from(value: String) -> Self {
        Self::Text(value.into_boxed_str())
    }
}

impl From<bool> for MetricScalar {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for MetricScalar {
    fn from(value: i64) -> Self {
        Self::Number(value.into())
    }
}

impl From<u64> for MetricScalar {
    fn from(value: u64) -> Self {
        Self::Number(value.into())
    }
}

impl From<f64> for MetricScalar {
    fn from(value: f64) -> Self {
        Number::from_f64(value).map_or_else(|| Self::Text(value.to_string().into()), Self::Number)
    }
}

/// Second level of a two-level mapping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetricGroup {
    /// Inner mapping of field name to scalar.
    Fields(BTreeMap<String, MetricScalar>),
    /// Non-mapping entry. Kept for fidelity, never emitted.
    Value(MetricScalar),
}

/// Value of one snapshot entry.
///
/// Serializes back to the plain JSON shape it was read from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum MetricValue {
    /// Single scalar.
    Scalar(MetricScalar),
    /// Ordered list of scalars.
    List(Vec<MetricScalar>),
    /// Ordered list of records (sub-metrics).
    Records(Vec<MetricRecord>),
    /// Two-level mapping: group name to inner mapping.
    Groups(BTreeMap<String, MetricGroup>),
}

impl MetricValue {
    /// Classify a JSON value into a metric shape.
    ///
    /// Lists whose first element is an object must contain only objects.
    /// Values nested deeper than the shape allows are kept as compact JSON text.
    pub fn from_json(metric: &str, value: Value) -> Result<Self, MetricShapeError> {
        match value {
            Value::Array(items) => {
                if matches!(items.first(), Some(Value::Object(_))) {
                    records_from_json(metric, items).map(Self::Records)
                } else {
                    Ok(Self::List(
                        items.into_iter().map(MetricScalar::from_json).collect(),
                    ))
                }
            },
            Value::Object(groups) => Ok(Self::Groups(
                groups
                    .into_iter()
                    .map(|(name, group)| (name, group_from_json(group)))
                    .collect(),
            )),
            scalar => Ok(Self::Scalar(MetricScalar::from_json(scalar))),
        }
    }
}

impl From<MetricScalar> for MetricValue {
    fn from(value: MetricScalar) -> Self {
        Self::Scalar(value)
    }
}

fn records_from_json(metric: &str, items: Vec<Value>) -> Result<Vec<MetricRecord>, MetricShapeError> {
    items
        .into_iter()
        .enumerate()
        .map(|(index, item)| match item {
            Value::Object(fields) => Ok(fields
                .into_iter()
                .map(|(field, value)| (field, MetricScalar::from_json(value)))
                .collect()),
            _ => Err(MetricShapeError::MixedRecords {
                metric: metric.to_string(),
                index,
            }),
        })
        .collect()
}

fn group_from_json(value: Value) -> MetricGroup {
    match value {
        Value::Object(fields) => MetricGroup::Fields(
            fields
                .into_iter()
                .map(|(field, value)| (field, MetricScalar::from_json(value)))
                .collect(),
        ),
        other => MetricGroup::Value(MetricScalar::from_json(other)),
    }
}

/// One reporting cycle's full set of named metric values.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    entries: BTreeMap<String, MetricValue>,
}

impl MetricsSnapshot {
    /// Create an empty snapshot.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a metric.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<MetricValue>) {
        self.entries.insert(name.into(), value.into());
    }

    /// Builder-style insert.
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: impl Into<MetricValue>) -> Self {
        self.insert(name, value);
        self
    }

    /// Look up a metric by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&MetricValue> {
        self.entries.get(name)
    }

    /// Iterate metrics in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &MetricValue)> {
        self.entries.iter()
    }

    /// Number of metrics.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true when the snapshot has no metrics.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Build a snapshot from a JSON object such as a profiler's serialized output.
    pub fn from_json(value: Value) -> Result<Self, MetricShapeError> {
        let Value::Object(entries) = value else {
            return Err(MetricShapeError::NotAnObject);
        };
        let mut snapshot = Self::new();
        for (name, value) in entries {
            let metric = MetricValue::from_json(&name, value)?;
            snapshot.entries.insert(name, metric);
        }
        Ok(snapshot)
    }

    /// Parse a snapshot from JSON text.
    pub fn from_json_str(input: &str) -> Result<Self, MetricShapeError> {
        let value: Value =
            serde_json::from_str(input).map_err(|error| MetricShapeError::InvalidJson {
                message: error.to_string(),
            })?;
        Self::from_json(value)
    }
}

impl<K: Into<String>, V: Into<MetricValue>> FromIterator<(K, V)> for MetricsSnapshot {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut snapshot = Self::new();
        for (name, value) in iter {
            snapshot.insert(name, value);
        }
        snapshot
    }
}

/// Failures while classifying loosely-typed input into metric shapes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MetricShapeError {
    /// Snapshot input was not a JSON object.
    NotAnObject,
    /// Snapshot input was not valid JSON.
    InvalidJson {
        /// Parser message.
        message: String,
    },
    /// A list of records contained a non-record element.
    MixedRecords {
        /// Metric name.
        metric: String,
        /// Zero-based index of the offending element.
        index: usize,
    },
}

impl MetricShapeError {
    fn error_code(&self) -> ErrorCode {
        match self {
            Self::NotAnObject | Self::InvalidJson { .. } => {
                ErrorCode::new("domain", "invalid_snapshot")
            },
            Self::MixedRecords { .. } => ErrorCode::new("domain", "mixed_metric_records"),
        }
    }
}

impl fmt::Display for MetricShapeError {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotAnObject => formatter.write_str("metrics snapshot must be an object"),
            Self::InvalidJson { message } => {
                write!(formatter, "metrics snapshot is not valid JSON: {message}")
            },
            Self::MixedRecords { metric, index } => write!(
                formatter,
                "metric {metric} mixes records with other values at index {index}"
            ),
        }
    }
}

impl std::error::Error for MetricShapeError {}

impl From<MetricShapeError> for ErrorEnvelope {
    fn from(error: MetricShapeError) -> Self {
        let envelope = Self::expected(error.error_code(), error.to_string());
        match error {
            MetricShapeError::MixedRecords { metric, index } => envelope
                .with_metadata("metric", metric)
                .with_metadata("index", index.to_string()),
            MetricShapeError::NotAnObject | MetricShapeError::InvalidJson { .. } => envelope,
        }
    }
}
