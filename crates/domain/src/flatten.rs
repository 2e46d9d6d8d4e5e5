//! Snapshot flattening into a single-level property bag.
//!
//! Key synthesis per metric shape:
//!
//! | shape            | emitted key(s)                                   |
//! |------------------|--------------------------------------------------|
//! | scalar           | `metric`                                         |
//! | list of text     | `metric` (values joined with `,`, null as `null`) |
//! | named record     | `metric-<name without whitespace>-<field>`       |
//! | unnamed record   | `metric-<field>-<position>` (position from 1)    |
//! | two-level groups | `metric-<group>-<field>-1`                       |
//!
//! Lists whose first element is not text emit nothing.
//! Keys that collide are overwritten by the later write.

use crate::metrics::{
    FlattenedMetrics, MetricGroup, MetricRecord, MetricScalar, MetricValue, MetricsSnapshot,
    RECORD_NAME_FIELD,
};
use profiler_reporter_shared::{ErrorCode, ErrorEnvelope};
use std::collections::BTreeMap;
use std::fmt;

/// Separator used when joining a list of scalars.
pub const LIST_SEPARATOR: &str = ",";

/// Suffix appended to every two-level key. Existing dashboards query these
/// keys verbatim, so the suffix never advances.
pub const GROUP_FIELD_SUFFIX: u32 = 1;

/// Failures while flattening a snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlattenError {
    /// A null value cannot be stringified.
    NullValue {
        /// Snapshot entry that contained the null.
        metric: String,
        /// Flat key that would have been emitted.
        key: String,
    },
}

impl FlattenError {
    fn error_code(&self) -> ErrorCode {
        match self {
            Self::NullValue { .. } => ErrorCode::new("domain", "null_metric_value"),
        }
    }
}

impl fmt::Display for FlattenError {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NullValue { metric, key } => {
                write!(formatter, "metric {metric} has a null value at {key}")
            },
        }
    }
}

impl std::error::Error for FlattenError {}

impl From<FlattenError> for ErrorEnvelope {
    fn from(error: FlattenError) -> Self {
        let envelope = Self::expected(error.error_code(), error.to_string());
        match error {
            FlattenError::NullValue { metric, key } => envelope
                .with_metadata("metric", metric)
                .with_metadata("property", key),
        }
    }
}

/// Flatten a snapshot into string properties.
///
/// The first null scalar, record field or group field aborts the whole snapshot;
/// no partial result is returned. Nulls inside a text list render as `null`.
pub fn flatten_metrics(snapshot: &MetricsSnapshot) -> Result<FlattenedMetrics, FlattenError> {
    let mut flattened = FlattenedMetrics::new();
    for (metric, value) in snapshot.iter() {
        match value {
            MetricValue::Scalar(scalar) => {
                let rendered = render(metric, metric, scalar)?;
                flattened.insert(metric.clone(), rendered);
            },
            MetricValue::List(items) => flatten_list(metric, items, &mut flattened),
            MetricValue::Records(records) => flatten_records(metric, records, &mut flattened)?,
            MetricValue::Groups(groups) => flatten_groups(metric, groups, &mut flattened)?,
        }
    }
    Ok(flattened)
}

fn flatten_list(metric: &str, items: &[MetricScalar], flattened: &mut FlattenedMetrics) {
    // Only text lists are joined; the first element decides.
    if !matches!(items.first(), Some(MetricScalar::Text(_))) {
        return;
    }
    let joined = items
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(LIST_SEPARATOR);
    flattened.insert(metric.to_string(), joined);
}

fn flatten_records(
    metric: &str,
    records: &[MetricRecord],
    flattened: &mut FlattenedMetrics,
) -> Result<(), FlattenError> {
    let mut position: usize = 1;
    for record in records {
        let label = record_label(record);
        for (field, value) in record {
            let key = match label.as_deref() {
                Some(_) if field == RECORD_NAME_FIELD => continue,
                Some(label) => format!("{metric}-{label}-{field}"),
                None => format!("{metric}-{field}-{position}"),
            };
            let rendered = render(metric, &key, value)?;
            flattened.insert(key, rendered);
        }
        // Advances for named records too, so positions match the list index.
        position += 1;
    }
    Ok(())
}

fn record_label(record: &MetricRecord) -> Option<String> {
    let name = record.get(RECORD_NAME_FIELD)?.as_text()?;
    let label: String = name.chars().filter(|ch| !ch.is_whitespace()).collect();
    if label.is_empty() { None } else { Some(label) }
}

fn flatten_groups(
    metric: &str,
    groups: &BTreeMap<String, MetricGroup>,
    flattened: &mut FlattenedMetrics,
) -> Result<(), FlattenError> {
    for (group, entry) in groups {
        let MetricGroup::Fields(fields) = entry else {
            continue;
        };
        for (field, value) in fields {
            let key = format!("{metric}-{group}-{field}-{GROUP_FIELD_SUFFIX}");
            let rendered = render(metric, &key, value)?;
            flattened.insert(key, rendered);
        }
    }
    Ok(())
}

fn render(metric: &str, key: &str, value: &MetricScalar) -> Result<String, FlattenError> {
    if value.is_null() {
        return Err(FlattenError::NullValue {
            metric: metric.to_string(),
            key: key.to_string(),
        });
    }
    Ok(value.to_string())
}
