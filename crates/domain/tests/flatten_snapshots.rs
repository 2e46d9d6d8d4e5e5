//! Integration coverage for snapshot parsing and flattening.

use profiler_reporter_domain::{MetricShapeError, MetricsSnapshot, flatten_metrics};
use profiler_reporter_shared::ErrorEnvelope;

type TestResult = Result<(), Box<dyn std::error::Error>>;

const AGENT_SNAPSHOT: &str = r#"{
    "uptime": 3600,
    "healthy": true,
    "hosts": ["a", "b", "c"],
    "zones": ["eu-west", null],
    "ports": [8080, 8443],
    "disks": [
        {"name": "disk 1", "used": 10},
        {"name": "disk 2", "used": 20}
    ],
    "threads": [{"count": 4}, {"count": 7}],
    "pools": {"eden": {"used": 5, "max": 9}, "label": "ignored"},
    "metrics": {"jvm": {"heap": {"used": 5}}}
}"#;

#[test]
fn agent_snapshot_flattens_into_string_properties() -> TestResult {
    let snapshot = MetricsSnapshot::from_json_str(AGENT_SNAPSHOT)?;
    let flattened = flatten_metrics(&snapshot)?;

    let expected = [
        ("uptime", "3600"),
        ("healthy", "true"),
        ("hosts", "a,b,c"),
        ("zones", "eu-west,null"),
        ("disks-disk1-used", "10"),
        ("disks-disk2-used", "20"),
        ("threads-count-1", "4"),
        ("threads-count-2", "7"),
        ("pools-eden-used-1", "5"),
        ("pools-eden-max-1", "9"),
        ("metrics-jvm-heap-1", r#"{"used":5}"#),
    ];
    for (key, value) in expected {
        assert_eq!(flattened.get(key).map(String::as_str), Some(value), "{key}");
    }
    assert_eq!(flattened.len(), expected.len());
    assert!(!flattened.keys().any(|key| key.starts_with("pools-label")));
    assert!(!flattened.contains_key("ports"));
    Ok(())
}

#[test]
fn null_metric_fails_the_whole_snapshot() -> TestResult {
    let snapshot = MetricsSnapshot::from_json_str(r#"{"ok": 1, "broken": null}"#)?;

    let Err(error) = flatten_metrics(&snapshot) else {
        return Err("null metric must not flatten".into());
    };
    let envelope: ErrorEnvelope = error.into();
    assert!(envelope.has_code("domain", "null_metric_value"));
    assert_eq!(envelope.metadata.get("metric"), Some(&"broken".to_string()));
    Ok(())
}

#[test]
fn malformed_snapshots_map_into_error_envelopes() -> TestResult {
    let Err(error) = MetricsSnapshot::from_json_str("[1, 2]") else {
        return Err("arrays are not snapshots".into());
    };
    assert_eq!(error, MetricShapeError::NotAnObject);
    let envelope: ErrorEnvelope = error.into();
    assert_eq!(envelope.code.code(), "invalid_snapshot");

    let Err(error) = MetricsSnapshot::from_json_str(r#"{"disks": [{"used": 1}, 2]}"#) else {
        return Err("mixed records must be rejected".into());
    };
    let envelope: ErrorEnvelope = error.into();
    assert_eq!(envelope.code.code(), "mixed_metric_records");
    assert_eq!(envelope.metadata.get("index"), Some(&"1".to_string()));
    Ok(())
}
