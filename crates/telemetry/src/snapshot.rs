// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Wire encoding for registry snapshots.
//!
//! A snapshot is a JSON array with one object per tracked metric:
//!
//! ```text
//! [{"type":"double_gauge","name":"latency","description":"","value":2.71,
//!   "timestamp":1700000000000,"changes_since_flush":2,
//!   "history":[{"value":0.0,"timestamp":...},{"value":3.15,"timestamp":...}]}]
//! ```
//!
//! The `type` tag lets the receiving side rebuild the concrete variant.

use crate::errors::SnapshotError;
use crate::metric::{coerce_value, Metric, MetricRecord, MetricType, MetricValue, Mutability};
use crate::tracked::TrackedMetric;
use fnv::FnvBuildHasher;
use hashbrown::HashSet;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize)]
struct WireMetric {
    #[serde(rename = "type")]
    metric_type: MetricType,
    name: String,
    #[serde(default)]
    description: String,
    value: MetricValue,
    timestamp: i64,
    changes_since_flush: u64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    history: Vec<MetricRecord>,
}

impl From<&TrackedMetric> for WireMetric {
    fn from(tracked: &TrackedMetric) -> Self {
        let current = tracked.current();
        WireMetric {
            metric_type: current.metric_type(),
            name: current.name().to_string(),
            description: current.description().to_string(),
            value: current.value(),
            timestamp: current.timestamp(),
            changes_since_flush: tracked.changes_since_flush(),
            history: tracked.history().to_vec(),
        }
    }
}

impl TryFrom<WireMetric> for TrackedMetric {
    type Error = SnapshotError;

    fn try_from(wire: WireMetric) -> Result<Self, Self::Error> {
        if !wire.history.is_empty() {
            if wire.metric_type.mutability() == Mutability::MutableInPlace {
                return Err(SnapshotError::Invalid(format!(
                    "metric `{}` of type {} cannot carry history",
                    wire.name, wire.metric_type
                )));
            }
            if wire.changes_since_flush == 0 {
                return Err(SnapshotError::Invalid(format!(
                    "metric `{}` carries history without any change",
                    wire.name
                )));
            }
        }

        let mut history = Vec::with_capacity(wire.history.len());
        for record in wire.history {
            let value = coerce_value(wire.metric_type, record.value.clone()).ok_or_else(|| {
                SnapshotError::Invalid(format!(
                    "metric `{}` of type {} has history value {:?}",
                    wire.name, wire.metric_type, record.value
                ))
            })?;
            history.push(MetricRecord {
                value,
                timestamp: record.timestamp,
            });
        }

        let current = Metric::from_parts(
            wire.metric_type,
            &wire.name,
            wire.description,
            wire.value,
            wire.timestamp,
        )
        .map_err(|e| SnapshotError::Invalid(e.to_string()))?;

        Ok(TrackedMetric::from_parts(
            current,
            wire.changes_since_flush,
            history,
        ))
    }
}

/// Encodes tracked metrics into a snapshot payload.
pub fn encode<'a, I>(entries: I) -> Result<Vec<u8>, SnapshotError>
where
    I: IntoIterator<Item = &'a TrackedMetric>,
{
    let wire: Vec<WireMetric> = entries.into_iter().map(WireMetric::from).collect();
    serde_json::to_vec(&wire).map_err(SnapshotError::Encode)
}

/// Decodes a snapshot payload, validating every entry.
pub fn decode(payload: &[u8]) -> Result<Vec<TrackedMetric>, SnapshotError> {
    let wire: Vec<WireMetric> = serde_json::from_slice(payload).map_err(SnapshotError::Decode)?;

    let mut seen = HashSet::with_capacity_and_hasher(wire.len(), FnvBuildHasher::default());
    let mut entries = Vec::with_capacity(wire.len());
    for metric in wire {
        if !seen.insert(metric.name.clone()) {
            return Err(SnapshotError::Invalid(format!(
                "metric `{}` appears more than once",
                metric.name
            )));
        }
        entries.push(TrackedMetric::try_from(metric)?);
    }
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metric::{Counter, DoubleGauge, StateMetric};
    use crate::tracked::MetricUpdate;

    #[test]
    fn test_encode_tags_each_variant() {
        let mut counter = TrackedMetric::new(Counter::new("requests", "served").into());
        counter.apply_update(MetricUpdate::Increment(2)).unwrap();
        let state = TrackedMetric::new(StateMetric::new("phase", "").into());

        let payload = encode([&counter, &state]).unwrap();
        let json: serde_json::Value = serde_json::from_slice(&payload).unwrap();

        assert_eq!(json[0]["type"], "counter");
        assert_eq!(json[0]["name"], "requests");
        assert_eq!(json[0]["description"], "served");
        assert_eq!(json[0]["value"], 2);
        assert_eq!(json[0]["changes_since_flush"], 1);
        assert!(json[0].get("history").is_none());
        assert_eq!(json[1]["type"], "state");
        assert_eq!(json[1]["value"], "");
    }

    #[test]
    fn test_history_survives_decoding() {
        let mut gauge = TrackedMetric::new(DoubleGauge::new("latency", "").into());
        gauge
            .apply_update(MetricUpdate::Value(MetricValue::Double(3.15)))
            .unwrap();
        gauge
            .apply_update(MetricUpdate::Value(MetricValue::Double(2.71)))
            .unwrap();

        let decoded = decode(&encode([&gauge]).unwrap()).unwrap();
        assert_eq!(decoded, vec![gauge]);
    }

    #[test]
    fn test_non_finite_doubles_survive_decoding() {
        let mut gauge = TrackedMetric::new(DoubleGauge::new("ratio", "").into());
        for value in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
            gauge
                .apply_update(MetricUpdate::Value(MetricValue::Double(value)))
                .unwrap();
        }
        let mut counter = TrackedMetric::new(Counter::new("requests", "").into());
        counter.apply_update(MetricUpdate::Increment(7)).unwrap();

        let payload = encode([&counter, &gauge]).unwrap();
        let json: serde_json::Value = serde_json::from_slice(&payload).unwrap();
        assert_eq!(json[1]["value"], "-inf");
        assert_eq!(json[1]["history"][1]["value"], "NaN");

        let decoded = decode(&payload).unwrap();
        assert_eq!(decoded[0], counter);
        let ratio = &decoded[1];
        assert_eq!(ratio.current().value(), MetricValue::Double(f64::NEG_INFINITY));
        assert_eq!(ratio.changes_since_flush(), 3);
        let history: Vec<_> = ratio.history().iter().map(|r| r.value.clone()).collect();
        assert_eq!(history[0], MetricValue::Double(0.0));
        assert!(matches!(history[1], MetricValue::Double(v) if v.is_nan()));
        assert_eq!(history[2], MetricValue::Double(f64::INFINITY));
    }

    #[test]
    fn test_decode_rejects_malformed_json() {
        assert!(matches!(decode(b""), Err(SnapshotError::Decode(_))));
        assert!(matches!(decode(b"{}"), Err(SnapshotError::Decode(_))));
        assert!(matches!(
            decode(br#"[{"type":"histogram","name":"x","value":1,"timestamp":0,"changes_since_flush":1}]"#),
            Err(SnapshotError::Decode(_))
        ));
    }

    #[test]
    fn test_decode_rejects_value_of_wrong_type() {
        let payload = br#"[{"type":"counter","name":"x","value":"ten","timestamp":0,"changes_since_flush":1}]"#;
        assert!(matches!(decode(payload), Err(SnapshotError::Invalid(_))));
    }

    #[test]
    fn test_decode_rejects_history_on_counter() {
        let payload = br#"[{"type":"counter","name":"x","value":1,"timestamp":0,"changes_since_flush":1,
            "history":[{"value":0,"timestamp":0}]}]"#;
        assert!(matches!(decode(payload), Err(SnapshotError::Invalid(_))));
    }

    #[test]
    fn test_decode_rejects_history_without_changes() {
        let payload = br#"[{"type":"integer_gauge","name":"x","value":1,"timestamp":0,"changes_since_flush":0,
            "history":[{"value":0,"timestamp":0}]}]"#;
        assert!(matches!(decode(payload), Err(SnapshotError::Invalid(_))));
    }

    #[test]
    fn test_decode_rejects_mistyped_history() {
        let payload = br#"[{"type":"integer_gauge","name":"x","value":1,"timestamp":0,"changes_since_flush":1,
            "history":[{"value":"zero","timestamp":0}]}]"#;
        assert!(matches!(decode(payload), Err(SnapshotError::Invalid(_))));
    }

    #[test]
    fn test_decode_rejects_duplicate_names() {
        let payload = br#"[
            {"type":"counter","name":"x","value":1,"timestamp":0,"changes_since_flush":1},
            {"type":"counter","name":"x","value":2,"timestamp":0,"changes_since_flush":1}]"#;
        assert!(matches!(decode(payload), Err(SnapshotError::Invalid(_))));
    }

    #[test]
    fn test_decode_accepts_missing_description() {
        let payload =
            br#"[{"type":"double_gauge","name":"x","value":4,"timestamp":7,"changes_since_flush":1}]"#;
        let decoded = decode(payload).unwrap();
        assert_eq!(decoded[0].current().value(), MetricValue::Double(4.0));
        assert_eq!(decoded[0].current().description(), "");
        assert_eq!(decoded[0].current().timestamp(), 7);
    }
}
