// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Change accounting around a single metric.

use crate::errors::RegistryError;
use crate::metric::{Metric, MetricRecord, MetricValue, Mutability};
use ustr::Ustr;

/// The ways a registered metric can be updated.
#[derive(Debug, Clone, PartialEq)]
pub enum MetricUpdate {
    /// Store a new untyped value, type checked against the metric.
    Value(MetricValue),
    /// Replace the metric with another instance of the same variant.
    Replace(Metric),
    /// Add a (possibly negative) delta to a counter.
    Increment(i64),
    /// Subtract a delta from a counter.
    Decrement(i64),
}

/// A metric plus the changes it accumulated since the last flush.
///
/// Only immutable-per-update variants keep a history; for them every value
/// that gets overwritten is recorded so that sinks see each observation.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackedMetric {
    current: Metric,
    changes_since_flush: u64,
    history: Vec<MetricRecord>,
}

impl TrackedMetric {
    pub fn new(metric: Metric) -> Self {
        Self {
            current: metric,
            changes_since_flush: 0,
            history: Vec::new(),
        }
    }

    /// Builds an entry from already validated parts.
    pub(crate) fn from_parts(
        current: Metric,
        changes_since_flush: u64,
        history: Vec<MetricRecord>,
    ) -> Self {
        Self {
            current,
            changes_since_flush,
            history,
        }
    }

    pub fn name(&self) -> Ustr {
        self.current.name()
    }

    pub fn current(&self) -> &Metric {
        &self.current
    }

    pub fn changes_since_flush(&self) -> u64 {
        self.changes_since_flush
    }

    pub fn history(&self) -> &[MetricRecord] {
        &self.history
    }

    fn keeps_history(&self) -> bool {
        self.current.mutability() == Mutability::ImmutablePerUpdate
    }

    pub fn apply_update(&mut self, update: MetricUpdate) -> Result<(), RegistryError> {
        // Taken before the update so the overwritten value lands in history
        let previous = self.current.record();

        match update {
            MetricUpdate::Value(value) => self.current.assign_value(value)?,
            MetricUpdate::Replace(metric) => {
                self.check_compatible(&metric)?;
                self.current = metric;
            }
            MetricUpdate::Increment(delta) => self.current.increment(delta)?,
            MetricUpdate::Decrement(delta) => self.current.decrement(delta)?,
        }

        if self.keeps_history() {
            self.history.push(previous);
        }
        self.changes_since_flush = self.changes_since_flush.saturating_add(1);
        Ok(())
    }

    /// Folds a remotely produced entry into this one.
    ///
    /// Not idempotent: merging the same entry twice counts its changes and
    /// appends its history twice.
    pub fn merge_from(&mut self, other: TrackedMetric) -> Result<(), RegistryError> {
        self.check_compatible(&other.current)?;

        if other.changes_since_flush > 0 && self.keeps_history() {
            self.history.extend(other.history);
        }
        self.current = other.current;
        self.changes_since_flush = self
            .changes_since_flush
            .saturating_add(other.changes_since_flush);
        Ok(())
    }

    pub fn reset(&mut self) {
        self.changes_since_flush = 0;
        self.history.clear();
    }

    /// One pair per retained observation plus one for the current value.
    pub fn to_key_value_pairs(&self) -> Vec<(String, String)> {
        let name = self.current.name().to_string();
        let mut pairs = Vec::with_capacity(self.history.len() + 1);
        for record in &self.history {
            pairs.push((name.clone(), record.value.to_string()));
        }
        pairs.push((name, self.current.value().to_string()));
        pairs
    }

    fn check_compatible(&self, other: &Metric) -> Result<(), RegistryError> {
        if other.name() != self.current.name() {
            return Err(RegistryError::NameMismatch {
                expected: self.current.name().to_string(),
                actual: other.name().to_string(),
            });
        }
        if other.metric_type() != self.current.metric_type() {
            return Err(RegistryError::TypeMismatch {
                name: self.current.name().to_string(),
                expected: self.current.metric_type(),
                actual: other.metric_type(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metric::{Counter, DoubleGauge, IntegerGauge, MetricType, StateMetric};

    fn tracked_gauge(updates: &[f64]) -> TrackedMetric {
        let mut tracked = TrackedMetric::new(DoubleGauge::new("latency", "").into());
        for value in updates {
            tracked
                .apply_update(MetricUpdate::Value(MetricValue::Double(*value)))
                .unwrap();
        }
        tracked
    }

    #[test]
    fn test_counter_updates_keep_no_history() {
        let mut tracked = TrackedMetric::new(Counter::new("requests", "").into());
        tracked.apply_update(MetricUpdate::Increment(3)).unwrap();
        tracked.apply_update(MetricUpdate::Increment(1)).unwrap();
        tracked.apply_update(MetricUpdate::Increment(-2)).unwrap();

        assert_eq!(tracked.current().value(), MetricValue::Integer(2));
        assert_eq!(tracked.changes_since_flush(), 3);
        assert!(tracked.history().is_empty());
    }

    #[test]
    fn test_gauge_updates_record_previous_values() {
        let tracked = tracked_gauge(&[3.15, 2.71]);

        assert_eq!(tracked.changes_since_flush(), 2);
        let values: Vec<_> = tracked.history().iter().map(|r| r.value.clone()).collect();
        assert_eq!(
            values,
            vec![MetricValue::Double(0.0), MetricValue::Double(3.15)]
        );
        assert_eq!(tracked.current().value(), MetricValue::Double(2.71));
    }

    #[test]
    fn test_replace_records_history_for_immutable_variants() {
        let mut tracked = TrackedMetric::new(IntegerGauge::with_initial("queue", "", 5).into());
        let replacement = IntegerGauge::with_initial("queue", "", 8);
        tracked
            .apply_update(MetricUpdate::Replace(replacement.into()))
            .unwrap();

        assert_eq!(tracked.history().len(), 1);
        assert_eq!(tracked.history()[0].value, MetricValue::Integer(5));
        assert_eq!(tracked.current().value(), MetricValue::Integer(8));
    }

    #[test]
    fn test_state_metric_is_mutable_in_place() {
        let mut tracked = TrackedMetric::new(StateMetric::new("phase", "").into());
        tracked
            .apply_update(MetricUpdate::Value(MetricValue::from("init")))
            .unwrap();
        tracked
            .apply_update(MetricUpdate::Value(MetricValue::from("running")))
            .unwrap();

        assert!(tracked.history().is_empty());
        assert_eq!(tracked.changes_since_flush(), 2);
        assert_eq!(
            tracked.to_key_value_pairs(),
            vec![("phase".to_string(), "running".to_string())]
        );
    }

    #[test]
    fn test_failed_update_changes_nothing() {
        let mut tracked = tracked_gauge(&[1.0]);
        let before = tracked.clone();

        assert!(tracked
            .apply_update(MetricUpdate::Value(MetricValue::from("oops")))
            .is_err());
        assert!(tracked.apply_update(MetricUpdate::Increment(1)).is_err());
        let err = tracked
            .apply_update(MetricUpdate::Replace(Counter::new("latency", "").into()))
            .unwrap_err();
        assert!(matches!(err, RegistryError::TypeMismatch { .. }));
        let err = tracked
            .apply_update(MetricUpdate::Replace(DoubleGauge::new("other", "").into()))
            .unwrap_err();
        assert!(matches!(err, RegistryError::NameMismatch { .. }));

        assert_eq!(tracked, before);
    }

    #[test]
    fn test_merge_appends_remote_history_and_adds_changes() {
        let mut resident = tracked_gauge(&[1.0]);
        let remote = tracked_gauge(&[3.15, 2.71]);

        resident.merge_from(remote).unwrap();

        assert_eq!(resident.changes_since_flush(), 3);
        let values: Vec<_> = resident.history().iter().map(|r| r.value.clone()).collect();
        assert_eq!(
            values,
            vec![
                MetricValue::Double(0.0),
                MetricValue::Double(0.0),
                MetricValue::Double(3.15)
            ]
        );
        assert_eq!(resident.current().value(), MetricValue::Double(2.71));
    }

    #[test]
    fn test_merge_is_not_idempotent() {
        let remote = tracked_gauge(&[3.15, 2.71]);
        let mut resident = remote.clone();
        resident.merge_from(remote).unwrap();

        assert_eq!(resident.changes_since_flush(), 4);
        assert_eq!(resident.history().len(), 4);
    }

    #[test]
    fn test_merge_counter_replaces_current() {
        let mut resident = TrackedMetric::new(Counter::new("requests", "").into());
        resident.apply_update(MetricUpdate::Increment(10)).unwrap();

        let mut remote = TrackedMetric::new(Counter::new("requests", "").into());
        remote.apply_update(MetricUpdate::Increment(4)).unwrap();
        remote.apply_update(MetricUpdate::Increment(4)).unwrap();

        resident.merge_from(remote).unwrap();
        assert_eq!(resident.current().value(), MetricValue::Integer(8));
        assert_eq!(resident.changes_since_flush(), 3);
        assert!(resident.history().is_empty());
    }

    #[test]
    fn test_merge_without_changes_skips_history() {
        let mut resident = tracked_gauge(&[]);
        let remote = TrackedMetric::from_parts(
            DoubleGauge::with_initial("latency", "", 9.5).into(),
            0,
            Vec::new(),
        );
        resident.merge_from(remote).unwrap();

        assert_eq!(resident.changes_since_flush(), 0);
        assert!(resident.history().is_empty());
        assert_eq!(resident.current().value(), MetricValue::Double(9.5));
    }

    #[test]
    fn test_merge_type_mismatch() {
        let mut resident = TrackedMetric::new(Counter::new("x", "").into());
        let remote = TrackedMetric::new(IntegerGauge::new("x", "").into());
        let before = resident.clone();

        let err = resident.merge_from(remote).unwrap_err();
        assert_eq!(
            err,
            RegistryError::TypeMismatch {
                name: "x".to_string(),
                expected: MetricType::Counter,
                actual: MetricType::IntegerGauge,
            }
        );
        assert_eq!(resident, before);
    }

    #[test]
    fn test_reset_keeps_current() {
        let mut tracked = tracked_gauge(&[3.15, 2.71]);
        tracked.reset();

        assert_eq!(tracked.changes_since_flush(), 0);
        assert!(tracked.history().is_empty());
        assert_eq!(tracked.current().value(), MetricValue::Double(2.71));
    }

    #[test]
    fn test_key_value_pairs_for_immutable_metric() {
        let tracked = tracked_gauge(&[3.15, 2.71]);
        assert_eq!(
            tracked.to_key_value_pairs(),
            vec![
                ("latency".to_string(), "0".to_string()),
                ("latency".to_string(), "3.15".to_string()),
                ("latency".to_string(), "2.71".to_string()),
            ]
        );
    }
}
