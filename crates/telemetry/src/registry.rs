// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Process-wide collection of tracked metrics.
//!
//! Every operation takes the single registry lock for its whole duration and
//! never performs I/O while holding it.

use crate::errors::{RegistryError, SnapshotError};
use crate::metric::{Metric, MetricValue};
use crate::snapshot;
use crate::tracked::{MetricUpdate, TrackedMetric};
use fnv::FnvBuildHasher;
use hashbrown::HashMap;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, trace, warn};
use ustr::Ustr;

#[derive(Debug)]
struct Entries {
    map: HashMap<Ustr, TrackedMetric, FnvBuildHasher>,
    // Registration order, used for stable iteration
    order: Vec<Ustr>,
}

impl Entries {
    fn new() -> Self {
        Self {
            map: HashMap::with_hasher(FnvBuildHasher::default()),
            order: Vec::new(),
        }
    }

    fn insert(&mut self, tracked: TrackedMetric) {
        let name = tracked.name();
        self.order.push(name);
        self.map.insert(name, tracked);
    }

    fn iter(&self) -> impl Iterator<Item = &TrackedMetric> {
        self.order.iter().filter_map(|name| self.map.get(name))
    }

    fn get_mut(&mut self, name: &str) -> Option<&mut TrackedMetric> {
        // Names that were never interned cannot be registered
        let key = Ustr::from_existing(name)?;
        self.map.get_mut(&key)
    }

    fn key_value_pairs(&self) -> Vec<(String, String)> {
        self.iter()
            .flat_map(TrackedMetric::to_key_value_pairs)
            .collect()
    }

    fn reset_all(&mut self) {
        for tracked in self.map.values_mut() {
            tracked.reset();
        }
    }
}

/// Name-keyed, internally synchronized set of [`TrackedMetric`] entries.
#[derive(Debug)]
pub struct MetricRegistry {
    entries: Mutex<Entries>,
}

impl Default for MetricRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricRegistry {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(Entries::new()),
        }
    }

    fn from_entries(tracked: Vec<TrackedMetric>) -> Self {
        let mut entries = Entries::new();
        for entry in tracked {
            entries.insert(entry);
        }
        Self {
            entries: Mutex::new(entries),
        }
    }

    #[allow(clippy::expect_used)]
    fn lock(&self) -> MutexGuard<'_, Entries> {
        self.entries.lock().expect("lock poisoned")
    }

    /// Registers `metric` under its name.
    ///
    /// Returns false, leaving the existing entry untouched, if the name is
    /// already taken.
    pub fn register(&self, metric: impl Into<Metric>) -> bool {
        let metric = metric.into();
        let mut entries = self.lock();
        if entries.map.contains_key(&metric.name()) {
            warn!("The metric [{}] already exists.", metric.name());
            return false;
        }
        debug!(
            "Registered {} metric [{}]",
            metric.metric_type(),
            metric.name()
        );
        entries.insert(TrackedMetric::new(metric));
        true
    }

    pub fn get(&self, name: &str) -> Option<Metric> {
        let key = Ustr::from_existing(name)?;
        self.lock().map.get(&key).map(|t| t.current().clone())
    }

    /// Returns a copy of the tracked entry, including its history.
    pub fn tracked(&self, name: &str) -> Option<TrackedMetric> {
        let key = Ustr::from_existing(name)?;
        self.lock().map.get(&key).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        Ustr::from_existing(name).is_some_and(|key| self.lock().map.contains_key(&key))
    }

    pub fn len(&self) -> usize {
        self.lock().map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Metric names in registration order.
    pub fn names(&self) -> Vec<Ustr> {
        self.lock().order.clone()
    }

    /// Copies of every entry in registration order.
    pub fn entries(&self) -> Vec<TrackedMetric> {
        self.lock().iter().cloned().collect()
    }

    fn apply(&self, name: &str, update: MetricUpdate) -> Result<(), RegistryError> {
        let mut entries = self.lock();
        let tracked = entries
            .get_mut(name)
            .ok_or_else(|| RegistryError::NotRegistered(name.to_string()))?;
        tracked.apply_update(update)
    }

    /// Stores `value` in the metric registered as `name`.
    pub fn update(&self, name: &str, value: impl Into<MetricValue>) -> Result<(), RegistryError> {
        self.apply(name, MetricUpdate::Value(value.into()))
    }

    /// Replaces the registered metric of the same name with `metric`.
    pub fn update_metric(&self, metric: impl Into<Metric>) -> Result<(), RegistryError> {
        let metric = metric.into();
        let name = metric.name();
        self.apply(name.as_str(), MetricUpdate::Replace(metric))
    }

    pub fn increment(&self, name: &str, delta: i64) -> Result<(), RegistryError> {
        self.apply(name, MetricUpdate::Increment(delta))
    }

    pub fn decrement(&self, name: &str, delta: i64) -> Result<(), RegistryError> {
        self.apply(name, MetricUpdate::Decrement(delta))
    }

    /// Merges copies of every entry of `other` into this registry.
    pub fn merge_registry(&self, other: &MetricRegistry) -> Result<usize, RegistryError> {
        // Copied out first so merging a registry into itself cannot deadlock
        let incoming = other.entries();
        self.merge_entries(incoming)
    }

    /// Merges a registry that is no longer needed, moving its entries.
    pub fn absorb(&self, other: MetricRegistry) -> Result<usize, RegistryError> {
        let entries = match other.entries.into_inner() {
            Ok(entries) => entries,
            Err(poisoned) => poisoned.into_inner(),
        };
        let Entries { mut map, order } = entries;
        let incoming = order.iter().filter_map(|name| map.remove(name)).collect();
        self.merge_entries(incoming)
    }

    /// Entries present locally are merged, new names are inserted.
    ///
    /// Every shared name is type checked before anything is applied, so a
    /// snapshot with one conflicting metric is rejected as a whole.
    fn merge_entries(&self, incoming: Vec<TrackedMetric>) -> Result<usize, RegistryError> {
        let mut entries = self.lock();

        for remote in &incoming {
            if let Some(local) = entries.map.get(&remote.name()) {
                let expected = local.current().metric_type();
                let actual = remote.current().metric_type();
                if expected != actual {
                    return Err(RegistryError::TypeMismatch {
                        name: remote.name().to_string(),
                        expected,
                        actual,
                    });
                }
            }
        }

        let merged = incoming.len();
        for remote in incoming {
            trace!(
                "Metric name: {}, value: {}, description: {}, time: {}, changes since last flush: {}",
                remote.name(),
                remote.current().value(),
                remote.current().description(),
                remote.current().timestamp(),
                remote.changes_since_flush()
            );
            match entries.map.get_mut(&remote.name()) {
                Some(local) => local.merge_from(remote)?,
                None => entries.insert(remote),
            }
        }
        Ok(merged)
    }

    /// Encodes every entry that changed since the last flush.
    pub fn serialize(&self) -> Result<Vec<u8>, SnapshotError> {
        let entries = self.lock();
        snapshot::encode(entries.iter().filter(|t| t.changes_since_flush() > 0))
    }

    pub fn deserialize(payload: &[u8]) -> Result<MetricRegistry, SnapshotError> {
        Ok(Self::from_entries(snapshot::decode(payload)?))
    }

    pub fn total_changes(&self) -> u64 {
        self.lock()
            .map
            .values()
            .fold(0u64, |acc, t| acc.saturating_add(t.changes_since_flush()))
    }

    /// True once the accumulated changes exceed `threshold`.
    pub fn flush_ready(&self, threshold: u64) -> bool {
        self.total_changes() > threshold
    }

    pub fn to_key_value_pairs(&self) -> Vec<(String, String)> {
        self.lock().key_value_pairs()
    }

    pub fn reset_all(&self) {
        self.lock().reset_all();
    }

    /// Copies out the key/value pairs and resets every entry under one lock,
    /// so no update can land between the two.
    pub fn drain_for_flush(&self) -> Vec<(String, String)> {
        let mut entries = self.lock();
        let pairs = entries.key_value_pairs();
        entries.reset_all();
        pairs
    }
}
