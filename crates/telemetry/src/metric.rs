// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Metric value model.
//!
//! A [`Metric`] is a closed set of variants. Each variant is a [`TypedMetric`]
//! parameterized by a marker type implementing [`MetricKind`], which fixes the
//! value type and the [`Mutability`] of the variant at compile time.

use crate::errors::RegistryError;
use crate::util::now_millis;
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;
use std::fmt::Debug;
use ustr::{ustr, Ustr};

/// How a tracked metric treats the value it is about to overwrite.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mutability {
    /// The old value is disposable; only the running value matters.
    MutableInPlace,
    /// Every value is an observation and is kept until the next flush.
    ImmutablePerUpdate,
}

/// Discriminator shared by runtime type checks and the wire encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricType {
    Counter,
    IntegerGauge,
    DoubleGauge,
    State,
}

impl MetricType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricType::Counter => "counter",
            MetricType::IntegerGauge => "integer_gauge",
            MetricType::DoubleGauge => "double_gauge",
            MetricType::State => "state",
        }
    }

    pub fn mutability(&self) -> Mutability {
        match self {
            MetricType::Counter => CounterKind::MUTABILITY,
            MetricType::IntegerGauge => IntegerGaugeKind::MUTABILITY,
            MetricType::DoubleGauge => DoubleGaugeKind::MUTABILITY,
            MetricType::State => StateKind::MUTABILITY,
        }
    }
}

impl fmt::Display for MetricType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Untyped metric value for generic code and the wire.
///
/// Non-finite doubles have no JSON number form and are written as the
/// strings `"NaN"`, `"inf"` and `"-inf"`, which double gauges accept back.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum MetricValue {
    Integer(i64),
    Double(f64),
    Text(String),
}

impl Serialize for MetricValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            MetricValue::Integer(v) => serializer.serialize_i64(*v),
            MetricValue::Double(v) if v.is_finite() => serializer.serialize_f64(*v),
            MetricValue::Double(v) => serializer.collect_str(v),
            MetricValue::Text(v) => serializer.serialize_str(v),
        }
    }
}

fn parse_non_finite(token: &str) -> Option<f64> {
    match token {
        "NaN" => Some(f64::NAN),
        "inf" => Some(f64::INFINITY),
        "-inf" => Some(f64::NEG_INFINITY),
        _ => None,
    }
}

impl fmt::Display for MetricValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetricValue::Integer(v) => write!(f, "{v}"),
            MetricValue::Double(v) => write!(f, "{v}"),
            MetricValue::Text(v) => f.write_str(v),
        }
    }
}

impl From<i64> for MetricValue {
    fn from(value: i64) -> Self {
        MetricValue::Integer(value)
    }
}

impl From<i32> for MetricValue {
    fn from(value: i32) -> Self {
        MetricValue::Integer(i64::from(value))
    }
}

impl From<f64> for MetricValue {
    fn from(value: f64) -> Self {
        MetricValue::Double(value)
    }
}

impl From<String> for MetricValue {
    fn from(value: String) -> Self {
        MetricValue::Text(value)
    }
}

impl From<&str> for MetricValue {
    fn from(value: &str) -> Self {
        MetricValue::Text(value.to_string())
    }
}

/// A value observed at one point in a metric's history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricRecord {
    pub value: MetricValue,
    pub timestamp: i64,
}

/// Compile-time description of one metric variant.
pub trait MetricKind: Debug + Clone + Copy + PartialEq + Send + Sync + 'static {
    const METRIC_TYPE: MetricType;
    const MUTABILITY: Mutability;
    type Value: Clone + Debug + Default + PartialEq + Into<MetricValue> + Send + Sync + 'static;

    /// Converts an untyped value into this kind's value, if compatible.
    fn extract(value: MetricValue) -> Option<Self::Value>;
}

/// Kinds whose value is replaced wholesale by `set_value`.
pub trait Overwritable: MetricKind {}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CounterKind;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IntegerGaugeKind;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DoubleGaugeKind;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StateKind;

impl MetricKind for CounterKind {
    const METRIC_TYPE: MetricType = MetricType::Counter;
    const MUTABILITY: Mutability = Mutability::MutableInPlace;
    type Value = i64;

    fn extract(value: MetricValue) -> Option<i64> {
        match value {
            MetricValue::Integer(v) => Some(v),
            _ => None,
        }
    }
}

impl MetricKind for IntegerGaugeKind {
    const METRIC_TYPE: MetricType = MetricType::IntegerGauge;
    const MUTABILITY: Mutability = Mutability::ImmutablePerUpdate;
    type Value = i64;

    fn extract(value: MetricValue) -> Option<i64> {
        match value {
            MetricValue::Integer(v) => Some(v),
            _ => None,
        }
    }
}

impl MetricKind for DoubleGaugeKind {
    const METRIC_TYPE: MetricType = MetricType::DoubleGauge;
    const MUTABILITY: Mutability = Mutability::ImmutablePerUpdate;
    type Value = f64;

    fn extract(value: MetricValue) -> Option<f64> {
        match value {
            MetricValue::Double(v) => Some(v),
            // JSON writers are free to drop the fractional part of whole numbers
            MetricValue::Integer(v) => Some(v as f64),
            MetricValue::Text(v) => parse_non_finite(&v),
        }
    }
}

impl MetricKind for StateKind {
    const METRIC_TYPE: MetricType = MetricType::State;
    const MUTABILITY: Mutability = Mutability::MutableInPlace;
    type Value = String;

    fn extract(value: MetricValue) -> Option<String> {
        match value {
            MetricValue::Text(v) => Some(v),
            _ => None,
        }
    }
}

impl Overwritable for IntegerGaugeKind {}
impl Overwritable for DoubleGaugeKind {}
impl Overwritable for StateKind {}

/// A named, described, timestamped value of kind `K`.
#[derive(Debug, Clone, PartialEq)]
pub struct TypedMetric<K: MetricKind> {
    name: Ustr,
    description: String,
    value: K::Value,
    timestamp: i64,
}

pub type Counter = TypedMetric<CounterKind>;
pub type IntegerGauge = TypedMetric<IntegerGaugeKind>;
pub type DoubleGauge = TypedMetric<DoubleGaugeKind>;
pub type StateMetric = TypedMetric<StateKind>;

impl<K: MetricKind> TypedMetric<K> {
    /// Creates a metric holding the default value of its kind.
    pub fn new(name: &str, description: &str) -> Self {
        Self::with_initial(name, description, K::Value::default())
    }

    pub fn with_initial(name: &str, description: &str, value: K::Value) -> Self {
        Self::from_parts(ustr(name), description.to_string(), value, now_millis())
    }

    pub(crate) fn from_parts(
        name: Ustr,
        description: String,
        value: K::Value,
        timestamp: i64,
    ) -> Self {
        Self {
            name,
            description,
            value,
            timestamp,
        }
    }

    pub fn name(&self) -> Ustr {
        self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn value(&self) -> &K::Value {
        &self.value
    }

    pub fn timestamp(&self) -> i64 {
        self.timestamp
    }

    pub fn metric_type(&self) -> MetricType {
        K::METRIC_TYPE
    }

    pub fn mutability(&self) -> Mutability {
        K::MUTABILITY
    }

    pub fn untyped_value(&self) -> MetricValue {
        self.value.clone().into()
    }

    pub fn record(&self) -> MetricRecord {
        MetricRecord {
            value: self.untyped_value(),
            timestamp: self.timestamp,
        }
    }

    pub(crate) fn assign(&mut self, value: K::Value) {
        self.value = value;
        self.timestamp = now_millis();
    }

    pub(crate) fn assign_untyped(&mut self, value: MetricValue) -> Result<(), RegistryError> {
        let typed = K::extract(value.clone()).ok_or_else(|| RegistryError::InvalidValue {
            name: self.name.to_string(),
            metric_type: K::METRIC_TYPE,
            value,
        })?;
        self.assign(typed);
        Ok(())
    }
}

impl Counter {
    pub fn increment(&mut self, delta: i64) {
        self.value = self.value.saturating_add(delta);
        self.timestamp = now_millis();
    }

    pub fn decrement(&mut self, delta: i64) {
        self.value = self.value.saturating_sub(delta);
        self.timestamp = now_millis();
    }

    pub fn inc(&mut self) {
        self.increment(1);
    }

    pub fn dec(&mut self) {
        self.decrement(1);
    }
}

impl<K: Overwritable> TypedMetric<K> {
    pub fn set_value(&mut self, value: K::Value) {
        self.assign(value);
    }
}

/// Any metric a registry can hold.
#[derive(Debug, Clone, PartialEq)]
pub enum Metric {
    Counter(Counter),
    IntegerGauge(IntegerGauge),
    DoubleGauge(DoubleGauge),
    State(StateMetric),
}

macro_rules! dispatch {
    ($metric:expr, $inner:ident => $body:expr) => {
        match $metric {
            Metric::Counter($inner) => $body,
            Metric::IntegerGauge($inner) => $body,
            Metric::DoubleGauge($inner) => $body,
            Metric::State($inner) => $body,
        }
    };
}

impl Metric {
    pub fn name(&self) -> Ustr {
        dispatch!(self, m => m.name())
    }

    pub fn description(&self) -> &str {
        dispatch!(self, m => m.description())
    }

    pub fn value(&self) -> MetricValue {
        dispatch!(self, m => m.untyped_value())
    }

    pub fn timestamp(&self) -> i64 {
        dispatch!(self, m => m.timestamp())
    }

    pub fn metric_type(&self) -> MetricType {
        dispatch!(self, m => m.metric_type())
    }

    pub fn mutability(&self) -> Mutability {
        dispatch!(self, m => m.mutability())
    }

    pub fn record(&self) -> MetricRecord {
        dispatch!(self, m => m.record())
    }

    /// Returns a copy of this metric carrying `value` at a fresh timestamp.
    pub fn with_value(&self, value: MetricValue) -> Result<Metric, RegistryError> {
        let mut copy = self.clone();
        copy.assign_value(value)?;
        Ok(copy)
    }

    pub(crate) fn assign_value(&mut self, value: MetricValue) -> Result<(), RegistryError> {
        dispatch!(self, m => m.assign_untyped(value))
    }

    pub(crate) fn increment(&mut self, delta: i64) -> Result<(), RegistryError> {
        self.counter_mut("increment")?.increment(delta);
        Ok(())
    }

    pub(crate) fn decrement(&mut self, delta: i64) -> Result<(), RegistryError> {
        self.counter_mut("decrement")?.decrement(delta);
        Ok(())
    }

    fn counter_mut(&mut self, operation: &'static str) -> Result<&mut Counter, RegistryError> {
        match self {
            Metric::Counter(counter) => Ok(counter),
            other => Err(RegistryError::UnsupportedOperation {
                name: other.name().to_string(),
                metric_type: other.metric_type(),
                operation,
            }),
        }
    }

    /// Rebuilds a metric of `metric_type` from decoded parts.
    pub(crate) fn from_parts(
        metric_type: MetricType,
        name: &str,
        description: String,
        value: MetricValue,
        timestamp: i64,
    ) -> Result<Metric, RegistryError> {
        fn build<K: MetricKind>(
            name: &str,
            description: String,
            value: MetricValue,
            timestamp: i64,
        ) -> Result<TypedMetric<K>, RegistryError> {
            let typed = K::extract(value.clone()).ok_or_else(|| RegistryError::InvalidValue {
                name: name.to_string(),
                metric_type: K::METRIC_TYPE,
                value,
            })?;
            Ok(TypedMetric::from_parts(
                ustr(name),
                description,
                typed,
                timestamp,
            ))
        }

        Ok(match metric_type {
            MetricType::Counter => {
                Metric::Counter(build::<CounterKind>(name, description, value, timestamp)?)
            }
            MetricType::IntegerGauge => Metric::IntegerGauge(build::<IntegerGaugeKind>(
                name,
                description,
                value,
                timestamp,
            )?),
            MetricType::DoubleGauge => Metric::DoubleGauge(build::<DoubleGaugeKind>(
                name,
                description,
                value,
                timestamp,
            )?),
            MetricType::State => {
                Metric::State(build::<StateKind>(name, description, value, timestamp)?)
            }
        })
    }
}

impl From<Counter> for Metric {
    fn from(metric: Counter) -> Self {
        Metric::Counter(metric)
    }
}

impl From<IntegerGauge> for Metric {
    fn from(metric: IntegerGauge) -> Self {
        Metric::IntegerGauge(metric)
    }
}

impl From<DoubleGauge> for Metric {
    fn from(metric: DoubleGauge) -> Self {
        Metric::DoubleGauge(metric)
    }
}

impl From<StateMetric> for Metric {
    fn from(metric: StateMetric) -> Self {
        Metric::State(metric)
    }
}

/// Converts `value` into the form a metric of `metric_type` stores, if it
/// can hold it at all.
pub(crate) fn coerce_value(metric_type: MetricType, value: MetricValue) -> Option<MetricValue> {
    match metric_type {
        MetricType::Counter => CounterKind::extract(value).map(Into::into),
        MetricType::IntegerGauge => IntegerGaugeKind::extract(value).map(Into::into),
        MetricType::DoubleGauge => DoubleGaugeKind::extract(value).map(Into::into),
        MetricType::State => StateKind::extract(value).map(Into::into),
    }
}
