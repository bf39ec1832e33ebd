// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::metric::{MetricType, MetricValue};

/// Errors raised by registry and tracked-metric operations.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RegistryError {
    #[error("metric `{0}` is not registered")]
    NotRegistered(String),

    #[error("metric `{name}` is a {expected} but was given a {actual}")]
    TypeMismatch {
        name: String,
        expected: MetricType,
        actual: MetricType,
    },

    #[error("metric `{actual}` cannot update metric `{expected}`")]
    NameMismatch { expected: String, actual: String },

    #[error("metric `{name}` of type {metric_type} cannot hold value {value:?}")]
    InvalidValue {
        name: String,
        metric_type: MetricType,
        value: MetricValue,
    },

    #[error("metric `{name}` of type {metric_type} does not support {operation}")]
    UnsupportedOperation {
        name: String,
        metric_type: MetricType,
        operation: &'static str,
    },
}

/// Errors raised while encoding or decoding a registry snapshot.
#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    #[error("failed to encode snapshot: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("failed to decode snapshot: {0}")]
    Decode(#[source] serde_json::Error),

    #[error("invalid snapshot: {0}")]
    Invalid(String),
}

/// Errors a sink may report for a single flush.
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("sink I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("sink failed: {0}")]
    Failed(String),
}

/// Errors raised while building the collector configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Errors surfaced to callers of [`crate::collector_service::CollectorHandle::ingest_snapshot`].
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error(transparent)]
    Snapshot(#[from] SnapshotError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error("collector channel closed: {0}")]
    ChannelClosed(String),
}
