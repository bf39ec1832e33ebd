// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Typed metrics with change tracking.
//!
//! Workers record observations in a [`registry::MetricRegistry`] and ship
//! snapshots of whatever changed. A [`collector_service::MetricsCollectorService`]
//! merges those snapshots into a resident registry and, once enough changes
//! have accumulated, flushes them to every configured [`sink::MetricsSink`].

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

pub mod collector_service;
pub mod config;
pub mod constants;
pub mod errors;
pub mod metric;
pub mod registry;
pub mod sink;
pub mod snapshot;
pub mod tracked;
pub mod util;

pub use collector_service::{CollectorHandle, IngestReport, MetricsCollectorService};
pub use config::CollectorConfig;
pub use metric::{Counter, DoubleGauge, IntegerGauge, Metric, MetricType, MetricValue, StateMetric};
pub use registry::MetricRegistry;
pub use sink::{MetricsSink, TracingSink};
pub use tracked::TrackedMetric;
