// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

/// Default number of accumulated changes that must be exceeded before a flush.
pub const DEFAULT_FLUSH_THRESHOLD: u64 = 1;

pub const DEFAULT_LOG_LEVEL: &str = "info";

pub const FLUSH_THRESHOLD_ENV: &str = "DD_METRICS_SINK_THRESHOLD";
pub const LOG_LEVEL_ENV: &str = "DD_LOG_LEVEL";

// Keys sent to sinks for a system state report
pub const SYSTEM_STATE_KEY: &str = "SystemState";
pub const TIME_UPDATED_KEY: &str = "TimeUpdated";

pub const VALID_LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];
