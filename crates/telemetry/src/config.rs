// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::constants::{
    DEFAULT_FLUSH_THRESHOLD, DEFAULT_LOG_LEVEL, FLUSH_THRESHOLD_ENV, LOG_LEVEL_ENV,
    VALID_LOG_LEVELS,
};
use crate::errors::ConfigError;
use crate::util::parse_log_level;
use std::env;

/// Configuration for the metrics collector service
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectorConfig {
    /// Number of accumulated changes that must be exceeded to trigger a flush
    pub flush_threshold: u64,
    /// Log level (e.g., trace, debug, info, warn, error)
    ///
    /// The crate never installs a subscriber. Binaries read this when they
    /// build their `tracing` filter.
    pub log_level: String,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            flush_threshold: DEFAULT_FLUSH_THRESHOLD,
            log_level: DEFAULT_LOG_LEVEL.to_string(),
        }
    }
}

impl CollectorConfig {
    /// Create configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let flush_threshold = match lookup(FLUSH_THRESHOLD_ENV) {
            Some(raw) => raw.trim().parse::<u64>().map_err(|_| {
                ConfigError::Invalid(format!(
                    "{FLUSH_THRESHOLD_ENV} must be a non-negative integer, got '{raw}'"
                ))
            })?,
            None => DEFAULT_FLUSH_THRESHOLD,
        };
        let log_level = match lookup(LOG_LEVEL_ENV) {
            Some(raw) => parse_log_level(&raw).ok_or_else(|| {
                ConfigError::Invalid(format!(
                    "Invalid log level '{raw}'. Must be one of: trace, debug, info, warn, error"
                ))
            })?,
            None => DEFAULT_LOG_LEVEL.to_string(),
        };

        let config = Self {
            flush_threshold,
            log_level,
        };

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !VALID_LOG_LEVELS.contains(&self.log_level.as_str()) {
            return Err(ConfigError::Invalid(format!(
                "Invalid log level '{}'. Must be one of: trace, debug, info, warn, error",
                self.log_level
            )));
        }

        Ok(())
    }
}
