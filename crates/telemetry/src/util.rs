// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Utility functions shared by the registry and the collector service.

use crate::constants::VALID_LOG_LEVELS;
use std::time::{SystemTime, UNIX_EPOCH};

/// Wall-clock time in milliseconds since the Unix epoch.
///
/// Clocks set before the epoch read as zero.
pub fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| i64::try_from(d.as_millis()).unwrap_or(i64::MAX))
        .unwrap_or_default()
}

/// Parses and validates a log level string.
///
/// The level is trimmed and lowercased. Only `trace`, `debug`, `info`, `warn`
/// and `error` are accepted.
///
/// # Examples
///
/// ```
/// use telemetry::util::parse_log_level;
///
/// assert_eq!(parse_log_level(" DEBUG "), Some("debug".to_string()));
/// assert_eq!(parse_log_level("verbose"), None);
/// ```
pub fn parse_log_level(level: &str) -> Option<String> {
    let normalized = level.trim().to_lowercase();
    if VALID_LOG_LEVELS.contains(&normalized.as_str()) {
        Some(normalized)
    } else {
        tracing::error!(
            "Invalid log level '{}'. Must be one of: trace, debug, info, warn, error",
            level
        );
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_now_millis_is_after_2020() {
        assert!(now_millis() > 1_577_836_800_000);
    }

    #[test]
    fn test_parse_log_level_valid() {
        for level in VALID_LOG_LEVELS {
            assert_eq!(parse_log_level(level), Some(level.to_string()));
        }
        assert_eq!(parse_log_level("\tWarn\n"), Some("warn".to_string()));
    }

    #[test]
    fn test_parse_log_level_invalid() {
        assert_eq!(parse_log_level(""), None);
        assert_eq!(parse_log_level("verbose"), None);
        assert_eq!(parse_log_level("info,debug"), None);
    }
}
