// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Configuration for the bulk writer.
//!
//! [`WriterConfig`] is handed to [`crate::BulkWriterBuilder`] and can be
//! constructed programmatically or deserialized from JSON. The client handle
//! is not part of the config; it is passed to the builder separately.
//!
//! # Quick Start
//!
//! ```rust
//! use bulk_writer::config::WriterConfig;
//!
//! let config = WriterConfig {
//!     destination_id: "1BxiMVs0XRA5nFMdKvBdBZjgmUUqptlbs74OgvE2upms".into(),
//!     interval_ms: 30_000,
//!     ..Default::default()
//! };
//! assert!(config.validate().is_ok());
//! ```
//!
//! # Configuration Structure
//!
//! ```text
//! WriterConfig
//! ├── destination_id: String            # Spreadsheet / table identifier (required)
//! ├── interval_ms: u64                  # Flush period, >= 5000 (default 60000)
//! ├── value_input_option: RAW | USER_ENTERED
//! ├── insert_data_option: OVERWRITE | INSERT_ROWS
//! ├── retry: RetryPolicy                # Rate-limit retry budget and delay
//! └── rate_limit_*                      # Optional client-side throttle
//! ```
//!
//! # JSON Example
//!
//! ```json
//! {
//!   "destination_id": "1BxiMVs0XRA5nFMdKvBdBZjgmUUqptlbs74OgvE2upms",
//!   "interval_ms": 60000,
//!   "value_input_option": "USER_ENTERED",
//!   "insert_data_option": "INSERT_ROWS",
//!   "retry": { "max_retries": 2, "retry_delay_ms": 60000 }
//! }
//! ```

use crate::error::{Result, WriterError};
use crate::resilience::{RateLimitConfig, RetryPolicy};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Smallest accepted flush interval (ms).
pub const MIN_INTERVAL_MS: u64 = 5_000;

/// Flush interval used when none is configured (ms).
pub const DEFAULT_INTERVAL_MS: u64 = 60_000;

/// Largest accepted flush interval (ms), one day.
pub const MAX_INTERVAL_MS: u64 = 24 * 60 * 60 * 1_000;

/// Smallest accepted flush interval.
pub const MIN_INTERVAL: Duration = Duration::from_millis(MIN_INTERVAL_MS);

/// Largest accepted flush interval.
pub const MAX_INTERVAL: Duration = Duration::from_millis(MAX_INTERVAL_MS);

// ═══════════════════════════════════════════════════════════════════════════════
// Pass-through options forwarded verbatim to the remote append call
// ═══════════════════════════════════════════════════════════════════════════════

/// How the remote interprets incoming cell values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ValueInputOption {
    /// Stored as-is.
    Raw,
    /// Parsed as if typed into the UI (formulas, dates, numbers).
    #[default]
    UserEntered,
}

impl ValueInputOption {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Raw => "RAW",
            Self::UserEntered => "USER_ENTERED",
        }
    }
}

impl std::fmt::Display for ValueInputOption {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How appended rows are placed relative to existing data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InsertDataOption {
    /// Rows overwrite whatever is after the table.
    Overwrite,
    /// New rows are inserted for the data.
    #[default]
    InsertRows,
}

impl InsertDataOption {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Overwrite => "OVERWRITE",
            Self::InsertRows => "INSERT_ROWS",
        }
    }
}

impl std::fmt::Display for InsertDataOption {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// WriterConfig
// ═══════════════════════════════════════════════════════════════════════════════

/// The top-level config object passed to [`crate::BulkWriterBuilder`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WriterConfig {
    /// Identifier of the remote spreadsheet/table. Required.
    #[serde(default)]
    pub destination_id: String,

    /// Flush period in milliseconds. Must be at least [`MIN_INTERVAL_MS`].
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,

    #[serde(default)]
    pub value_input_option: ValueInputOption,

    #[serde(default)]
    pub insert_data_option: InsertDataOption,

    /// Rate-limit retry behaviour.
    #[serde(default)]
    pub retry: RetryPolicy,

    // ─────────────────────────────────────────────────────────────────────────
    // Client-side throttling (keeps us under the remote quota up front)
    // ─────────────────────────────────────────────────────────────────────────

    /// Throttle outgoing append requests with a token bucket.
    #[serde(default = "default_false")]
    pub rate_limit_enabled: bool,

    /// Sustained requests per second.
    #[serde(default = "default_rate_limit_per_sec")]
    pub rate_limit_per_sec: u32,

    /// Burst size for the token bucket.
    #[serde(default = "default_rate_limit_burst")]
    pub rate_limit_burst: u32,
}

fn default_interval_ms() -> u64 {
    DEFAULT_INTERVAL_MS
}

fn default_false() -> bool {
    false
}

fn default_rate_limit_per_sec() -> u32 {
    1 // 60 requests/minute, the usual per-user write quota
}

fn default_rate_limit_burst() -> u32 {
    10
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            destination_id: String::new(),
            interval_ms: DEFAULT_INTERVAL_MS,
            value_input_option: ValueInputOption::default(),
            insert_data_option: InsertDataOption::default(),
            retry: RetryPolicy::default(),
            rate_limit_enabled: false,
            rate_limit_per_sec: 1,
            rate_limit_burst: 10,
        }
    }
}

impl WriterConfig {
    /// Config with the minimum interval and a fast retry policy.
    pub fn for_testing(destination_id: &str) -> Self {
        Self {
            destination_id: destination_id.to_string(),
            interval_ms: MIN_INTERVAL_MS,
            retry: RetryPolicy::testing(),
            ..Default::default()
        }
    }

    /// Get the flush interval as a Duration.
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    /// Check the constraints the writer relies on.
    pub fn validate(&self) -> Result<()> {
        if self.destination_id.trim().is_empty() {
            return Err(WriterError::Config("No destination id provided".to_string()));
        }
        validate_interval(self.interval())?;
        self.retry.validate()
    }

    /// Create rate limit configuration from the throttle settings.
    ///
    /// Returns `None` if rate limiting is disabled.
    pub fn rate_limit_config(&self) -> Option<RateLimitConfig> {
        if self.rate_limit_enabled {
            Some(RateLimitConfig {
                burst_size: self.rate_limit_burst,
                refill_rate: self.rate_limit_per_sec,
            })
        } else {
            None
        }
    }
}

/// Reject flush intervals outside [`MIN_INTERVAL`]..=[`MAX_INTERVAL`].
pub fn validate_interval(interval: Duration) -> Result<()> {
    if interval < MIN_INTERVAL {
        return Err(WriterError::Config(format!(
            "Interval must be at least {}ms, got {}ms",
            MIN_INTERVAL_MS,
            interval.as_millis()
        )));
    }
    if interval > MAX_INTERVAL {
        return Err(WriterError::Config(format!(
            "Interval must be at most {}ms, got {}ms",
            MAX_INTERVAL_MS,
            interval.as_millis()
        )));
    }
    Ok(())
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════
