// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Resilience utilities: rate-limit retry policy and client-side throttling.
//!
//! - [`RetryPolicy`]: bounded retry for rate-limited writes
//! - [`RateLimiter`]: token bucket that keeps request volume under quota
//!
//! # Example
//!
//! ```rust,no_run
//! # async fn example() {
//! use bulk_writer::resilience::{RateLimiter, RateLimitConfig, RetryPolicy};
//!
//! // 60 requests/minute with a burst of 10
//! let limiter = RateLimiter::new(RateLimitConfig { burst_size: 10, refill_rate: 1 });
//! limiter.acquire().await; // Waits if over limit
//!
//! let policy = RetryPolicy::default();
//! assert_eq!(policy.max_retries, 2);
//! # }
//! ```

use governor::{
    clock::DefaultClock,
    middleware::NoOpMiddleware,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter as GovLimiter,
};
use crate::error::{Result, WriterError};
use serde::{Deserialize, Serialize};
use std::num::NonZeroU32;
use std::time::Duration;

/// Longest wait before any single retry, whatever the backoff factor.
pub const MAX_RETRY_DELAY: Duration = Duration::from_secs(60 * 60);

// =============================================================================
// Retry Policy
// =============================================================================

/// Retry behaviour for rate-limited writes.
///
/// A write rejected with `rate_limit_status` is retried up to `max_retries`
/// times, waiting `retry_delay_ms * backoff_factor^(retry - 1)` before each
/// retry. With the default factor of 1.0 every retry waits the same delay.
/// Any other failure is never retried.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Retries after the initial attempt.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Delay before the first retry (ms).
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,

    /// Multiplier applied to the delay for each further retry.
    #[serde(default = "default_backoff_factor")]
    pub backoff_factor: f64,

    /// Remote status code that means "rate limited".
    #[serde(default = "default_rate_limit_status")]
    pub rate_limit_status: u16,
}

fn default_max_retries() -> u32 {
    2
}

fn default_retry_delay_ms() -> u64 {
    60_000 // one minute, matches per-minute quotas
}

fn default_backoff_factor() -> f64 {
    1.0
}

fn default_rate_limit_status() -> u16 {
    429
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            retry_delay_ms: 60_000,
            backoff_factor: 1.0,
            rate_limit_status: 429,
        }
    }
}

impl RetryPolicy {
    /// Short delays for tests.
    pub fn testing() -> Self {
        Self {
            max_retries: 2,
            retry_delay_ms: 10,
            backoff_factor: 1.0,
            rate_limit_status: 429,
        }
    }

    /// Never retry; every rate limit is terminal.
    pub fn no_retry() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// Whether a write that has already been retried `retry_count` times may retry again.
    pub fn can_retry(&self, retry_count: u32) -> bool {
        retry_count < self.max_retries
    }

    /// Reject backoff factors that are not finite or would shrink the delay.
    pub fn validate(&self) -> Result<()> {
        if !self.backoff_factor.is_finite() || self.backoff_factor < 1.0 {
            return Err(WriterError::Config(format!(
                "Backoff factor must be a finite number >= 1.0, got {}",
                self.backoff_factor
            )));
        }
        Ok(())
    }

    /// Delay before retry number `retry` (1-indexed), capped at [`MAX_RETRY_DELAY`].
    pub fn delay_for_retry(&self, retry: u32) -> Duration {
        let base = Duration::from_millis(self.retry_delay_ms).min(MAX_RETRY_DELAY);
        if retry <= 1 || self.backoff_factor <= 1.0 {
            return base;
        }

        let exponent = i32::try_from(retry - 1).unwrap_or(i32::MAX);
        let scaled = base.as_secs_f64() * self.backoff_factor.powi(exponent);
        Duration::try_from_secs_f64(scaled)
            .map(|delay| delay.min(MAX_RETRY_DELAY))
            .unwrap_or(MAX_RETRY_DELAY)
    }

    /// Whether `status` is the rate-limit signal.
    pub fn is_rate_limit(&self, status: Option<u16>) -> bool {
        status == Some(self.rate_limit_status)
    }
}

// =============================================================================
// Rate Limiting
// =============================================================================

/// Client-side request budget, derived from the writer's throttle settings.
///
/// Every append request spends one permit. Permits come back at
/// `refill_rate` per second and pile up to at most `burst_size`, so a
/// flush touching many regions can go out at once after a quiet spell.
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Append requests that may go out back to back.
    pub burst_size: u32,

    /// Sustained append requests per second.
    pub refill_rate: u32,
}

impl Default for RateLimitConfig {
    /// One append per second (a typical per-minute write quota), bursts of 10.
    fn default() -> Self {
        Self {
            burst_size: 10,
            refill_rate: 1,
        }
    }
}

/// Permit pool consulted before each append request.
///
/// One instance lives in the dispatcher; every region's task draws from it,
/// so a wide flush is spread out instead of tripping the remote quota.
/// Zero in either setting is treated as one.
pub struct RateLimiter {
    limiter: GovLimiter<NotKeyed, InMemoryState, DefaultClock, NoOpMiddleware>,
    config: RateLimitConfig,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        let quota = Quota::per_second(NonZeroU32::new(config.refill_rate).unwrap_or(NonZeroU32::MIN))
            .allow_burst(NonZeroU32::new(config.burst_size).unwrap_or(NonZeroU32::MIN));

        let limiter = GovLimiter::direct(quota);

        Self { limiter, config }
    }

    /// Wait for a permit. Dropping the future gives nothing back, since
    /// no permit was taken yet.
    pub async fn acquire(&self) {
        self.limiter.until_ready().await;
    }

    /// Take a permit if one is free right now; the dispatcher uses this to
    /// tell a throttled request from an unthrottled one.
    pub fn try_acquire(&self) -> bool {
        self.limiter.check().is_ok()
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter").field("config", &self.config).finish()
    }
}
