// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Metrics for observability.
//!
//! Exports Prometheus-compatible metrics through the `metrics` facade for:
//! - Buffered rows
//! - Flush cycles
//! - Remote write attempts, retries and terminal failures
//! - Scheduler state
//!
//! # Metric Naming Convention
//!
//! All metrics are prefixed with `bulk_writer_` and follow Prometheus conventions:
//! - Counters end in `_total`
//! - Gauges represent current state
//! - Histograms track distributions (duration, size)
//!
//! No recorder is installed by this crate; without one every call is a no-op.

use metrics::{counter, gauge, histogram};
use std::time::Duration;

/// Record a row appended to the buffer.
pub fn record_row_buffered(region: &str) {
    counter!("bulk_writer_rows_buffered_total", "region" => region.to_string()).increment(1);
}

/// Record a completed drain-and-dispatch pass.
pub fn record_flush(regions: usize, rows: usize) {
    counter!("bulk_writer_flushes_total").increment(1);
    counter!("bulk_writer_flushed_rows_total").increment(rows as u64);
    histogram!("bulk_writer_flush_regions").record(regions as f64);
}

/// Record one remote append attempt and its outcome.
pub fn record_write_attempt(region: &str, outcome: &str, duration: Duration) {
    counter!(
        "bulk_writer_write_attempts_total",
        "region" => region.to_string(),
        "outcome" => outcome.to_string()
    )
    .increment(1);
    histogram!("bulk_writer_write_duration_seconds", "region" => region.to_string())
        .record(duration.as_secs_f64());
}

/// Record a rate-limited write being scheduled for retry.
pub fn record_rate_limit_retry(region: &str, retry: u32) {
    counter!(
        "bulk_writer_rate_limit_retries_total",
        "region" => region.to_string(),
        "retry" => retry.to_string()
    )
    .increment(1);
}

/// Record a write held back by the client-side throttle.
pub fn record_throttled(region: &str) {
    counter!("bulk_writer_throttled_total", "region" => region.to_string()).increment(1);
}

/// Record a batch moved to the failed-write store.
pub fn record_terminal_failure(region: &str, rows: usize) {
    counter!("bulk_writer_terminal_failures_total", "region" => region.to_string()).increment(1);
    counter!("bulk_writer_failed_rows_total", "region" => region.to_string()).increment(rows as u64);
}

/// Gauge for batches currently held in the failed-write store.
pub fn set_failed_batches(count: usize) {
    gauge!("bulk_writer_failed_batches").set(count as f64);
}

/// Gauge for dispatch tasks still running.
pub fn set_in_flight_writes(count: usize) {
    gauge!("bulk_writer_in_flight_writes").set(count as f64);
}

/// Gauge for scheduler state (0=stopped, 1=running).
pub fn set_scheduler_state(state: &str) {
    let value = match state {
        "Stopped" => 0.0,
        "Running" => 1.0,
        _ => -1.0,
    };
    gauge!("bulk_writer_scheduler_state").set(value);
}

/// Gauge for the configured flush interval.
pub fn set_flush_interval(interval: Duration) {
    gauge!("bulk_writer_flush_interval_seconds").set(interval.as_secs_f64());
}
