// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Bulk writer coordinator.
//!
//! The main object that ties together:
//! - The pending-row buffer via [`crate::buffer::RowBuffer`]
//! - Per-region dispatch via [`crate::dispatch::WriteDispatcher`]
//! - The periodic timer via [`crate::scheduler::FlushScheduler`]
//! - Terminal failures via [`crate::failed::FailedWriteStore`]
//!
//! # Flush Cycle
//!
//! 1. Swap the buffer for an empty one (one lock acquisition)
//! 2. Spawn one dispatch task per region with that region's rows
//! 3. Return immediately; writes resolve in their own tasks
//!
//! Rows appended after step 1 belong to the next cycle, even while the
//! previous cycle's writes are still in flight or waiting out a rate limit.
//!
//! # Lifecycle
//!
//! The writer never registers process-wide hooks. Hosts call
//! [`BulkWriter::shutdown()`] on their way out: it stops the timer, flushes,
//! and waits (bounded) for outstanding writes.

mod builder;
mod types;

pub use builder::BulkWriterBuilder;
pub use types::{FlushSummary, ShutdownSummary};

use crate::buffer::{Row, RowBatch, RowBuffer};
use crate::config::WriterConfig;
use crate::dispatch::{log_error_handler, DeliveryOutcome, ErrorHandler, WriteDispatcher, WriteFailure};
use crate::error::{Result, WriterError};
use crate::failed::FailedWriteStore;
use crate::metrics;
use crate::remote::RemoteTable;
use crate::scheduler::{FlushScheduler, SchedulerState};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

/// State shared between the writer handle and the scheduler's timer task.
struct Shared<R: RemoteTable> {
    buffer: Mutex<RowBuffer>,
    failed: Arc<Mutex<FailedWriteStore>>,
    dispatcher: Arc<WriteDispatcher<R>>,
    /// Dispatch tasks not yet known to have finished.
    in_flight: Mutex<Vec<JoinHandle<DeliveryOutcome>>>,
}

impl<R: RemoteTable> Shared<R> {
    #[instrument(skip(self))]
    async fn flush(&self) -> FlushSummary {
        // The swap is the whole critical section: appends never wait on I/O
        let drained = self.buffer.lock().await.drain_all();
        if drained.is_empty() {
            debug!("Flush skipped, buffer empty");
            return FlushSummary::default();
        }

        let mut summary = FlushSummary::default();
        let mut handles = Vec::with_capacity(drained.len());
        for (region, batch) in drained {
            summary.regions += 1;
            summary.rows += batch.len();
            handles.push(self.dispatcher.spawn(region, batch));
        }

        let in_flight_count = {
            let mut in_flight = self.in_flight.lock().await;
            in_flight.retain(|handle| !handle.is_finished());
            in_flight.extend(handles);
            in_flight.len()
        };
        metrics::set_in_flight_writes(in_flight_count);
        metrics::record_flush(summary.regions, summary.rows);

        info!(
            regions = summary.regions,
            rows = summary.rows,
            in_flight = in_flight_count,
            "Flushed buffer"
        );

        summary
    }

    async fn take_in_flight(&self) -> Vec<JoinHandle<DeliveryOutcome>> {
        std::mem::take(&mut *self.in_flight.lock().await)
    }
}

/// Write-coalescing buffer in front of a rate-limited remote table.
///
/// Rows appended for the same region between two flushes are sent as one
/// append request, in append order. See the module docs for the cycle.
///
/// # Example
///
/// ```rust,no_run
/// # use bulk_writer::remote::{AppendRequest, BoxFuture, RemoteTable};
/// # struct SheetsClient;
/// # impl RemoteTable for SheetsClient {
/// #     fn append_rows<'a>(&'a self, _r: &'a AppendRequest) -> BoxFuture<'a, ()> { Box::pin(async { Ok(()) }) }
/// # }
/// use bulk_writer::BulkWriter;
/// use serde_json::json;
/// use std::sync::Arc;
/// use std::time::Duration;
///
/// # async fn example() -> bulk_writer::Result<()> {
/// let writer = BulkWriter::builder()
///     .client(Arc::new(SheetsClient))
///     .destination_id("1BxiMVs0XRA5nFMdKvBdBZjgmUUqptlbs74OgvE2upms")
///     .build()?;
///
/// writer.start().await?;
/// writer.append("Events!A:C", vec![json!("login"), json!("alice"), json!(1)]).await;
///
/// // On the way out
/// writer.shutdown(Duration::from_secs(10)).await;
/// # Ok(())
/// # }
/// ```
pub struct BulkWriter<R: RemoteTable> {
    config: WriterConfig,
    shared: Arc<Shared<R>>,
    scheduler: Mutex<FlushScheduler>,
    shut_down: AtomicBool,
}

impl<R: RemoteTable> BulkWriter<R> {
    /// Start building a writer.
    pub fn builder() -> BulkWriterBuilder<R> {
        BulkWriterBuilder::new()
    }

    /// Assemble a writer from validated parts.
    fn from_parts(
        client: Arc<R>,
        config: WriterConfig,
        error_handler: Option<ErrorHandler>,
    ) -> Result<Self> {
        let failed = Arc::new(Mutex::new(FailedWriteStore::new()));
        let dispatcher = Arc::new(WriteDispatcher::new(
            client,
            &config,
            Arc::clone(&failed),
            error_handler.unwrap_or_else(log_error_handler),
        ));

        let shared = Arc::new(Shared {
            buffer: Mutex::new(RowBuffer::new()),
            failed,
            dispatcher,
            in_flight: Mutex::new(Vec::new()),
        });

        let timer_shared = Arc::clone(&shared);
        let scheduler = FlushScheduler::new(config.interval(), move || {
            let shared = Arc::clone(&timer_shared);
            async move {
                shared.flush().await;
            }
        })?;

        info!(
            destination_id = %config.destination_id,
            interval_ms = config.interval_ms,
            max_retries = config.retry.max_retries,
            "Bulk writer created"
        );

        Ok(Self {
            config,
            shared,
            scheduler: Mutex::new(scheduler),
            shut_down: AtomicBool::new(false),
        })
    }

    pub fn destination_id(&self) -> &str {
        &self.config.destination_id
    }

    /// Configuration the writer was built with (the interval may since have changed).
    pub fn config(&self) -> &WriterConfig {
        &self.config
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Core
    // ─────────────────────────────────────────────────────────────────────────

    /// Buffer one row for `region`. Never fails.
    pub async fn append(&self, region: impl Into<String>, row: Row) {
        let region = region.into();
        metrics::record_row_buffered(&region);
        self.shared.buffer.lock().await.append(region, row);
    }

    /// Drain the buffer and dispatch one write per region.
    ///
    /// Returns once the writes are dispatched, not delivered. The buffer is
    /// empty afterwards whatever the writes' eventual outcome.
    pub async fn flush(&self) -> FlushSummary {
        self.shared.flush().await
    }

    /// Wait for every dispatched write (including pending retries) to resolve.
    ///
    /// Returns how many writes were awaited.
    pub async fn wait_idle(&self) -> usize {
        let mut awaited = 0;
        loop {
            let handles = self.shared.take_in_flight().await;
            if handles.is_empty() {
                break;
            }
            for handle in handles {
                awaited += 1;
                match handle.await {
                    Ok(outcome) => debug!(region = %outcome.region(), state = %outcome.state(), "Write resolved"),
                    Err(e) => warn!(error = %e, "Dispatch task panicked"),
                }
            }
        }
        metrics::set_in_flight_writes(0);
        awaited
    }

    /// Dispatch tasks that have not finished yet.
    pub async fn in_flight(&self) -> usize {
        self.shared
            .in_flight
            .lock()
            .await
            .iter()
            .filter(|handle| !handle.is_finished())
            .count()
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Scheduler control
    // ─────────────────────────────────────────────────────────────────────────

    /// Arm the periodic flush timer. No-op when already running.
    ///
    /// Fails with `InvalidState` after [`shutdown()`](Self::shutdown).
    pub async fn start(&self) -> Result<()> {
        self.ensure_open()?;
        self.scheduler.lock().await.start();
        Ok(())
    }

    /// Disarm the periodic flush timer. Buffered rows stay buffered.
    pub async fn stop(&self) {
        self.scheduler.lock().await.stop();
    }

    /// Stop then start the timer.
    pub async fn restart(&self) -> Result<()> {
        self.ensure_open()?;
        self.scheduler.lock().await.restart();
        Ok(())
    }

    pub async fn scheduler_state(&self) -> SchedulerState {
        self.scheduler.lock().await.state()
    }

    pub async fn is_running(&self) -> bool {
        self.scheduler.lock().await.is_running()
    }

    pub async fn interval(&self) -> Duration {
        self.scheduler.lock().await.interval()
    }

    /// Change the flush period.
    ///
    /// Intervals below the minimum are rejected and the previous interval is
    /// kept. A running timer restarts with the new interval.
    pub async fn set_interval(&self, interval: Duration) -> Result<()> {
        self.scheduler.lock().await.set_interval(interval)?;
        metrics::set_flush_interval(interval);
        info!(
            interval_ms = u64::try_from(interval.as_millis()).unwrap_or(u64::MAX),
            "Flush interval updated"
        );
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Buffer introspection
    // ─────────────────────────────────────────────────────────────────────────

    /// Copy of the rows waiting for the next flush.
    pub async fn cache(&self) -> HashMap<String, RowBatch> {
        self.shared.buffer.lock().await.snapshot()
    }

    /// Discard every pending row.
    pub async fn clear_cache(&self) {
        self.shared.buffer.lock().await.clear_all();
    }

    /// Discard the pending rows for one region.
    pub async fn clear_range_queue(&self, region: &str) {
        if let Some(rows) = self.shared.buffer.lock().await.clear_region(region) {
            debug!(region = %region, rows = rows.len(), "Cleared pending rows");
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Failed writes
    // ─────────────────────────────────────────────────────────────────────────

    /// Copy of every batch that failed terminally, by region.
    pub async fn error_values(&self) -> HashMap<String, Vec<RowBatch>> {
        self.shared.failed.lock().await.snapshot()
    }

    pub async fn clear_error_values(&self) {
        self.shared.failed.lock().await.clear_all();
        metrics::set_failed_batches(0);
    }

    /// Replace the terminal-failure callback. Affects later failures only.
    pub async fn set_error_handler<F>(&self, handler: F)
    where
        F: Fn(&WriteFailure) + Send + Sync + 'static,
    {
        self.shared.dispatcher.set_error_handler(Arc::new(handler)).await;
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Shutdown
    // ─────────────────────────────────────────────────────────────────────────

    /// Stop the timer, flush, and wait up to `timeout` for outstanding writes.
    ///
    /// Writes still running at the deadline (typically ones waiting out a
    /// rate-limit delay) are left running detached; their batches may be
    /// lost if the process exits. Calling this twice is harmless.
    pub async fn shutdown(&self, timeout: Duration) -> ShutdownSummary {
        info!(
            timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
            "Shutting down bulk writer"
        );
        self.shut_down.store(true, Ordering::SeqCst);
        self.scheduler.lock().await.stop();

        let flushed = self.shared.flush().await;
        let handles = self.shared.take_in_flight().await;

        let mut summary = ShutdownSummary {
            flushed,
            ..Default::default()
        };

        let deadline = tokio::time::Instant::now() + timeout;
        for handle in handles {
            match tokio::time::timeout_at(deadline, handle).await {
                Ok(Ok(outcome)) => {
                    summary.completed += 1;
                    debug!(region = %outcome.region(), state = %outcome.state(), "Write resolved during shutdown");
                }
                Ok(Err(e)) => {
                    summary.completed += 1;
                    warn!(error = %e, "Dispatch task panicked during shutdown");
                }
                Err(_) => {
                    summary.timed_out += 1;
                }
            }
        }

        if summary.timed_out > 0 {
            warn!(
                timed_out = summary.timed_out,
                "Writes still in flight at shutdown deadline (batches may be lost)"
            );
        }
        metrics::set_in_flight_writes(summary.timed_out);

        info!(
            regions = summary.flushed.regions,
            rows = summary.flushed.rows,
            completed = summary.completed,
            timed_out = summary.timed_out,
            "Bulk writer shut down"
        );
        summary
    }

    fn ensure_open(&self) -> Result<()> {
        if self.shut_down.load(Ordering::SeqCst) {
            return Err(WriterError::InvalidState {
                expected: "Open".to_string(),
                actual: "ShutDown".to_string(),
            });
        }
        Ok(())
    }
}
