// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Per-region write dispatch with rate-limit retry.
//!
//! Each drained region batch becomes one spawned dispatch task that sends
//! the whole batch as a single append request and resolves it to either
//! success or the failed-write store.
//!
//! # Attempt State Machine
//!
//! ```text
//!            append_rows() ok
//! Pending ─────────────────────────→ Done
//!    │  ↑
//!    │  │ retry delay elapsed
//!    │  └──────────── PendingRetry
//!    │                     ↑
//!    │   rate limited,     │
//!    ├── retries remain ───┘
//!    │
//!    │   rate limited and retries exhausted,
//!    └── or any other failure ──────→ Failed (terminal)
//! ```
//!
//! The retry delay is a `tokio::time::sleep` inside the dispatch task, so a
//! throttled region never holds up appends, the next flush, or other regions.
//! `Failed` batches go to the [`FailedWriteStore`] and the error handler is
//! invoked exactly once per failed batch.

use crate::buffer::RowBatch;
use crate::config::{InsertDataOption, ValueInputOption, WriterConfig};
use crate::error::WriterError;
use crate::failed::FailedWriteStore;
use crate::metrics;
use crate::remote::{AppendRequest, RemoteTable};
use crate::resilience::{RateLimiter, RetryPolicy};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, error, instrument, warn};

/// Callback invoked once per terminal write failure.
pub type ErrorHandler = Arc<dyn Fn(&WriteFailure) + Send + Sync>;

/// Error handler used when none is configured: logs the failure.
pub fn log_error_handler() -> ErrorHandler {
    Arc::new(|failure: &WriteFailure| {
        error!(
            region = %failure.region,
            rows = failure.rows.len(),
            attempts = failure.attempts,
            error = %failure.error,
            "Write failed terminally"
        );
    })
}

/// Detail handed to the error handler for a terminal failure.
#[derive(Debug, Clone, PartialEq)]
pub struct WriteFailure {
    pub region: String,
    /// The batch that was not written (also kept in the failed-write store).
    pub rows: RowBatch,
    /// The final error.
    pub error: WriterError,
    /// Attempts made, including the initial one.
    pub attempts: u32,
}

/// State of a single write attempt. See module docs for transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteState {
    Pending,
    PendingRetry,
    Done,
    Failed,
}

impl std::fmt::Display for WriteState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WriteState::Pending => write!(f, "Pending"),
            WriteState::PendingRetry => write!(f, "PendingRetry"),
            WriteState::Done => write!(f, "Done"),
            WriteState::Failed => write!(f, "Failed"),
        }
    }
}

/// How a dispatched batch resolved.
#[derive(Debug, Clone, PartialEq)]
pub enum DeliveryOutcome {
    Delivered {
        region: String,
        rows: usize,
        retries: u32,
    },
    Failed {
        region: String,
        rows: usize,
        retries: u32,
        error: WriterError,
    },
}

impl DeliveryOutcome {
    pub fn region(&self) -> &str {
        match self {
            Self::Delivered { region, .. } | Self::Failed { region, .. } => region,
        }
    }

    pub fn retries(&self) -> u32 {
        match self {
            Self::Delivered { retries, .. } | Self::Failed { retries, .. } => *retries,
        }
    }

    /// Final state of the attempt.
    pub fn state(&self) -> WriteState {
        match self {
            Self::Delivered { .. } => WriteState::Done,
            Self::Failed { .. } => WriteState::Failed,
        }
    }

    pub fn is_delivered(&self) -> bool {
        matches!(self, Self::Delivered { .. })
    }
}

/// Sends region batches to the remote table.
pub struct WriteDispatcher<R: RemoteTable> {
    client: Arc<R>,
    destination_id: String,
    value_input_option: ValueInputOption,
    insert_data_option: InsertDataOption,
    retry: RetryPolicy,
    limiter: Option<RateLimiter>,
    failed: Arc<Mutex<FailedWriteStore>>,
    error_handler: RwLock<ErrorHandler>,
}

impl<R: RemoteTable> WriteDispatcher<R> {
    /// Create a dispatcher that records terminal failures into `failed`.
    pub fn new(
        client: Arc<R>,
        config: &WriterConfig,
        failed: Arc<Mutex<FailedWriteStore>>,
        error_handler: ErrorHandler,
    ) -> Self {
        Self {
            client,
            destination_id: config.destination_id.clone(),
            value_input_option: config.value_input_option,
            insert_data_option: config.insert_data_option,
            retry: config.retry.clone(),
            limiter: config.rate_limit_config().map(RateLimiter::new),
            failed,
            error_handler: RwLock::new(error_handler),
        }
    }

    /// Replace the error handler. Only failures resolved afterwards see it.
    pub async fn set_error_handler(&self, handler: ErrorHandler) {
        *self.error_handler.write().await = handler;
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Spawn [`write()`](Self::write) as its own task.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn spawn(self: &Arc<Self>, region: String, batch: RowBatch) -> JoinHandle<DeliveryOutcome> {
        let dispatcher = Arc::clone(self);
        tokio::spawn(async move { dispatcher.write(region, batch).await })
    }

    /// Send `batch` for `region` as one request, retrying rate limits.
    ///
    /// Never returns an error: terminal failures are recorded in the
    /// failed-write store and reported to the error handler.
    #[instrument(skip(self, batch), fields(rows = batch.len()))]
    pub async fn write(&self, region: String, batch: RowBatch) -> DeliveryOutcome {
        let request = AppendRequest {
            destination_id: self.destination_id.clone(),
            region,
            value_input_option: self.value_input_option,
            insert_data_option: self.insert_data_option,
            rows: batch,
        };

        let mut retry_count: u32 = 0;
        loop {
            if let Some(ref limiter) = self.limiter {
                if !limiter.try_acquire() {
                    metrics::record_throttled(&request.region);
                    debug!(region = %request.region, "Throttled, waiting for a request permit");
                    limiter.acquire().await;
                }
            }

            let start = Instant::now();
            let result = self.client.append_rows(&request).await;
            let elapsed = start.elapsed();

            let err = match result {
                Ok(()) => {
                    metrics::record_write_attempt(&request.region, "success", elapsed);
                    debug!(
                        region = %request.region,
                        rows = request.rows.len(),
                        retries = retry_count,
                        state = %WriteState::Done,
                        "Batch written"
                    );
                    return DeliveryOutcome::Delivered {
                        region: request.region,
                        rows: request.rows.len(),
                        retries: retry_count,
                    };
                }
                Err(e) => e,
            };

            let error = WriterError::from_remote(&request.region, err, &self.retry);

            if error.is_retryable() && self.retry.can_retry(retry_count) {
                metrics::record_write_attempt(&request.region, "rate_limited", elapsed);
                retry_count += 1;
                let delay = self.retry.delay_for_retry(retry_count);
                metrics::record_rate_limit_retry(&request.region, retry_count);
                warn!(
                    region = %request.region,
                    retry = retry_count,
                    max_retries = self.retry.max_retries,
                    delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    state = %WriteState::PendingRetry,
                    "Rate limited, retrying after delay"
                );
                tokio::time::sleep(delay).await;
                continue;
            }

            metrics::record_write_attempt(&request.region, "failed", elapsed);
            return self.fail(request, error, retry_count).await;
        }
    }

    /// Move a batch to the failed-write store and notify the handler.
    async fn fail(&self, request: AppendRequest, error: WriterError, retries: u32) -> DeliveryOutcome {
        let AppendRequest { region, rows, .. } = request;
        let row_count = rows.len();

        let failure = WriteFailure {
            region: region.clone(),
            rows: rows.clone(),
            error: error.clone(),
            attempts: retries + 1,
        };

        {
            let mut store = self.failed.lock().await;
            store.record_failure(region.clone(), rows);
            metrics::set_failed_batches(store.batch_count());
        }
        metrics::record_terminal_failure(&region, row_count);

        debug!(
            region = %region,
            rows = row_count,
            retries,
            state = %WriteState::Failed,
            "Batch moved to failed-write store"
        );

        // Clone out so the lock isn't held while user code runs
        let handler = Arc::clone(&*self.error_handler.read().await);
        handler(&failure);

        DeliveryOutcome::Failed {
            region,
            rows: row_count,
            retries,
            error,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RemoteError;
    use crate::remote::BoxFuture;
    use serde_json::json;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Remote that replays scripted responses, then succeeds.
    struct ScriptedTable {
        responses: std::sync::Mutex<VecDeque<Result<(), RemoteError>>>,
        calls: std::sync::Mutex<Vec<(tokio::time::Instant, AppendRequest)>>,
    }

    impl ScriptedTable {
        fn new(responses: Vec<Result<(), RemoteError>>) -> Self {
            Self {
                responses: std::sync::Mutex::new(responses.into()),
                calls: std::sync::Mutex::new(Vec::new()),
            }
        }

        fn call_times(&self) -> Vec<tokio::time::Instant> {
            self.calls.lock().unwrap().iter().map(|(t, _)| *t).collect()
        }

        fn call_count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }
    }

    impl RemoteTable for ScriptedTable {
        fn append_rows<'a>(&'a self, request: &'a AppendRequest) -> BoxFuture<'a, ()> {
            self.calls
                .lock()
                .unwrap()
                .push((tokio::time::Instant::now(), request.clone()));
            let response = self.responses.lock().unwrap().pop_front().unwrap_or(Ok(()));
            Box::pin(async move { response })
        }
    }

    fn rate_limited() -> Result<(), RemoteError> {
        Err(RemoteError::with_status(429, "Quota exceeded"))
    }

    fn dispatcher(
        table: Arc<ScriptedTable>,
        handler: ErrorHandler,
    ) -> (WriteDispatcher<ScriptedTable>, Arc<Mutex<FailedWriteStore>>) {
        let failed = Arc::new(Mutex::new(FailedWriteStore::new()));
        let mut config = WriterConfig::for_testing("sheet-1");
        config.retry.retry_delay_ms = 60_000;
        (
            WriteDispatcher::new(table, &config, Arc::clone(&failed), handler),
            failed,
        )
    }

    fn batch() -> RowBatch {
        vec![vec![json!("a"), json!(1)], vec![json!("b"), json!(2)]]
    }

    fn counting_handler() -> (ErrorHandler, Arc<AtomicUsize>) {
        let count = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&count);
        let handler: ErrorHandler = Arc::new(move |_failure: &WriteFailure| {
            c.fetch_add(1, Ordering::SeqCst);
        });
        (handler, count)
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_first_attempt() {
        let table = Arc::new(ScriptedTable::new(vec![]));
        let (handler, fired) = counting_handler();
        let (dispatcher, failed) = dispatcher(Arc::clone(&table), handler);

        let outcome = dispatcher.write("Sheet1!A:B".to_string(), batch()).await;

        assert!(outcome.is_delivered());
        assert_eq!(outcome.retries(), 0);
        assert_eq!(outcome.state(), WriteState::Done);
        assert_eq!(table.call_count(), 1);
        assert!(failed.lock().await.is_empty());
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_request_carries_options_and_rows() {
        let table = Arc::new(ScriptedTable::new(vec![]));
        let (dispatcher, _failed) = dispatcher(Arc::clone(&table), log_error_handler());

        dispatcher.write("Log!A1".to_string(), batch()).await;

        let calls = table.calls.lock().unwrap();
        let request = &calls[0].1;
        assert_eq!(request.destination_id, "sheet-1");
        assert_eq!(request.region, "Log!A1");
        assert_eq!(request.value_input_option, ValueInputOption::UserEntered);
        assert_eq!(request.insert_data_option, InsertDataOption::InsertRows);
        assert_eq!(request.rows, batch());
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limited_twice_then_success() {
        let table = Arc::new(ScriptedTable::new(vec![rate_limited(), rate_limited(), Ok(())]));
        let (handler, fired) = counting_handler();
        let (dispatcher, failed) = dispatcher(Arc::clone(&table), handler);

        let outcome = dispatcher.write("r".to_string(), batch()).await;

        assert!(outcome.is_delivered());
        assert_eq!(outcome.retries(), 2);
        assert_eq!(table.call_count(), 3);

        let times = table.call_times();
        assert!(times[1] - times[0] >= Duration::from_secs(60));
        assert!(times[2] - times[1] >= Duration::from_secs(60));

        assert!(failed.lock().await.is_empty());
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limit_exhausts_retries() {
        let table = Arc::new(ScriptedTable::new(vec![
            rate_limited(),
            rate_limited(),
            rate_limited(),
            rate_limited(),
        ]));
        let (handler, fired) = counting_handler();
        let (dispatcher, failed) = dispatcher(Arc::clone(&table), handler);

        let outcome = dispatcher.write("r".to_string(), batch()).await;

        // Initial attempt plus two retries, never a fourth
        assert_eq!(table.call_count(), 3);
        assert_eq!(outcome.state(), WriteState::Failed);
        assert_eq!(outcome.retries(), 2);
        match outcome {
            DeliveryOutcome::Failed { error, .. } => {
                assert!(matches!(error, WriterError::RateLimited { status: 429, .. }));
            }
            other => panic!("expected failure, got {:?}", other),
        }

        assert_eq!(failed.lock().await.get("r"), Some(&vec![batch()]));
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_rate_limit_failure_is_terminal_immediately() {
        let table = Arc::new(ScriptedTable::new(vec![Err(RemoteError::with_status(
            400,
            "Unable to parse range",
        ))]));
        let (handler, fired) = counting_handler();
        let (dispatcher, failed) = dispatcher(Arc::clone(&table), handler);

        let outcome = dispatcher.write("bad range".to_string(), batch()).await;

        assert_eq!(table.call_count(), 1);
        assert_eq!(outcome.retries(), 0);
        assert!(!outcome.is_delivered());
        assert_eq!(failed.lock().await.batch_count(), 1);
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_handler_receives_failure_detail() {
        let table = Arc::new(ScriptedTable::new(vec![Err(RemoteError::transport("reset"))]));
        let seen: Arc<std::sync::Mutex<Vec<WriteFailure>>> = Arc::default();
        let s = Arc::clone(&seen);
        let handler: ErrorHandler = Arc::new(move |f: &WriteFailure| s.lock().unwrap().push(f.clone()));
        let (dispatcher, _failed) = dispatcher(Arc::clone(&table), handler);

        dispatcher.write("r".to_string(), batch()).await;

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].region, "r");
        assert_eq!(seen[0].rows, batch());
        assert_eq!(seen[0].attempts, 1);
        assert_eq!(seen[0].error.status(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_replaced_handler_sees_later_failures_only() {
        let table = Arc::new(ScriptedTable::new(vec![
            Err(RemoteError::with_status(500, "first")),
            Err(RemoteError::with_status(500, "second")),
        ]));
        let (first, first_count) = counting_handler();
        let (second, second_count) = counting_handler();
        let (dispatcher, failed) = dispatcher(Arc::clone(&table), first);

        dispatcher.write("r".to_string(), batch()).await;
        dispatcher.set_error_handler(second).await;
        dispatcher.write("r".to_string(), batch()).await;

        assert_eq!(first_count.load(Ordering::SeqCst), 1);
        assert_eq!(second_count.load(Ordering::SeqCst), 1);
        assert_eq!(failed.lock().await.get("r").map(Vec::len), Some(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_spawned_write_resolves() {
        let table = Arc::new(ScriptedTable::new(vec![rate_limited()]));
        let (dispatcher, _failed) = dispatcher(Arc::clone(&table), log_error_handler());
        let dispatcher = Arc::new(dispatcher);

        let handle = dispatcher.spawn("r".to_string(), batch());
        let outcome = handle.await.unwrap();

        assert!(outcome.is_delivered());
        assert_eq!(outcome.region(), "r");
        assert_eq!(outcome.retries(), 1);
    }

    #[test]
    fn test_write_state_display() {
        assert_eq!(WriteState::Pending.to_string(), "Pending");
        assert_eq!(WriteState::PendingRetry.to_string(), "PendingRetry");
        assert_eq!(WriteState::Done.to_string(), "Done");
        assert_eq!(WriteState::Failed.to_string(), "Failed");
    }
}
