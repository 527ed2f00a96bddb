// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! # Bulk Writer
//!
//! A write-coalescing buffer in front of a rate-limited remote table service.
//!
//! ## Architecture
//!
//! Callers append rows keyed by a region (a range such as `"Sheet1!A:D"`).
//! Rows accumulate in memory and are flushed periodically, one combined
//! append request per region:
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────────────────┐
//! │                               BulkWriter                                  │
//! │                                                                           │
//! │  append() ──► ┌───────────┐   flush()   ┌────────────────┐                │
//! │               │ RowBuffer │────────────►│ WriteDispatcher│──► RemoteTable │
//! │               │ (region → │  (swap for  │ (one task per  │   (append_rows)│
//! │               │   rows)   │   empty)    │  region)       │                │
//! │               └───────────┘             └────────────────┘                │
//! │                     ▲                          │  429 → sleep, retry      │
//! │                     │                          ▼                          │
//! │              ┌──────────────┐         ┌──────────────────┐                │
//! │              │FlushScheduler│         │ FailedWriteStore │ + error handler│
//! │              │ (interval)   │         │ (terminal fails) │                │
//! │              └──────────────┘         └──────────────────┘                │
//! └───────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Delivery
//!
//! - Rate-limited writes (status 429 by default) are retried after a fixed
//!   delay, up to `max_retries` times
//! - Anything else fails the batch immediately
//! - Failed batches are kept for inspection and passed to the error handler
//!
//! Retries run in their own tasks; a slow region never holds back the next
//! flush or any other region.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use bulk_writer::{BulkWriter, WriterConfig};
//! # use bulk_writer::remote::{AppendRequest, BoxFuture, RemoteTable};
//! # struct SheetsClient;
//! # impl RemoteTable for SheetsClient {
//! #     fn append_rows<'a>(&'a self, _r: &'a AppendRequest) -> BoxFuture<'a, ()> { Box::pin(async { Ok(()) }) }
//! # }
//! use serde_json::json;
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> bulk_writer::Result<()> {
//!     let config: WriterConfig = serde_json::from_str(
//!         r#"{ "destination_id": "my-sheet", "interval_ms": 30000 }"#,
//!     ).expect("valid config");
//!
//!     let writer = BulkWriter::builder()
//!         .client(Arc::new(SheetsClient))
//!         .config(config)
//!         .error_handler(|failure| eprintln!("lost {} rows", failure.rows.len()))
//!         .build()?;
//!
//!     writer.start().await?;
//!     writer.append("Events!A:B", vec![json!("signup"), json!(42)]).await;
//!
//!     writer.shutdown(Duration::from_secs(10)).await;
//!     Ok(())
//! }
//! ```

pub mod buffer;
pub mod config;
pub mod coordinator;
pub mod dispatch;
pub mod error;
pub mod failed;
pub mod metrics;
pub mod remote;
pub mod resilience;
pub mod scheduler;

// Re-exports for convenience
pub use buffer::{Row, RowBatch, RowBuffer};
pub use config::{InsertDataOption, ValueInputOption, WriterConfig};
pub use coordinator::{BulkWriter, BulkWriterBuilder, FlushSummary, ShutdownSummary};
pub use dispatch::{DeliveryOutcome, ErrorHandler, WriteFailure, WriteState};
pub use error::{RemoteError, Result, WriterError};
pub use failed::FailedWriteStore;
pub use remote::{AppendRequest, RemoteTable};
pub use resilience::{RateLimitConfig, RetryPolicy};
pub use scheduler::SchedulerState;
