// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Remote table integration trait.
//!
//! Defines what the writer needs from the rate-limited tabular-data service.
//! Authentication and client construction belong to the host; it hands the
//! writer an `Arc` of something implementing [`RemoteTable`].
//!
//! # Example
//!
//! ```rust,no_run
//! use bulk_writer::remote::{AppendRequest, BoxFuture, RemoteTable};
//!
//! struct MyClient { /* authenticated HTTP client */ }
//!
//! impl RemoteTable for MyClient {
//!     fn append_rows<'a>(&'a self, request: &'a AppendRequest) -> BoxFuture<'a, ()> {
//!         Box::pin(async move {
//!             // POST {destination_id}/values/{region}:append
//!             let _ = request.rows.len();
//!             Ok(())
//!         })
//!     }
//! }
//! ```

use crate::buffer::RowBatch;
use crate::config::{InsertDataOption, ValueInputOption};
use crate::error::RemoteError;
use std::future::Future;
use std::pin::Pin;

/// Result type for remote table operations.
pub type RemoteResult<T> = std::result::Result<T, RemoteError>;

/// Type alias for boxed async futures (reduces trait signature complexity).
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = RemoteResult<T>> + Send + 'a>>;

/// One combined append call for a single region.
///
/// `value_input_option` and `insert_data_option` are forwarded verbatim
/// from the writer configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct AppendRequest {
    pub destination_id: String,
    pub region: String,
    pub value_input_option: ValueInputOption,
    pub insert_data_option: InsertDataOption,
    pub rows: RowBatch,
}

/// Trait defining what we need from the remote table client.
///
/// Implementations return `Err(RemoteError)` with the response status code
/// when the service rejects the request. The writer decides which status
/// means "rate limited"; the client does no retrying of its own.
pub trait RemoteTable: Send + Sync + 'static {
    /// Append `request.rows` after the last row of `request.region`.
    fn append_rows<'a>(&'a self, request: &'a AppendRequest) -> BoxFuture<'a, ()>;
}
