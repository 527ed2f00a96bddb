//! Shared test utilities for integration and property tests.
//!
//! This module provides:
//! - A scripted mock RemoteTable that records every append call
//! - Row and writer construction helpers

pub mod mock_table;

pub use mock_table::*;

use bulk_writer::{BulkWriter, Row, WriterConfig};
use serde_json::json;
use std::sync::Arc;

/// Single-cell row holding `n`.
#[allow(dead_code)]
pub fn row(n: i64) -> Row {
    vec![json!(n)]
}

/// Writer over `table` with the minimum interval and the given config tweaks.
#[allow(dead_code)]
pub fn writer_with(table: Arc<MockTable>, config: WriterConfig) -> BulkWriter<MockTable> {
    BulkWriter::builder()
        .client(table)
        .config(config)
        .build()
        .expect("valid test config")
}
