// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Builder for [`BulkWriter`].
//!
//! Validation happens in [`BulkWriterBuilder::build()`], before any buffer,
//! dispatcher or scheduler exists.

use super::BulkWriter;
use crate::config::{InsertDataOption, ValueInputOption, WriterConfig};
use crate::dispatch::{ErrorHandler, WriteFailure};
use crate::error::{Result, WriterError};
use crate::remote::RemoteTable;
use crate::resilience::RetryPolicy;
use std::sync::Arc;
use std::time::Duration;

/// Collects the client handle and configuration for a [`BulkWriter`].
pub struct BulkWriterBuilder<R: RemoteTable> {
    client: Option<Arc<R>>,
    config: WriterConfig,
    error_handler: Option<ErrorHandler>,
}

impl<R: RemoteTable> Default for BulkWriterBuilder<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: RemoteTable> BulkWriterBuilder<R> {
    pub fn new() -> Self {
        Self {
            client: None,
            config: WriterConfig::default(),
            error_handler: None,
        }
    }

    /// Authenticated client for the remote table. Required.
    pub fn client(mut self, client: Arc<R>) -> Self {
        self.client = Some(client);
        self
    }

    /// Replace the whole configuration.
    pub fn config(mut self, config: WriterConfig) -> Self {
        self.config = config;
        self
    }

    /// Spreadsheet/table identifier. Required.
    pub fn destination_id(mut self, destination_id: impl Into<String>) -> Self {
        self.config.destination_id = destination_id.into();
        self
    }

    /// Flush period, between [`crate::config::MIN_INTERVAL`] and [`crate::config::MAX_INTERVAL`].
    pub fn interval(mut self, interval: Duration) -> Self {
        self.config.interval_ms = u64::try_from(interval.as_millis()).unwrap_or(u64::MAX);
        self
    }

    pub fn value_input_option(mut self, option: ValueInputOption) -> Self {
        self.config.value_input_option = option;
        self
    }

    pub fn insert_data_option(mut self, option: InsertDataOption) -> Self {
        self.config.insert_data_option = option;
        self
    }

    pub fn retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.config.retry = retry;
        self
    }

    /// Callback for terminal write failures. Defaults to logging them.
    pub fn error_handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(&WriteFailure) + Send + Sync + 'static,
    {
        self.error_handler = Some(Arc::new(handler));
        self
    }

    /// Validate and construct the writer. The scheduler starts stopped.
    pub fn build(self) -> Result<BulkWriter<R>> {
        let client = self
            .client
            .ok_or_else(|| WriterError::Config("No client provided".to_string()))?;
        self.config.validate()?;

        BulkWriter::from_parts(client, self.config, self.error_handler)
    }
}
