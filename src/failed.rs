// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Store for batches that failed terminally.
//!
//! A batch lands here when the remote rejects it with a non-rate-limit
//! error, or keeps rate-limiting it past the retry budget. Entries
//! accumulate across flush cycles and are only removed by an explicit
//! clear; nothing here is retried automatically.

use crate::buffer::RowBatch;
use std::collections::HashMap;

/// Failed batches keyed by region, oldest first.
#[derive(Debug, Default, Clone)]
pub struct FailedWriteStore {
    failed: HashMap<String, Vec<RowBatch>>,
}

impl FailedWriteStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a failed batch under `region`.
    pub fn record_failure(&mut self, region: impl Into<String>, batch: RowBatch) {
        self.failed.entry(region.into()).or_default().push(batch);
    }

    /// Copy of every failed batch.
    pub fn snapshot(&self) -> HashMap<String, Vec<RowBatch>> {
        self.failed.clone()
    }

    pub fn get(&self, region: &str) -> Option<&Vec<RowBatch>> {
        self.failed.get(region)
    }

    pub fn clear_region(&mut self, region: &str) -> Option<Vec<RowBatch>> {
        self.failed.remove(region)
    }

    pub fn clear_all(&mut self) {
        self.failed.clear();
    }

    /// Number of regions with at least one failed batch.
    pub fn len(&self) -> usize {
        self.failed.len()
    }

    /// Total failed batches across all regions.
    pub fn batch_count(&self) -> usize {
        self.failed.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.failed.is_empty()
    }
}
