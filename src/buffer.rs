// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Pending-row buffer keyed by destination region.
//!
//! Rows accumulate per region in append order and are drained all at once
//! by the flush cycle.
//!
//! # Design
//!
//! ```text
//! append(region, row) ──▶ RowBuffer ──▶ drain_all() ──▶ one write per region
//!                         │
//!                         │ HashMap<region, Vec<Row>>
//!                         │ (append order kept)
//! ```
//!
//! `drain_all()` swaps the map for an empty one. The writer calls it under
//! the same lock that guards `append`, so a drain is a point-in-time
//! snapshot: rows appended afterwards land in the next cycle.

use serde_json::Value;
use std::collections::HashMap;

/// One row of cell values.
pub type Row = Vec<Value>;

/// Ordered rows destined for one region.
pub type RowBatch = Vec<Row>;

/// Accumulates rows per region until the next drain.
#[derive(Debug, Default, Clone)]
pub struct RowBuffer {
    pending: HashMap<String, RowBatch>,
}

impl RowBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a row for `region`, creating the region's batch on first use.
    pub fn append(&mut self, region: impl Into<String>, row: Row) {
        self.pending.entry(region.into()).or_default().push(row);
    }

    /// Take every pending batch, leaving the buffer empty.
    pub fn drain_all(&mut self) -> HashMap<String, RowBatch> {
        std::mem::take(&mut self.pending)
    }

    /// Discard the pending batch for one region.
    ///
    /// Returns the discarded batch, if the region had one.
    pub fn clear_region(&mut self, region: &str) -> Option<RowBatch> {
        self.pending.remove(region)
    }

    pub fn clear_all(&mut self) {
        self.pending.clear();
    }

    /// Copy of the pending batches (does not consume).
    pub fn snapshot(&self) -> HashMap<String, RowBatch> {
        self.pending.clone()
    }

    /// Pending rows for one region.
    pub fn get(&self, region: &str) -> Option<&RowBatch> {
        self.pending.get(region)
    }

    /// Number of regions with pending rows.
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// Total pending rows across all regions.
    pub fn row_count(&self) -> usize {
        self.pending.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}
