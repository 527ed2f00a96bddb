// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Summary types returned by the writer's flush and shutdown paths.

/// What a single flush cycle handed to the dispatcher.
///
/// Counts describe dispatched work, not delivered work: writes resolve
/// later in their own tasks.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct FlushSummary {
    /// Regions dispatched (one remote write each).
    pub regions: usize,
    /// Rows across all dispatched batches.
    pub rows: usize,
}

impl FlushSummary {
    /// True when the buffer was empty and nothing was dispatched.
    pub fn is_empty(&self) -> bool {
        self.regions == 0
    }
}

/// Result of [`BulkWriter::shutdown()`](super::BulkWriter::shutdown).
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ShutdownSummary {
    /// The final flush.
    pub flushed: FlushSummary,
    /// Writes that resolved (delivered or failed) before the deadline.
    pub completed: usize,
    /// Writes still outstanding at the deadline; left running detached.
    pub timed_out: usize,
}

impl ShutdownSummary {
    /// Every outstanding write resolved before the deadline.
    pub fn is_clean(&self) -> bool {
        self.timed_out == 0
    }
}
