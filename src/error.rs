// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Error types for the bulk writer.
//!
//! Errors fall into three groups: configuration problems surfaced
//! synchronously to the caller, rate-limit signals from the remote table
//! (absorbed by bounded retry), and terminal write failures that are
//! recorded in the failed-write store and reported to the error handler.
//!
//! # Error Categories
//!
//! | Error Type | Retryable | Description |
//! |------------|-----------|-------------|
//! | `Config` | No | Missing client/destination, interval out of range, unusable backoff factor |
//! | `RateLimited` | Yes | Remote returned the rate-limit status code |
//! | `Remote` | No | Any other remote failure |
//! | `InvalidState` | No | Lifecycle violation (e.g. `start()` after shutdown) |
//!
//! # Propagation
//!
//! Only `Config` and `InvalidState` are ever returned from public methods.
//! Write-path errors never escape the dispatcher; they are observable
//! through [`crate::BulkWriter::error_values()`] and the error handler.

use crate::resilience::RetryPolicy;
use thiserror::Error;

/// Result type alias for bulk writer operations.
pub type Result<T> = std::result::Result<T, WriterError>;

/// Errors that can occur while configuring or running a bulk writer.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WriterError {
    /// Invalid or missing configuration.
    ///
    /// Returned by [`crate::BulkWriterBuilder::build()`] and
    /// [`crate::BulkWriter::set_interval()`]. Prior state is left untouched.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The remote table throttled the request.
    ///
    /// Retried automatically until the retry budget is spent; only seen by
    /// the error handler once retries are exhausted.
    #[error("Rate limited ({region}): status {status}, {message}")]
    RateLimited {
        region: String,
        status: u16,
        message: String,
    },

    /// Any remote failure other than a rate limit. Terminal immediately.
    #[error("Remote write failed ({region}): {message}")]
    Remote {
        region: String,
        status: Option<u16>,
        message: String,
    },

    /// Lifecycle violation.
    #[error("Invalid state: expected {expected}, got {actual}")]
    InvalidState { expected: String, actual: String },
}

impl WriterError {
    /// Classify a remote failure for `region`.
    ///
    /// A status the policy treats as a rate limit maps to
    /// [`WriterError::RateLimited`], everything else to [`WriterError::Remote`].
    pub fn from_remote(region: impl Into<String>, err: RemoteError, policy: &RetryPolicy) -> Self {
        match err.status {
            Some(status) if policy.is_rate_limit(Some(status)) => Self::RateLimited {
                region: region.into(),
                status,
                message: err.message,
            },
            status => Self::Remote {
                region: region.into(),
                status,
                message: err.message,
            },
        }
    }

    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::RateLimited { .. } => true,
            Self::Config(_) => false,
            Self::Remote { .. } => false,
            Self::InvalidState { .. } => false,
        }
    }

    /// Status code reported by the remote table, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::RateLimited { status, .. } => Some(*status),
            Self::Remote { status, .. } => *status,
            _ => None,
        }
    }
}

/// Error returned by a [`crate::remote::RemoteTable`] implementation.
///
/// `status` carries the HTTP-like status code when the remote produced one;
/// transport failures without a response leave it `None`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("remote error (status {status:?}): {message}")]
pub struct RemoteError {
    pub status: Option<u16>,
    pub message: String,
}

impl RemoteError {
    /// Error carrying a status code.
    pub fn with_status(status: u16, message: impl Into<String>) -> Self {
        Self {
            status: Some(status),
            message: message.into(),
        }
    }

    /// Error without a status code (connection reset, DNS failure, ...).
    pub fn transport(message: impl Into<String>) -> Self {
        Self {
            status: None,
            message: message.into(),
        }
    }
}
