//! Mock RemoteTable for testing.
//!
//! Records every append_rows() call with the (Tokio) time it was made.
//! Responses are scripted per region; unscripted calls succeed.
//! An optional gate holds calls open to simulate slow writes.

use bulk_writer::remote::{AppendRequest, BoxFuture, RemoteTable};
use bulk_writer::RemoteError;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::{RwLock, Semaphore};
use tokio::time::Instant;

/// A scripted response for one call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Response {
    Ok,
    Status(u16),
}

/// A recorded append_rows() call.
#[derive(Debug, Clone)]
pub struct AppendCall {
    pub request: AppendRequest,
    pub at: Instant,
}

/// Mock implementation of RemoteTable that records all calls.
///
/// # Example
/// ```rust,ignore
/// let mock = MockTable::new();
///
/// // Two rate limits, then success
/// mock.script("a", [Response::Status(429), Response::Status(429)]).await;
///
/// // Use in tests...
///
/// let calls = mock.calls_for("a").await;
/// assert_eq!(calls.len(), 3);
/// ```
pub struct MockTable {
    calls: RwLock<Vec<AppendCall>>,
    /// Queued responses per region, consumed in order
    scripts: RwLock<HashMap<String, VecDeque<Response>>>,
    /// Regions that answer every call with this status
    always: RwLock<HashMap<String, u16>>,
    /// When set, each call waits for a permit before responding
    gate: Option<Arc<Semaphore>>,
}

impl MockTable {
    /// Create a mock that accepts every call.
    pub fn new() -> Self {
        Self {
            calls: RwLock::new(Vec::new()),
            scripts: RwLock::new(HashMap::new()),
            always: RwLock::new(HashMap::new()),
            gate: None,
        }
    }

    /// Create a mock whose calls block until [`release()`](Self::release).
    #[allow(dead_code)]
    pub fn gated() -> Self {
        Self {
            gate: Some(Arc::new(Semaphore::new(0))),
            ..Self::new()
        }
    }

    /// Let `n` blocked (or future) calls through.
    #[allow(dead_code)]
    pub fn release(&self, n: usize) {
        if let Some(ref gate) = self.gate {
            gate.add_permits(n);
        }
    }

    /// Queue responses for `region`. Calls beyond the script succeed.
    #[allow(dead_code)]
    pub async fn script(&self, region: &str, responses: impl IntoIterator<Item = Response>) {
        self.scripts
            .write()
            .await
            .entry(region.to_string())
            .or_default()
            .extend(responses);
    }

    /// Answer every call for `region` with `status`.
    #[allow(dead_code)]
    pub async fn always_fail(&self, region: &str, status: u16) {
        self.always.write().await.insert(region.to_string(), status);
    }

    // =========================================================================
    // Query Methods
    // =========================================================================

    /// All recorded calls, in call order.
    pub async fn calls(&self) -> Vec<AppendCall> {
        self.calls.read().await.clone()
    }

    /// Recorded calls for one region, in call order.
    #[allow(dead_code)]
    pub async fn calls_for(&self, region: &str) -> Vec<AppendCall> {
        self.calls
            .read()
            .await
            .iter()
            .filter(|c| c.request.region == region)
            .cloned()
            .collect()
    }

    #[allow(dead_code)]
    pub async fn call_count(&self) -> usize {
        self.calls.read().await.len()
    }

    /// Yield until at least `n` calls have been recorded.
    #[allow(dead_code)]
    pub async fn wait_for_calls(&self, n: usize) {
        while self.call_count().await < n {
            tokio::task::yield_now().await;
        }
    }

    async fn next_response(&self, region: &str) -> Response {
        if let Some(status) = self.always.read().await.get(region) {
            return Response::Status(*status);
        }
        self.scripts
            .write()
            .await
            .get_mut(region)
            .and_then(|queue| queue.pop_front())
            .unwrap_or(Response::Ok)
    }
}

impl Default for MockTable {
    fn default() -> Self {
        Self::new()
    }
}

impl RemoteTable for MockTable {
    fn append_rows<'a>(&'a self, request: &'a AppendRequest) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            self.calls.write().await.push(AppendCall {
                request: request.clone(),
                at: Instant::now(),
            });

            if let Some(ref gate) = self.gate {
                let permit = gate.acquire().await.expect("gate closed");
                permit.forget();
            }

            match self.next_response(&request.region).await {
                Response::Ok => Ok(()),
                Response::Status(status) => {
                    Err(RemoteError::with_status(status, format!("status {}", status)))
                }
            }
        })
    }
}
