// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Periodic flush scheduler.
//!
//! Arms a Tokio task that invokes a flush callback every `interval`. The
//! scheduler is latched: a second `start()` while running is a no-op, so
//! there is never more than one timer per scheduler.
//!
//! # State Transitions
//!
//! ```text
//!          start()
//! Stopped ────────→ Running
//!    ↑                 │
//!    └──── stop() ─────┘
//!
//! set_interval() while Running = stop() + start() with the new interval
//! ```
//!
//! The first tick fires one full interval after arming. Missed ticks (a
//! flush slower than the interval) are delayed rather than bursted.

use crate::config::validate_interval;
use crate::error::Result;
use crate::metrics;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info};

/// Future returned by a flush callback.
pub type FlushFuture = Pin<Box<dyn Future<Output = ()> + Send>>;

type FlushFn = Arc<dyn Fn() -> FlushFuture + Send + Sync>;

/// Scheduler state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    /// No timer armed.
    Stopped,
    /// Timer armed; flushes fire every interval.
    Running,
}

impl std::fmt::Display for SchedulerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SchedulerState::Stopped => write!(f, "Stopped"),
            SchedulerState::Running => write!(f, "Running"),
        }
    }
}

/// Arms and disarms the periodic flush timer.
pub struct FlushScheduler {
    interval: Duration,
    flush: FlushFn,
    /// Present while running; sending `true` (or dropping) stops the timer task.
    stop_tx: Option<watch::Sender<bool>>,
}

impl FlushScheduler {
    /// Create a stopped scheduler.
    ///
    /// Fails if `interval` is outside [`crate::config::MIN_INTERVAL`]..=[`crate::config::MAX_INTERVAL`].
    pub fn new<F, Fut>(interval: Duration, flush: F) -> Result<Self>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        validate_interval(interval)?;
        Ok(Self {
            interval,
            flush: Arc::new(move || Box::pin(flush()) as FlushFuture),
            stop_tx: None,
        })
    }

    pub fn state(&self) -> SchedulerState {
        if self.stop_tx.is_some() {
            SchedulerState::Running
        } else {
            SchedulerState::Stopped
        }
    }

    pub fn is_running(&self) -> bool {
        self.state() == SchedulerState::Running
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Arm the timer.
    ///
    /// Returns `false` (and does nothing) when already running. Must be
    /// called from within a Tokio runtime.
    pub fn start(&mut self) -> bool {
        if self.stop_tx.is_some() {
            debug!("Flush scheduler already running");
            return false;
        }

        let (stop_tx, stop_rx) = watch::channel(false);
        let flush = Arc::clone(&self.flush);
        let interval = self.interval;

        // Detached: the task exits once the stop signal fires or the sender drops
        let _timer = tokio::spawn(run_timer(interval, flush, stop_rx));

        self.stop_tx = Some(stop_tx);
        metrics::set_scheduler_state("Running");
        metrics::set_flush_interval(interval);
        info!(
            interval_ms = u64::try_from(interval.as_millis()).unwrap_or(u64::MAX),
            "Flush scheduler started"
        );
        true
    }

    /// Disarm the timer. Returns `false` when already stopped.
    ///
    /// A flush already in progress is allowed to finish.
    pub fn stop(&mut self) -> bool {
        match self.stop_tx.take() {
            Some(stop_tx) => {
                let _ = stop_tx.send(true);
                metrics::set_scheduler_state("Stopped");
                info!("Flush scheduler stopped");
                true
            }
            None => false,
        }
    }

    /// `stop()` followed by `start()`.
    pub fn restart(&mut self) {
        self.stop();
        self.start();
    }

    /// Change the flush interval.
    ///
    /// Rejects intervals below the minimum and keeps the old one. A running
    /// timer is restarted so the new interval takes effect immediately; a
    /// stopped scheduler uses it on the next `start()`.
    pub fn set_interval(&mut self, interval: Duration) -> Result<()> {
        validate_interval(interval)?;
        self.interval = interval;
        if self.is_running() {
            self.restart();
        }
        Ok(())
    }
}

impl Drop for FlushScheduler {
    fn drop(&mut self) {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(true);
        }
    }
}

impl std::fmt::Debug for FlushScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FlushScheduler")
            .field("interval", &self.interval)
            .field("state", &self.state())
            .finish()
    }
}

/// Timer loop: flush on every tick until the stop signal fires.
async fn run_timer(interval: Duration, flush: FlushFn, mut stop_rx: watch::Receiver<bool>) {
    // Mark initial value as seen so changed() only fires on actual changes
    if *stop_rx.borrow_and_update() {
        return;
    }

    let now = Instant::now();
    let first_tick = now.checked_add(interval).unwrap_or_else(|| far_future(now));
    let mut timer = tokio::time::interval_at(first_tick, interval);
    timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;

            // Priority: check stop first
            result = stop_rx.changed() => {
                if result.is_err() || *stop_rx.borrow() {
                    debug!("Flush timer stopping");
                    break;
                }
                continue;
            }

            _ = timer.tick() => {
                debug!("Flush timer tick");
                (flush)().await;
            }
        }
    }
}

/// Roughly 30 years out; used when `now + interval` would overflow.
fn far_future(now: Instant) -> Instant {
    now + Duration::from_secs(86_400 * 365 * 30)
}
