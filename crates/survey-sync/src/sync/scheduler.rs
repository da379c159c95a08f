//! Interval triggering with an injected clock.
//!
//! [`SyncTicker`] only answers "is an interval attempt due?", so tests
//! drive it with a [`ManualClock`](super::clock::ManualClock) instead of
//! waiting. [`SyncScheduler`] pairs a ticker with an engine; with the
//! `runtime` feature it can also drive itself on a tokio timer.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use super::clock::Clock;
use super::engine::SyncEngine;
use super::types::SyncOutcome;

// ============================================================================
// SyncTicker
// ============================================================================

pub struct SyncTicker {
    interval_ms: i64,
    clock: Arc<dyn Clock>,
    next_due: Mutex<Option<i64>>,
}

impl SyncTicker {
    pub fn new(interval_ms: i64, clock: Arc<dyn Clock>) -> Self {
        Self {
            interval_ms: interval_ms.max(0),
            clock,
            next_due: Mutex::new(None),
        }
    }

    pub fn interval_ms(&self) -> i64 {
        self.interval_ms
    }

    /// Arm the ticker; the first tick is due one interval from now.
    pub fn start(&self) {
        *self.next_due.lock() = Some(self.clock.now_ms().saturating_add(self.interval_ms));
    }

    pub fn stop(&self) {
        *self.next_due.lock() = None;
    }

    pub fn is_running(&self) -> bool {
        self.next_due.lock().is_some()
    }

    /// `true` once per elapsed interval. Missed intervals collapse into one
    /// tick; the next deadline is measured from now.
    pub fn due(&self) -> bool {
        let now = self.clock.now_ms();
        let mut next = self.next_due.lock();
        match *next {
            Some(deadline) if now >= deadline => {
                *next = Some(now.saturating_add(self.interval_ms));
                true
            }
            _ => false,
        }
    }
}

// ============================================================================
// SyncScheduler
// ============================================================================

pub struct SyncScheduler {
    engine: Arc<SyncEngine>,
    ticker: SyncTicker,
    disposed: AtomicBool,
}

impl SyncScheduler {
    /// Scheduler using the engine's configured interval and clock.
    pub fn new(engine: Arc<SyncEngine>) -> Self {
        let ticker = SyncTicker::new(
            engine.config().sync_interval_ms,
            Arc::clone(engine.clock()),
        );
        Self::with_ticker(engine, ticker)
    }

    pub fn with_ticker(engine: Arc<SyncEngine>, ticker: SyncTicker) -> Self {
        Self {
            engine,
            ticker,
            disposed: AtomicBool::new(false),
        }
    }

    pub fn engine(&self) -> &Arc<SyncEngine> {
        &self.engine
    }

    pub fn ticker(&self) -> &SyncTicker {
        &self.ticker
    }

    pub fn start(&self) {
        if !self.disposed.load(Ordering::SeqCst) {
            self.ticker.start();
        }
    }

    pub fn stop(&self) {
        self.ticker.stop();
    }

    /// Run an interval attempt if one is due.
    pub async fn tick(&self) -> Option<SyncOutcome> {
        if self.disposed.load(Ordering::SeqCst) || !self.ticker.due() {
            return None;
        }
        Some(self.engine.on_interval().await)
    }

    /// Poll [`tick`](Self::tick) every `poll` until `shutdown` resolves or
    /// the scheduler is disposed, then make a final unload attempt.
    ///
    /// The future is not `Send`; run it on a current-thread runtime or a
    /// `LocalSet`.
    #[cfg(feature = "runtime")]
    pub async fn run<F>(&self, poll: std::time::Duration, shutdown: F)
    where
        F: std::future::Future<Output = ()>,
    {
        self.start();
        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                _ = tokio::time::sleep(poll) => {
                    if self.disposed.load(Ordering::SeqCst) {
                        break;
                    }
                    if let Some(outcome) = self.tick().await {
                        tracing::debug!(outcome = ?outcome, "interval sync finished");
                    }
                }
            }
        }
        self.stop();
        let outcome = self.engine.on_unload().await;
        tracing::debug!(outcome = ?outcome, "scheduler stopped");
    }

    pub fn dispose(&self) {
        self.disposed.store(true, Ordering::SeqCst);
        self.ticker.stop();
    }
}
