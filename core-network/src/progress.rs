//! # Transfer Progress Emitter
//!
//! Throttled `d-p` / `u-p` progress events for file downloads and uploads.
//!
//! Emission rules for one transfer:
//! - the first chunk always emits
//! - afterwards at most one non-terminal event per interval
//! - once `transferred` reaches a known total, only the terminal event may
//!   report it
//! - [`ProgressEmitter::finish`] always emits, exactly once
//!
//! The emitter only observes byte counts; it never touches the data.

use std::time::Duration;

use core_runtime::events::{EventBus, TransferEvent};
use tokio::time::Instant;
use tracing::trace;

/// Allows one emission per `interval`.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    interval: Duration,
    last_emit: Option<Instant>,
}

impl RateLimiter {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_emit: None,
        }
    }

    /// Returns whether an emission at `now` is allowed, and if so records it.
    pub fn should_emit(&mut self, now: Instant) -> bool {
        let allowed = match self.last_emit {
            None => true,
            Some(last) => now.saturating_duration_since(last) >= self.interval,
        };
        if allowed {
            self.last_emit = Some(now);
        }
        allowed
    }

    /// Record an emission that bypassed the limiter.
    pub fn mark(&mut self, now: Instant) {
        self.last_emit = Some(now);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Download,
    Upload,
}

/// Progress state of one body write or read.
pub struct ProgressEmitter {
    bus: EventBus,
    request_id: String,
    direction: Direction,
    total: i64,
    transferred: u64,
    limiter: RateLimiter,
    finished: bool,
}

impl ProgressEmitter {
    /// `total` is the expected byte count, or -1 when unknown.
    pub fn new(
        bus: EventBus,
        request_id: impl Into<String>,
        direction: Direction,
        total: i64,
        interval: Duration,
    ) -> Self {
        Self {
            bus,
            request_id: request_id.into(),
            direction,
            total,
            transferred: 0,
            limiter: RateLimiter::new(interval),
            finished: false,
        }
    }

    pub fn transferred(&self) -> u64 {
        self.transferred
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn on_bytes(&mut self, count: usize) {
        self.on_bytes_at(count, Instant::now());
    }

    pub fn on_bytes_at(&mut self, count: usize, now: Instant) {
        self.transferred += count as u64;
        if self.finished || self.reached_total() {
            return;
        }
        if self.limiter.should_emit(now) {
            self.emit();
        }
    }

    /// Emit the terminal event. Later calls do nothing.
    pub fn finish(&mut self) {
        if self.finished {
            return;
        }
        self.finished = true;
        self.limiter.mark(Instant::now());
        self.emit();
    }

    fn reached_total(&self) -> bool {
        self.total >= 0 && self.transferred >= self.total as u64
    }

    fn emit(&self) {
        let request_id = self.request_id.clone();
        let transferred = self.transferred;
        let total = self.total;
        let event = match self.direction {
            Direction::Download => TransferEvent::Download {
                request_id,
                transferred,
                total,
            },
            Direction::Upload => TransferEvent::Upload {
                request_id,
                transferred,
                total,
            },
        };
        trace!(request_id = %self.request_id, transferred, total, "Transfer progress");
        // Nobody listening is fine.
        self.bus.emit(event).ok();
    }
}
