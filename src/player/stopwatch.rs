//! Listening-time stopwatch.

use std::sync::Arc;
use std::time::{Duration, Instant};

/// Source of the current instant, swappable in tests.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

/// Wall clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Accumulates time only while running.
pub struct Stopwatch {
    clock: Arc<dyn Clock>,
    started: Option<Instant>,
    elapsed: Duration,
}

impl Stopwatch {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            started: None,
            elapsed: Duration::ZERO,
        }
    }

    /// Start timing. No-op if already running.
    pub fn start(&mut self) {
        if self.started.is_none() {
            self.started = Some(self.clock.now());
        }
    }

    /// Stop timing and bank the running segment. No-op if stopped.
    pub fn stop(&mut self) {
        if let Some(started) = self.started.take() {
            self.elapsed += self.clock.now().saturating_duration_since(started);
        }
    }

    pub fn is_running(&self) -> bool {
        self.started.is_some()
    }

    pub fn elapsed(&self) -> Duration {
        let running = self
            .started
            .map(|s| self.clock.now().saturating_duration_since(s))
            .unwrap_or_default();
        self.elapsed + running
    }

    /// Zero the total and stop.
    pub fn reset(&mut self) {
        self.started = None;
        self.elapsed = Duration::ZERO;
    }
}

impl Default for Stopwatch {
    fn default() -> Self {
        Self::new(Arc::new(SystemClock))
    }
}
