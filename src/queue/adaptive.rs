//! Latency-driven adjustment of the in-flight batch bound.

use std::collections::VecDeque;
use std::time::Duration;

use crate::config::{Concurrency, DEFAULT_IN_FLIGHT, DEFAULT_IN_FLIGHT_CEILING, QueueConfig};

/// Tracks a bounded window of recent batch round-trip latencies and moves
/// the in-flight bound one step at a time.
///
/// The bound never leaves `[1, ceiling]`, and no adjustment happens until a
/// full window of samples has been observed; the window is cleared after
/// each adjustment so a single sample can never swing the bound twice.
pub(crate) struct ConcurrencyController {
    bound: usize,
    ceiling: usize,
    window: VecDeque<Duration>,
    window_len: usize,
    fast: Duration,
    slow: Duration,
    adaptive: bool,
}

impl ConcurrencyController {
    pub fn new(cfg: &QueueConfig) -> Self {
        let (bound, ceiling, adaptive) = match cfg.concurrency {
            Concurrency::Fixed(n) => {
                let n = n.max(1);
                (n, n, false)
            }
            Concurrency::Auto => (DEFAULT_IN_FLIGHT, DEFAULT_IN_FLIGHT_CEILING, true),
        };
        Self {
            bound,
            ceiling,
            window: VecDeque::with_capacity(cfg.latency_window),
            window_len: cfg.latency_window.max(1),
            fast: cfg.fast_threshold,
            slow: cfg.slow_threshold,
            adaptive,
        }
    }

    pub fn bound(&self) -> usize {
        self.bound
    }

    /// Latencies currently in the window, oldest first.
    pub fn recent_latencies(&self) -> Vec<Duration> {
        self.window.iter().copied().collect()
    }

    /// Record one batch latency. Returns the new bound when it changed.
    pub fn record(&mut self, sample: Duration) -> Option<usize> {
        if !self.adaptive {
            return None;
        }
        if self.window.len() == self.window_len {
            self.window.pop_front();
        }
        self.window.push_back(sample);
        if self.window.len() < self.window_len {
            return None;
        }

        let total: Duration = self.window.iter().sum();
        let average = total / self.window.len() as u32;
        let next = if average < self.fast {
            (self.bound + 1).min(self.ceiling)
        } else if average > self.slow {
            self.bound.saturating_sub(1).max(1)
        } else {
            self.bound
        };
        self.window.clear();

        if next != self.bound {
            self.bound = next;
            Some(next)
        } else {
            None
        }
    }
}
