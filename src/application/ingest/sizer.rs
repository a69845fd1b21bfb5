//! Feedback controller for flush batch sizing.

use std::time::Duration;

use tracing::debug;

/// Maps observed flush latency onto the next batch size.
///
/// The size doubles while flushes finish well under the target latency,
/// halves when they overshoot it badly, and stays put in between. Bounds
/// are inclusive; [`reset`](Self::reset) drops back to the minimum when
/// the buffer goes idle.
#[derive(Debug)]
pub struct AdaptiveBatchSizer {
    current: usize,
    min: usize,
    max: usize,
    target_latency: Duration,
}

impl AdaptiveBatchSizer {
    pub fn new(min: usize, max: usize, target_latency: Duration) -> Self {
        Self {
            current: min,
            min,
            max,
            target_latency,
        }
    }

    pub fn current_size(&self) -> usize {
        self.current
    }

    /// Feed one observation: the latency of the flush that just completed
    /// and how many messages it actually carried.
    pub fn adjust(&mut self, observed: Duration, batch_size: usize) {
        let target = self.target_latency;
        let previous = self.current;
        if observed < target / 2 {
            self.current = (self.current * 2).min(self.max);
        } else if observed > target + target / 2 {
            self.current = (self.current / 2).max(self.min);
        }
        if self.current != previous {
            debug!(
                observed_ms = observed.as_millis() as u64,
                batch_size,
                from = previous,
                to = self.current,
                "Adjusted batch size"
            );
        }
    }

    /// Return to the minimum size; called when the buffer is idle.
    pub fn reset(&mut self) {
        self.current = self.min;
    }
}
