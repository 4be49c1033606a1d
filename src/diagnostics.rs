//! Lightweight in-process diagnostics
//!
//! A rolling latency window for recall calls. Samples are kept in a fixed
//! 200-slot ring; a summary line (count, p50, p95) goes to the diagnostics
//! stream every few records.

use std::collections::VecDeque;
use std::sync::Mutex;
use tracing::debug;

const WINDOW_CAPACITY: usize = 200;
const EMIT_INTERVAL: u64 = 25;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LatencySnapshot {
    pub count: usize,
    pub p50_ms: f64,
    pub p95_ms: f64,
}

/// Rolling latency window.
pub struct LatencyWindow {
    samples: Mutex<VecDeque<f64>>,
    recorded: Mutex<u64>,
}

impl LatencyWindow {
    pub fn new() -> Self {
        Self {
            samples: Mutex::new(VecDeque::with_capacity(WINDOW_CAPACITY)),
            recorded: Mutex::new(0),
        }
    }

    /// Record one sample in milliseconds, periodically emitting a summary.
    pub fn record(&self, millis: f64) {
        if let Ok(mut samples) = self.samples.lock() {
            if samples.len() == WINDOW_CAPACITY {
                samples.pop_front();
            }
            samples.push_back(millis);
        }

        let should_emit = {
            match self.recorded.lock() {
                Ok(mut recorded) => {
                    *recorded += 1;
                    *recorded % EMIT_INTERVAL == 0
                }
                Err(_) => false,
            }
        };

        if should_emit {
            if let Some(snapshot) = self.snapshot() {
                debug!(
                    "recall latency: count={} p50={:.1}ms p95={:.1}ms",
                    snapshot.count, snapshot.p50_ms, snapshot.p95_ms
                );
            }
        }
    }

    pub fn snapshot(&self) -> Option<LatencySnapshot> {
        let samples = self.samples.lock().ok()?;
        if samples.is_empty() {
            return None;
        }
        let mut sorted: Vec<f64> = samples.iter().copied().collect();
        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        Some(LatencySnapshot {
            count: sorted.len(),
            p50_ms: percentile(&sorted, 0.50),
            p95_ms: percentile(&sorted, 0.95),
        })
    }
}

impl Default for LatencyWindow {
    fn default() -> Self {
        Self::new()
    }
}

fn percentile(sorted: &[f64], q: f64) -> f64 {
    let idx = ((sorted.len() as f64 - 1.0) * q).round() as usize;
    sorted[idx.min(sorted.len() - 1)]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_window_has_no_snapshot() {
        assert!(LatencyWindow::new().snapshot().is_none());
    }

    #[test]
    fn test_percentiles() {
        let window = LatencyWindow::new();
        for i in 1..=100 {
            window.record(i as f64);
        }
        let snapshot = window.snapshot().unwrap();
        assert_eq!(snapshot.count, 100);
        assert!((snapshot.p50_ms - 50.0).abs() <= 1.0);
        assert!((snapshot.p95_ms - 95.0).abs() <= 1.0);
    }

    #[test]
    fn test_window_is_bounded() {
        let window = LatencyWindow::new();
        for i in 0..500 {
            window.record(i as f64);
        }
        let snapshot = window.snapshot().unwrap();
        assert_eq!(snapshot.count, WINDOW_CAPACITY);
        // Only the most recent samples remain.
        assert!(snapshot.p50_ms >= 300.0);
    }
}
