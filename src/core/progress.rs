use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Per-operation counters, updated by the driver task and read by anyone.
pub struct ProgressTracker {
    pub pages_captured: AtomicU32,
    pub bytes_captured: AtomicU64,
    pub start_time: Instant,
}

impl ProgressTracker {
    pub fn new() -> Self {
        Self {
            pages_captured: AtomicU32::new(0),
            bytes_captured: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    pub fn record_page(&self, bytes: usize) {
        self.pages_captured.fetch_add(1, Ordering::Relaxed);
        self.bytes_captured.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    pub fn pages(&self) -> u32 {
        self.pages_captured.load(Ordering::Relaxed)
    }

    pub fn pages_per_minute(&self) -> f64 {
        let elapsed = self.start_time.elapsed().as_secs_f64();
        if elapsed < f64::EPSILON {
            return 0.0;
        }
        self.pages() as f64 * 60.0 / elapsed
    }

    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        ProgressSnapshot {
            pages_captured: self.pages(),
            bytes_captured: self.bytes_captured.load(Ordering::Relaxed),
            elapsed: self.elapsed(),
            pages_per_minute: self.pages_per_minute(),
        }
    }
}

impl Default for ProgressTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ProgressSnapshot {
    pub pages_captured: u32,
    pub bytes_captured: u64,
    pub elapsed: Duration,
    pub pages_per_minute: f64,
}
