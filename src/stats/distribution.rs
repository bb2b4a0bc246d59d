//! Response-time accumulators.
//!
//! - `DataBuffer`: bounded window of recent samples, for percentiles
//! - `Distribution`: unbounded lifetime moments (mean/min/max/stddev)
//! - `MeasuredRate`: event count over the last complete time bucket

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};

/// Percentiles reported for the windowed buffer.
pub const PERCENTILES: [f64; 9] = [10.0, 25.0, 50.0, 75.0, 90.0, 95.0, 98.0, 99.0, 99.5];

/// Ring buffer keeping the most recent `capacity` samples.
#[derive(Debug, Clone)]
pub struct DataBuffer {
    samples: VecDeque<f64>,
    capacity: usize,
}

impl DataBuffer {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, value: f64) {
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(value);
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Nearest-rank percentile over the current window.
    pub fn percentile(&self, percent: f64) -> Option<f64> {
        let sorted = self.sorted();
        nearest_rank(&sorted, percent)
    }

    /// All of [`PERCENTILES`] in one sort.
    pub fn percentiles(&self) -> Vec<(f64, f64)> {
        let sorted = self.sorted();
        PERCENTILES
            .iter()
            .filter_map(|p| nearest_rank(&sorted, *p).map(|v| (*p, v)))
            .collect()
    }

    fn sorted(&self) -> Vec<f64> {
        let mut sorted: Vec<f64> = self.samples.iter().copied().collect();
        sorted.sort_by(|a, b| a.total_cmp(b));
        sorted
    }
}

fn nearest_rank(sorted: &[f64], percent: f64) -> Option<f64> {
    if sorted.is_empty() {
        return None;
    }
    let rank = ((percent / 100.0) * sorted.len() as f64).ceil() as usize;
    let index = rank.clamp(1, sorted.len()) - 1;
    Some(sorted[index])
}

/// Lifetime moments of every sample ever recorded.
#[derive(Debug, Clone, Default)]
pub struct Distribution {
    count: u64,
    sum: f64,
    sum_squares: f64,
    min: f64,
    max: f64,
}

impl Distribution {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn note_value(&mut self, value: f64) {
        if self.count == 0 {
            self.min = value;
            self.max = value;
        } else {
            self.min = self.min.min(value);
            self.max = self.max.max(value);
        }
        self.count += 1;
        self.sum += value;
        self.sum_squares += value * value;
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.sum / self.count as f64
        }
    }

    pub fn variance(&self) -> f64 {
        if self.count == 0 {
            return 0.0;
        }
        let mean = self.mean();
        (self.sum_squares / self.count as f64 - mean * mean).max(0.0)
    }

    pub fn std_dev(&self) -> f64 {
        self.variance().sqrt()
    }

    pub fn min(&self) -> f64 {
        self.min
    }

    pub fn max(&self) -> f64 {
        self.max
    }
}

/// Counts events per fixed time bucket and reports the last complete bucket.
#[derive(Debug)]
pub struct MeasuredRate {
    window_ms: u64,
    bucket_start_ms: AtomicU64,
    current: AtomicU64,
    last: AtomicU64,
}

impl MeasuredRate {
    pub fn new(window_ms: u64, now_ms: u64) -> Self {
        Self {
            window_ms: window_ms.max(1),
            bucket_start_ms: AtomicU64::new(now_ms),
            current: AtomicU64::new(0),
            last: AtomicU64::new(0),
        }
    }

    pub fn increment(&self, now_ms: u64) {
        self.roll(now_ms);
        self.current.fetch_add(1, Ordering::Relaxed);
    }

    /// Events counted in the previous complete bucket.
    pub fn count(&self, now_ms: u64) -> u64 {
        self.roll(now_ms);
        self.last.load(Ordering::Relaxed)
    }

    /// Events counted so far in the running bucket.
    pub fn current_count(&self, now_ms: u64) -> u64 {
        self.roll(now_ms);
        self.current.load(Ordering::Relaxed)
    }

    fn roll(&self, now_ms: u64) {
        let start = self.bucket_start_ms.load(Ordering::Acquire);
        let elapsed = now_ms.saturating_sub(start);
        if elapsed < self.window_ms {
            return;
        }
        let new_start = now_ms - elapsed % self.window_ms;
        // Only the thread that moves the bucket start publishes the rollover.
        if self
            .bucket_start_ms
            .compare_exchange(start, new_start, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            let finished = self.current.swap(0, Ordering::AcqRel);
            let last = if elapsed < 2 * self.window_ms { finished } else { 0 };
            self.last.store(last, Ordering::Release);
        }
    }
}
