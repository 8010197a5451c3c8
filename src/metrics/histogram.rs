//! Fixed-Bucket Latency Histograms
//!
//! Every handler latency in FlashGate is recorded in microseconds into a
//! [`Histogram`]. Histograms are plain atomic accumulators: any number of
//! completion tasks can increment the same histogram concurrently, and there
//! is no ordering requirement between increments.
//!
//! ## Buckets
//!
//! ```text
//!  ≤50µs  ≤100µs  ≤250µs ... ≤5s  ≤60s  overflow
//! ┌──────┬───────┬───────┬───┬─────┬─────┬────────┐
//! │  n0  │  n1   │  n2   │...│ n14 │ n15 │  n16   │
//! └──────┴───────┴───────┴───┴─────┴─────┴────────┘
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Upper bounds (inclusive, microseconds) of each histogram bucket.
pub const BUCKET_BOUNDS_US: [u64; 16] = [
    50,         // 0.05ms
    100,        // 0.1ms
    250,        // 0.25ms
    500,        // 0.5ms
    1_000,      // 1ms
    2_500,      // 2.5ms
    5_000,      // 5ms
    10_000,     // 10ms
    25_000,     // 25ms
    50_000,     // 50ms
    100_000,    // 100ms
    250_000,    // 250ms
    500_000,    // 500ms
    1_000_000,  // 1s
    5_000_000,  // 5s
    60_000_000, // 60s
];

/// Largest value a handler latency histogram tracks (60 seconds).
pub const MAX_TRACKABLE_US: u64 = 60_000_000;

/// Static description of a histogram, declared once per metric.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HistogramDescriptor {
    /// Unique metric name
    pub name: &'static str,
    /// Short label shown next to the value
    pub label: &'static str,
    /// Human readable description
    pub description: &'static str,
    /// Values above this are clamped before being recorded
    pub max_trackable_us: u64,
}

impl HistogramDescriptor {
    /// Declares a handler latency histogram tracking up to 60 seconds.
    pub const fn handler_latency(
        name: &'static str,
        label: &'static str,
        description: &'static str,
    ) -> Self {
        Self {
            name,
            label,
            description,
            max_trackable_us: MAX_TRACKABLE_US,
        }
    }
}

/// A latency histogram with atomic buckets.
#[derive(Debug)]
pub struct Histogram {
    descriptor: HistogramDescriptor,
    buckets: [AtomicU64; BUCKET_BOUNDS_US.len() + 1],
    count: AtomicU64,
    total_us: AtomicU64,
    max_us: AtomicU64,
}

impl Histogram {
    /// Creates an empty histogram for the given descriptor.
    pub fn new(descriptor: HistogramDescriptor) -> Self {
        Self {
            descriptor,
            buckets: std::array::from_fn(|_| AtomicU64::new(0)),
            count: AtomicU64::new(0),
            total_us: AtomicU64::new(0),
            max_us: AtomicU64::new(0),
        }
    }

    /// Returns the descriptor this histogram was instantiated from.
    pub fn descriptor(&self) -> &HistogramDescriptor {
        &self.descriptor
    }

    /// Records a single observation, in microseconds.
    pub fn increment(&self, us: u64) {
        let us = us.min(self.descriptor.max_trackable_us);
        let idx = BUCKET_BOUNDS_US
            .iter()
            .position(|bound| us <= *bound)
            .unwrap_or(BUCKET_BOUNDS_US.len());

        self.buckets[idx].fetch_add(1, Ordering::Relaxed);
        self.count.fetch_add(1, Ordering::Relaxed);
        self.total_us.fetch_add(us, Ordering::Relaxed);
        self.max_us.fetch_max(us, Ordering::Relaxed);
    }

    /// Records the time elapsed since `start`.
    pub fn increment_since(&self, start: Instant) {
        self.increment(elapsed_micros(start));
    }

    /// Number of recorded observations.
    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    /// Takes a point-in-time copy of the histogram.
    pub fn snapshot(&self) -> HistogramSnapshot {
        HistogramSnapshot {
            count: self.count.load(Ordering::Relaxed),
            total_us: self.total_us.load(Ordering::Relaxed),
            max_us: self.max_us.load(Ordering::Relaxed),
            buckets: self
                .buckets
                .iter()
                .map(|b| b.load(Ordering::Relaxed))
                .collect(),
        }
    }
}

/// A point-in-time copy of a [`Histogram`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistogramSnapshot {
    pub count: u64,
    pub total_us: u64,
    pub max_us: u64,
    /// Per-bucket counts; the last entry counts values above the last bound
    pub buckets: Vec<u64>,
}

impl HistogramSnapshot {
    /// Mean latency in microseconds, or 0 when empty.
    pub fn mean_us(&self) -> u64 {
        if self.count == 0 {
            0
        } else {
            self.total_us / self.count
        }
    }

    /// Upper bound of the bucket that contains the given percentile.
    ///
    /// `pct` is clamped to `0.0..=100.0`. Returns 0 for an empty histogram.
    pub fn percentile_us(&self, pct: f64) -> u64 {
        if self.count == 0 {
            return 0;
        }
        let pct = pct.clamp(0.0, 100.0);
        let rank = ((pct / 100.0) * self.count as f64).ceil().max(1.0) as u64;

        let mut seen = 0;
        for (idx, n) in self.buckets.iter().enumerate() {
            seen += n;
            if seen >= rank {
                return BUCKET_BOUNDS_US.get(idx).copied().unwrap_or(self.max_us);
            }
        }
        self.max_us
    }
}

/// Microseconds elapsed since `start`, saturating at `u64::MAX`.
pub fn elapsed_micros(start: Instant) -> u64 {
    u64::try_from(start.elapsed().as_micros()).unwrap_or(u64::MAX)
}
