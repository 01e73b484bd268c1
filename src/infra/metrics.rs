//! Lock-free metrics collection and periodic reporting
//!
//! Uses atomics for hot-path operations to avoid mutex contention.
//! All counter updates are lock-free; reporting is the only operation
//! that needs synchronization (via atomic swap).
//!
//! NOTE: All atomics use Relaxed ordering intentionally. These are statistical
//! counters only. Do NOT use these atomics for coordination or logic decisions.

use crate::domain::reward::Rejection;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::info;

/// Prometheus-style exponential bucket boundaries (microseconds)
/// Buckets: ≤100, ≤200, ≤400, ≤800, ≤1600, ≤3200, ≤6400, ≤12800, ≤25600, ≤51200, >51200
const BUCKET_BOUNDS: [u64; 10] = [100, 200, 400, 800, 1600, 3200, 6400, 12800, 25600, 51200];
const NUM_BUCKETS: usize = 11;

/// Compute bucket index for a latency value using binary search
#[inline]
fn bucket_index(latency_us: u64) -> usize {
    BUCKET_BOUNDS.partition_point(|&bound| bound < latency_us)
}

/// Update an atomic max value using compare-and-swap loop
#[inline]
fn update_atomic_max(atomic_max: &AtomicU64, new_value: u64) {
    let mut current_max = atomic_max.load(Ordering::Relaxed);
    while new_value > current_max {
        match atomic_max.compare_exchange_weak(
            current_max,
            new_value,
            Ordering::Relaxed,
            Ordering::Relaxed,
        ) {
            Ok(_) => break,
            Err(actual) => current_max = actual,
        }
    }
}

/// Swap all buckets to zero and return their values
#[inline]
fn swap_buckets(buckets: &[AtomicU64; NUM_BUCKETS]) -> [u64; NUM_BUCKETS] {
    let mut result = [0u64; NUM_BUCKETS];
    for (i, bucket) in buckets.iter().enumerate() {
        result[i] = bucket.swap(0, Ordering::Relaxed);
    }
    result
}

/// Compute percentile from histogram buckets
/// Returns the upper bound of the bucket containing the percentile
fn percentile_from_buckets(buckets: &[u64; NUM_BUCKETS], percentile: f64) -> u64 {
    let total: u64 = buckets.iter().sum();
    if total == 0 {
        return 0;
    }

    let target = (total as f64 * percentile) as u64;
    let mut cumulative = 0u64;

    // Upper bounds for each bucket (last bucket uses 2x the previous bound)
    const BUCKET_UPPER_BOUNDS: [u64; NUM_BUCKETS] =
        [100, 200, 400, 800, 1600, 3200, 6400, 12800, 25600, 51200, 102400];

    for (i, &count) in buckets.iter().enumerate() {
        cumulative += count;
        if cumulative >= target {
            return BUCKET_UPPER_BOUNDS[i];
        }
    }
    BUCKET_UPPER_BOUNDS[NUM_BUCKETS - 1]
}

/// Lock-free metrics collector
///
/// All recording operations are lock-free using atomics.
/// The `report()` method atomically swaps counters to get a consistent snapshot.
pub struct Metrics {
    /// Total classification frames accepted (monotonic)
    frames_total: AtomicU64,
    /// Frames since last report (reset on report)
    frames_since_report: AtomicU64,
    /// Sum of pipeline latencies in microseconds (reset on report)
    latency_sum_us: AtomicU64,
    /// Max pipeline latency in microseconds (reset on report)
    latency_max_us: AtomicU64,
    /// Pipeline latency histogram buckets (reset on report)
    latency_buckets: [AtomicU64; NUM_BUCKETS],
    /// Frames dropped by input validation (monotonic)
    frames_invalid: AtomicU64,
    /// Source lines that failed to parse (monotonic)
    source_lines_malformed: AtomicU64,
    /// Streaks that reached the required length (monotonic)
    streaks_fired: AtomicU64,
    /// Successful payouts (monotonic)
    rewards_awarded: AtomicU64,
    /// Points paid out (monotonic)
    points_awarded: AtomicU64,
    /// Fired observations rejected by the cooldown window (monotonic)
    rejected_cooldown: AtomicU64,
    /// Fired observations with no matching category (monotonic)
    rejected_no_category: AtomicU64,
    /// Explicit consensus resets on session pause/resume (monotonic)
    session_resets: AtomicU64,
    /// Frame timeline re-based after the source clock moved (monotonic)
    timeline_rebases: AtomicU64,
    /// Awards credited in memory but not written to the ledger file (monotonic)
    ledger_write_failures: AtomicU64,
    /// Last report time (only accessed from reporter)
    last_report_time: parking_lot::Mutex<Instant>,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            frames_total: AtomicU64::new(0),
            frames_since_report: AtomicU64::new(0),
            latency_sum_us: AtomicU64::new(0),
            latency_max_us: AtomicU64::new(0),
            latency_buckets: std::array::from_fn(|_| AtomicU64::new(0)),
            frames_invalid: AtomicU64::new(0),
            source_lines_malformed: AtomicU64::new(0),
            streaks_fired: AtomicU64::new(0),
            rewards_awarded: AtomicU64::new(0),
            points_awarded: AtomicU64::new(0),
            rejected_cooldown: AtomicU64::new(0),
            rejected_no_category: AtomicU64::new(0),
            session_resets: AtomicU64::new(0),
            timeline_rebases: AtomicU64::new(0),
            ledger_write_failures: AtomicU64::new(0),
            last_report_time: parking_lot::Mutex::new(Instant::now()),
        }
    }

    /// Record a frame passed through the pipeline with given latency (lock-free)
    #[inline]
    pub fn record_frame_processed(&self, latency_us: u64) {
        self.frames_total.fetch_add(1, Ordering::Relaxed);
        self.frames_since_report.fetch_add(1, Ordering::Relaxed);
        self.latency_sum_us.fetch_add(latency_us, Ordering::Relaxed);

        let bucket = bucket_index(latency_us);
        self.latency_buckets[bucket].fetch_add(1, Ordering::Relaxed);

        update_atomic_max(&self.latency_max_us, latency_us);
    }

    #[inline]
    pub fn record_invalid(&self) {
        self.frames_invalid.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_malformed_line(&self) {
        self.source_lines_malformed.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_streak_fired(&self) {
        self.streaks_fired.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_award(&self, points: u32) {
        self.rewards_awarded.fetch_add(1, Ordering::Relaxed);
        self.points_awarded.fetch_add(points as u64, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_rejection(&self, rejection: Rejection) {
        let counter = match rejection {
            Rejection::NoCategory => &self.rejected_no_category,
            Rejection::Cooldown { .. } => &self.rejected_cooldown,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_session_reset(&self) {
        self.session_resets.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_timeline_rebased(&self) {
        self.timeline_rebases.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_ledger_write_failed(&self) {
        self.ledger_write_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn frames_total(&self) -> u64 {
        self.frames_total.load(Ordering::Relaxed)
    }

    pub fn frames_invalid(&self) -> u64 {
        self.frames_invalid.load(Ordering::Relaxed)
    }

    pub fn rewards_awarded(&self) -> u64 {
        self.rewards_awarded.load(Ordering::Relaxed)
    }

    pub fn rejected_cooldown(&self) -> u64 {
        self.rejected_cooldown.load(Ordering::Relaxed)
    }

    pub fn rejected_no_category(&self) -> u64 {
        self.rejected_no_category.load(Ordering::Relaxed)
    }

    pub fn timeline_rebases(&self) -> u64 {
        self.timeline_rebases.load(Ordering::Relaxed)
    }

    pub fn ledger_write_failures(&self) -> u64 {
        self.ledger_write_failures.load(Ordering::Relaxed)
    }

    /// Generate a metrics summary, resetting periodic counters
    pub fn report(&self, ledger_total: u64) -> MetricsSummary {
        let frames_count = self.frames_since_report.swap(0, Ordering::Relaxed);
        let latency_sum = self.latency_sum_us.swap(0, Ordering::Relaxed);
        let max_latency = self.latency_max_us.swap(0, Ordering::Relaxed);
        let lat_buckets = swap_buckets(&self.latency_buckets);

        let elapsed = {
            let mut last = self.last_report_time.lock();
            let elapsed = last.elapsed();
            *last = Instant::now();
            elapsed
        };

        let frames_per_sec = if elapsed.as_secs_f64() > 0.0 {
            frames_count as f64 / elapsed.as_secs_f64()
        } else {
            0.0
        };

        let avg_latency = if frames_count > 0 { latency_sum / frames_count } else { 0 };

        MetricsSummary {
            frames_total: self.frames_total.load(Ordering::Relaxed),
            frames_per_sec,
            avg_latency_us: avg_latency,
            max_latency_us: max_latency,
            lat_buckets,
            lat_p50_us: percentile_from_buckets(&lat_buckets, 0.50),
            lat_p99_us: percentile_from_buckets(&lat_buckets, 0.99),
            frames_invalid: self.frames_invalid.load(Ordering::Relaxed),
            source_lines_malformed: self.source_lines_malformed.load(Ordering::Relaxed),
            streaks_fired: self.streaks_fired.load(Ordering::Relaxed),
            rewards_awarded: self.rewards_awarded.load(Ordering::Relaxed),
            points_awarded: self.points_awarded.load(Ordering::Relaxed),
            rejected_cooldown: self.rejected_cooldown.load(Ordering::Relaxed),
            rejected_no_category: self.rejected_no_category.load(Ordering::Relaxed),
            session_resets: self.session_resets.load(Ordering::Relaxed),
            timeline_rebases: self.timeline_rebases.load(Ordering::Relaxed),
            ledger_write_failures: self.ledger_write_failures.load(Ordering::Relaxed),
            ledger_total,
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug)]
pub struct MetricsSummary {
    pub frames_total: u64,
    pub frames_per_sec: f64,
    pub avg_latency_us: u64,
    pub max_latency_us: u64,
    /// Pipeline latency histogram buckets
    /// Bounds: ≤100, ≤200, ≤400, ≤800, ≤1600, ≤3200, ≤6400, ≤12800, ≤25600, ≤51200, >51200 µs
    pub lat_buckets: [u64; NUM_BUCKETS],
    pub lat_p50_us: u64,
    pub lat_p99_us: u64,
    pub frames_invalid: u64,
    pub source_lines_malformed: u64,
    pub streaks_fired: u64,
    pub rewards_awarded: u64,
    pub points_awarded: u64,
    pub rejected_cooldown: u64,
    pub rejected_no_category: u64,
    pub session_resets: u64,
    pub timeline_rebases: u64,
    pub ledger_write_failures: u64,
    /// Running ledger total at report time
    pub ledger_total: u64,
}

impl MetricsSummary {
    pub fn log(&self) {
        info!(
            frames_total = %self.frames_total,
            frames_per_sec = format!("{:.1}", self.frames_per_sec),
            avg_latency_us = %self.avg_latency_us,
            max_latency_us = %self.max_latency_us,
            p50_us = %self.lat_p50_us,
            p99_us = %self.lat_p99_us,
            invalid = %self.frames_invalid,
            malformed = %self.source_lines_malformed,
            fired = %self.streaks_fired,
            awarded = %self.rewards_awarded,
            points = %self.points_awarded,
            rejected_cooldown = %self.rejected_cooldown,
            rejected_no_category = %self.rejected_no_category,
            session_resets = %self.session_resets,
            rebases = %self.timeline_rebases,
            ledger_write_failures = %self.ledger_write_failures,
            ledger_total = %self.ledger_total,
            "metrics"
        );
    }
}
