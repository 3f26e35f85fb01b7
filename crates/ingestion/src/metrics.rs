//! Scan counters shared between the acquisition thread and its readers

use std::sync::atomic::{AtomicU64, Ordering};

use contracts::{Position, NUM_POSITIONS};

/// Acquisition metrics
#[derive(Debug, Default)]
pub struct ScanMetrics {
    /// Readings produced, per position
    readings: [AtomicU64; NUM_POSITIONS],

    /// Failed bus transactions, per position
    i2c_errors: [AtomicU64; NUM_POSITIONS],

    /// Readings lost because the queue was full
    queue_drops: AtomicU64,

    /// Completed scan cycles
    cycles: AtomicU64,

    /// Duration of the latest cycle (us)
    last_cycle_us: AtomicU64,

    /// Interrupt edges lost because the edge queue was full
    edge_drops: AtomicU64,
}

impl ScanMetrics {
    /// Create new metrics instance
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_reading(&self, position: Position) {
        self.readings[position.index()].fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_i2c_error(&self, position: Position) {
        self.i2c_errors[position.index()].fetch_add(1, Ordering::Relaxed);
        metrics::counter!("motion_play_i2c_errors_total", "position" => position.name())
            .increment(1);
    }

    pub fn record_queue_drop(&self) {
        self.queue_drops.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("motion_play_queue_drops_total").increment(1);
    }

    pub fn record_edge_drop(&self) {
        self.edge_drops.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cycle(&self, duration_us: u64) {
        self.cycles.fetch_add(1, Ordering::Relaxed);
        self.last_cycle_us.store(duration_us, Ordering::Relaxed);
        metrics::histogram!("motion_play_scan_cycle_us").record(duration_us as f64);
    }

    /// Get snapshot
    pub fn snapshot(&self) -> ScanSnapshot {
        ScanSnapshot {
            readings: self.readings.each_ref().map(|c| c.load(Ordering::Relaxed)),
            i2c_errors: self.i2c_errors.each_ref().map(|c| c.load(Ordering::Relaxed)),
            queue_drops: self.queue_drops.load(Ordering::Relaxed),
            cycles: self.cycles.load(Ordering::Relaxed),
            last_cycle_us: self.last_cycle_us.load(Ordering::Relaxed),
            edge_drops: self.edge_drops.load(Ordering::Relaxed),
        }
    }
}

/// Metrics snapshot
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanSnapshot {
    pub readings: [u64; NUM_POSITIONS],
    pub i2c_errors: [u64; NUM_POSITIONS],
    pub queue_drops: u64,
    pub cycles: u64,
    pub last_cycle_us: u64,
    pub edge_drops: u64,
}

impl ScanSnapshot {
    /// Counters accumulated since `earlier`
    pub fn since(&self, earlier: &ScanSnapshot) -> ScanSnapshot {
        let diff = |now: &[u64; NUM_POSITIONS], then: &[u64; NUM_POSITIONS]| {
            std::array::from_fn(|i| now[i].saturating_sub(then[i]))
        };
        ScanSnapshot {
            readings: diff(&self.readings, &earlier.readings),
            i2c_errors: diff(&self.i2c_errors, &earlier.i2c_errors),
            queue_drops: self.queue_drops.saturating_sub(earlier.queue_drops),
            cycles: self.cycles.saturating_sub(earlier.cycles),
            last_cycle_us: self.last_cycle_us,
            edge_drops: self.edge_drops.saturating_sub(earlier.edge_drops),
        }
    }

    pub fn total_readings(&self) -> u64 {
        self.readings.iter().sum()
    }
}
