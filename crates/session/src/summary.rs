//! Session summary arithmetic

use contracts::{SensorSettings, SessionSummary, NUM_POSITIONS};

/// Counters the acquisition side kept while the session ran
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AcquisitionTotals {
    pub per_sensor_i2c_errors: [u64; NUM_POSITIONS],
    pub queue_drops: u64,
    /// Cycles the scan engine ran during the session. Replaces the count
    /// inferred from buffered reading order, which misses cycles whose
    /// readings were all dropped or failed.
    pub scan_cycles: Option<u64>,
}

/// Fill in the derived rates of a summary
///
/// `measured = cycles * 1000 / duration_ms` (0 for a zero-length session)
/// and `theoretical = sample_rate * duration_s * active_sensors`.
pub fn finalize_summary(
    summary: &mut SessionSummary,
    settings: &SensorSettings,
    duration_ms: u64,
    active_sensor_count: usize,
) {
    summary.num_active_sensors = active_sensor_count;
    summary.measured_cycle_rate_hz = if duration_ms == 0 {
        0.0
    } else {
        summary.total_cycles as f64 * 1000.0 / duration_ms as f64
    };
    summary.theoretical_max_readings = (f64::from(settings.sample_rate_hz)
        * (duration_ms as f64 / 1000.0)
        * active_sensor_count as f64)
        .round() as u64;
}
