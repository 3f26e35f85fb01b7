//! Detection and session metrics
//!
//! Prometheus recording helpers plus an in-memory aggregator used for the
//! end-of-run summary.

use contracts::{
    BoardIndex, CalibrationRecord, DetectionResult, Direction, Position, SessionSummary,
    NUM_BOARDS,
};
use metrics::{counter, gauge, histogram};

/// Record the counters of a finalized session
///
/// # Example
///
/// ```ignore
/// use observability::metrics::record_session_summary;
///
/// let record = manager.stop_session(pending, totals)?;
/// record_session_summary(&record.summary, record.duration_ms);
/// ```
pub fn record_session_summary(summary: &SessionSummary, duration_ms: u64) {
    counter!("motion_play_session_cycles_total").increment(summary.total_cycles);
    gauge!("motion_play_session_cycle_rate_hz").set(summary.measured_cycle_rate_hz);
    gauge!("motion_play_session_theoretical_max_readings")
        .set(summary.theoretical_max_readings as f64);
    gauge!("motion_play_session_active_sensors").set(summary.num_active_sensors as f64);
    histogram!("motion_play_session_duration_ms").record(duration_ms as f64);

    for position in Position::ALL {
        let readings = summary.per_sensor_readings[position.index()];
        if readings > 0 {
            counter!("motion_play_session_readings_total", "position" => position.name())
                .increment(readings);
        }
    }

    if summary.buffer_drops > 0 {
        counter!("motion_play_session_buffer_drops_total").increment(summary.buffer_drops);
    }
    if summary.queue_drops > 0 {
        counter!("motion_play_session_queue_drops_total").increment(summary.queue_drops);
    }
}

/// Record the per-sink outcome of a session upload
pub fn record_upload_outcome(sink_name: &str, success: bool) {
    let status = if success { "success" } else { "failure" };
    counter!(
        "motion_play_uploads_total",
        "sink" => sink_name.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

/// Record the reading queue depth seen by the detection task
pub fn record_queue_depth(depth: usize) {
    gauge!("motion_play_reading_queue_depth").set(depth as f64);
}

/// Publish the thresholds of the active calibration
pub fn record_calibration(record: &CalibrationRecord) {
    for board in &record.boards {
        gauge!(
            "motion_play_calibration_threshold",
            "board" => format!("P{}", board.pcb_id)
        )
        .set(f64::from(board.threshold));
    }
    gauge!("motion_play_calibration_valid").set(if record.is_valid() { 1.0 } else { 0.0 });
}

/// Detection aggregator
///
/// Keeps per-direction and per-board counts and running statistics of the
/// verdicts seen during a run.
#[derive(Debug, Clone, Default)]
pub struct DetectionMetricsAggregator {
    pub total: u64,

    pub a_to_b: u64,

    pub b_to_a: u64,

    pub unknown: u64,

    /// Detections with more than one contributing board, all agreeing
    pub consensus: u64,

    /// How often each board was the best board
    pub per_module: [u64; NUM_BOARDS],

    pub confidence_stats: RunningStats,

    pub com_gap_stats: RunningStats,

    pub modules_stats: RunningStats,
}

impl DetectionMetricsAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, detection: &DetectionResult) {
        self.total += 1;
        match detection.direction {
            Direction::AToB => self.a_to_b += 1,
            Direction::BToA => self.b_to_a += 1,
            Direction::Unknown => self.unknown += 1,
        }
        if detection.modules_detected > 1 && detection.is_consensus() {
            self.consensus += 1;
        }
        self.per_module[detection.detected_module.index()] += 1;

        self.confidence_stats.push(detection.confidence);
        self.com_gap_stats.push(detection.com_gap_ms);
        self.modules_stats.push(detection.modules_detected as f64);
    }

    pub fn summary(&self) -> MetricsSummary {
        MetricsSummary {
            total: self.total,
            a_to_b: self.a_to_b,
            b_to_a: self.b_to_a,
            unknown: self.unknown,
            consensus: self.consensus,
            unknown_rate: if self.total > 0 {
                self.unknown as f64 / self.total as f64 * 100.0
            } else {
                0.0
            },
            per_module: self.per_module,
            confidence: StatsSummary::from(&self.confidence_stats),
            com_gap_ms: StatsSummary::from(&self.com_gap_stats),
            modules_detected: StatsSummary::from(&self.modules_stats),
        }
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Detection summary
#[derive(Debug, Clone, Default)]
pub struct MetricsSummary {
    pub total: u64,
    pub a_to_b: u64,
    pub b_to_a: u64,
    pub unknown: u64,
    pub consensus: u64,
    pub unknown_rate: f64,
    pub per_module: [u64; NUM_BOARDS],
    pub confidence: StatsSummary,
    pub com_gap_ms: StatsSummary,
    pub modules_detected: StatsSummary,
}

impl std::fmt::Display for MetricsSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "=== Detection Summary ===")?;
        writeln!(f, "Total detections: {}", self.total)?;
        writeln!(f, "  A->B: {}", self.a_to_b)?;
        writeln!(f, "  B->A: {}", self.b_to_a)?;
        writeln!(f, "  Unknown: {} ({:.2}%)", self.unknown, self.unknown_rate)?;
        writeln!(f, "Multi-board consensus: {}", self.consensus)?;
        writeln!(f, "Confidence: {}", self.confidence)?;
        writeln!(f, "CoM gap (ms): {}", self.com_gap_ms)?;
        writeln!(f, "Boards per detection: {}", self.modules_detected)?;

        if self.total > 0 {
            writeln!(f, "Best board counts:")?;
            for board in BoardIndex::ALL {
                writeln!(f, "  {}: {}", board, self.per_module[board.index()])?;
            }
        }

        Ok(())
    }
}

/// Stats summary
#[derive(Debug, Clone, Default)]
pub struct StatsSummary {
    pub count: u64,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub std_dev: f64,
}

impl From<&RunningStats> for StatsSummary {
    fn from(stats: &RunningStats) -> Self {
        Self {
            count: stats.count,
            min: stats.min,
            max: stats.max,
            mean: stats.mean(),
            std_dev: stats.std_dev(),
        }
    }
}

impl std::fmt::Display for StatsSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.count == 0 {
            write!(f, "N/A")
        } else {
            write!(
                f,
                "min={:.3}, max={:.3}, mean={:.3}, std={:.3} (n={})",
                self.min, self.max, self.mean, self.std_dev, self.count
            )
        }
    }
}

/// Online statistics (Welford's algorithm)
#[derive(Debug, Clone, Default)]
pub struct RunningStats {
    count: u64,
    mean: f64,
    m2: f64,
    min: f64,
    max: f64,
}

impl RunningStats {
    pub fn push(&mut self, value: f64) {
        self.count += 1;

        if self.count == 1 {
            self.min = value;
            self.max = value;
            self.mean = value;
            self.m2 = 0.0;
        } else {
            self.min = self.min.min(value);
            self.max = self.max.max(value);

            let delta = value - self.mean;
            self.mean += delta / self.count as f64;
            let delta2 = value - self.mean;
            self.m2 += delta * delta2;
        }
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.mean
        }
    }

    /// Sample variance
    pub fn variance(&self) -> f64 {
        if self.count < 2 {
            0.0
        } else {
            self.m2 / (self.count - 1) as f64
        }
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

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::BoardVerdict;

    fn detection(direction: Direction, board: usize, boards: &[Direction]) -> DetectionResult {
        DetectionResult {
            t_us: 1_000,
            direction,
            confidence: if direction.is_known() { 0.8 } else { 0.4 },
            detected_module: BoardIndex::ALL[board],
            modules_detected: boards.len(),
            com_gap_ms: 25.0,
            side_a: Default::default(),
            side_b: Default::default(),
            boards: boards
                .iter()
                .zip(BoardIndex::ALL)
                .map(|(&direction, board)| BoardVerdict { board, direction })
                .collect(),
        }
    }

    #[test]
    fn test_running_stats() {
        let mut stats = RunningStats::default();
        for value in [1.0, 2.0, 3.0, 4.0, 5.0] {
            stats.push(value);
        }

        assert_eq!(stats.count(), 5);
        assert!((stats.mean() - 3.0).abs() < 1e-10);
        assert!((stats.min() - 1.0).abs() < 1e-10);
        assert!((stats.max() - 5.0).abs() < 1e-10);
        assert!((stats.variance() - 2.5).abs() < 1e-10);
    }

    #[test]
    fn test_aggregator_update() {
        let mut aggregator = DetectionMetricsAggregator::new();

        aggregator.update(&detection(Direction::AToB, 0, &[Direction::AToB]));
        aggregator.update(&detection(
            Direction::BToA,
            2,
            &[Direction::BToA, Direction::BToA, Direction::BToA],
        ));
        aggregator.update(&detection(
            Direction::Unknown,
            1,
            &[Direction::AToB, Direction::BToA],
        ));

        let summary = aggregator.summary();
        assert_eq!(summary.total, 3);
        assert_eq!((summary.a_to_b, summary.b_to_a, summary.unknown), (1, 1, 1));
        assert_eq!(summary.consensus, 1);
        assert_eq!(summary.per_module, [1, 1, 1]);
        assert!((summary.modules_detected.mean - 2.0).abs() < 1e-10);
        assert!((summary.unknown_rate - 100.0 / 3.0).abs() < 1e-10);

        aggregator.reset();
        assert_eq!(aggregator.total, 0);
    }

    #[test]
    fn test_summary_display() {
        let mut aggregator = DetectionMetricsAggregator::new();
        aggregator.update(&detection(Direction::AToB, 1, &[Direction::AToB]));

        let output = format!("{}", aggregator.summary());
        assert!(output.contains("Total detections: 1"));
        assert!(output.contains("Unknown: 0 (0.00%)"));
        assert!(output.contains("Confidence: min=0.800"));
    }

    #[test]
    fn test_empty_summary() {
        let output = format!("{}", DetectionMetricsAggregator::new().summary());
        assert!(output.contains("Confidence: N/A"));
        assert!(!output.contains("Best board counts"));
    }
}
