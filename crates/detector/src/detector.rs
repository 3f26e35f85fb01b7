//! Direction detector
//!
//! Owns the six trackers, feeds them readings and, once per scan cycle,
//! pairs each board's completed waves and merges the boards into one
//! verdict. After a verdict every tracker's wave is cleared (partial
//! reset); baselines keep learning.

use std::sync::Arc;

use contracts::{
    BoardIndex, CalibrationRecord, DetectionResult, DetectorConfig, Position, Reading, Side,
    NUM_POSITIONS,
};
use tracing::{debug, info, instrument};

use crate::calibration::publisher::CalibrationSubscription;
use crate::consensus;
use crate::pairer::{pair_board, BoardDetection};
use crate::tracker::{WaveState, WaveTracker};

/// Consumes readings, emits direction verdicts
pub struct DirectionDetector {
    config: DetectorConfig,
    trackers: [WaveTracker; NUM_POSITIONS],
    subscription: Option<CalibrationSubscription>,
    calibration: Option<Arc<CalibrationRecord>>,
    /// Position index of the previous reading, to spot cycle boundaries
    last_index: Option<usize>,
    emitted: u64,
}

impl DirectionDetector {
    pub fn new(config: DetectorConfig) -> Self {
        let trackers = Position::ALL.map(|position| WaveTracker::new(position, &config));
        Self {
            config,
            trackers,
            subscription: None,
            calibration: None,
            last_index: None,
            emitted: 0,
        }
    }

    /// Follow a published calibration; the current value applies at once
    pub fn with_calibration(mut self, mut subscription: CalibrationSubscription) -> Self {
        let current = subscription.borrow_and_update().clone();
        self.subscription = Some(subscription);
        self.apply_calibration(current);
        self
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    pub fn tracker(&self, position: Position) -> &WaveTracker {
        &self.trackers[position.index()]
    }

    pub fn trackers(&self) -> &[WaveTracker; NUM_POSITIONS] {
        &self.trackers
    }

    /// Calibration in force, if any
    pub fn calibration(&self) -> Option<&CalibrationRecord> {
        self.calibration.as_deref()
    }

    /// Verdicts emitted since construction
    pub fn emitted(&self) -> u64 {
        self.emitted
    }

    /// Stream entry point: a reading whose position does not come after the
    /// previous one starts a new scan cycle, so the finished cycle is
    /// polled before the reading is applied.
    pub fn process(&mut self, reading: &Reading) -> Option<DetectionResult> {
        let index = reading.position.index();
        let result = match self.last_index {
            Some(last) if index <= last => self.poll(),
            _ => None,
        };
        self.push(reading);
        self.last_index = Some(index);
        result
    }

    /// Feed one reading to its tracker without polling
    pub fn push(&mut self, reading: &Reading) -> WaveState {
        self.refresh_calibration();
        self.trackers[reading.position.index()].update(reading.t_us, reading.proximity)
    }

    /// Pair and merge whatever the trackers hold now. On a verdict the
    /// trackers are partially reset.
    pub fn poll(&mut self) -> Option<DetectionResult> {
        let detections = self.board_detections();
        let result = consensus::combine(&detections, &self.config)?;

        self.emitted += 1;
        record_detection(&result);
        info!(
            direction = %result.direction,
            confidence = result.confidence,
            board = %result.detected_module,
            modules = result.modules_detected,
            com_gap_ms = result.com_gap_ms,
            "Detection"
        );

        self.partial_reset();
        Some(result)
    }

    /// End of stream: poll the last, possibly unfinished cycle
    pub fn flush(&mut self) -> Option<DetectionResult> {
        let result = self.poll();
        self.last_index = None;
        result
    }

    /// Boards whose two sides pair right now
    pub fn board_detections(&self) -> Vec<BoardDetection> {
        BoardIndex::ALL
            .into_iter()
            .filter_map(|board| {
                pair_board(
                    board,
                    self.trackers[board.position(Side::A).index()].completed(),
                    self.trackers[board.position(Side::B).index()].completed(),
                    &self.config,
                )
            })
            .collect()
    }

    /// Clear every wave; baselines, smoothing and thresholds survive
    pub fn partial_reset(&mut self) {
        self.trackers.iter_mut().for_each(WaveTracker::reset_wave);
    }

    /// Back to the constructed state: baselines relearn from scratch. The
    /// calibration subscription is kept.
    #[instrument(name = "detector_full_reset", skip(self))]
    pub fn full_reset(&mut self) {
        self.trackers.iter_mut().for_each(WaveTracker::full_reset);
        self.last_index = None;
        debug!("Detector fully reset");
    }

    /// Install a calibration (or drop it with `None`). Only a valid record
    /// is used; ready trackers re-derive their thresholds at once and any
    /// open wave is dropped.
    #[instrument(name = "detector_apply_calibration", skip_all, fields(present = record.is_some()))]
    pub fn apply_calibration(&mut self, record: Option<Arc<CalibrationRecord>>) {
        let record = record.filter(|r| r.is_valid());
        for tracker in &mut self.trackers {
            let threshold = record
                .as_ref()
                .and_then(|r| r.threshold_for(tracker.position().board()));
            tracker.set_calibrated_threshold(threshold);
            tracker.reset_wave();
        }
        info!(calibrated = record.is_some(), "Detector thresholds updated");
        self.calibration = record;
    }

    fn refresh_calibration(&mut self) {
        let Some(subscription) = self.subscription.as_mut() else {
            return;
        };
        if !subscription.has_changed().unwrap_or(false) {
            return;
        }
        let record = subscription.borrow_and_update().clone();
        self.apply_calibration(record);
    }
}

fn record_detection(result: &DetectionResult) {
    metrics::counter!(
        "motion_play_detections_total",
        "direction" => result.direction.label()
    )
    .increment(1);
    metrics::histogram!("motion_play_detection_confidence").record(result.confidence);
    metrics::histogram!("motion_play_detection_com_gap_ms").record(result.com_gap_ms);
}
