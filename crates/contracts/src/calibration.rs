//! CalibrationRecord - Calibration wizard output
//!
//! Per-board noise floor and signal statistics plus the fixed threshold
//! derived from them. Trackers consult a record only when `is_valid()`.

use serde::{Deserialize, Serialize};

use crate::{BoardIndex, IntegrationTime, LedCurrent, MultiPulse, SensorSettings, NUM_BOARDS};

/// Marker word identifying a finalized record
pub const CALIBRATION_MAGIC: u32 = 0xCA11_B123;

/// Current record schema version
pub const CALIBRATION_VERSION: u32 = 1;

/// Threshold from noise ceiling and weakest observed signal
///
/// Halfway between the two when they are separated; otherwise just under
/// the signal floor, never below 1.
pub fn derive_threshold(baseline_max: u16, signal_min: u16) -> u16 {
    if signal_min > baseline_max {
        baseline_max + (signal_min - baseline_max) / 2
    } else {
        signal_min.saturating_sub(5).max(1)
    }
}

/// Calibration of one board, aggregated over both of its sensors
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoardCalibration {
    /// One-based board number
    pub pcb_id: u8,

    pub baseline_min: u16,
    pub baseline_max: u16,
    pub baseline_mean: f64,
    pub baseline_stddev: f64,

    pub signal_min: u16,
    pub signal_max: u16,
    pub signal_mean: f64,

    pub threshold: u16,

    pub valid: bool,
}

impl BoardCalibration {
    /// Empty, invalid entry for a board
    pub fn empty(board: BoardIndex) -> Self {
        Self {
            pcb_id: board.number(),
            baseline_min: 0,
            baseline_max: 0,
            baseline_mean: 0.0,
            baseline_stddev: 0.0,
            signal_min: 0,
            signal_max: 0,
            signal_mean: 0.0,
            threshold: 0,
            valid: false,
        }
    }

    /// Recompute `threshold` from the captured statistics
    pub fn compute_threshold(&mut self) {
        self.threshold = derive_threshold(self.baseline_max, self.signal_min);
    }
}

/// Sensor configuration active when the record was captured
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalibrationSnapshot {
    pub multi_pulse: MultiPulse,
    pub integration_time: IntegrationTime,
    pub led_current: LedCurrent,
}

impl From<&SensorSettings> for CalibrationSnapshot {
    fn from(settings: &SensorSettings) -> Self {
        Self {
            multi_pulse: settings.multi_pulse,
            integration_time: settings.integration_time,
            led_current: settings.led_current,
        }
    }
}

/// Device calibration, one singleton per device
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationRecord {
    pub magic: u32,
    pub version: u32,

    /// Capture time (ms since the device clock epoch)
    pub timestamp_ms: u64,

    pub sensor: CalibrationSnapshot,

    pub boards: [BoardCalibration; NUM_BOARDS],
}

impl CalibrationRecord {
    /// Blank record, not yet finalized
    pub fn new(sensor: CalibrationSnapshot) -> Self {
        Self {
            magic: 0,
            version: CALIBRATION_VERSION,
            timestamp_ms: 0,
            sensor,
            boards: BoardIndex::ALL.map(BoardCalibration::empty),
        }
    }

    /// Stamp magic, version and capture time
    pub fn finalize(&mut self, timestamp_ms: u64) {
        self.magic = CALIBRATION_MAGIC;
        self.version = CALIBRATION_VERSION;
        self.timestamp_ms = timestamp_ms;
    }

    /// Magic and version match and every board is individually valid
    pub fn is_valid(&self) -> bool {
        self.magic == CALIBRATION_MAGIC
            && self.version == CALIBRATION_VERSION
            && self.boards.iter().all(|board| board.valid)
    }

    /// Fixed threshold for a board, if that board is valid
    pub fn threshold_for(&self, board: BoardIndex) -> Option<u16> {
        let entry = &self.boards[board.index()];
        entry.valid.then_some(entry.threshold)
    }

    /// Boards whose entry is not valid
    pub fn failed_boards(&self) -> Vec<BoardIndex> {
        BoardIndex::ALL
            .into_iter()
            .filter(|board| !self.boards[board.index()].valid)
            .collect()
    }
}
