//! Synthetic reading streams shared by the unit tests

use contracts::{
    BoardIndex, CalibrationRecord, CalibrationSnapshot, DetectionResult, Position, Reading,
    SensorSettings, NUM_POSITIONS,
};

use crate::detector::DirectionDetector;

/// Triangular bump from the scene baseline to `peak`, 60 ms wide
#[derive(Debug, Clone, Copy)]
pub struct Bump {
    pub center_ms: f64,
    pub peak: f64,
    pub half_width_ms: f64,
}

pub fn bump(center_ms: f64, peak: f64) -> Bump {
    Bump {
        center_ms,
        peak,
        half_width_ms: 30.0,
    }
}

impl Bump {
    fn value(&self, ms: u64, base: u16) -> u16 {
        let distance = (ms as f64 - self.center_ms).abs();
        if distance >= self.half_width_ms {
            return base;
        }
        let base_f = f64::from(base);
        let level = base_f + (self.peak - base_f) * (1.0 - distance / self.half_width_ms);
        level.round() as u16
    }
}

/// Every position at a flat level plus optional bumps, one reading per
/// position per millisecond in position order
pub struct Scene {
    base: u16,
    bumps: [Vec<Bump>; NUM_POSITIONS],
}

impl Scene {
    pub fn baseline(base: u16) -> Self {
        Self {
            base,
            bumps: Default::default(),
        }
    }

    pub fn with(mut self, position: Position, bump: Bump) -> Self {
        self.bumps[position.index()].push(bump);
        self
    }

    pub fn value(&self, position: Position, ms: u64) -> u16 {
        self.bumps[position.index()]
            .iter()
            .map(|b| b.value(ms, self.base))
            .max()
            .unwrap_or(self.base)
    }

    /// Feed `ms` cycles through `process`, then flush
    pub fn run(&self, detector: &mut DirectionDetector, ms: u64) -> Vec<DetectionResult> {
        let mut results = Vec::new();
        for t in 0..ms {
            for position in Position::ALL {
                let reading = Reading::new(t * 1000, position, self.value(position, t));
                results.extend(detector.process(&reading));
            }
        }
        results.extend(detector.flush());
        results
    }
}

/// Finalized record, baseline 20 and signal 150 on every board
pub fn valid_record() -> CalibrationRecord {
    let mut record = CalibrationRecord::new(CalibrationSnapshot::from(&SensorSettings::default()));
    for board in BoardIndex::ALL {
        let entry = &mut record.boards[board.index()];
        entry.baseline_max = 20;
        entry.signal_min = 150;
        entry.compute_threshold();
        entry.valid = true;
    }
    record.finalize(42);
    record
}
