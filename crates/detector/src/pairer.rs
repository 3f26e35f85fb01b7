//! Module pairer - one direction per board from its two completed waves

use contracts::{BoardIndex, DetectorConfig, Direction, SideTelemetry};

use crate::tracker::CompletedWave;

/// Paired waves of one board
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoardDetection {
    pub board: BoardIndex,
    pub direction: Direction,
    pub side_a: CompletedWave,
    pub side_b: CompletedWave,
}

impl BoardDetection {
    /// Strength used to pick the best board
    pub fn peak_sum(&self) -> f64 {
        self.side_a.peak + self.side_b.peak
    }

    pub fn mean_peak(&self) -> f64 {
        self.peak_sum() / 2.0
    }

    /// |CoM_A - CoM_B| in ms
    pub fn com_gap_ms(&self) -> f64 {
        (self.side_a.center_of_mass_us - self.side_b.center_of_mass_us).abs() / 1000.0
    }

    /// Later of the two wave ends
    pub fn end_us(&self) -> u64 {
        self.side_a.end_us.max(self.side_b.end_us)
    }
}

/// Pair a board's side A and side B waves
///
/// Both must be complete, each at least `min_wave_duration_ms` long, with
/// peak times no more than `max_peak_gap_ms` apart. The side whose center
/// of mass comes first is the entry side; ties fall back to peak order,
/// and a board tied on both reports B to A. A paired board always has a
/// known direction.
pub fn pair_board(
    board: BoardIndex,
    side_a: Option<CompletedWave>,
    side_b: Option<CompletedWave>,
    config: &DetectorConfig,
) -> Option<BoardDetection> {
    let (a, b) = (side_a?, side_b?);

    if a.duration_ms() < config.min_wave_duration_ms || b.duration_ms() < config.min_wave_duration_ms
    {
        return None;
    }

    let peak_gap_ms = a.peak_time_us.abs_diff(b.peak_time_us) as f64 / 1000.0;
    if peak_gap_ms > config.max_peak_gap_ms {
        return None;
    }

    let direction = if a.center_of_mass_us < b.center_of_mass_us {
        Direction::AToB
    } else if b.center_of_mass_us < a.center_of_mass_us {
        Direction::BToA
    } else if a.peak_time_us < b.peak_time_us {
        Direction::AToB
    } else {
        // Full tie: side B is taken as entry
        Direction::BToA
    };

    Some(BoardDetection {
        board,
        direction,
        side_a: a,
        side_b: b,
    })
}

impl From<&CompletedWave> for SideTelemetry {
    fn from(wave: &CompletedWave) -> Self {
        SideTelemetry {
            center_of_mass_ms: wave.center_of_mass_ms(),
            peak: wave.peak,
            peak_time_ms: wave.peak_time_ms(),
            duration_ms: wave.duration_ms(),
            baseline_max: wave.baseline_max,
            threshold: wave.threshold,
        }
    }
}
