//! DetectionResult - Detector output
//!
//! One direction verdict per transit, carrying the best board's telemetry.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::BoardIndex;

/// Direction of travel through the hoop
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    #[default]
    Unknown,
    /// Entered past side A, left past side B
    AToB,
    /// Entered past side B, left past side A
    BToA,
}

impl Direction {
    /// Short label used in logs and metrics
    pub const fn label(self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::AToB => "a_to_b",
            Self::BToA => "b_to_a",
        }
    }

    pub fn is_known(self) -> bool {
        self != Self::Unknown
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unknown => f.write_str("UNKNOWN"),
            Self::AToB => f.write_str("A->B"),
            Self::BToA => f.write_str("B->A"),
        }
    }
}

/// Wave envelope telemetry of one side of the best board
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct SideTelemetry {
    /// Signal-weighted mean time of the wave (ms)
    pub center_of_mass_ms: f64,

    /// Highest smoothed value seen in the wave
    pub peak: f64,

    /// Time of the peak (ms)
    pub peak_time_ms: f64,

    /// Wave end minus wave start (ms)
    pub duration_ms: f64,

    /// Baseline ring maximum at emission
    pub baseline_max: f64,

    /// Threshold in force at emission
    pub threshold: f64,
}

/// Per-board verdict contributing to the consensus
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoardVerdict {
    pub board: BoardIndex,
    pub direction: Direction,
}

/// Detector verdict
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionResult {
    /// Best board's latest wave end time (us); never precedes its inputs
    pub t_us: u64,

    pub direction: Direction,

    /// In [0, 1]
    pub confidence: f64,

    /// Board with the strongest paired signal
    pub detected_module: BoardIndex,

    /// Number of boards with a paired detection
    pub modules_detected: usize,

    /// |CoM_A - CoM_B| of the best board (ms)
    pub com_gap_ms: f64,

    pub side_a: SideTelemetry,

    pub side_b: SideTelemetry,

    /// Every contributing board's own direction, in board order
    pub boards: Vec<BoardVerdict>,
}

impl DetectionResult {
    /// Mean of the best board's two peaks
    pub fn mean_peak(&self) -> f64 {
        (self.side_a.peak + self.side_b.peak) / 2.0
    }

    /// Whether the contributing boards agreed
    pub fn is_consensus(&self) -> bool {
        self.boards
            .windows(2)
            .all(|pair| pair[0].direction == pair[1].direction)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_direction_labels() {
        assert_eq!(Direction::AToB.to_string(), "A->B");
        assert_eq!(
            serde_json::to_string(&Direction::BToA).unwrap(),
            "\"b_to_a\""
        );
        assert!(!Direction::Unknown.is_known());
    }

    #[test]
    fn test_consensus_check() {
        let verdict = |b: usize, direction| BoardVerdict {
            board: BoardIndex::new(b).unwrap(),
            direction,
        };
        let mut result = DetectionResult {
            t_us: 0,
            direction: Direction::AToB,
            confidence: 0.9,
            detected_module: BoardIndex::new(0).unwrap(),
            modules_detected: 2,
            com_gap_ms: 30.0,
            side_a: SideTelemetry::default(),
            side_b: SideTelemetry::default(),
            boards: vec![verdict(0, Direction::AToB), verdict(1, Direction::AToB)],
        };
        assert!(result.is_consensus());

        result.boards[1].direction = Direction::BToA;
        assert!(!result.is_consensus());
    }
}
