//! Consensus across boards
//!
//! Combines the per-board detections of one transit into a single verdict.
//! The best board (largest peak sum) supplies the telemetry and the base
//! confidence; agreement between boards adds a boost, disagreement turns
//! the verdict into `Unknown` without one.

use contracts::{BoardVerdict, DetectionResult, DetectorConfig, Direction, SideTelemetry};

use crate::pairer::BoardDetection;

/// Timing and signal confidence of one board, before any boost
pub fn base_confidence(detection: &BoardDetection, config: &DetectorConfig) -> f64 {
    let gap_confidence = (detection.com_gap_ms() / config.gap_confidence_ms).min(1.0);
    let signal_confidence = (detection.mean_peak() / config.signal_confidence_peak).min(1.0);
    (0.6 * gap_confidence + 0.4 * signal_confidence).clamp(0.0, 1.0)
}

/// Common direction if every board agrees, `Unknown` otherwise
pub fn consensus_direction(detections: &[BoardDetection]) -> Direction {
    let Some(first) = detections.first() else {
        return Direction::Unknown;
    };
    if detections.iter().all(|d| d.direction == first.direction) {
        first.direction
    } else {
        Direction::Unknown
    }
}

/// Strongest board; the lowest board index wins a tie
pub fn best_board(detections: &[BoardDetection]) -> Option<&BoardDetection> {
    detections.iter().fold(None, |best, candidate| match best {
        Some(current) if current.peak_sum() >= candidate.peak_sum() => Some(current),
        _ => Some(candidate),
    })
}

/// Merge the boards that paired this cycle. `None` when no board did.
pub fn combine(detections: &[BoardDetection], config: &DetectorConfig) -> Option<DetectionResult> {
    let best = best_board(detections)?;
    let direction = consensus_direction(detections);

    let mut confidence = base_confidence(best, config);
    if direction.is_known() {
        let extra_boards = detections.len().saturating_sub(1) as f64;
        confidence = (confidence + config.consensus_boost * extra_boards).min(1.0);
    }

    let mut boards: Vec<BoardVerdict> = detections
        .iter()
        .map(|d| BoardVerdict {
            board: d.board,
            direction: d.direction,
        })
        .collect();
    boards.sort_by_key(|verdict| verdict.board);

    Some(DetectionResult {
        t_us: best.end_us(),
        direction,
        confidence,
        detected_module: best.board,
        modules_detected: detections.len(),
        com_gap_ms: best.com_gap_ms(),
        side_a: SideTelemetry::from(&best.side_a),
        side_b: SideTelemetry::from(&best.side_b),
        boards,
    })
}
