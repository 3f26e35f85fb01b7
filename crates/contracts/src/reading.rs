//! Reading - sampling engine output
//!
//! One proximity sample from one sensor, plus the interrupt-posture event.

use serde::{Deserialize, Serialize};

use crate::{BoardIndex, Position};

/// One sample from one sensor
///
/// Immutable once emitted; readings of a position are strictly ordered by
/// `t_us`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reading {
    /// Monotonic microsecond timestamp
    pub t_us: u64,

    /// Sensor position (board and side)
    pub position: Position,

    /// Proximity count
    #[serde(rename = "prox", alias = "proximity")]
    pub proximity: u16,

    /// Ambient light count, when read
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ambient: Option<u16>,
}

impl Reading {
    /// Proximity-only reading
    pub fn new(t_us: u64, position: Position, proximity: u16) -> Self {
        Self {
            t_us,
            position,
            proximity,
            ambient: None,
        }
    }

    /// Timestamp in milliseconds
    #[inline]
    pub fn t_ms(&self) -> f64 {
        self.t_us as f64 / 1000.0
    }
}

/// Cause of an interrupt-posture edge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InterruptKind {
    /// Proximity rose above the high threshold (object close)
    Rising,
    /// Proximity fell below the low threshold (object away)
    Falling,
}

/// Interrupt-posture event, resolved from a board-level line edge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterruptEvent {
    /// Edge timestamp captured by the line handler
    pub t_us: u64,

    /// Board whose combined line fired
    pub board: BoardIndex,

    /// Sensor whose flag register named the cause, if any
    pub position: Option<Position>,

    /// Rising or falling
    pub kind: InterruptKind,

    /// Raw interrupt flag byte for diagnostics
    pub raw_flags: u8,
}
