//! Sensor position mapping
//!
//! Position `2k` is board `k` side A, position `2k + 1` is board `k` side B.
//! The pairer relies on this layout, so it is encoded once here and every
//! other crate goes through these descriptors.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::ContractError;

/// Number of sensor boards around the hoop
pub const NUM_BOARDS: usize = 3;

/// Number of sensor positions (two per board)
pub const NUM_POSITIONS: usize = NUM_BOARDS * 2;

/// Face of a sensor board
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    A,
    B,
}

impl Side {
    /// User-facing side number (1 or 2)
    #[inline]
    pub const fn number(self) -> u8 {
        match self {
            Side::A => 1,
            Side::B => 2,
        }
    }

    /// Channel on the board-local switch
    #[inline]
    pub const fn channel(self) -> u8 {
        match self {
            Side::A => 0,
            Side::B => 1,
        }
    }

    /// The other face of the same board
    #[inline]
    pub const fn opposite(self) -> Side {
        match self {
            Side::A => Side::B,
            Side::B => Side::A,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::A => f.write_str("A"),
            Side::B => f.write_str("B"),
        }
    }
}

/// Zero-based board index (0..3)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct BoardIndex(u8);

impl BoardIndex {
    /// All boards in scan order
    pub const ALL: [BoardIndex; NUM_BOARDS] = [BoardIndex(0), BoardIndex(1), BoardIndex(2)];

    /// Create a board index, rejecting out-of-range values
    pub fn new(index: usize) -> Result<Self, ContractError> {
        if index < NUM_BOARDS {
            Ok(Self(index as u8))
        } else {
            Err(ContractError::IndexOutOfRange {
                kind: "board",
                index,
            })
        }
    }

    /// Zero-based index
    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }

    /// One-based board number used in reports ("P1".."P3")
    #[inline]
    pub const fn number(self) -> u8 {
        self.0 + 1
    }

    /// Channel on the top-level switch
    #[inline]
    pub const fn channel(self) -> u8 {
        self.0
    }

    /// Position of the given side of this board
    #[inline]
    pub const fn position(self, side: Side) -> Position {
        Position(self.0 * 2 + side.channel())
    }

    /// Side A and side B positions of this board
    #[inline]
    pub const fn positions(self) -> (Position, Position) {
        (self.position(Side::A), self.position(Side::B))
    }
}

impl TryFrom<u8> for BoardIndex {
    type Error = ContractError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::new(value as usize)
    }
}

impl From<BoardIndex> for u8 {
    fn from(board: BoardIndex) -> Self {
        board.0
    }
}

impl fmt::Display for BoardIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "P{}", self.number())
    }
}

/// Global sensor position (0..6)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct Position(u8);

impl Position {
    /// All positions in scan order
    pub const ALL: [Position; NUM_POSITIONS] = [
        Position(0),
        Position(1),
        Position(2),
        Position(3),
        Position(4),
        Position(5),
    ];

    /// Create a position, rejecting out-of-range values
    pub fn new(index: usize) -> Result<Self, ContractError> {
        if index < NUM_POSITIONS {
            Ok(Self(index as u8))
        } else {
            Err(ContractError::IndexOutOfRange {
                kind: "position",
                index,
            })
        }
    }

    /// Zero-based index
    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }

    /// Board carrying this sensor
    #[inline]
    pub const fn board(self) -> BoardIndex {
        BoardIndex(self.0 / 2)
    }

    /// Face of the board
    #[inline]
    pub const fn side(self) -> Side {
        if self.0 % 2 == 0 {
            Side::A
        } else {
            Side::B
        }
    }

    /// Sensor on the opposite face of the same board
    #[inline]
    pub const fn partner(self) -> Position {
        Position(self.0 ^ 1)
    }

    /// Report name, e.g. "P2S1"
    pub fn name(self) -> String {
        self.to_string()
    }
}

impl TryFrom<u8> for Position {
    type Error = ContractError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::new(value as usize)
    }
}

impl From<Position> for u8 {
    fn from(position: Position) -> Self {
        position.0
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "P{}S{}", self.board().number(), self.side().number())
    }
}

/// Static description of one sensor slot, as reported in session metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveSensor {
    pub position: Position,
    pub pcb_id: u8,
    pub side: u8,
    pub name: String,
}

impl From<Position> for ActiveSensor {
    fn from(position: Position) -> Self {
        Self {
            position,
            pcb_id: position.board().number(),
            side: position.side().number(),
            name: position.name(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_position_layout() {
        for board in BoardIndex::ALL {
            let (a, b) = board.positions();
            assert_eq!(a.index(), board.index() * 2);
            assert_eq!(b.index(), board.index() * 2 + 1);
            assert_eq!(a.side(), Side::A);
            assert_eq!(b.side(), Side::B);
            assert_eq!(a.board(), board);
            assert_eq!(a.partner(), b);
            assert_eq!(b.partner(), a);
        }
    }

    #[test]
    fn test_position_names() {
        let names: Vec<String> = Position::ALL.iter().map(|p| p.name()).collect();
        assert_eq!(names, ["P1S1", "P1S2", "P2S1", "P2S2", "P3S1", "P3S2"]);
    }

    #[test]
    fn test_out_of_range_rejected() {
        assert!(Position::new(6).is_err());
        assert!(BoardIndex::new(3).is_err());
        assert!(serde_json::from_str::<Position>("7").is_err());
        assert_eq!(serde_json::from_str::<Position>("3").unwrap().index(), 3);
    }

    #[test]
    fn test_active_sensor_from_position() {
        let sensor = ActiveSensor::from(Position::ALL[3]);
        assert_eq!(sensor.pcb_id, 2);
        assert_eq!(sensor.side, 2);
        assert_eq!(sensor.name, "P2S2");
    }
}
