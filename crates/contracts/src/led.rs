//! LedSurface trait - result display strip
//!
//! The strip reduces to a solid fill plus a global brightness. Animation
//! timing lives with the caller.

use serde::{Deserialize, Serialize};

use crate::Direction;

/// 8-bit RGB color
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const OFF: Rgb = Rgb::new(0, 0, 0);
    pub const A_TO_B: Rgb = Rgb::new(0, 100, 255);
    pub const B_TO_A: Rgb = Rgb::new(255, 100, 0);
    pub const UNKNOWN: Rgb = Rgb::new(255, 255, 255);

    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Result color for a verdict
    pub const fn for_direction(direction: Direction) -> Self {
        match direction {
            Direction::AToB => Self::A_TO_B,
            Direction::BToA => Self::B_TO_A,
            Direction::Unknown => Self::UNKNOWN,
        }
    }
}

/// Addressable strip driven as one surface
pub trait LedSurface: Send {
    /// Set every pixel to `color` and latch
    fn fill(&mut self, color: Rgb);

    /// Global brightness, 0..=255
    fn set_brightness(&mut self, brightness: u8);
}

impl<L: LedSurface + ?Sized> LedSurface for Box<L> {
    fn fill(&mut self, color: Rgb) {
        (**self).fill(color)
    }

    fn set_brightness(&mut self, brightness: u8) {
        (**self).set_brightness(brightness)
    }
}
