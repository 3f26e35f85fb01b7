//! # Contracts
//!
//! Frozen interface contracts (ICD), defining inter-module data structures and traits.
//! All business crates can only depend on this crate, reverse dependencies are prohibited.
//!
//! ## Time Model
//! - Readings carry a monotonic microsecond timestamp from the acquisition clock
//! - Detector and wizard timing is derived from reading timestamps only

mod bus;
mod calibration;
mod clock;
mod config;
mod detection;
mod error;
mod led;
mod position;
mod reading;
mod sensor_config;
mod session;
mod sink;
mod upload;

pub use bus::{BusError, I2cBus};
pub use calibration::*;
pub use clock::{Clock, ManualClock, MonotonicClock};
pub use config::*;
pub use detection::*;
pub use error::*;
pub use led::{LedSurface, Rgb};
pub use position::*;
pub use reading::*;
pub use sensor_config::*;
pub use session::*;
pub use sink::*;
pub use upload::*;
