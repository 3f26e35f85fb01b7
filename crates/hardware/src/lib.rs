//! # Hardware
//!
//! Sensor-side hardware access.
//!
//! Responsibilities:
//! - Route the shared bus through the two-stage switch tree (`MuxController`)
//! - Discover which boards and sensors are present
//! - Pack typed sensor settings into VCNL4040 registers (`Vcnl4040`)
//! - Provide a deterministic simulated device for runs without hardware

pub mod error;
pub mod mux;
pub mod sim;
pub mod vcnl4040;

pub use error::{HardwareError, Result};
pub use mux::{BoardInfo, DiscoveryReport, MuxController, PCA_CANDIDATES, TCA_ADDRESS};
pub use sim::{Bump, SimConfig, SimulatedBus, Transit};
pub use vcnl4040::{InterruptFlags, InterruptThresholds, RegisterImage, Vcnl4040};
