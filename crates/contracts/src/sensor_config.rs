//! Proximity sensor configuration
//!
//! Typed settings the driver packs into registers. The serialized labels
//! ("200mA", "1T", "1/40") are the ones reported in uploads and config files.

use serde::{Deserialize, Serialize};
use std::fmt;
use validator::Validate;

use crate::ContractError;

/// IR LED drive current
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum LedCurrent {
    #[serde(rename = "50mA")]
    Ma50,
    #[serde(rename = "75mA")]
    Ma75,
    #[serde(rename = "100mA")]
    Ma100,
    #[serde(rename = "120mA")]
    Ma120,
    #[serde(rename = "140mA")]
    Ma140,
    #[serde(rename = "160mA")]
    Ma160,
    #[serde(rename = "180mA")]
    Ma180,
    #[default]
    #[serde(rename = "200mA")]
    Ma200,
}

impl LedCurrent {
    /// Drive current in milliamps
    pub const fn milliamps(self) -> u16 {
        match self {
            Self::Ma50 => 50,
            Self::Ma75 => 75,
            Self::Ma100 => 100,
            Self::Ma120 => 120,
            Self::Ma140 => 140,
            Self::Ma160 => 160,
            Self::Ma180 => 180,
            Self::Ma200 => 200,
        }
    }
}

impl fmt::Display for LedCurrent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}mA", self.milliamps())
    }
}

/// Proximity integration time, in multiples of the base period T
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum IntegrationTime {
    #[default]
    #[serde(rename = "1T")]
    T1,
    #[serde(rename = "1.5T")]
    T1_5,
    #[serde(rename = "2T")]
    T2,
    #[serde(rename = "2.5T")]
    T2_5,
    #[serde(rename = "3T")]
    T3,
    #[serde(rename = "3.5T")]
    T3_5,
    #[serde(rename = "4T")]
    T4,
    #[serde(rename = "8T")]
    T8,
}

impl IntegrationTime {
    /// Label used in reports
    pub const fn label(self) -> &'static str {
        match self {
            Self::T1 => "1T",
            Self::T1_5 => "1.5T",
            Self::T2 => "2T",
            Self::T2_5 => "2.5T",
            Self::T3 => "3T",
            Self::T3_5 => "3.5T",
            Self::T4 => "4T",
            Self::T8 => "8T",
        }
    }
}

impl fmt::Display for IntegrationTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Proximity LED duty ratio; bounds the per-sensor measurement rate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum DutyCycle {
    #[default]
    #[serde(rename = "1/40")]
    D40,
    #[serde(rename = "1/80")]
    D80,
    #[serde(rename = "1/160")]
    D160,
    #[serde(rename = "1/320")]
    D320,
}

impl DutyCycle {
    /// Label used in reports
    pub const fn label(self) -> &'static str {
        match self {
            Self::D40 => "1/40",
            Self::D80 => "1/80",
            Self::D160 => "1/160",
            Self::D320 => "1/320",
        }
    }
}

impl fmt::Display for DutyCycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Number of LED pulses per measurement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum MultiPulse {
    #[default]
    X1,
    X2,
    X4,
    X8,
}

impl MultiPulse {
    /// Pulse count
    pub const fn count(self) -> u8 {
        match self {
            Self::X1 => 1,
            Self::X2 => 2,
            Self::X4 => 4,
            Self::X8 => 8,
        }
    }
}

impl TryFrom<u8> for MultiPulse {
    type Error = ContractError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Self::X1),
            2 => Ok(Self::X2),
            4 => Ok(Self::X4),
            8 => Ok(Self::X8),
            other => Err(ContractError::config_validation(
                "multi_pulse",
                format!("must be 1, 2, 4 or 8, got {other}"),
            )),
        }
    }
}

impl From<MultiPulse> for u8 {
    fn from(value: MultiPulse) -> Self {
        value.count()
    }
}

/// Consecutive threshold hits required before an interrupt fires
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum Persistence {
    #[default]
    One,
    Two,
    Three,
    Four,
}

impl TryFrom<u8> for Persistence {
    type Error = ContractError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Self::One),
            2 => Ok(Self::Two),
            3 => Ok(Self::Three),
            4 => Ok(Self::Four),
            other => Err(ContractError::config_validation(
                "persistence",
                format!("must be 1..=4, got {other}"),
            )),
        }
    }
}

impl From<Persistence> for u8 {
    fn from(value: Persistence) -> Self {
        match value {
            Persistence::One => 1,
            Persistence::Two => 2,
            Persistence::Three => 3,
            Persistence::Four => 4,
        }
    }
}

/// Interrupt line behavior
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InterruptMode {
    /// Line pulses once per threshold crossing; flags must be read to clear
    #[default]
    Normal,
    /// Line held low while an object is present
    LogicOutput,
}

/// How the sensors are observed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Posture {
    /// Scan loop reads proximity on every cycle
    #[default]
    Polling,
    /// Sensors raise a line edge on threshold crossings
    Interrupt,
}

/// Polling-posture sensor settings, snapshotted into sessions and calibration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct SensorSettings {
    /// Target scan rate (cycles per second)
    #[validate(range(min = 1, max = 4000))]
    pub sample_rate_hz: u32,

    pub led_current: LedCurrent,

    pub integration_time: IntegrationTime,

    pub duty_cycle: DutyCycle,

    pub multi_pulse: MultiPulse,

    /// 16-bit proximity output
    pub high_resolution: bool,

    /// Also read the ambient channel on every cycle
    pub read_ambient: bool,

    #[validate(range(min = 100, max = 1000))]
    pub i2c_clock_khz: u32,
}

impl Default for SensorSettings {
    fn default() -> Self {
        Self {
            sample_rate_hz: 1000,
            led_current: LedCurrent::Ma200,
            integration_time: IntegrationTime::T1,
            duty_cycle: DutyCycle::D40,
            multi_pulse: MultiPulse::X1,
            high_resolution: true,
            read_ambient: false,
            i2c_clock_khz: 400,
        }
    }
}

/// Interrupt-posture settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct InterruptSettings {
    /// High threshold = baseline + margin
    #[validate(range(min = 1))]
    pub threshold_margin: u16,

    /// Low threshold = high threshold - hysteresis
    pub hysteresis: u16,

    pub persistence: Persistence,

    pub smart_persistence: bool,

    pub mode: InterruptMode,

    /// Bounded edge queue between the line handler and the scanner
    #[validate(range(min = 1))]
    pub edge_queue_capacity: usize,
}

impl Default for InterruptSettings {
    fn default() -> Self {
        Self {
            threshold_margin: 10,
            hysteresis: 5,
            persistence: Persistence::One,
            smart_persistence: true,
            mode: InterruptMode::Normal,
            edge_queue_capacity: 256,
        }
    }
}
