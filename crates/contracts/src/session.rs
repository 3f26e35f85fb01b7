//! Session record - Session manager output
//!
//! Built at session start, finalized at stop, then handed to the sinks by
//! move.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{
    ActiveSensor, DutyCycle, IntegrationTime, InterruptEvent, LedCurrent, MultiPulse, Reading,
    SensorSettings, NUM_POSITIONS,
};

/// Session manager state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    #[default]
    Idle,
    Collecting,
    Uploading,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => f.write_str("idle"),
            Self::Collecting => f.write_str("collecting"),
            Self::Uploading => f.write_str("uploading"),
        }
    }
}

/// What a session buffers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionKind {
    /// Polled proximity readings
    #[default]
    Proximity,
    /// Interrupt-posture edge events
    Interrupt,
}

/// Sensor configuration as reported in uploads, with the measured rate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorConfigReport {
    pub sample_rate_hz: u32,
    pub actual_sample_rate_hz: f64,
    pub led_current: LedCurrent,
    pub integration_time: IntegrationTime,
    pub duty_cycle: DutyCycle,
    pub multi_pulse: MultiPulse,
    pub high_resolution: bool,
    pub read_ambient: bool,
    pub i2c_clock_khz: u32,
}

impl SensorConfigReport {
    pub fn new(settings: &SensorSettings, actual_sample_rate_hz: f64) -> Self {
        Self {
            sample_rate_hz: settings.sample_rate_hz,
            actual_sample_rate_hz,
            led_current: settings.led_current,
            integration_time: settings.integration_time,
            duty_cycle: settings.duty_cycle,
            multi_pulse: settings.multi_pulse,
            high_resolution: settings.high_resolution,
            read_ambient: settings.read_ambient,
            i2c_clock_khz: settings.i2c_clock_khz,
        }
    }
}

/// Per-session counters and derived rates
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SessionSummary {
    /// Completed scan cycles (position index wrapped back to the start)
    pub total_cycles: u64,

    /// `total_cycles * 1000 / duration_ms`
    pub measured_cycle_rate_hz: f64,

    /// `sample_rate_hz * duration_s * num_active_sensors`
    pub theoretical_max_readings: u64,

    pub per_sensor_readings: [u64; NUM_POSITIONS],

    pub per_sensor_i2c_errors: [u64; NUM_POSITIONS],

    /// Readings lost at the acquisition queue
    pub queue_drops: u64,

    /// Readings lost because the session buffer was full
    pub buffer_drops: u64,

    pub num_active_sensors: usize,
}

impl SessionSummary {
    /// Readings actually buffered
    pub fn total_readings(&self) -> u64 {
        self.per_sensor_readings.iter().sum()
    }

    pub fn total_i2c_errors(&self) -> u64 {
        self.per_sensor_i2c_errors.iter().sum()
    }
}

/// A finalized session, ready for upload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    /// Device suffix plus start time, e.g. "001_52340"
    pub session_id: String,

    pub device_id: String,

    pub kind: SessionKind,

    pub start_time_ms: u64,

    pub duration_ms: u64,

    /// Buffered readings in acquisition order
    pub readings: Vec<Reading>,

    /// Buffered edge events (interrupt sessions)
    pub events: Vec<InterruptEvent>,

    pub active_sensors: Vec<ActiveSensor>,

    pub sensor_config: SensorConfigReport,

    pub summary: SessionSummary,
}

impl SessionRecord {
    /// Number of buffered items of the session's kind
    pub fn len(&self) -> usize {
        match self.kind {
            SessionKind::Proximity => self.readings.len(),
            SessionKind::Interrupt => self.events.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
