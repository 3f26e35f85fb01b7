//! DeviceConfig - Config Loader output
//!
//! Describes the full device setup: identity, sensor settings, sampling,
//! detector tuning, calibration timing, session buffering, upload batching,
//! LED response and output routing. Every section has defaults so a file
//! with only `[device]` is complete.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use validator::Validate;

use crate::{BatchMode, InterruptSettings, Posture, SensorSettings, SessionKind};

/// Complete device configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct DeviceConfig {
    #[validate(nested)]
    pub device: DeviceSection,

    #[serde(default)]
    #[validate(nested)]
    pub sensor: SensorSettings,

    #[serde(default)]
    #[validate(nested)]
    pub sampling: SamplingConfig,

    #[serde(default)]
    #[validate(nested)]
    pub detector: DetectorConfig,

    #[serde(default)]
    #[validate(nested)]
    pub calibration: CalibrationConfig,

    #[serde(default)]
    #[validate(nested)]
    pub session: SessionConfig,

    #[serde(default)]
    #[validate(nested)]
    pub upload: UploadConfig,

    #[serde(default)]
    #[validate(nested)]
    pub led: LedConfig,

    /// Output routing
    #[serde(default)]
    pub sinks: Vec<SinkConfig>,
}

/// Device identity
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct DeviceSection {
    /// Session ids use the part after the last '-'
    #[validate(length(min = 1))]
    pub device_id: String,
}

impl Default for DeviceSection {
    fn default() -> Self {
        Self {
            device_id: "motionplay-device-001".to_string(),
        }
    }
}

impl DeviceSection {
    /// Short suffix used in session ids
    pub fn suffix(&self) -> &str {
        self.device_id
            .rsplit('-')
            .next()
            .unwrap_or(self.device_id.as_str())
    }
}

/// Acquisition settings
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct SamplingConfig {
    pub posture: Posture,

    /// Top-level switch address
    pub mux_address: u8,

    /// Bounded reading queue between acquisition and detection
    #[validate(range(min = 1))]
    pub queue_capacity: usize,

    /// Per-transaction bus timeout
    #[validate(range(min = 1))]
    pub transaction_timeout_ms: u32,

    /// Measure and write per-sensor cancellation at startup
    pub cover_cancellation: bool,

    /// Reads averaged for cover cancellation
    #[validate(range(min = 1))]
    pub cancellation_samples: u16,

    #[validate(nested)]
    pub interrupt: InterruptSettings,
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            posture: Posture::Polling,
            mux_address: 0x70,
            queue_capacity: 4096,
            transaction_timeout_ms: 100,
            cover_cancellation: false,
            cancellation_samples: 32,
            interrupt: InterruptSettings::default(),
        }
    }
}

/// Wave tracker and consensus tuning
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct DetectorConfig {
    /// Raw samples averaged into one smoothed sample
    #[validate(range(min = 1))]
    pub smoothing_window: usize,

    /// Smoothed idle samples kept for the noise floor
    #[validate(range(min = 1))]
    pub baseline_window: usize,

    /// Baseline updates between threshold recomputations
    #[validate(range(min = 1))]
    pub recompute_interval: usize,

    #[validate(range(min = 1.0))]
    pub peak_multiplier: f64,

    #[validate(range(min = 0.0))]
    pub min_rise: f64,

    #[validate(range(exclusive_min = 0.0, exclusive_max = 1.0))]
    pub exit_fraction: f64,

    #[validate(range(min = 0.0))]
    pub min_wave_duration_ms: f64,

    #[validate(range(exclusive_min = 0.0))]
    pub max_wave_duration_ms: f64,

    #[validate(range(exclusive_min = 0.0))]
    pub max_peak_gap_ms: f64,

    /// CoM gap giving full timing confidence
    #[validate(range(exclusive_min = 0.0))]
    pub gap_confidence_ms: f64,

    /// Mean peak giving full signal confidence
    #[validate(range(exclusive_min = 0.0))]
    pub signal_confidence_peak: f64,

    /// Added per extra agreeing board
    #[validate(range(min = 0.0, max = 1.0))]
    pub consensus_boost: f64,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            smoothing_window: 5,
            baseline_window: 200,
            recompute_interval: 50,
            peak_multiplier: 1.5,
            min_rise: 10.0,
            exit_fraction: 0.5,
            min_wave_duration_ms: 8.0,
            max_wave_duration_ms: 200.0,
            max_peak_gap_ms: 150.0,
            gap_confidence_ms: 50.0,
            signal_confidence_peak: 100.0,
            consensus_boost: 0.15,
        }
    }
}

/// Calibration wizard timing and elevation rules
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct CalibrationConfig {
    /// Intro screen before the first baseline step (skippable)
    pub intro_ms: u64,

    /// Baseline capture window per board
    #[validate(range(min = 1))]
    pub baseline_window_ms: u64,

    /// Sustained elevation required while capturing the signal
    #[validate(range(min = 1))]
    pub sustain_ms: u64,

    /// Approach step gives up after this long
    #[validate(range(min = 1))]
    pub approach_timeout_ms: u64,

    /// Summary shown at least this long before confirm completes it
    pub summary_min_ms: u64,

    /// Samples required per capture for a board to be valid
    #[validate(range(min = 1))]
    pub min_samples: usize,

    /// Elevated when reading > max(baseline_max * factor, floor)
    #[validate(range(min = 1.0))]
    pub elevation_factor: f64,

    pub elevation_floor: u16,

    /// Elevation lost when reading < baseline_max + margin
    pub elevation_lost_margin: u16,

    /// Persisted calibration file loaded at startup
    #[serde(skip_serializing_if = "Option::is_none")]
    pub store_path: Option<String>,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            intro_ms: 3000,
            baseline_window_ms: 600,
            sustain_ms: 500,
            approach_timeout_ms: 10_000,
            summary_min_ms: 2000,
            min_samples: 20,
            elevation_factor: 2.0,
            elevation_floor: 10,
            elevation_lost_margin: 5,
            store_path: None,
        }
    }
}

/// Session buffering
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct SessionConfig {
    /// Buffered readings per session (30 s at 1 kHz)
    #[validate(range(min = 1))]
    pub buffer_capacity: usize,

    pub kind: SessionKind,

    /// Upload with live-debug batch sizes
    pub live_debug: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            buffer_capacity: 30_000,
            kind: SessionKind::Proximity,
            live_debug: false,
        }
    }
}

/// Session upload batching and retry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct UploadConfig {
    #[validate(range(min = 1))]
    pub proximity_batch_size: usize,

    #[validate(range(min = 1))]
    pub interrupt_batch_size: usize,

    #[validate(range(min = 1))]
    pub live_debug_batch_size: usize,

    /// Pause between consecutive batches
    pub inter_batch_delay_ms: u64,

    /// Retries of a batch that failed transiently
    pub max_retries: u32,

    pub retry_backoff_ms: u64,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            proximity_batch_size: 25,
            interrupt_batch_size: 100,
            live_debug_batch_size: 200,
            inter_batch_delay_ms: 100,
            max_retries: 2,
            retry_backoff_ms: 200,
        }
    }
}

impl UploadConfig {
    pub fn batch_size(&self, mode: BatchMode) -> usize {
        match mode {
            BatchMode::Proximity => self.proximity_batch_size,
            BatchMode::Interrupt => self.interrupt_batch_size,
            BatchMode::LiveDebug => self.live_debug_batch_size,
        }
    }
}

/// LED result display
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct LedConfig {
    #[validate(range(min = 1))]
    pub result_duration_ms: u64,

    #[validate(range(min = 1))]
    pub unknown_flash_ms: u64,

    pub brightness: u8,

    #[validate(range(min = 1))]
    pub num_pixels: usize,
}

impl Default for LedConfig {
    fn default() -> Self {
        Self {
            result_duration_ms: 3000,
            unknown_flash_ms: 500,
            brightness: 128,
            num_pixels: 72,
        }
    }
}

/// Sink output configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct SinkConfig {
    #[validate(length(min = 1))]
    pub name: String,

    pub sink_type: SinkType,

    #[serde(default = "default_queue_capacity")]
    #[validate(range(min = 1))]
    pub queue_capacity: usize,

    /// Type-specific parameters
    #[serde(default)]
    pub params: HashMap<String, String>,
}

fn default_queue_capacity() -> usize {
    100
}

/// Sink type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SinkType {
    /// Log output
    Log,
    /// JSON lines files per session
    File,
    /// UDP datagrams
    Network,
}
