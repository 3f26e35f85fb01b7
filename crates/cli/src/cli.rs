//! CLI argument definitions using clap.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Motion Play - hoop transit direction detector
#[derive(Parser, Debug)]
#[command(
    name = "motion-play",
    author,
    version,
    about = "Hoop transit direction detector",
    long_about = "Direction detector for a hoop with three dual-sensor proximity boards.\n\n\
                  Discovers the sensor tree, scans all six sensors, classifies each \n\
                  transit as A->B or B->A, and uploads the session to configured sinks."
)]
pub struct Cli {
    /// Increase logging verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true, env = "MOTION_PLAY_VERBOSE")]
    pub verbose: u8,

    /// Suppress all output except warnings and errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Log output format
    #[arg(
        long,
        value_enum,
        default_value = "pretty",
        global = true,
        env = "MOTION_PLAY_LOG_FORMAT"
    )]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Acquire, detect and upload one session
    Run(RunArgs),

    /// Run the calibration wizard and persist the result
    Calibrate(CalibrateArgs),

    /// Validate configuration file without running
    Validate(ValidateArgs),

    /// Display configuration information
    Info(InfoArgs),
}

/// Where readings come from
#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SourceKind {
    /// Simulated sensor tree with scripted transits
    #[default]
    Sim,
    /// Recorded JSONL reading stream
    Replay,
}

/// Arguments for the `run` command
#[derive(Parser, Debug, Clone)]
pub struct RunArgs {
    /// Path to configuration file (TOML or JSON)
    #[arg(short, long, default_value = "config.toml", env = "MOTION_PLAY_CONFIG")]
    pub config: PathBuf,

    /// Reading source
    #[arg(long, value_enum, default_value = "sim", env = "MOTION_PLAY_SOURCE")]
    pub source: SourceKind,

    /// Recording to play back (with `--source replay`)
    #[arg(long, env = "MOTION_PLAY_REPLAY")]
    pub replay: Option<PathBuf>,

    /// Replay speed multiplier (0 = as fast as possible)
    #[arg(long, default_value = "1.0", env = "MOTION_PLAY_REPLAY_SPEED")]
    pub replay_speed: f64,

    /// Session length in seconds (0 = until the source ends or a signal)
    #[arg(long, default_value = "0", env = "MOTION_PLAY_DURATION")]
    pub duration: u64,

    /// Scripted transits for the simulated source, alternating direction
    #[arg(long, default_value = "6", env = "MOTION_PLAY_PASSES")]
    pub passes: u32,

    /// Calibration file (overrides `calibration.store_path`)
    #[arg(long, env = "MOTION_PLAY_CALIBRATION")]
    pub calibration: Option<PathBuf>,

    /// Stop after this many detections (0 = unlimited)
    #[arg(long, default_value = "0", env = "MOTION_PLAY_MAX_DETECTIONS")]
    pub max_detections: u64,

    /// Hard limit on the whole run in seconds, upload included (0 = none)
    #[arg(long, default_value = "0", env = "MOTION_PLAY_TIMEOUT")]
    pub timeout: u64,

    /// Metrics server port (0 = disabled)
    #[arg(long, default_value = "0", env = "MOTION_PLAY_METRICS_PORT")]
    pub metrics_port: u16,

    /// Record every reading to a JSONL file
    #[arg(long, env = "MOTION_PLAY_RECORD")]
    pub record: Option<PathBuf>,

    /// Validate configuration and exit without running
    #[arg(long)]
    pub dry_run: bool,
}

/// Arguments for the `calibrate` command
#[derive(Parser, Debug, Clone)]
pub struct CalibrateArgs {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml", env = "MOTION_PLAY_CONFIG")]
    pub config: PathBuf,

    /// Where to persist the calibration record
    #[arg(short, long, env = "MOTION_PLAY_CALIBRATION")]
    pub output: PathBuf,

    /// Signal counts of the object held in front of each board
    #[arg(long, default_value = "150")]
    pub hold_amplitude: u16,
}

/// Arguments for the `validate` command
#[derive(Parser, Debug)]
pub struct ValidateArgs {
    /// Path to configuration file to validate
    #[arg(short, long, default_value = "config.toml")]
    pub config: PathBuf,

    /// Output validation result as JSON
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the `info` command
#[derive(Parser, Debug)]
pub struct InfoArgs {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml")]
    pub config: PathBuf,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,

    /// Show the packed register words written to each sensor
    #[arg(long)]
    pub registers: bool,
}

/// Log output format
#[derive(ValueEnum, Clone, Copy, Debug, Default)]
pub enum LogFormat {
    /// JSON structured logging
    Json,
    /// Human-readable pretty format
    #[default]
    Pretty,
    /// Compact single-line format
    Compact,
}

impl From<LogFormat> for observability::LogFormat {
    fn from(format: LogFormat) -> Self {
        match format {
            LogFormat::Json => Self::Json,
            LogFormat::Pretty => Self::Pretty,
            LogFormat::Compact => Self::Compact,
        }
    }
}
