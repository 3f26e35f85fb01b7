//! Layered error definitions
//!
//! Categorized by source: config / bus / discovery / calibration / session / sink

use thiserror::Error;

use crate::BusError;

/// Unified error type
#[derive(Debug, Error)]
pub enum ContractError {
    // ===== Configuration Errors =====
    /// Configuration parse error
    #[error("config parse error: {message}")]
    ConfigParse {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Configuration validation error
    #[error("config validation error at '{field}': {message}")]
    ConfigValidation { field: String, message: String },

    // ===== Bus / Hardware Errors =====
    /// Bus transaction failed at a sensor position
    #[error("bus error at {target}: {source}")]
    Bus {
        target: String,
        #[source]
        source: BusError,
    },

    /// Top-level switch did not acknowledge; acquisition cannot start
    #[error("top-level mux not found at 0x{address:02X}")]
    MuxNotFound { address: u8 },

    /// No sensor answered during discovery
    #[error("no sensors discovered behind mux")]
    NoSensors,

    /// Device id register returned an unexpected value
    #[error("unexpected device id at {target}: expected 0x{expected:04X}, got 0x{actual:04X}")]
    DeviceIdMismatch {
        target: String,
        expected: u16,
        actual: u16,
    },

    /// Position or board index out of range
    #[error("{kind} index {index} out of range")]
    IndexOutOfRange { kind: &'static str, index: usize },

    // ===== Calibration Errors =====
    /// Calibration record rejected
    #[error("calibration invalid: {message}")]
    CalibrationInvalid { message: String },

    // ===== Session Errors =====
    /// Operation not allowed in the current session state
    #[error("session operation '{operation}' not allowed in state {state}")]
    SessionState {
        operation: &'static str,
        state: String,
    },

    // ===== Sink Errors =====
    /// Sink write error
    #[error("sink '{sink_name}' write error: {message}")]
    SinkWrite { sink_name: String, message: String },

    /// Sink connection error
    #[error("sink '{sink_name}' connection error: {message}")]
    SinkConnection { sink_name: String, message: String },

    // ===== General Errors =====
    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Other error
    #[error("{0}")]
    Other(String),
}

impl ContractError {
    /// Create configuration parse error
    pub fn config_parse(message: impl Into<String>) -> Self {
        Self::ConfigParse {
            message: message.into(),
            source: None,
        }
    }

    /// Create configuration validation error
    pub fn config_validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ConfigValidation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create bus error against a named target (position name or chip address)
    pub fn bus(target: impl Into<String>, source: BusError) -> Self {
        Self::Bus {
            target: target.into(),
            source,
        }
    }

    /// Create session state error
    pub fn session_state(operation: &'static str, state: impl std::fmt::Display) -> Self {
        Self::SessionState {
            operation,
            state: state.to_string(),
        }
    }

    /// Create calibration error
    pub fn calibration(message: impl Into<String>) -> Self {
        Self::CalibrationInvalid {
            message: message.into(),
        }
    }

    /// Create sink write error
    pub fn sink_write(sink_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::SinkWrite {
            sink_name: sink_name.into(),
            message: message.into(),
        }
    }

    /// Create sink connection error
    pub fn sink_connection(sink_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::SinkConnection {
            sink_name: sink_name.into(),
            message: message.into(),
        }
    }

    /// Whether a retry at the upload boundary may succeed
    pub fn is_transient(&self) -> bool {
        match self {
            Self::SinkConnection { .. } => true,
            Self::Bus { source, .. } => matches!(source, BusError::Timeout { .. }),
            Self::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::TimedOut
                    | std::io::ErrorKind::Interrupted
                    | std::io::ErrorKind::WouldBlock
                    | std::io::ErrorKind::ConnectionRefused
            ),
            _ => false,
        }
    }
}
