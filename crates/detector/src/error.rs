//! Detector error types

use contracts::ContractError;
use thiserror::Error;

/// Detector error
#[derive(Debug, Error)]
pub enum DetectorError {
    /// Calibration record rejected
    #[error("calibration invalid: {message}")]
    InvalidCalibration { message: String },

    /// Wizard asked to start while a run is in progress
    #[error("calibration wizard busy in step {step}")]
    WizardBusy { step: String },

    /// Stored calibration could not be encoded or decoded
    #[error("calibration encoding error: {message}")]
    Encode { message: String },

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<DetectorError> for ContractError {
    fn from(err: DetectorError) -> Self {
        match err {
            DetectorError::InvalidCalibration { message } => ContractError::calibration(message),
            DetectorError::Io(e) => ContractError::Io(e),
            other => ContractError::Other(other.to_string()),
        }
    }
}

/// Detector Result type alias
pub type Result<T> = std::result::Result<T, DetectorError>;
