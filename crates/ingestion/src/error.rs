//! Ingestion error types

use contracts::ContractError;
use hardware::HardwareError;
use thiserror::Error;

/// Ingestion error
#[derive(Debug, Error)]
pub enum IngestionError {
    /// Switch tree or sensor failure outside the scan loop
    #[error(transparent)]
    Hardware(#[from] HardwareError),

    /// Acquisition already running
    #[error("acquisition already running")]
    AlreadyRunning,

    /// Acquisition thread panicked or was never started
    #[error("acquisition thread unavailable: {message}")]
    ThreadUnavailable { message: String },

    /// Replay file could not be parsed
    #[error("replay file {path} line {line}: {message}")]
    ReplayParse {
        path: String,
        line: usize,
        message: String,
    },

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<IngestionError> for ContractError {
    fn from(err: IngestionError) -> Self {
        match err {
            IngestionError::Hardware(e) => e.into(),
            IngestionError::Io(e) => ContractError::Io(e),
            other => ContractError::Other(other.to_string()),
        }
    }
}

/// Ingestion Result type alias
pub type Result<T> = std::result::Result<T, IngestionError>;
