//! Hardware error types

use contracts::{BoardIndex, BusError, ContractError, Position};
use thiserror::Error;

/// Switch tree and sensor driver errors
#[derive(Debug, Error)]
pub enum HardwareError {
    /// Top-level switch missing
    #[error("top-level mux not found at 0x{address:02X}")]
    MuxNotFound { address: u8 },

    /// Discovery found no sensor at all
    #[error("no sensors discovered")]
    NoSensors,

    /// Board has no board-local switch
    #[error("board {board} has no local mux")]
    BoardUnavailable { board: BoardIndex },

    /// Sensor not present at a position
    #[error("no sensor at {position}")]
    SensorAbsent { position: Position },

    /// Bus transaction failed
    #[error("bus error at {target}: {source}")]
    Bus {
        target: String,
        #[source]
        source: BusError,
    },

    /// Device id register returned an unexpected value
    #[error("unexpected device id at {target}: 0x{actual:04X}")]
    DeviceIdMismatch { target: String, actual: u16 },

    /// Wrapped ContractError
    #[error(transparent)]
    Contract(#[from] ContractError),
}

impl HardwareError {
    /// Create bus error against a named target
    pub fn bus(target: impl Into<String>, source: BusError) -> Self {
        Self::Bus {
            target: target.into(),
            source,
        }
    }

    /// Whether the failure is a plain transaction failure (counted, not fatal)
    pub fn is_bus(&self) -> bool {
        matches!(self, Self::Bus { .. })
    }
}

impl From<HardwareError> for ContractError {
    fn from(err: HardwareError) -> Self {
        match err {
            HardwareError::MuxNotFound { address } => ContractError::MuxNotFound { address },
            HardwareError::NoSensors => ContractError::NoSensors,
            HardwareError::Bus { target, source } => ContractError::Bus { target, source },
            HardwareError::DeviceIdMismatch { target, actual } => {
                ContractError::DeviceIdMismatch {
                    target,
                    expected: crate::vcnl4040::DEVICE_ID,
                    actual,
                }
            }
            HardwareError::Contract(inner) => inner,
            other => ContractError::Other(other.to_string()),
        }
    }
}

/// Result alias
pub type Result<T> = std::result::Result<T, HardwareError>;
