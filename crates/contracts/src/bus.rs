//! I2cBus trait - shared serial bus abstraction
//!
//! The sampling engine owns exactly one bus handle; every transaction to
//! the switch tree and the proximity sensors goes through it.

use thiserror::Error;

/// Bus transaction failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum BusError {
    /// Target did not acknowledge its address or data
    #[error("no acknowledge from 0x{address:02X}")]
    Nack { address: u8 },

    /// Transaction exceeded the bus timeout
    #[error("timeout after {waited_ms}ms talking to 0x{address:02X}")]
    Timeout { address: u8, waited_ms: u32 },

    /// Bus level fault (arbitration lost, bus stuck)
    #[error("bus fault talking to 0x{address:02X}")]
    Fault { address: u8 },
}

impl BusError {
    /// 7-bit address of the failing target
    pub fn address(&self) -> u8 {
        match *self {
            Self::Nack { address } | Self::Timeout { address, .. } | Self::Fault { address } => {
                address
            }
        }
    }
}

/// Blocking I2C master
///
/// Implemented by the simulated bus in tests and by board support code on
/// hardware. Transactions are synchronous: the acquisition thread is the
/// only caller.
pub trait I2cBus: Send {
    /// Write `bytes` to `address`. An empty write is an address probe.
    fn write(&mut self, address: u8, bytes: &[u8]) -> Result<(), BusError>;

    /// Write `bytes` then read `buffer.len()` bytes with a repeated start.
    fn write_read(&mut self, address: u8, bytes: &[u8], buffer: &mut [u8])
        -> Result<(), BusError>;

    /// Probe for an acknowledge at `address`
    fn probe(&mut self, address: u8) -> Result<(), BusError> {
        self.write(address, &[])
    }
}

impl<B: I2cBus + ?Sized> I2cBus for Box<B> {
    fn write(&mut self, address: u8, bytes: &[u8]) -> Result<(), BusError> {
        (**self).write(address, bytes)
    }

    fn write_read(
        &mut self,
        address: u8,
        bytes: &[u8],
        buffer: &mut [u8],
    ) -> Result<(), BusError> {
        (**self).write_read(address, bytes, buffer)
    }

    fn probe(&mut self, address: u8) -> Result<(), BusError> {
        (**self).probe(address)
    }
}
