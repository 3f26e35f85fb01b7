//! Two-stage bus switch tree
//!
//! A top-level 8-way switch gates one channel per board; each board carries
//! a 4-way switch in front of its two sensors. A board-local switch is only
//! reachable while its top-level channel is enabled, which dictates the
//! ordering of every disable sequence below.

use contracts::{ActiveSensor, BoardIndex, I2cBus, Position, Side, NUM_BOARDS};
use tracing::{debug, info, instrument, warn};

use crate::error::{HardwareError, Result};
use crate::vcnl4040::{Vcnl4040, DEVICE_ID};

/// Default top-level switch address
pub const TCA_ADDRESS: u8 = 0x70;

/// Board-local switch addresses, in probe order
pub const PCA_CANDIDATES: [u8; 7] = [0x74, 0x75, 0x76, 0x72, 0x71, 0x73, 0x77];

/// What discovery found on one board slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoardInfo {
    pub board: BoardIndex,
    /// Board-local switch address, if one answered
    pub pca_address: Option<u8>,
    /// Sensor presence per side (A, B)
    pub sensors: [bool; 2],
}

impl BoardInfo {
    fn absent(board: BoardIndex) -> Self {
        Self {
            board,
            pca_address: None,
            sensors: [false; 2],
        }
    }

    pub fn has_sensor(&self, side: Side) -> bool {
        self.sensors[side.channel() as usize]
    }

    /// Both sensors present, so the board can pair waves
    pub fn is_complete(&self) -> bool {
        self.sensors.iter().all(|present| *present)
    }
}

/// Static discovery result
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveryReport {
    pub tca_address: u8,
    pub boards: [BoardInfo; NUM_BOARDS],
}

impl DiscoveryReport {
    pub fn is_present(&self, position: Position) -> bool {
        self.boards[position.board().index()].has_sensor(position.side())
    }

    /// Present positions in scan order
    pub fn active_positions(&self) -> Vec<Position> {
        Position::ALL
            .into_iter()
            .filter(|position| self.is_present(*position))
            .collect()
    }

    pub fn active_sensors(&self) -> Vec<ActiveSensor> {
        self.active_positions()
            .into_iter()
            .map(ActiveSensor::from)
            .collect()
    }

    pub fn active_count(&self) -> usize {
        self.active_positions().len()
    }

    /// Boards with both sensors present
    pub fn complete_boards(&self) -> Vec<BoardIndex> {
        self.boards
            .iter()
            .filter(|info| info.is_complete())
            .map(|info| info.board)
            .collect()
    }
}

/// Owner of the bus and of the switch tree state
pub struct MuxController<B> {
    bus: B,
    tca_address: u8,
    boards: [BoardInfo; NUM_BOARDS],
    current: Option<Position>,
}

impl<B: I2cBus> MuxController<B> {
    pub fn new(bus: B) -> Self {
        Self::with_address(bus, TCA_ADDRESS)
    }

    pub fn with_address(bus: B, tca_address: u8) -> Self {
        Self {
            bus,
            tca_address,
            boards: BoardIndex::ALL.map(BoardInfo::absent),
            current: None,
        }
    }

    /// Probe the tree: top-level switch, each board's local switch, then the
    /// sensor id behind each local channel. Leaves every channel disabled.
    ///
    /// # Errors
    /// `MuxNotFound` if the top-level switch does not answer, `NoSensors` if
    /// nothing answered behind it. A missing board is not an error.
    #[instrument(name = "mux_discover", skip(self), fields(tca = format_args!("0x{:02X}", self.tca_address)))]
    pub fn discover(&mut self) -> Result<DiscoveryReport> {
        if self.bus.probe(self.tca_address).is_err() {
            return Err(HardwareError::MuxNotFound {
                address: self.tca_address,
            });
        }
        self.write_tca(0)?;
        self.current = None;

        let driver = Vcnl4040::new();
        for board in BoardIndex::ALL {
            let mut info = BoardInfo::absent(board);

            if let Err(e) = self.write_tca(1 << board.channel()) {
                warn!(board = %board, error = %e, "Failed to enable board channel");
                self.boards[board.index()] = info;
                continue;
            }

            info.pca_address = self.scan_for_pca();
            let Some(pca) = info.pca_address else {
                warn!(board = %board, "No board-local mux found, board disabled");
                self.boards[board.index()] = info;
                continue;
            };

            for side in [Side::A, Side::B] {
                if self.write_pca(pca, 1 << side.channel()).is_err() {
                    continue;
                }
                let present = match driver.device_id(&mut self.bus) {
                    Ok(DEVICE_ID) => true,
                    Ok(other) => {
                        warn!(
                            position = %board.position(side),
                            id = format_args!("0x{other:04X}"),
                            "Unexpected device id"
                        );
                        false
                    }
                    Err(_) => false,
                };
                info.sensors[side.channel() as usize] = present;
                debug!(position = %board.position(side), present, "Probed sensor");
            }

            let _ = self.write_pca(pca, 0);
            self.boards[board.index()] = info;
        }

        self.disable_all()?;

        let report = self.report();
        info!(
            active = report.active_count(),
            complete_boards = report.complete_boards().len(),
            "Discovery finished"
        );
        if report.active_count() == 0 {
            return Err(HardwareError::NoSensors);
        }
        Ok(report)
    }

    /// Route the bus to one sensor, disabling every other channel
    ///
    /// When leaving a board its top-level channel is re-enabled first so the
    /// board-local disable write can reach the chip.
    pub fn select(&mut self, position: Position) -> Result<()> {
        if self.current == Some(position) {
            return Ok(());
        }

        let board = position.board();
        let pca = self.boards[board.index()]
            .pca_address
            .ok_or(HardwareError::BoardUnavailable { board })?;

        // Unknown until every write below lands
        let previous = self.current.take();
        if let Some(previous) = previous {
            let old_board = previous.board();
            if old_board != board {
                if let Some(old_pca) = self.boards[old_board.index()].pca_address {
                    self.write_tca(1 << old_board.channel())?;
                    self.write_pca(old_pca, 0)?;
                }
            }
        }

        self.write_tca(1 << board.channel())?;
        self.write_pca(pca, 1 << position.side().channel())?;
        self.current = Some(position);
        Ok(())
    }

    /// For each board with a local switch: enable its top-level channel and
    /// clear the local channels. Then clear the top-level switch.
    ///
    /// Keeps going past individual failures and returns the first one.
    pub fn disable_all(&mut self) -> Result<()> {
        let mut first_error = None;

        for info in self.boards {
            let Some(pca) = info.pca_address else {
                continue;
            };
            let step = self
                .write_tca(1 << info.board.channel())
                .and_then(|_| self.write_pca(pca, 0));
            if let Err(e) = step {
                warn!(board = %info.board, error = %e, "Failed to clear board-local mux");
                first_error.get_or_insert(e);
            }
        }

        if let Err(e) = self.write_tca(0) {
            first_error.get_or_insert(e);
        }
        self.current = None;

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Current discovery state
    pub fn report(&self) -> DiscoveryReport {
        DiscoveryReport {
            tca_address: self.tca_address,
            boards: self.boards,
        }
    }

    pub fn is_present(&self, position: Position) -> bool {
        self.boards[position.board().index()].has_sensor(position.side())
    }

    /// Currently routed sensor
    pub fn current(&self) -> Option<Position> {
        self.current
    }

    pub fn bus(&self) -> &B {
        &self.bus
    }

    pub fn tca_address(&self) -> u8 {
        self.tca_address
    }

    /// Borrow the bus for a transaction with the selected sensor
    pub fn bus_mut(&mut self) -> &mut B {
        &mut self.bus
    }

    pub fn into_bus(self) -> B {
        self.bus
    }

    fn scan_for_pca(&mut self) -> Option<u8> {
        let tca = self.tca_address;
        PCA_CANDIDATES
            .into_iter()
            .filter(|address| *address != tca)
            .find(|address| self.bus.probe(*address).is_ok())
    }

    fn write_tca(&mut self, mask: u8) -> Result<()> {
        self.bus
            .write(self.tca_address, &[mask])
            .map_err(|e| HardwareError::bus(format!("mux 0x{:02X}", self.tca_address), e))
    }

    fn write_pca(&mut self, address: u8, mask: u8) -> Result<()> {
        self.bus
            .write(address, &[mask])
            .map_err(|e| HardwareError::bus(format!("mux 0x{address:02X}"), e))
    }
}
