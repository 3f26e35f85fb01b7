//! Simulated switch tree and sensors
//!
//! Models the top-level switch, one board-local switch per board and six
//! sensors with register files. A board-local switch only sees writes while
//! its top-level channel is enabled, and a sensor only answers when exactly
//! one path to it is open, so routing mistakes show up as NACKs or bus
//! faults just as they would on the bench.

use std::sync::Arc;

use contracts::{
    BoardIndex, BusError, Clock, Direction, I2cBus, ManualClock, MonotonicClock, Position, Side,
    NUM_BOARDS, NUM_POSITIONS,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::mux::TCA_ADDRESS;
use crate::vcnl4040::{reg, InterruptFlags, ADDRESS as SENSOR_ADDRESS, DEVICE_ID};

/// Triangular proximity bump on one sensor
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bump {
    pub position: Position,
    pub center_us: u64,
    pub half_width_us: u64,
    pub amplitude: u16,
}

impl Bump {
    /// Added counts at time `t_us`
    pub fn value_at(&self, t_us: u64) -> f64 {
        let distance = t_us.abs_diff(self.center_us);
        if distance >= self.half_width_us || self.half_width_us == 0 {
            return 0.0;
        }
        let fraction = 1.0 - distance as f64 / self.half_width_us as f64;
        f64::from(self.amplitude) * fraction
    }
}

/// One object passing through the hoop
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transit {
    /// Board to excite; `None` excites every board
    pub board: Option<BoardIndex>,
    pub direction: Direction,
    /// Entry-side bump center
    pub entry_us: u64,
    /// Exit-side bump lags the entry side by this much
    pub lag_us: u64,
    pub half_width_us: u64,
    pub amplitude: u16,
}

impl Transit {
    /// Expand into per-sensor bumps
    pub fn bumps(&self) -> Vec<Bump> {
        let boards: Vec<BoardIndex> = match self.board {
            Some(board) => vec![board],
            None => BoardIndex::ALL.to_vec(),
        };
        let entry_side = match self.direction {
            Direction::BToA => Side::B,
            _ => Side::A,
        };

        boards
            .into_iter()
            .flat_map(|board| {
                [
                    Bump {
                        position: board.position(entry_side),
                        center_us: self.entry_us,
                        half_width_us: self.half_width_us,
                        amplitude: self.amplitude,
                    },
                    Bump {
                        position: board.position(entry_side.opposite()),
                        center_us: self.entry_us + self.lag_us,
                        half_width_us: self.half_width_us,
                        amplitude: self.amplitude,
                    },
                ]
            })
            .collect()
    }
}

/// Simulated device configuration
#[derive(Debug, Clone)]
pub struct SimConfig {
    pub tca_present: bool,
    pub tca_address: u8,
    /// Board-local switch address per board
    pub pca_addresses: [u8; NUM_BOARDS],
    /// Boards without a local switch
    pub missing_boards: Vec<BoardIndex>,
    /// Sensors that do not answer
    pub missing_sensors: Vec<Position>,
    /// Idle proximity count
    pub baseline: u16,
    /// Uniform noise added on top of the baseline (0..=noise)
    pub noise: u16,
    /// Idle ambient count
    pub ambient: u16,
    pub seed: u64,
    /// Probability that a sensor transaction is not acknowledged
    pub nack_rate: f64,
    /// Sensors subject to `nack_rate`; empty means all
    pub flaky_positions: Vec<Position>,
    /// Clock advance per bus transaction (manual clock only)
    pub transaction_us: u64,
    pub bumps: Vec<Bump>,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            tca_present: true,
            tca_address: TCA_ADDRESS,
            pca_addresses: [0x74; NUM_BOARDS],
            missing_boards: Vec::new(),
            missing_sensors: Vec::new(),
            baseline: 20,
            noise: 0,
            ambient: 120,
            seed: 7,
            nack_rate: 0.0,
            flaky_positions: Vec::new(),
            transaction_us: 100,
            bumps: Vec::new(),
        }
    }
}

impl SimConfig {
    pub fn with_transits(mut self, transits: &[Transit]) -> Self {
        self.bumps
            .extend(transits.iter().flat_map(|transit| transit.bumps()));
        self
    }
}

#[derive(Debug, Clone)]
struct SimSensor {
    registers: [u16; 13],
    close: bool,
}

impl SimSensor {
    fn new() -> Self {
        let mut registers = [0u16; 13];
        registers[reg::ID as usize] = DEVICE_ID;
        // Power-on: proximity and ambient shut down
        registers[reg::ALS_CONF as usize] = 0x0001;
        registers[reg::PS_CONF1_2 as usize] = 0x0001;
        Self {
            registers,
            close: false,
        }
    }

    fn conf1(&self) -> u8 {
        self.registers[reg::PS_CONF1_2 as usize].to_le_bytes()[0]
    }

    fn conf2(&self) -> u8 {
        self.registers[reg::PS_CONF1_2 as usize].to_le_bytes()[1]
    }

    fn interrupts_enabled(&self) -> bool {
        self.conf2() & 0x03 != 0
    }
}

/// In-memory bus with the switch tree and sensors behind it
pub struct SimulatedBus {
    config: SimConfig,
    clock: Arc<dyn Clock>,
    manual: Option<ManualClock>,
    rng: StdRng,
    tca_mask: u8,
    pca_masks: [u8; NUM_BOARDS],
    sensors: [Option<SimSensor>; NUM_POSITIONS],
    transactions: u64,
}

impl SimulatedBus {
    /// Simulation on a manual clock that advances per transaction
    pub fn new(config: SimConfig) -> Self {
        let clock = ManualClock::new(0);
        Self::build(config, Arc::new(clock.clone()), Some(clock))
    }

    /// Simulation following the host's monotonic clock
    pub fn realtime(config: SimConfig) -> Self {
        Self::build(config, Arc::new(MonotonicClock::new()), None)
    }

    fn build(config: SimConfig, clock: Arc<dyn Clock>, manual: Option<ManualClock>) -> Self {
        let sensors = Position::ALL.map(|position| {
            let missing = config.missing_boards.contains(&position.board())
                || config.missing_sensors.contains(&position);
            (!missing).then(SimSensor::new)
        });

        Self {
            rng: StdRng::seed_from_u64(config.seed),
            config,
            clock,
            manual,
            tca_mask: 0,
            pca_masks: [0; NUM_BOARDS],
            sensors,
            transactions: 0,
        }
    }

    /// Shared time source; readings must be stamped with it
    pub fn clock(&self) -> Arc<dyn Clock> {
        Arc::clone(&self.clock)
    }

    /// Schedule more signal
    pub fn add_bumps(&mut self, bumps: impl IntoIterator<Item = Bump>) {
        self.config.bumps.extend(bumps);
    }

    pub fn tca_mask(&self) -> u8 {
        self.tca_mask
    }

    /// Latched board-local masks (a board's latch persists while its
    /// top-level channel is off)
    pub fn pca_masks(&self) -> [u8; NUM_BOARDS] {
        self.pca_masks
    }

    /// Sensors an addressed transaction would currently reach
    pub fn routed_sensors(&self) -> Vec<Position> {
        Position::ALL
            .into_iter()
            .filter(|position| {
                let board = position.board();
                self.board_reachable(board)
                    && self.pca_masks[board.index()] & (1 << position.side().channel()) != 0
                    && self.sensors[position.index()].is_some()
            })
            .collect()
    }

    /// Raw register contents, for inspection
    pub fn register(&self, position: Position, register: u8) -> Option<u16> {
        self.sensors[position.index()]
            .as_ref()
            .and_then(|sensor| sensor.registers.get(register as usize).copied())
    }

    pub fn transactions(&self) -> u64 {
        self.transactions
    }

    /// Evaluate every sensor with interrupts enabled against its thresholds
    /// and latch flags. Returns the boards whose combined line fired.
    pub fn update_interrupt_lines(&mut self) -> Vec<BoardIndex> {
        let mut fired = Vec::new();
        for position in Position::ALL {
            let enabled = self.sensors[position.index()]
                .as_ref()
                .is_some_and(SimSensor::interrupts_enabled);
            if !enabled {
                continue;
            }
            let value = self.proximity(position);
            let Some(sensor) = self.sensors[position.index()].as_mut() else {
                continue;
            };
            let high = sensor.registers[reg::PS_THDH as usize];
            let low = sensor.registers[reg::PS_THDL as usize];
            let mut flag = 0u8;
            if !sensor.close && value > high {
                sensor.close = true;
                flag = InterruptFlags::PS_IF_CLOSE;
            } else if sensor.close && value < low {
                sensor.close = false;
                flag = InterruptFlags::PS_IF_AWAY;
            }
            if flag != 0 {
                let flags = &mut sensor.registers[reg::INT_FLAG as usize];
                *flags |= u16::from(flag) << 8;
                if !fired.contains(&position.board()) {
                    fired.push(position.board());
                }
            }
        }
        fired
    }

    fn tick(&mut self) {
        self.transactions += 1;
        if let Some(manual) = &self.manual {
            manual.advance_us(self.config.transaction_us);
        }
    }

    fn board_reachable(&self, board: BoardIndex) -> bool {
        self.tca_mask & (1 << board.channel()) != 0
            && !self.config.missing_boards.contains(&board)
    }

    fn route_sensor(&mut self) -> Result<Position, BusError> {
        let routed = self.routed_sensors();
        let position = match routed.as_slice() {
            [] => {
                return Err(BusError::Nack {
                    address: SENSOR_ADDRESS,
                })
            }
            [one] => *one,
            // Two sensors driving one address
            _ => {
                return Err(BusError::Fault {
                    address: SENSOR_ADDRESS,
                })
            }
        };
        Ok(position)
    }

    /// Injected failure on a data read
    fn inject_nack(&mut self, position: Position) -> bool {
        let flaky = self.config.flaky_positions.is_empty()
            || self.config.flaky_positions.contains(&position);
        flaky
            && self.config.nack_rate > 0.0
            && self.rng.random_bool(self.config.nack_rate.clamp(0.0, 1.0))
    }

    /// Proximity output after cancellation and resolution clipping
    fn proximity(&mut self, position: Position) -> u16 {
        let now = self.clock.now_us();
        let signal: f64 = self
            .config
            .bumps
            .iter()
            .filter(|bump| bump.position == position)
            .map(|bump| bump.value_at(now))
            .sum();
        let noise = if self.config.noise > 0 {
            self.rng.random_range(0..=self.config.noise)
        } else {
            0
        };
        let raw = (f64::from(self.config.baseline) + signal).round() as u32 + u32::from(noise);

        let Some(sensor) = self.sensors[position.index()].as_ref() else {
            return 0;
        };
        if sensor.conf1() & 0x01 != 0 {
            return 0;
        }
        let cancelled = raw.saturating_sub(u32::from(sensor.registers[reg::PS_CANC as usize]));
        let ceiling = if sensor.conf2() & 0x08 != 0 {
            u32::from(u16::MAX)
        } else {
            0x0FFF
        };
        cancelled.min(ceiling) as u16
    }

    fn read_sensor_register(&mut self, position: Position, register: u8) -> u16 {
        match register {
            reg::PS_DATA => self.proximity(position),
            reg::ALS_DATA => {
                let shut_down = self.sensors[position.index()]
                    .as_ref()
                    .map_or(true, |sensor| sensor.registers[reg::ALS_CONF as usize] & 0x01 != 0);
                if shut_down {
                    0
                } else {
                    self.config.ambient
                }
            }
            reg::INT_FLAG => match self.sensors[position.index()].as_mut() {
                Some(sensor) => std::mem::take(&mut sensor.registers[reg::INT_FLAG as usize]),
                None => 0,
            },
            other => self
                .sensors[position.index()]
                .as_ref()
                .and_then(|sensor| sensor.registers.get(other as usize).copied())
                .unwrap_or(0),
        }
    }
}

impl I2cBus for SimulatedBus {
    fn write(&mut self, address: u8, bytes: &[u8]) -> Result<(), BusError> {
        self.tick();

        if address == self.config.tca_address {
            if !self.config.tca_present {
                return Err(BusError::Nack { address });
            }
            if let Some(mask) = bytes.first() {
                self.tca_mask = *mask;
            }
            return Ok(());
        }

        if address == SENSOR_ADDRESS {
            let position = self.route_sensor()?;
            if let ([register, low, high], Some(sensor)) =
                (bytes, self.sensors[position.index()].as_mut())
            {
                if *register <= reg::PS_THDH {
                    sensor.registers[*register as usize] = u16::from_le_bytes([*low, *high]);
                }
            }
            return Ok(());
        }

        let reachable: Vec<BoardIndex> = BoardIndex::ALL
            .into_iter()
            .filter(|board| {
                self.board_reachable(*board) && self.config.pca_addresses[board.index()] == address
            })
            .collect();
        if reachable.is_empty() {
            return Err(BusError::Nack { address });
        }
        if let Some(mask) = bytes.first() {
            for board in reachable {
                self.pca_masks[board.index()] = *mask;
            }
        }
        Ok(())
    }

    fn write_read(
        &mut self,
        address: u8,
        bytes: &[u8],
        buffer: &mut [u8],
    ) -> Result<(), BusError> {
        self.tick();

        if address != SENSOR_ADDRESS {
            return Err(BusError::Nack { address });
        }
        let position = self.route_sensor()?;
        let register = bytes.first().copied().unwrap_or(reg::ID);
        if matches!(register, reg::PS_DATA | reg::ALS_DATA) && self.inject_nack(position) {
            return Err(BusError::Nack { address });
        }
        let value = self.read_sensor_register(position, register).to_le_bytes();
        for (slot, byte) in buffer.iter_mut().zip(value) {
            *slot = byte;
        }
        Ok(())
    }
}
