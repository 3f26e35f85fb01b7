//! VCNL4040 proximity sensor driver
//!
//! Registers are 16 bits, little-endian, addressed by command code. The
//! driver holds no bus; every call borrows the bus from the caller, which
//! has already routed the switch tree to the right sensor.

use contracts::{
    BusError, DutyCycle, I2cBus, IntegrationTime, InterruptMode, InterruptSettings, LedCurrent,
    MultiPulse, Persistence, SensorSettings,
};
use tracing::{debug, instrument};

/// Fixed 7-bit sensor address
pub const ADDRESS: u8 = 0x60;

/// Expected value of the ID register
pub const DEVICE_ID: u16 = 0x0186;

/// Register command codes
pub mod reg {
    pub const ALS_CONF: u8 = 0x00;
    pub const ALS_THDH: u8 = 0x01;
    pub const ALS_THDL: u8 = 0x02;
    /// PS_CONF1 (low byte) + PS_CONF2 (high byte)
    pub const PS_CONF1_2: u8 = 0x03;
    /// PS_CONF3 (low byte) + PS_MS (high byte)
    pub const PS_CONF3_MS: u8 = 0x04;
    pub const PS_CANC: u8 = 0x05;
    pub const PS_THDL: u8 = 0x06;
    pub const PS_THDH: u8 = 0x07;
    pub const PS_DATA: u8 = 0x08;
    pub const ALS_DATA: u8 = 0x09;
    pub const WHITE_DATA: u8 = 0x0A;
    /// Reserved (low byte) + INT_FLAG (high byte)
    pub const INT_FLAG: u8 = 0x0B;
    pub const ID: u8 = 0x0C;
}

// PS_CONF1
const PS_SD: u8 = 0x01;
// PS_CONF2
const PS_HD_16BIT: u8 = 0x08;
const PS_INT_BOTH: u8 = 0x03;
// PS_CONF3
const PS_SMART_PERS: u8 = 0x10;
// PS_MS
const WHITE_DISABLE: u8 = 0x80;
const PS_MS_LOGIC: u8 = 0x40;
// ALS_CONF
const ALS_SD: u8 = 0x01;

fn duty_bits(duty: DutyCycle) -> u8 {
    match duty {
        DutyCycle::D40 => 0x00,
        DutyCycle::D80 => 0x40,
        DutyCycle::D160 => 0x80,
        DutyCycle::D320 => 0xC0,
    }
}

fn persistence_bits(persistence: Persistence) -> u8 {
    match persistence {
        Persistence::One => 0x00,
        Persistence::Two => 0x10,
        Persistence::Three => 0x20,
        Persistence::Four => 0x30,
    }
}

fn integration_bits(it: IntegrationTime) -> u8 {
    match it {
        IntegrationTime::T1 => 0x00,
        IntegrationTime::T1_5 => 0x02,
        IntegrationTime::T2 => 0x04,
        IntegrationTime::T2_5 => 0x06,
        IntegrationTime::T3 => 0x08,
        IntegrationTime::T3_5 => 0x0A,
        IntegrationTime::T4 => 0x0C,
        IntegrationTime::T8 => 0x0E,
    }
}

fn multi_pulse_bits(pulses: MultiPulse) -> u8 {
    match pulses {
        MultiPulse::X1 => 0x00,
        MultiPulse::X2 => 0x20,
        MultiPulse::X4 => 0x40,
        MultiPulse::X8 => 0x60,
    }
}

fn led_current_bits(current: LedCurrent) -> u8 {
    match current {
        LedCurrent::Ma50 => 0x00,
        LedCurrent::Ma75 => 0x01,
        LedCurrent::Ma100 => 0x02,
        LedCurrent::Ma120 => 0x03,
        LedCurrent::Ma140 => 0x04,
        LedCurrent::Ma160 => 0x05,
        LedCurrent::Ma180 => 0x06,
        LedCurrent::Ma200 => 0x07,
    }
}

#[inline]
fn word(low: u8, high: u8) -> u16 {
    u16::from_le_bytes([low, high])
}

/// Interrupt flag byte (high byte of INT_FLAG)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct InterruptFlags(pub u8);

impl InterruptFlags {
    pub const PS_SPFLAG: u8 = 0x40;
    pub const ALS_IF_L: u8 = 0x20;
    pub const ALS_IF_H: u8 = 0x10;
    pub const PS_IF_CLOSE: u8 = 0x02;
    pub const PS_IF_AWAY: u8 = 0x01;

    /// Proximity rose above the high threshold
    pub fn is_close(self) -> bool {
        self.0 & Self::PS_IF_CLOSE != 0
    }

    /// Proximity fell below the low threshold
    pub fn is_away(self) -> bool {
        self.0 & Self::PS_IF_AWAY != 0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }
}

/// Proximity thresholds programmed for the interrupt posture
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InterruptThresholds {
    pub cancellation: u16,
    pub low: u16,
    pub high: u16,
}

impl InterruptThresholds {
    /// Cancellation removes the baseline, so thresholds sit in the cancelled
    /// domain: the raw signal crosses high at `baseline + margin` and low at
    /// `baseline + margin - hysteresis`.
    pub fn from_baseline(baseline: u16, settings: &InterruptSettings) -> Self {
        let high = settings.threshold_margin.max(1);
        let low = high.saturating_sub(settings.hysteresis).max(1).min(high);
        Self {
            cancellation: baseline,
            low,
            high,
        }
    }
}

/// Packed configuration words the driver writes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegisterImage {
    pub als_conf: u16,
    pub ps_conf1_2: u16,
    pub ps_conf3_ms: u16,
}

impl RegisterImage {
    /// Polling posture: proximity on, interrupts off
    pub fn polling(settings: &SensorSettings) -> Self {
        let ps_conf1 = duty_bits(settings.duty_cycle)
            | persistence_bits(Persistence::One)
            | integration_bits(settings.integration_time);
        let ps_conf2 = if settings.high_resolution {
            PS_HD_16BIT
        } else {
            0
        };
        let ps_conf3 = multi_pulse_bits(settings.multi_pulse);
        let ps_ms = WHITE_DISABLE | led_current_bits(settings.led_current);
        let als_conf = if settings.read_ambient { 0 } else { ALS_SD };

        Self {
            als_conf: word(als_conf, 0),
            ps_conf1_2: word(ps_conf1, ps_conf2),
            ps_conf3_ms: word(ps_conf3, ps_ms),
        }
    }

    /// Interrupt posture: both proximity interrupts on, with persistence
    pub fn interrupt(settings: &SensorSettings, interrupt: &InterruptSettings) -> Self {
        let mut image = Self::polling(settings);
        let [mut ps_conf1, mut ps_conf2] = image.ps_conf1_2.to_le_bytes();
        let [mut ps_conf3, mut ps_ms] = image.ps_conf3_ms.to_le_bytes();

        ps_conf1 = (ps_conf1 & 0xCF) | persistence_bits(interrupt.persistence);
        ps_conf2 |= PS_INT_BOTH;
        if interrupt.smart_persistence {
            ps_conf3 |= PS_SMART_PERS;
        }
        if interrupt.mode == InterruptMode::LogicOutput {
            ps_ms |= PS_MS_LOGIC;
        }

        image.ps_conf1_2 = word(ps_conf1, ps_conf2);
        image.ps_conf3_ms = word(ps_conf3, ps_ms);
        image
    }

    /// Whether proximity is shut down in this image
    pub fn proximity_enabled(&self) -> bool {
        self.ps_conf1_2.to_le_bytes()[0] & PS_SD == 0
    }
}

/// Register-level driver for one sensor behind the switch tree
#[derive(Debug, Clone, Copy)]
pub struct Vcnl4040 {
    address: u8,
}

impl Default for Vcnl4040 {
    fn default() -> Self {
        Self { address: ADDRESS }
    }
}

impl Vcnl4040 {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn address(&self) -> u8 {
        self.address
    }

    pub fn read_register<B: I2cBus + ?Sized>(&self, bus: &mut B, register: u8) -> Result<u16, BusError> {
        let mut buffer = [0u8; 2];
        bus.write_read(self.address, &[register], &mut buffer)?;
        Ok(u16::from_le_bytes(buffer))
    }

    pub fn write_register<B: I2cBus + ?Sized>(
        &self,
        bus: &mut B,
        register: u8,
        value: u16,
    ) -> Result<(), BusError> {
        let [low, high] = value.to_le_bytes();
        bus.write(self.address, &[register, low, high])
    }

    /// Read the ID register
    pub fn device_id<B: I2cBus + ?Sized>(&self, bus: &mut B) -> Result<u16, BusError> {
        self.read_register(bus, reg::ID)
    }

    /// Whether the selected endpoint answers with the expected id
    pub fn is_present<B: I2cBus + ?Sized>(&self, bus: &mut B) -> bool {
        matches!(self.device_id(bus), Ok(DEVICE_ID))
    }

    /// Polling posture: write the configuration once, interrupts disabled
    #[instrument(name = "vcnl4040_configure_polling", skip(self, bus, settings))]
    pub fn configure_polling<B: I2cBus + ?Sized>(
        &self,
        bus: &mut B,
        settings: &SensorSettings,
    ) -> Result<RegisterImage, BusError> {
        let image = RegisterImage::polling(settings);
        self.write_image(bus, &image)?;
        debug!(
            ps_conf1_2 = format_args!("0x{:04X}", image.ps_conf1_2),
            ps_conf3_ms = format_args!("0x{:04X}", image.ps_conf3_ms),
            "Sensor configured for polling"
        );
        Ok(image)
    }

    /// Interrupt posture: cancellation at the baseline, thresholds above it
    #[instrument(name = "vcnl4040_configure_interrupt", skip(self, bus, settings, interrupt))]
    pub fn configure_interrupt<B: I2cBus + ?Sized>(
        &self,
        bus: &mut B,
        settings: &SensorSettings,
        interrupt: &InterruptSettings,
        baseline: u16,
    ) -> Result<InterruptThresholds, BusError> {
        let thresholds = InterruptThresholds::from_baseline(baseline, interrupt);

        self.set_cancellation(bus, thresholds.cancellation)?;
        self.write_register(bus, reg::PS_THDL, thresholds.low)?;
        self.write_register(bus, reg::PS_THDH, thresholds.high)?;
        self.write_image(bus, &RegisterImage::interrupt(settings, interrupt))?;
        // Clear anything latched while reconfiguring
        self.read_interrupt_flags(bus)?;

        debug!(
            baseline,
            low = thresholds.low,
            high = thresholds.high,
            "Sensor configured for interrupts"
        );
        Ok(thresholds)
    }

    pub fn read_proximity<B: I2cBus + ?Sized>(&self, bus: &mut B) -> Result<u16, BusError> {
        self.read_register(bus, reg::PS_DATA)
    }

    pub fn read_ambient<B: I2cBus + ?Sized>(&self, bus: &mut B) -> Result<u16, BusError> {
        self.read_register(bus, reg::ALS_DATA)
    }

    pub fn read_white<B: I2cBus + ?Sized>(&self, bus: &mut B) -> Result<u16, BusError> {
        self.read_register(bus, reg::WHITE_DATA)
    }

    /// Read and clear the interrupt flags
    pub fn read_interrupt_flags<B: I2cBus + ?Sized>(
        &self,
        bus: &mut B,
    ) -> Result<InterruptFlags, BusError> {
        let value = self.read_register(bus, reg::INT_FLAG)?;
        Ok(InterruptFlags(value.to_le_bytes()[1]))
    }

    pub fn set_cancellation<B: I2cBus + ?Sized>(&self, bus: &mut B, level: u16) -> Result<(), BusError> {
        self.write_register(bus, reg::PS_CANC, level)
    }

    /// Average `samples` reads with nothing in front of the cover and write
    /// the mean as cancellation level. Returns the level written.
    #[instrument(name = "vcnl4040_calibrate_cancellation", skip(self, bus))]
    pub fn calibrate_cancellation<B: I2cBus + ?Sized>(
        &self,
        bus: &mut B,
        samples: u16,
    ) -> Result<u16, BusError> {
        self.set_cancellation(bus, 0)?;

        let samples = samples.max(1);
        let mut total: u32 = 0;
        for _ in 0..samples {
            total += u32::from(self.read_proximity(bus)?);
        }
        let level = (total / u32::from(samples)) as u16;

        self.set_cancellation(bus, level)?;
        debug!(level, samples, "Cover cancellation written");
        Ok(level)
    }

    fn write_image<B: I2cBus + ?Sized>(&self, bus: &mut B, image: &RegisterImage) -> Result<(), BusError> {
        self.write_register(bus, reg::ALS_CONF, image.als_conf)?;
        self.write_register(bus, reg::PS_CONF1_2, image.ps_conf1_2)?;
        self.write_register(bus, reg::PS_CONF3_MS, image.ps_conf3_ms)
    }
}
