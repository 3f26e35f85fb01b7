//! Reading sources and local surfaces for runs without hardware.

use std::time::Duration;

use anyhow::{Context, Result};
use contracts::{DeviceConfig, Direction, LedSurface, Rgb};
use hardware::{MuxController, SimConfig, SimulatedBus, Transit};
use ingestion::SamplingEngine;
use tracing::{debug, info};

/// First scripted transit, leaving room for baseline learning
const FIRST_TRANSIT_US: u64 = 1_000_000;

/// Spacing between scripted transits
const TRANSIT_SPACING_US: u64 = 1_500_000;

/// `passes` transits through every board, alternating A->B and B->A
pub fn scripted_transits(passes: u32) -> Vec<Transit> {
    (0..u64::from(passes))
        .map(|i| Transit {
            board: None,
            direction: if i % 2 == 0 {
                Direction::AToB
            } else {
                Direction::BToA
            },
            entry_us: FIRST_TRANSIT_US + i * TRANSIT_SPACING_US,
            lag_us: 30_000,
            half_width_us: 40_000,
            amplitude: 150,
        })
        .collect()
}

/// Time needed to play every scripted transit plus a short tail
pub fn scripted_duration(passes: u32) -> Duration {
    Duration::from_micros(FIRST_TRANSIT_US + u64::from(passes) * TRANSIT_SPACING_US + 500_000)
}

/// Discover and configure the simulated sensor tree
///
/// `realtime` follows the host clock (paced acquisition); otherwise the bus
/// runs on a manual clock that advances per transaction.
pub fn open_simulated(
    device: &DeviceConfig,
    sim: SimConfig,
    realtime: bool,
) -> Result<SamplingEngine<SimulatedBus>> {
    let sim = SimConfig {
        tca_address: device.sampling.mux_address,
        ..sim
    };
    let bus = if realtime {
        SimulatedBus::realtime(sim)
    } else {
        SimulatedBus::new(sim)
    };
    let clock = bus.clock();

    let mut mux = MuxController::with_address(bus, device.sampling.mux_address);
    let report = mux.discover().context("Sensor discovery failed")?;
    info!(
        active = report.active_count(),
        complete_boards = report.complete_boards().len(),
        "Discovery complete"
    );

    let mut engine = SamplingEngine::new(mux, clock, device.sensor.clone())
        .with_transaction_timeout_ms(device.sampling.transaction_timeout_ms);
    engine
        .initialize()
        .context("Failed to configure sensors")?;

    if device.sampling.cover_cancellation {
        let levels = engine.cover_cancellation(device.sampling.cancellation_samples);
        debug!(?levels, "Cover cancellation applied");
    }

    Ok(engine)
}

/// LED strip stand-in that logs every fill
#[derive(Debug, Default)]
pub struct LogStrip {
    brightness: u8,
}

impl LedSurface for LogStrip {
    fn fill(&mut self, color: Rgb) {
        debug!(r = color.r, g = color.g, b = color.b, brightness = self.brightness, "LED");
    }

    fn set_brightness(&mut self, brightness: u8) {
        self.brightness = brightness;
    }
}
