//! `calibrate` command implementation.
//!
//! Drives the wizard against the simulated sensor tree on a manual clock.
//! When the wizard asks for the object on a board, a held-object signal is
//! scheduled on that board's two sensors.

use anyhow::{Context, Result};
use contracts::{
    BoardIndex, CalibrationConfig, CalibrationRecord, CalibrationSnapshot, Clock, Side,
};
use detector::{CalibrationStore, CalibrationWizard, WizardEvent, WizardStep};
use hardware::{Bump, SimConfig, SimulatedBus};
use ingestion::SamplingEngine;
use tracing::{info, instrument, warn};

use super::load_config;
use crate::cli::CalibrateArgs;
use crate::pipeline::open_simulated;

/// Execute the `calibrate` command
#[instrument(name = "calibrate", skip(args), fields(output = %args.output.display()))]
pub fn run_calibrate(args: &CalibrateArgs) -> Result<()> {
    let device = load_config(&args.config)?;
    let engine = open_simulated(&device, SimConfig::default(), false)?;

    let mut wizard = CalibrationWizard::new(
        device.calibration.clone(),
        CalibrationSnapshot::from(&device.sensor),
    );
    let record = drive_wizard(engine, &mut wizard, &device.calibration, args.hold_amplitude)?;

    print_record(&record);

    CalibrationStore::new(&args.output)
        .save(&record)
        .with_context(|| format!("Failed to save calibration to {}", args.output.display()))?;
    info!(path = %args.output.display(), "Calibration saved");
    println!("✓ Calibration saved to {}", args.output.display());
    Ok(())
}

/// Sim time the wizard may take before the run is abandoned
fn time_budget_us(config: &CalibrationConfig) -> u64 {
    let per_board = config.baseline_window_ms + config.approach_timeout_ms;
    let total_ms = config.intro_ms + per_board * BoardIndex::ALL.len() as u64 + config.summary_min_ms;
    (total_ms + 5_000) * 1000
}

/// Object held in front of both sensors of `board`, rising from `now_us`
fn held_object(board: BoardIndex, now_us: u64, amplitude: u16, sustain_ms: u64) -> [Bump; 2] {
    let half_width_us = (sustain_ms * 2 + 1000) * 1000;
    [Side::A, Side::B].map(|side| Bump {
        position: board.position(side),
        center_us: now_us + half_width_us,
        half_width_us,
        amplitude,
    })
}

/// Scan until the wizard completes, fails or runs out of time
fn drive_wizard(
    mut engine: SamplingEngine<SimulatedBus>,
    wizard: &mut CalibrationWizard,
    config: &CalibrationConfig,
    amplitude: u16,
) -> Result<CalibrationRecord> {
    let clock = engine.clock();
    let deadline_us = clock.now_us() + time_budget_us(config);
    let mut held: Option<BoardIndex> = None;
    let mut readings = Vec::new();

    wizard.start()?;
    println!("Calibration started: keep every board clear until asked.");

    loop {
        if clock.now_us() > deadline_us {
            wizard.cancel();
            anyhow::bail!("Calibration did not finish (stuck in {})", wizard.step());
        }

        match wizard.step() {
            WizardStep::Approach(board) if held != Some(board) => {
                println!("→ Hold the object in front of board {}", board);
                let bumps = held_object(board, clock.now_us(), amplitude, config.sustain_ms);
                engine.mux_mut().bus_mut().add_bumps(bumps);
                held = Some(board);
            }
            WizardStep::Summary => {
                if let Some(event) = wizard.confirm() {
                    if let Some(record) = finish(event)? {
                        return Ok(record);
                    }
                }
            }
            _ => {}
        }

        readings.clear();
        engine.scan_cycle(&mut readings);
        for reading in &readings {
            if let Some(event) = wizard.observe(reading) {
                if let Some(record) = finish(event)? {
                    return Ok(record);
                }
            }
        }
    }
}

/// Report a wizard event; the finished record on completion
fn finish(event: WizardEvent) -> Result<Option<CalibrationRecord>> {
    match event {
        WizardEvent::BoardCaptured { board, calibration } => {
            println!(
                "  ✓ Board {}: baseline max {}, signal min {}, threshold {}",
                board, calibration.baseline_max, calibration.signal_min, calibration.threshold
            );
            Ok(None)
        }
        WizardEvent::BoardTimedOut { board } => {
            warn!(board = %board, "Board timed out");
            println!("  ✗ Board {}: no sustained signal", board);
            Ok(None)
        }
        WizardEvent::Completed(record) => Ok(Some(record)),
        WizardEvent::Failed { boards } => {
            let names: Vec<String> = boards.iter().map(ToString::to_string).collect();
            anyhow::bail!("Calibration failed for boards: {}", names.join(", "))
        }
        WizardEvent::Cancelled => anyhow::bail!("Calibration cancelled"),
    }
}

fn print_record(record: &CalibrationRecord) {
    println!("\n=== Calibration Summary ===\n");
    println!(
        "Sensor: {:?} pulses, IT {:?}, LED {:?}",
        record.sensor.multi_pulse, record.sensor.integration_time, record.sensor.led_current
    );
    println!(
        "{:<6} {:>9} {:>9} {:>9} {:>9} {:>9} {:>10} {:>6}",
        "Board", "base min", "base max", "base std", "sig min", "sig max", "threshold", "valid"
    );
    for board in &record.boards {
        println!(
            "P{:<5} {:>9} {:>9} {:>9.2} {:>9} {:>9} {:>10} {:>6}",
            board.pcb_id,
            board.baseline_min,
            board.baseline_max,
            board.baseline_stddev,
            board.signal_min,
            board.signal_max,
            board.threshold,
            board.valid
        );
    }
    println!();
}
