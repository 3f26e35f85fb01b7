//! `run` command implementation.

use anyhow::{Context, Result};
use std::time::Duration;
use tracing::{info, warn};

use contracts::DeviceConfig;

use super::load_config;
use crate::cli::{RunArgs, SourceKind};
use crate::pipeline::{Pipeline, PipelineConfig, SourceConfig};

/// Execute the `run` command
pub async fn run_pipeline(args: &RunArgs) -> Result<()> {
    info!(config = %args.config.display(), "Loading configuration");
    let device = load_config(&args.config)?;

    info!(
        device_id = %device.device.device_id,
        sample_rate_hz = device.sensor.sample_rate_hz,
        session_kind = ?device.session.kind,
        sinks = device.sinks.len(),
        "Configuration loaded"
    );

    if args.dry_run {
        info!("Dry run mode - configuration is valid, exiting");
        print_config_summary(&device);
        return Ok(());
    }

    let source = match args.source {
        SourceKind::Sim => SourceConfig::Sim {
            passes: args.passes,
        },
        SourceKind::Replay => {
            let path = args
                .replay
                .clone()
                .context("--source replay needs --replay <file>")?;
            SourceConfig::Replay {
                path,
                speed: args.replay_speed,
            }
        }
    };

    let pipeline = Pipeline::new(PipelineConfig {
        device,
        source,
        duration: (args.duration > 0).then(|| Duration::from_secs(args.duration)),
        max_detections: (args.max_detections > 0).then_some(args.max_detections),
        calibration_path: args.calibration.clone(),
        metrics_port: (args.metrics_port > 0).then_some(args.metrics_port),
        record_path: args.record.clone(),
    });

    info!("Starting pipeline...");
    let run = pipeline.run(shutdown_signal());

    let result = if args.timeout > 0 {
        let timeout = Duration::from_secs(args.timeout);
        match tokio::time::timeout(timeout, run).await {
            Ok(result) => result,
            Err(_) => {
                warn!(timeout_secs = args.timeout, "Pipeline timed out");
                anyhow::bail!("Pipeline timed out after {}s", args.timeout);
            }
        }
    } else {
        run.await
    };
    let stats = result.context("Pipeline execution failed")?;

    info!(
        readings = stats.readings,
        detections = stats.detections.total,
        duration_secs = stats.duration.as_secs_f64(),
        "Pipeline completed successfully"
    );
    stats.print_summary();

    info!("Motion Play finished");
    Ok(())
}

/// Resolves on Ctrl+C or SIGTERM
///
/// A handler that cannot be installed is logged and never fires.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

/// Print configuration summary for dry-run mode
fn print_config_summary(device: &DeviceConfig) {
    println!("\n=== Configuration Summary ===\n");
    println!("Device: {}", device.device.device_id);
    println!(
        "Sensor: {} Hz, LED {:?}, IT {:?}, duty {:?}, {:?} pulses",
        device.sensor.sample_rate_hz,
        device.sensor.led_current,
        device.sensor.integration_time,
        device.sensor.duty_cycle,
        device.sensor.multi_pulse
    );
    println!(
        "Sampling: {:?} posture, mux 0x{:02X}, queue {}",
        device.sampling.posture, device.sampling.mux_address, device.sampling.queue_capacity
    );
    println!(
        "Session: {:?}, buffer {}",
        device.session.kind, device.session.buffer_capacity
    );

    if !device.sinks.is_empty() {
        println!("\nSinks ({}):", device.sinks.len());
        for sink in &device.sinks {
            println!("  - {} ({:?})", sink.name, sink.sink_type);
        }
    }

    match &device.calibration.store_path {
        Some(path) => println!("\nCalibration store: {}", path),
        None => println!("\nCalibration store: (none)"),
    }

    println!();
}
