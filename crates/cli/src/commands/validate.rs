//! `validate` command implementation.

use anyhow::{Context, Result};
use contracts::{DeviceConfig, Posture, SessionKind};
use serde::Serialize;
use tracing::info;

use crate::cli::ValidateArgs;

/// Validation result for JSON output
#[derive(Serialize)]
struct ValidationResult {
    valid: bool,
    config_path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    warnings: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    summary: Option<ConfigSummary>,
}

#[derive(Serialize)]
struct ConfigSummary {
    device_id: String,
    sample_rate_hz: u32,
    posture: String,
    session_kind: String,
    buffer_capacity: usize,
    sink_count: usize,
}

/// Execute the `validate` command
pub fn run_validate(args: &ValidateArgs) -> Result<()> {
    info!(config = %args.config.display(), "Validating configuration");

    let result = validate_config(args);

    if args.json {
        let json = serde_json::to_string_pretty(&result)
            .context("Failed to serialize validation result")?;
        println!("{}", json);
    } else {
        print_validation_result(&result);
    }

    if result.valid {
        Ok(())
    } else {
        anyhow::bail!("Configuration validation failed")
    }
}

fn validate_config(args: &ValidateArgs) -> ValidationResult {
    let config_path = args.config.display().to_string();

    if !args.config.exists() {
        return ValidationResult {
            valid: false,
            config_path,
            error: Some(format!("File not found: {}", args.config.display())),
            warnings: None,
            summary: None,
        };
    }

    match config_loader::ConfigLoader::load_from_path(&args.config) {
        Ok(device) => {
            let warnings = collect_warnings(&device);
            ValidationResult {
                valid: true,
                config_path,
                error: None,
                warnings: if warnings.is_empty() {
                    None
                } else {
                    Some(warnings)
                },
                summary: Some(ConfigSummary {
                    device_id: device.device.device_id.clone(),
                    sample_rate_hz: device.sensor.sample_rate_hz,
                    posture: format!("{:?}", device.sampling.posture),
                    session_kind: format!("{:?}", device.session.kind),
                    buffer_capacity: device.session.buffer_capacity,
                    sink_count: device.sinks.len(),
                }),
            }
        }
        Err(e) => ValidationResult {
            valid: false,
            config_path,
            error: Some(e.to_string()),
            warnings: None,
            summary: None,
        },
    }
}

/// Collect configuration warnings (non-fatal issues)
fn collect_warnings(device: &DeviceConfig) -> Vec<String> {
    let mut warnings = Vec::new();

    if device.sinks.is_empty() {
        warnings.push("No sinks configured - sessions will not be uploaded".to_string());
    }

    if device.calibration.store_path.is_none() {
        warnings.push(
            "calibration.store_path not set - adaptive thresholds only".to_string(),
        );
    }

    let posture_kind = match device.sampling.posture {
        Posture::Polling => SessionKind::Proximity,
        Posture::Interrupt => SessionKind::Interrupt,
    };
    if posture_kind != device.session.kind {
        warnings.push(format!(
            "session.kind {:?} does not match sampling posture {:?}",
            device.session.kind, device.sampling.posture
        ));
    }

    let session_ms =
        device.session.buffer_capacity as u64 * 1000 / u64::from(device.sensor.sample_rate_hz);
    if session_ms < 5_000 {
        warnings.push(format!(
            "session buffer holds only {} ms of readings at {} Hz",
            session_ms, device.sensor.sample_rate_hz
        ));
    }

    warnings
}

fn print_validation_result(result: &ValidationResult) {
    if result.valid {
        println!("✓ Configuration is valid: {}", result.config_path);

        if let Some(ref summary) = result.summary {
            println!("\n  Device: {}", summary.device_id);
            println!("  Sample rate: {} Hz", summary.sample_rate_hz);
            println!("  Posture: {}", summary.posture);
            println!(
                "  Session: {} ({} buffered)",
                summary.session_kind, summary.buffer_capacity
            );
            println!("  Sinks: {}", summary.sink_count);
        }

        if let Some(ref warnings) = result.warnings {
            println!("\n⚠ Warnings:");
            for warning in warnings {
                println!("  - {}", warning);
            }
        }
    } else {
        println!("✗ Configuration is invalid: {}", result.config_path);
        if let Some(ref error) = result.error {
            println!("\n  Error: {}", error);
        }
    }
}
