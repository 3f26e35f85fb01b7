//! Configuration validation
//!
//! Field ranges come from the `validator` derives on the config types.
//! Checks spanning several fields live here:
//! - min_wave_duration_ms < max_wave_duration_ms
//! - smoothing_window <= baseline_window
//! - sustain_ms < approach_timeout_ms
//! - top-level mux address in 0x70..=0x77
//! - sink names non-empty and unique, network sinks carry a valid `addr`

use std::collections::HashSet;
use std::net::SocketAddr;

use contracts::{ContractError, DeviceConfig, SinkType};
use validator::{Validate, ValidationErrors, ValidationErrorsKind};

/// Validate a DeviceConfig
///
/// Returns the first error encountered.
pub fn validate(config: &DeviceConfig) -> Result<(), ContractError> {
    validate_fields(config)?;
    validate_detector(config)?;
    validate_calibration(config)?;
    validate_sampling(config)?;
    validate_sinks(config)?;
    Ok(())
}

fn validate_fields(config: &DeviceConfig) -> Result<(), ContractError> {
    config.validate().map_err(|errors| {
        let (field, message) = first_error(&errors, "");
        ContractError::config_validation(field, message)
    })
}

/// Deterministic first error of a (possibly nested) error tree
fn first_error(errors: &ValidationErrors, prefix: &str) -> (String, String) {
    let mut fields: Vec<_> = errors.errors().iter().collect();
    fields.sort_by(|a, b| a.0.cmp(b.0));

    let Some((name, kind)) = fields.into_iter().next() else {
        return (prefix.trim_end_matches('.').to_string(), errors.to_string());
    };

    let path = format!("{prefix}{name}");
    match kind {
        ValidationErrorsKind::Struct(inner) => first_error(inner, &format!("{path}.")),
        ValidationErrorsKind::List(items) => match items.iter().next() {
            Some((index, inner)) => first_error(inner, &format!("{path}[{index}].")),
            None => (path, "invalid list".to_string()),
        },
        ValidationErrorsKind::Field(list) => {
            let message = list
                .first()
                .map(|e| match &e.message {
                    Some(message) => message.to_string(),
                    None => format!("failed '{}' check", e.code),
                })
                .unwrap_or_else(|| "invalid value".to_string());
            (path, message)
        }
    }
}

fn validate_detector(config: &DeviceConfig) -> Result<(), ContractError> {
    let detector = &config.detector;

    if detector.min_wave_duration_ms >= detector.max_wave_duration_ms {
        return Err(ContractError::config_validation(
            "detector.min_wave_duration_ms / detector.max_wave_duration_ms",
            format!(
                "min_wave_duration_ms ({}) must be < max_wave_duration_ms ({})",
                detector.min_wave_duration_ms, detector.max_wave_duration_ms
            ),
        ));
    }

    if detector.smoothing_window > detector.baseline_window {
        return Err(ContractError::config_validation(
            "detector.smoothing_window",
            format!(
                "smoothing_window ({}) must be <= baseline_window ({})",
                detector.smoothing_window, detector.baseline_window
            ),
        ));
    }

    Ok(())
}

fn validate_calibration(config: &DeviceConfig) -> Result<(), ContractError> {
    let calibration = &config.calibration;
    if calibration.sustain_ms >= calibration.approach_timeout_ms {
        return Err(ContractError::config_validation(
            "calibration.sustain_ms",
            format!(
                "sustain_ms ({}) must be < approach_timeout_ms ({})",
                calibration.sustain_ms, calibration.approach_timeout_ms
            ),
        ));
    }
    Ok(())
}

fn validate_sampling(config: &DeviceConfig) -> Result<(), ContractError> {
    let address = config.sampling.mux_address;
    if !(0x70..=0x77).contains(&address) {
        return Err(ContractError::config_validation(
            "sampling.mux_address",
            format!("mux address 0x{address:02X} outside 0x70..=0x77"),
        ));
    }
    Ok(())
}

fn validate_sinks(config: &DeviceConfig) -> Result<(), ContractError> {
    let mut seen = HashSet::new();
    for (idx, sink) in config.sinks.iter().enumerate() {
        if sink.name.is_empty() {
            return Err(ContractError::config_validation(
                format!("sinks[{}].name", idx),
                "sink name cannot be empty",
            ));
        }
        if !seen.insert(sink.name.as_str()) {
            return Err(ContractError::config_validation(
                format!("sinks[name={}]", sink.name),
                "duplicate sink name",
            ));
        }
        if sink.queue_capacity == 0 {
            return Err(ContractError::config_validation(
                format!("sinks[{}].queue_capacity", sink.name),
                "queue_capacity must be > 0",
            ));
        }
        if sink.sink_type == SinkType::Network {
            let addr = sink.params.get("addr").ok_or_else(|| {
                ContractError::config_validation(
                    format!("sinks[{}].params.addr", sink.name),
                    "network sink requires 'addr'",
                )
            })?;
            addr.parse::<SocketAddr>().map_err(|e| {
                ContractError::config_validation(
                    format!("sinks[{}].params.addr", sink.name),
                    format!("invalid address '{addr}': {e}"),
                )
            })?;
        }
    }
    Ok(())
}
