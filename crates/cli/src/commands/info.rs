//! `info` command implementation.

use anyhow::{Context, Result};
use contracts::{DeviceConfig, Posture};
use hardware::vcnl4040::reg;
use hardware::{InterruptThresholds, RegisterImage};
use serde::Serialize;
use tracing::info;

use super::load_config;
use crate::cli::InfoArgs;

/// Configuration info for JSON output
#[derive(Serialize)]
struct ConfigInfo {
    device_id: String,
    sensor: SensorInfo,
    sampling: SamplingInfo,
    session: SessionInfo,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    sinks: Vec<SinkInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    registers: Option<RegisterInfo>,
}

#[derive(Serialize)]
struct SensorInfo {
    sample_rate_hz: u32,
    led_current: String,
    integration_time: String,
    duty_cycle: String,
    multi_pulse: String,
    high_resolution: bool,
    i2c_clock_khz: u32,
}

#[derive(Serialize)]
struct SamplingInfo {
    posture: String,
    mux_address: String,
    queue_capacity: usize,
}

#[derive(Serialize)]
struct SessionInfo {
    kind: String,
    buffer_capacity: usize,
    live_debug: bool,
}

#[derive(Serialize)]
struct SinkInfo {
    name: String,
    sink_type: String,
    queue_capacity: usize,
}

/// Configuration words in the order the driver writes them
#[derive(Serialize)]
struct RegisterInfo {
    posture: String,
    words: Vec<RegisterWord>,
}

#[derive(Serialize)]
struct RegisterWord {
    name: &'static str,
    command: String,
    value: String,
}

impl RegisterWord {
    fn new(name: &'static str, command: u8, value: u16) -> Self {
        Self {
            name,
            command: format!("0x{command:02X}"),
            value: format!("0x{value:04X}"),
        }
    }
}

/// Execute the `info` command
pub fn run_info(args: &InfoArgs) -> Result<()> {
    info!(config = %args.config.display(), "Loading configuration info");
    let device = load_config(&args.config)?;

    if args.json {
        let info = build_config_info(&device, args);
        let json =
            serde_json::to_string_pretty(&info).context("Failed to serialize config info")?;
        println!("{}", json);
    } else {
        print_config_info(&device, args);
    }

    Ok(())
}

fn register_info(device: &DeviceConfig) -> RegisterInfo {
    let interrupt = &device.sampling.interrupt;
    let image = match device.sampling.posture {
        Posture::Polling => RegisterImage::polling(&device.sensor),
        Posture::Interrupt => RegisterImage::interrupt(&device.sensor, interrupt),
    };

    let mut words = vec![
        RegisterWord::new("ALS_CONF", reg::ALS_CONF, image.als_conf),
        RegisterWord::new("PS_CONF1_2", reg::PS_CONF1_2, image.ps_conf1_2),
        RegisterWord::new("PS_CONF3_MS", reg::PS_CONF3_MS, image.ps_conf3_ms),
    ];
    if device.sampling.posture == Posture::Interrupt {
        // Cancellation is measured per sensor at arm time
        let thresholds = InterruptThresholds::from_baseline(0, interrupt);
        words.push(RegisterWord::new("PS_THDL", reg::PS_THDL, thresholds.low));
        words.push(RegisterWord::new("PS_THDH", reg::PS_THDH, thresholds.high));
    }

    RegisterInfo {
        posture: format!("{:?}", device.sampling.posture),
        words,
    }
}

fn build_config_info(device: &DeviceConfig, args: &InfoArgs) -> ConfigInfo {
    let sensor = &device.sensor;
    ConfigInfo {
        device_id: device.device.device_id.clone(),
        sensor: SensorInfo {
            sample_rate_hz: sensor.sample_rate_hz,
            led_current: format!("{:?}", sensor.led_current),
            integration_time: format!("{:?}", sensor.integration_time),
            duty_cycle: format!("{:?}", sensor.duty_cycle),
            multi_pulse: format!("{:?}", sensor.multi_pulse),
            high_resolution: sensor.high_resolution,
            i2c_clock_khz: sensor.i2c_clock_khz,
        },
        sampling: SamplingInfo {
            posture: format!("{:?}", device.sampling.posture),
            mux_address: format!("0x{:02X}", device.sampling.mux_address),
            queue_capacity: device.sampling.queue_capacity,
        },
        session: SessionInfo {
            kind: format!("{:?}", device.session.kind),
            buffer_capacity: device.session.buffer_capacity,
            live_debug: device.session.live_debug,
        },
        sinks: device
            .sinks
            .iter()
            .map(|s| SinkInfo {
                name: s.name.clone(),
                sink_type: format!("{:?}", s.sink_type),
                queue_capacity: s.queue_capacity,
            })
            .collect(),
        registers: args.registers.then(|| register_info(device)),
    }
}

fn print_config_info(device: &DeviceConfig, args: &InfoArgs) {
    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("║               Motion Play Configuration                      ║");
    println!("╚══════════════════════════════════════════════════════════════╝\n");

    println!("📍 Device");
    println!("   └─ ID: {}", device.device.device_id);

    let sensor = &device.sensor;
    println!("\n📡 Sensors");
    println!("   ├─ Sample rate: {} Hz", sensor.sample_rate_hz);
    println!("   ├─ LED current: {:?}", sensor.led_current);
    println!("   ├─ Integration time: {:?}", sensor.integration_time);
    println!("   ├─ Duty cycle: {:?}", sensor.duty_cycle);
    println!("   ├─ Multi-pulse: {:?}", sensor.multi_pulse);
    println!("   ├─ 16-bit output: {}", sensor.high_resolution);
    println!("   └─ Bus clock: {} kHz", sensor.i2c_clock_khz);

    println!("\n⚙️  Sampling");
    println!("   ├─ Posture: {:?}", device.sampling.posture);
    println!("   ├─ Mux address: 0x{:02X}", device.sampling.mux_address);
    println!("   └─ Queue capacity: {}", device.sampling.queue_capacity);

    println!("\n🗂  Session");
    println!("   ├─ Kind: {:?}", device.session.kind);
    println!("   ├─ Buffer: {}", device.session.buffer_capacity);
    println!("   └─ Live debug: {}", device.session.live_debug);

    if args.registers {
        let registers = register_info(device);
        println!("\n🔧 Registers ({} posture)", registers.posture);
        for (i, word) in registers.words.iter().enumerate() {
            let prefix = if i == registers.words.len() - 1 {
                "└─"
            } else {
                "├─"
            };
            println!(
                "   {} {:<12} [{}] = {}",
                prefix, word.name, word.command, word.value
            );
        }
    }

    if !device.sinks.is_empty() {
        println!("\n📤 Sinks ({})", device.sinks.len());
        for (i, sink) in device.sinks.iter().enumerate() {
            let is_last = i == device.sinks.len() - 1;
            let prefix = if is_last { "└─" } else { "├─" };
            println!(
                "   {} {} ({:?}, queue {})",
                prefix, sink.name, sink.sink_type, sink.queue_capacity
            );
        }
    }

    println!();
}
