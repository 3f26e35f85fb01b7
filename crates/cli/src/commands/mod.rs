//! Command implementations.

mod calibrate;
mod info;
mod run;
mod validate;

pub use calibrate::run_calibrate;
pub use info::run_info;
pub use run::run_pipeline;
pub use validate::run_validate;

use std::path::Path;

use anyhow::{Context, Result};
use contracts::DeviceConfig;

/// Load and validate a device configuration file
fn load_config(path: &Path) -> Result<DeviceConfig> {
    if !path.exists() {
        anyhow::bail!("Configuration file not found: {}", path.display());
    }
    config_loader::ConfigLoader::load_from_path(path)
        .with_context(|| format!("Failed to load config from {}", path.display()))
}
