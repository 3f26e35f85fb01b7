//! Pipeline orchestration module.

mod orchestrator;
mod source;
mod stats;

pub use orchestrator::{Pipeline, PipelineConfig, SourceConfig};
pub use source::open_simulated;
pub use stats::RunStats;
