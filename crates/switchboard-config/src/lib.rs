#![allow(clippy::must_use_candidate)]

mod env;
pub mod llm;
mod loader;
pub mod telemetry;

use serde::Deserialize;

pub use llm::*;
pub use telemetry::{LogFormat, TelemetryConfig};

/// Top-level Switchboard configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Provider selection and per-vendor defaults
    #[serde(default)]
    pub llm: LlmConfig,
    /// Log output
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}
