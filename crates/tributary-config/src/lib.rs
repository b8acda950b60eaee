#![allow(clippy::must_use_candidate)]

pub mod content;
mod env;
mod loader;
pub mod stream;
pub mod telemetry;

use serde::Deserialize;

pub use content::*;
pub use stream::*;
pub use telemetry::{ExportProtocol, LogFormat, MetricsExporterConfig, TelemetryConfig};

/// Top-level Tributary configuration
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Stream merging configuration
    #[serde(default)]
    pub stream: StreamConfig,
    /// Content validation limits
    #[serde(default)]
    pub content: ContentConfig,
    /// Logging and metrics configuration
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}
