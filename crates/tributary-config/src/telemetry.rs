use serde::Deserialize;
use url::Url;

/// Logging and metrics configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TelemetryConfig {
    /// Service name attached to exported metrics
    #[serde(default = "default_service_name")]
    pub service_name: String,
    /// `tracing` filter directive (e.g. `info,tributary_llm=debug`)
    #[serde(default = "default_log_filter")]
    pub log_filter: String,
    /// Log output format
    #[serde(default)]
    pub log_format: LogFormat,
    /// OTLP metrics export, disabled when absent
    #[serde(default)]
    pub metrics: Option<MetricsExporterConfig>,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            service_name: default_service_name(),
            log_filter: default_log_filter(),
            log_format: LogFormat::default(),
            metrics: None,
        }
    }
}

/// Log output format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    /// Human-readable lines
    #[default]
    Pretty,
    /// One JSON object per line
    Json,
}

/// OTLP metrics exporter configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MetricsExporterConfig {
    /// OTLP endpoint URL
    pub endpoint: Url,
    /// Export protocol
    #[serde(default)]
    pub protocol: ExportProtocol,
    /// Export interval (e.g. "30s")
    #[serde(default = "default_export_interval")]
    pub interval: String,
}

/// OTLP export protocol
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExportProtocol {
    /// gRPC (default)
    #[default]
    Grpc,
    /// HTTP/protobuf
    HttpProto,
}

fn default_service_name() -> String {
    "tributary".to_owned()
}

fn default_log_filter() -> String {
    "info".to_owned()
}

fn default_export_interval() -> String {
    "30s".to_owned()
}
