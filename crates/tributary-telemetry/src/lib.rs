//! Telemetry for Tributary
//!
//! Installs structured logging via the `tracing` ecosystem and, when
//! configured, OTLP metric export for stream merge instrumentation

mod metadata;
pub mod metrics;

use std::time::Duration;

use opentelemetry::global;
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::metrics::SdkMeterProvider;
use tracing_subscriber::{EnvFilter, Layer, Registry, layer::SubscriberExt, util::SubscriberInitExt};
use tributary_config::{ExportProtocol, LogFormat, MetricsExporterConfig, TelemetryConfig};

pub use metrics::MergeMetrics;

/// Guard that flushes and shuts down the meter provider on drop
pub struct TelemetryGuard {
    meter_provider: Option<SdkMeterProvider>,
}

impl TelemetryGuard {
    /// Force flush all pending metrics immediately
    ///
    /// # Errors
    ///
    /// Returns an error if the meter provider fails to flush
    pub fn force_flush(&self) -> anyhow::Result<()> {
        if let Some(ref provider) = self.meter_provider {
            provider
                .force_flush()
                .map_err(|e| anyhow::anyhow!("failed to flush metrics: {e}"))?;
        }
        Ok(())
    }
}

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        if let Some(provider) = self.meter_provider.take()
            && let Err(e) = provider.shutdown()
        {
            eprintln!("failed to shutdown meter provider: {e}");
        }
    }
}

/// Initialize logging and optional metric export
///
/// Installs a global `tracing` subscriber filtered by `config.log_filter`
/// and formatted per `config.log_format`. When `config.metrics` is set, an
/// OTLP meter provider is registered globally so [`MergeMetrics`] reports
/// through it. The returned guard must be held for the lifetime of the
/// application.
///
/// # Errors
///
/// Returns an error if a global subscriber is already installed or the
/// metrics exporter cannot be built
pub fn init(config: &TelemetryConfig) -> anyhow::Result<TelemetryGuard> {
    let filter = EnvFilter::try_new(&config.log_filter).unwrap_or_else(|_| EnvFilter::new("info"));

    let fmt_layer: Box<dyn Layer<Registry> + Send + Sync> = match config.log_format {
        LogFormat::Pretty => tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false)
            .boxed(),
        LogFormat::Json => tracing_subscriber::fmt::layer()
            .json()
            .with_target(true)
            .with_current_span(true)
            .boxed(),
    };

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(filter)
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to install tracing subscriber: {e}"))?;

    let mut guard = TelemetryGuard { meter_provider: None };

    if let Some(ref exporter_config) = config.metrics {
        let provider = init_metrics(config, exporter_config)?;
        global::set_meter_provider(provider.clone());
        guard.meter_provider = Some(provider);
        tracing::info!(endpoint = %exporter_config.endpoint, "metrics export enabled");
    }

    Ok(guard)
}

/// Build a periodic OTLP meter provider
fn init_metrics(config: &TelemetryConfig, exporter_config: &MetricsExporterConfig) -> anyhow::Result<SdkMeterProvider> {
    use opentelemetry_otlp::MetricExporter;
    use opentelemetry_sdk::metrics::PeriodicReader;

    let exporter = match exporter_config.protocol {
        ExportProtocol::Grpc => MetricExporter::builder()
            .with_tonic()
            .with_endpoint(exporter_config.endpoint.as_str())
            .build()
            .map_err(|e| anyhow::anyhow!("failed to build gRPC metrics exporter: {e}"))?,
        ExportProtocol::HttpProto => MetricExporter::builder()
            .with_http()
            .with_endpoint(exporter_config.endpoint.as_str())
            .build()
            .map_err(|e| anyhow::anyhow!("failed to build HTTP metrics exporter: {e}"))?,
    };

    let interval = tributary_config::stream::parse_duration(&exporter_config.interval)
        .unwrap_or_else(|_| Duration::from_secs(30));

    let reader = PeriodicReader::builder(exporter).with_interval(interval).build();

    Ok(SdkMeterProvider::builder()
        .with_resource(metadata::build_resource(config))
        .with_reader(reader)
        .build())
}
