use opentelemetry::KeyValue;
use opentelemetry_sdk::Resource;
use opentelemetry_semantic_conventions::resource as semconv;
use tributary_config::TelemetryConfig;

/// Build an OpenTelemetry Resource describing this process
pub fn build_resource(config: &TelemetryConfig) -> Resource {
    Resource::builder()
        .with_attributes([
            KeyValue::new(semconv::SERVICE_NAME, config.service_name.clone()),
            KeyValue::new(semconv::SERVICE_VERSION, env!("CARGO_PKG_VERSION")),
        ])
        .build()
}

#[cfg(test)]
mod tests {
    use opentelemetry::{Key, Value};

    use super::*;

    #[test]
    fn resource_carries_service_name() {
        let config = TelemetryConfig {
            service_name: "merge-bench".to_owned(),
            ..TelemetryConfig::default()
        };

        let resource = build_resource(&config);
        assert_eq!(
            resource.get(&Key::new(semconv::SERVICE_NAME)),
            Some(Value::from("merge-bench"))
        );
    }
}
