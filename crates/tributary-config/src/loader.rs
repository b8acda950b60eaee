use std::path::Path;

use crate::Config;

impl Config {
    /// Load configuration from a TOML file
    ///
    /// Reads the file, substitutes `${VAR}` placeholders, then deserializes
    /// and validates the result.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, a referenced variable is
    /// unset, TOML parsing fails, or validation fails
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("failed to read config file {}: {e}", path.display()))?;

        let config = Self::from_toml_str(&raw)?;
        tracing::debug!(path = %path.display(), "loaded configuration");

        Ok(config)
    }

    /// Parse and validate configuration from TOML text
    ///
    /// # Errors
    ///
    /// Returns an error if variable expansion, parsing or validation fails
    pub fn from_toml_str(raw: &str) -> anyhow::Result<Self> {
        let expanded =
            crate::env::expand_env(raw).map_err(|e| anyhow::anyhow!("config variable expansion failed: {e}"))?;

        let config: Self = toml::from_str(&expanded).map_err(|e| anyhow::anyhow!("failed to parse config: {e}"))?;

        config.validate()?;

        Ok(config)
    }

    /// Validate that the configuration is internally consistent
    ///
    /// # Errors
    ///
    /// Returns an error if a bound is zero, a duration is malformed, or a
    /// MIME pattern is not of the form `type/subtype` or `type/*`
    pub fn validate(&self) -> anyhow::Result<()> {
        self.validate_stream_config()?;
        self.validate_content_config()?;
        self.validate_telemetry_config()?;
        Ok(())
    }

    fn validate_stream_config(&self) -> anyhow::Result<()> {
        if self.stream.channel_capacity == 0 {
            anyhow::bail!("stream.channel_capacity must be greater than 0");
        }

        let drain = self
            .stream
            .drain_timeout_duration()
            .map_err(|e| anyhow::anyhow!("stream.drain_timeout: {e}"))?;
        if drain.is_zero() {
            anyhow::bail!("stream.drain_timeout must be greater than 0");
        }

        if let Some(timeout) = self
            .stream
            .request_timeout_duration()
            .map_err(|e| anyhow::anyhow!("stream.request_timeout: {e}"))?
            && timeout.is_zero()
        {
            anyhow::bail!("stream.request_timeout must be greater than 0");
        }

        Ok(())
    }

    fn validate_content_config(&self) -> anyhow::Result<()> {
        if self.content.max_inline_bytes == Some(0) {
            anyhow::bail!("content.max_inline_bytes must be greater than 0");
        }

        for pattern in &self.content.allowed_mime_types {
            let valid = pattern
                .split_once('/')
                .is_some_and(|(kind, sub)| !kind.is_empty() && kind != "*" && !sub.is_empty() && !sub.contains('/'));
            if !valid {
                anyhow::bail!("content.allowed_mime_types: invalid MIME pattern '{pattern}'");
            }
        }

        Ok(())
    }

    fn validate_telemetry_config(&self) -> anyhow::Result<()> {
        if let Some(ref metrics) = self.telemetry.metrics {
            crate::stream::parse_duration(&metrics.interval)
                .map_err(|e| anyhow::anyhow!("telemetry.metrics.interval: {e}"))?;
        }

        Ok(())
    }
}
