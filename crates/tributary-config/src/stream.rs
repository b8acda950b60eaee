use std::time::Duration;

use serde::Deserialize;

/// Default bound of the merged output channel
pub const DEFAULT_CHANNEL_CAPACITY: usize = 64;

/// Default time auxiliary sources get to finish after the primary completes
pub const DEFAULT_DRAIN_TIMEOUT: &str = "30s";

/// Stream merging configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StreamConfig {
    /// Capacity of the bounded output channel
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
    /// How long to wait for auxiliary sources once the primary is done (e.g. "30s")
    #[serde(default = "default_drain_timeout")]
    pub drain_timeout: String,
    /// Optional deadline applied to every streamed request (e.g. "2m")
    #[serde(default)]
    pub request_timeout: Option<String>,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            drain_timeout: default_drain_timeout(),
            request_timeout: None,
        }
    }
}

impl StreamConfig {
    /// Parsed drain timeout
    ///
    /// # Errors
    ///
    /// Returns an error if the duration string is malformed
    pub fn drain_timeout_duration(&self) -> anyhow::Result<Duration> {
        parse_duration(&self.drain_timeout)
    }

    /// Parsed request timeout, if configured
    ///
    /// # Errors
    ///
    /// Returns an error if the duration string is malformed
    pub fn request_timeout_duration(&self) -> anyhow::Result<Option<Duration>> {
        self.request_timeout.as_deref().map(parse_duration).transpose()
    }
}

/// Parse a human-readable duration such as `"250ms"` or `"1m"`
///
/// # Errors
///
/// Returns an error if the string is not a valid duration
pub fn parse_duration(s: &str) -> anyhow::Result<Duration> {
    duration_str::parse(s).map_err(|e| anyhow::anyhow!("invalid duration '{s}': {e}"))
}

const fn default_channel_capacity() -> usize {
    DEFAULT_CHANNEL_CAPACITY
}

fn default_drain_timeout() -> String {
    DEFAULT_DRAIN_TIMEOUT.to_owned()
}
