use serde::Deserialize;

/// Limits applied when validating multimodal content before transmission
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ContentConfig {
    /// Largest inline payload accepted, in bytes
    #[serde(default)]
    pub max_inline_bytes: Option<u64>,
    /// Accepted MIME types (`type/subtype` or `type/*`); empty allows all
    #[serde(default)]
    pub allowed_mime_types: Vec<String>,
}
