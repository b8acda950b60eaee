//! Multimodal message content
//!
//! Every adapter and the event model share this single representation.
//! The variant set is closed; callers match on it exhaustively.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tributary_config::ContentConfig;

/// Type tag of a [`Content`] value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentKind {
    /// Plain text
    Text,
    /// Image reference or payload
    Image,
    /// Arbitrary file reference or payload
    File,
}

impl ContentKind {
    /// Wire name of the kind
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Image => "image",
            Self::File => "file",
        }
    }
}

impl fmt::Display for ContentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single piece of message content
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Content {
    /// UTF-8 text
    Text {
        /// The text string
        text: String,
    },
    /// Image, remote or inline
    Image(ImageContent),
    /// File, remote or inline
    File(FileContent),
}

/// Where the bytes of an image or file live
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaSource {
    /// Remote reference, never fetched by this crate
    Url(String),
    /// Inline payload, base64 on the wire
    Inline(#[serde(with = "base64_bytes")] Vec<u8>),
}

impl MediaSource {
    /// Whether the source actually points at something
    fn is_present(&self) -> bool {
        match self {
            Self::Url(url) => !url.trim().is_empty(),
            Self::Inline(data) => !data.is_empty(),
        }
    }

    /// Inline payload length, if inline
    fn inline_len(&self) -> Option<u64> {
        match self {
            Self::Url(_) => None,
            Self::Inline(data) => Some(data.len() as u64),
        }
    }
}

/// Image content
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageContent {
    /// Image bytes or URL
    pub source: MediaSource,
    /// MIME type (e.g. `image/png`)
    pub mime_type: String,
    /// Pixel width, when known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    /// Pixel height, when known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
    /// Size in bytes declared by the caller for URL-backed images
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub declared_size: Option<u64>,
}

/// File content
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileContent {
    /// Original file name
    pub filename: String,
    /// MIME type (e.g. `application/pdf`)
    pub mime_type: String,
    /// File bytes or URL
    pub source: MediaSource,
    /// Size in bytes declared by the caller
    pub declared_size: u64,
}

/// Limits a target model places on content
#[derive(Debug, Clone, Default)]
pub struct ContentLimits {
    /// Largest accepted inline payload in bytes
    pub max_inline_bytes: Option<u64>,
    /// Accepted MIME types (`type/subtype` or `type/*`); empty accepts all
    pub allowed_mime_types: Vec<String>,
}

impl From<&ContentConfig> for ContentLimits {
    fn from(config: &ContentConfig) -> Self {
        Self {
            max_inline_bytes: config.max_inline_bytes,
            allowed_mime_types: config.allowed_mime_types.clone(),
        }
    }
}

impl ContentLimits {
    /// Whether `mime_type` matches the allow-list
    ///
    /// Matching ignores case and MIME parameters (`; charset=...`).
    pub fn allows(&self, mime_type: &str) -> bool {
        if self.allowed_mime_types.is_empty() {
            return true;
        }

        let essence = mime_type.split(';').next().unwrap_or_default().trim().to_ascii_lowercase();
        let Some((kind, _)) = essence.split_once('/') else {
            return false;
        };

        self.allowed_mime_types.iter().any(|pattern| {
            let pattern = pattern.to_ascii_lowercase();
            match pattern.strip_suffix("/*") {
                Some(prefix) => prefix == kind,
                None => pattern == essence,
            }
        })
    }
}

/// Content rejected before transmission
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ContentError {
    /// Neither a URL nor inline data was provided
    #[error("{kind} content has neither a URL nor inline data")]
    MissingSource { kind: ContentKind },

    /// Inline payload exceeds the ceiling
    #[error("{kind} content is {size} bytes, limit is {limit}")]
    TooLarge { kind: ContentKind, size: u64, limit: u64 },

    /// MIME type not accepted by the target model
    #[error("{kind} content type '{mime_type}' is not supported")]
    UnsupportedMimeType { kind: ContentKind, mime_type: String },
}

impl ContentError {
    /// Kind of the content that failed validation
    pub const fn kind(&self) -> ContentKind {
        match self {
            Self::MissingSource { kind } | Self::TooLarge { kind, .. } | Self::UnsupportedMimeType { kind, .. } => {
                *kind
            }
        }
    }
}

impl Content {
    /// Text content
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    /// Image referenced by URL
    pub fn image_url(url: impl Into<String>, mime_type: impl Into<String>) -> Self {
        Self::Image(ImageContent {
            source: MediaSource::Url(url.into()),
            mime_type: mime_type.into(),
            width: None,
            height: None,
            declared_size: None,
        })
    }

    /// Image carried inline
    pub fn image_bytes(data: Vec<u8>, mime_type: impl Into<String>) -> Self {
        Self::Image(ImageContent {
            source: MediaSource::Inline(data),
            mime_type: mime_type.into(),
            width: None,
            height: None,
            declared_size: None,
        })
    }

    /// File carried inline; the declared size is the payload length
    pub fn file_bytes(filename: impl Into<String>, mime_type: impl Into<String>, data: Vec<u8>) -> Self {
        let declared_size = data.len() as u64;
        Self::File(FileContent {
            filename: filename.into(),
            mime_type: mime_type.into(),
            source: MediaSource::Inline(data),
            declared_size,
        })
    }

    /// File referenced by URL with a caller-declared size
    pub fn file_url(
        filename: impl Into<String>,
        mime_type: impl Into<String>,
        url: impl Into<String>,
        declared_size: u64,
    ) -> Self {
        Self::File(FileContent {
            filename: filename.into(),
            mime_type: mime_type.into(),
            source: MediaSource::Url(url.into()),
            declared_size,
        })
    }

    /// Type tag
    pub const fn kind(&self) -> ContentKind {
        match self {
            Self::Text { .. } => ContentKind::Text,
            Self::Image(_) => ContentKind::Image,
            Self::File(_) => ContentKind::File,
        }
    }

    /// Size in bytes, without any I/O
    ///
    /// URL-backed content reports its declared size (0 when an image
    /// declares none).
    pub fn size(&self) -> u64 {
        match self {
            Self::Text { text } => text.len() as u64,
            Self::Image(image) => image
                .source
                .inline_len()
                .unwrap_or_else(|| image.declared_size.unwrap_or(0)),
            Self::File(file) => file.source.inline_len().unwrap_or(file.declared_size),
        }
    }

    /// Text payload, if this is text content
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text { text } => Some(text),
            Self::Image(_) | Self::File(_) => None,
        }
    }

    /// MIME type of image or file content
    pub fn mime_type(&self) -> Option<&str> {
        match self {
            Self::Text { .. } => None,
            Self::Image(image) => Some(&image.mime_type),
            Self::File(file) => Some(&file.mime_type),
        }
    }

    /// Check the content against a target model's limits
    ///
    /// # Errors
    ///
    /// Returns a [`ContentError`] tagged with this content's kind when an
    /// image or file has no usable source, its inline payload exceeds
    /// `limits.max_inline_bytes`, or its MIME type is not allowed
    pub fn validate(&self, limits: &ContentLimits) -> Result<(), ContentError> {
        let kind = self.kind();
        let (source, mime_type) = match self {
            Self::Text { .. } => return Ok(()),
            Self::Image(image) => (&image.source, image.mime_type.as_str()),
            Self::File(file) => (&file.source, file.mime_type.as_str()),
        };

        if !source.is_present() {
            return Err(ContentError::MissingSource { kind });
        }

        if let (Some(size), Some(limit)) = (source.inline_len(), limits.max_inline_bytes)
            && size > limit
        {
            return Err(ContentError::TooLarge { kind, size, limit });
        }

        if !limits.allows(mime_type) {
            return Err(ContentError::UnsupportedMimeType {
                kind,
                mime_type: mime_type.to_owned(),
            });
        }

        Ok(())
    }
}

/// Serde adapter encoding bytes as standard base64
mod base64_bytes {
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(data: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(data))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD.decode(encoded).map_err(serde::de::Error::custom)
    }
}
