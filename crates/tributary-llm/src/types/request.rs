use serde::{Deserialize, Serialize};

use super::content::ContentLimits;
use super::message::Message;
use super::tool::{ToolChoice, ToolDefinition};
use crate::error::LlmError;

/// Parameters controlling text generation
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompletionParams {
    /// Sampling temperature (0.0 to 2.0)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    /// Nucleus sampling threshold
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,
    /// Maximum tokens to generate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    /// Stop sequences
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub stop: Vec<String>,
    /// Number of choices to generate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub n: Option<u32>,
    /// Random seed for deterministic generation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

/// Constraint on the shape of the model output
///
/// Carried through to adapters as-is; schemas are not checked here.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResponseFormat {
    /// Free-form text
    #[default]
    Text,
    /// Any syntactically valid JSON object
    JsonObject,
    /// JSON matching a caller-supplied schema
    JsonSchema {
        /// Schema name
        name: String,
        /// The JSON Schema document
        schema: serde_json::Value,
        /// Whether the provider should enforce the schema strictly
        #[serde(default)]
        strict: bool,
    },
}

/// Provider-agnostic completion request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionRequest {
    /// Model identifier
    pub model: String,
    /// Conversation messages
    pub messages: Vec<Message>,
    /// Generation parameters
    #[serde(default)]
    pub params: CompletionParams,
    /// Tool definitions available to the model
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ToolDefinition>,
    /// How the model should select tools
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<ToolChoice>,
    /// Output shape constraint
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_format: Option<ResponseFormat>,
    /// Whether to stream the response
    #[serde(default)]
    pub stream: bool,
}

impl CompletionRequest {
    pub fn new(model: impl Into<String>, messages: Vec<Message>) -> Self {
        Self {
            model: model.into(),
            messages,
            params: CompletionParams::default(),
            tools: Vec::new(),
            tool_choice: None,
            response_format: None,
            stream: false,
        }
    }

    #[must_use]
    pub fn with_tools(mut self, tools: Vec<ToolDefinition>) -> Self {
        self.tools = tools;
        self
    }

    #[must_use]
    pub fn with_response_format(mut self, format: ResponseFormat) -> Self {
        self.response_format = Some(format);
        self
    }

    #[must_use]
    pub const fn streaming(mut self) -> Self {
        self.stream = true;
        self
    }

    /// Check the request before it is handed to an adapter
    ///
    /// # Errors
    ///
    /// Returns `LlmError::InvalidRequest` for structural problems and
    /// `LlmError::Content` for the first content part that fails `limits`
    pub fn validate(&self, limits: &ContentLimits) -> Result<(), LlmError> {
        if self.model.trim().is_empty() {
            return Err(LlmError::InvalidRequest("model must not be empty".to_owned()));
        }

        if self.messages.is_empty() {
            return Err(LlmError::InvalidRequest("at least one message is required".to_owned()));
        }

        if let Some(ToolChoice::Function { ref name }) = self.tool_choice
            && !self.tools.iter().any(|tool| &tool.name == name)
        {
            return Err(LlmError::InvalidRequest(format!(
                "tool_choice references undefined tool '{name}'"
            )));
        }

        for message in &self.messages {
            message.validate()?;
            message.validate_content(limits)?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Content;

    #[test]
    fn validates_model_and_messages() {
        let limits = ContentLimits::default();
        assert!(CompletionRequest::new("", vec![Message::user("hi")]).validate(&limits).is_err());
        assert!(CompletionRequest::new("gpt", Vec::new()).validate(&limits).is_err());
        assert!(CompletionRequest::new("gpt", vec![Message::user("hi")]).validate(&limits).is_ok());
    }

    #[test]
    fn content_errors_are_surfaced() {
        let limits = ContentLimits {
            max_inline_bytes: Some(4),
            allowed_mime_types: Vec::new(),
        };
        let request = CompletionRequest::new(
            "gpt",
            vec![Message::user_parts(vec![Content::image_bytes(vec![0; 8], "image/png")])],
        );

        assert!(matches!(request.validate(&limits), Err(LlmError::Content(_))));
    }

    #[test]
    fn forced_tool_must_be_defined() {
        let mut request = CompletionRequest::new("gpt", vec![Message::user("hi")])
            .with_tools(vec![ToolDefinition::new("search")]);
        request.tool_choice = Some(ToolChoice::Function { name: "lookup".to_owned() });

        let err = request.validate(&ContentLimits::default()).unwrap_err();
        assert!(err.to_string().contains("lookup"));
    }

    #[test]
    fn response_format_round_trips_schema() {
        let format = ResponseFormat::JsonSchema {
            name: "answer".to_owned(),
            schema: serde_json::json!({"type": "object"}),
            strict: true,
        };
        let json = serde_json::to_value(&format).unwrap();
        assert_eq!(json["type"], "json_schema");
        assert_eq!(json["name"], "answer");

        let parsed: ResponseFormat = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, format);
    }
}
