use serde::{Deserialize, Serialize};

use super::content::{Content, ContentError, ContentLimits};
use crate::error::LlmError;

/// Role of a message participant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// System instruction
    System,
    /// User message
    User,
    /// Assistant response
    Assistant,
    /// Tool/function result
    Tool,
}

/// Message in a conversation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Role of the message author
    pub role: Role,
    /// Ordered content parts
    #[serde(default)]
    pub content: Vec<Content>,
    /// Optional participant name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Tool calls made by the assistant
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    /// ID of the tool call this message answers
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

/// A tool/function call requested by the assistant
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Unique identifier for this tool call
    pub id: String,
    /// Name of the function to call
    pub function: FunctionCall,
}

/// Function name and arguments within a tool call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionCall {
    /// Function name
    pub name: String,
    /// JSON-encoded arguments
    pub arguments: String,
}

impl ToolCall {
    /// Build a tool call from raw parts
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            function: FunctionCall {
                name: name.into(),
                arguments: arguments.into(),
            },
        }
    }

    /// Parse the JSON arguments
    ///
    /// # Errors
    ///
    /// Returns `LlmError::InvalidRequest` if the arguments are not valid JSON
    pub fn parsed_arguments(&self) -> Result<serde_json::Value, LlmError> {
        serde_json::from_str(&self.function.arguments).map_err(|e| {
            LlmError::InvalidRequest(format!("tool call {} has malformed arguments: {e}", self.id))
        })
    }
}

impl Message {
    fn with_role(role: Role, content: Vec<Content>) -> Self {
        Self {
            role,
            content,
            name: None,
            tool_calls: Vec::new(),
            tool_call_id: None,
        }
    }

    /// System instruction
    pub fn system(text: impl Into<String>) -> Self {
        Self::with_role(Role::System, vec![Content::text(text)])
    }

    /// User text message
    pub fn user(text: impl Into<String>) -> Self {
        Self::with_role(Role::User, vec![Content::text(text)])
    }

    /// User message with arbitrary parts
    pub fn user_parts(content: Vec<Content>) -> Self {
        Self::with_role(Role::User, content)
    }

    /// Assistant text message
    pub fn assistant(text: impl Into<String>) -> Self {
        Self::with_role(Role::Assistant, vec![Content::text(text)])
    }

    /// Assistant message requesting tool calls
    pub fn assistant_tool_calls(tool_calls: Vec<ToolCall>) -> Self {
        Self {
            tool_calls,
            ..Self::with_role(Role::Assistant, Vec::new())
        }
    }

    /// Tool result answering the call identified by `tool_call_id`
    pub fn tool(tool_call_id: impl Into<String>, content: Vec<Content>) -> Self {
        Self {
            tool_call_id: Some(tool_call_id.into()),
            ..Self::with_role(Role::Tool, content)
        }
    }

    /// Concatenate all text parts
    pub fn text(&self) -> String {
        self.content.iter().filter_map(Content::as_text).collect()
    }

    /// Check structural invariants
    ///
    /// # Errors
    ///
    /// Returns `LlmError::InvalidRequest` if a tool message lacks its
    /// correlation id or a non-assistant message carries tool calls
    pub fn validate(&self) -> Result<(), LlmError> {
        if self.role == Role::Tool && self.tool_call_id.as_deref().is_none_or(str::is_empty) {
            return Err(LlmError::InvalidRequest(
                "tool message must reference the tool call it answers".to_owned(),
            ));
        }

        if self.role != Role::Assistant && !self.tool_calls.is_empty() {
            return Err(LlmError::InvalidRequest(format!(
                "only assistant messages may carry tool calls, got {:?}",
                self.role
            )));
        }

        Ok(())
    }

    /// Validate every content part against `limits`
    ///
    /// # Errors
    ///
    /// Returns the first [`ContentError`] encountered
    pub fn validate_content(&self, limits: &ContentLimits) -> Result<(), ContentError> {
        self.content.iter().try_for_each(|part| part.validate(limits))
    }
}
