//! Conversation message types.
//!
//! A [`Message`] is a role plus non-blank text content. Assistant messages
//! that request capability invocations carry [`ToolCall`]s and are the only
//! messages allowed to have blank text; tool-result messages carry the id of
//! the call they answer.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};

/// Role of a message in a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// System instructions.
    System,
    /// User input.
    User,
    /// Model output.
    Assistant,
    /// Result of a capability invocation.
    Tool,
}

impl Role {
    /// Get the string representation of the role.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::Tool => "tool",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An invocation request embedded in an assistant message.
///
/// `arguments` holds either a JSON object or a JSON string containing the
/// serialized object, whichever form the provider produced. The resolver
/// accepts both.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Provider-assigned call id, echoed back on the tool-result message.
    pub id: String,
    /// Name of the requested capability.
    pub name: String,
    /// Raw arguments as produced by the provider.
    pub arguments: Value,
}

impl ToolCall {
    /// Create a tool call with structured arguments.
    #[must_use]
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: Value) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments,
        }
    }

    /// Create a tool call whose arguments are still serialized text.
    #[must_use]
    pub fn serialized(
        id: impl Into<String>,
        name: impl Into<String>,
        arguments: impl Into<String>,
    ) -> Self {
        Self::new(id, name, Value::String(arguments.into()))
    }

    /// Returns the arguments rendered as a JSON string.
    #[must_use]
    pub fn arguments_string(&self) -> String {
        match &self.arguments {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }
}

/// A single conversation message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawMessage")]
pub struct Message {
    /// Who produced the message.
    pub role: Role,
    /// Text content. Non-blank unless `tool_calls` is non-empty.
    pub content: String,
    /// Capability invocations requested by an assistant message.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    /// The call this tool-result message answers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

#[derive(Deserialize)]
struct RawMessage {
    role: Role,
    #[serde(default)]
    content: String,
    #[serde(default)]
    tool_calls: Vec<ToolCall>,
    #[serde(default)]
    tool_call_id: Option<String>,
}

impl TryFrom<RawMessage> for Message {
    type Error = Error;

    fn try_from(raw: RawMessage) -> Result<Self> {
        let message = Self {
            role: raw.role,
            content: raw.content,
            tool_calls: raw.tool_calls,
            tool_call_id: raw.tool_call_id,
        };
        message.validate()?;
        Ok(message)
    }
}

impl Message {
    /// Create a message, rejecting blank content.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidMessage`] if `content` is empty or whitespace.
    pub fn new(role: Role, content: impl Into<String>) -> Result<Self> {
        let message = Self {
            role,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_call_id: None,
        };
        message.validate()?;
        Ok(message)
    }

    /// Create a system message.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidMessage`] on blank content.
    pub fn system(content: impl Into<String>) -> Result<Self> {
        Self::new(Role::System, content)
    }

    /// Create a user message.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidMessage`] on blank content.
    pub fn user(content: impl Into<String>) -> Result<Self> {
        Self::new(Role::User, content)
    }

    /// Create an assistant message.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidMessage`] on blank content.
    pub fn assistant(content: impl Into<String>) -> Result<Self> {
        Self::new(Role::Assistant, content)
    }

    /// Create an assistant message that requests capability invocations.
    ///
    /// The accompanying text may be blank when at least one call is present.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidMessage`] if there are no calls and no text.
    pub fn assistant_tool_calls(content: impl Into<String>, tool_calls: Vec<ToolCall>) -> Result<Self> {
        let message = Self {
            role: Role::Assistant,
            content: content.into(),
            tool_calls,
            tool_call_id: None,
        };
        message.validate()?;
        Ok(message)
    }

    /// Create a tool-result message answering `tool_call_id`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidMessage`] on blank content.
    pub fn tool(tool_call_id: impl Into<String>, content: impl Into<String>) -> Result<Self> {
        let mut message = Self::new(Role::Tool, content)?;
        message.tool_call_id = Some(tool_call_id.into());
        Ok(message)
    }

    /// Returns `true` if this message requests capability invocations.
    #[must_use]
    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.content.trim().is_empty() && self.tool_calls.is_empty() {
            return Err(Error::InvalidMessage(format!(
                "{} message content must not be empty",
                self.role
            )));
        }
        Ok(())
    }
}
