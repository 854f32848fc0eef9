//! Provider client interface.
//!
//! The loop talks to a model through [`ChatProvider`]. Wire formats and
//! transports are the client's concern; the loop only sees
//! [`ChatRequest`]/[`ChatResponse`] and, in streaming mode, a
//! [`ChunkStream`].
//!
//! ```rust,ignore
//! let request = ChatRequest::new("gpt-4o")
//!     .with_messages(vec![Message::user("Hello!")?])
//!     .with_tools(registry.definitions());
//! let response = provider.chat(&request).await?;
//! ```

use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use futures::Stream;
use serde::{Deserialize, Serialize};

use crate::agent::GenerationConfig;
use crate::error::{LlmError, LlmResult};
use crate::message::{Message, ToolCall};
use crate::stream::{StopReason, StreamChunk};
use crate::tool::ToolDefinition;
use crate::usage::Usage;

/// Incremental response of a streaming call.
pub type ChunkStream = Pin<Box<dyn Stream<Item = LlmResult<StreamChunk>> + Send>>;

/// A request to a provider.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatRequest {
    /// Model identifier.
    #[serde(default)]
    pub model: String,

    /// Conversation so far.
    #[serde(default)]
    pub messages: Vec<Message>,

    /// Capabilities the model may call.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<ToolDefinition>>,

    /// Sampling parameters, forwarded unchanged.
    #[serde(default, flatten)]
    pub generation: GenerationConfig,

    /// Whether a streamed response is requested.
    #[serde(default)]
    pub stream: bool,
}

impl ChatRequest {
    /// Creates a new request for `model`.
    #[must_use]
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            ..Default::default()
        }
    }

    /// Sets the conversation.
    #[must_use]
    pub fn with_messages(mut self, messages: Vec<Message>) -> Self {
        self.messages = messages;
        self
    }

    /// Sets the tool definitions; an empty list clears them.
    #[must_use]
    pub fn with_tools(mut self, tools: Vec<ToolDefinition>) -> Self {
        self.tools = (!tools.is_empty()).then_some(tools);
        self
    }

    /// Sets sampling parameters.
    #[must_use]
    pub fn with_generation(mut self, generation: GenerationConfig) -> Self {
        self.generation = generation;
        self
    }

    /// Marks the request as streaming.
    #[must_use]
    pub const fn streaming(mut self) -> Self {
        self.stream = true;
        self
    }

    /// Returns `true` if tools are attached.
    #[must_use]
    pub fn has_tools(&self) -> bool {
        self.tools.as_ref().is_some_and(|t| !t.is_empty())
    }
}

/// A complete provider answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatResponse {
    /// The assistant message.
    pub message: Message,

    /// Token usage, when the provider reports it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,

    /// Model that produced the answer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    /// Why generation stopped.
    #[serde(default)]
    pub stop_reason: StopReason,
}

impl ChatResponse {
    /// Creates a response around `message`.
    #[must_use]
    pub const fn new(message: Message) -> Self {
        Self {
            message,
            usage: None,
            model: None,
            stop_reason: StopReason::Stop,
        }
    }

    /// Sets usage statistics.
    #[must_use]
    pub const fn with_usage(mut self, usage: Usage) -> Self {
        self.usage = Some(usage);
        self
    }

    /// Sets the model identifier.
    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Sets the stop reason.
    #[must_use]
    pub const fn with_stop_reason(mut self, reason: StopReason) -> Self {
        self.stop_reason = reason;
        self
    }

    /// Text content, if non-blank.
    #[must_use]
    pub fn text(&self) -> Option<&str> {
        let text = self.message.content.as_str();
        (!text.trim().is_empty()).then_some(text)
    }

    /// Requested capability invocations.
    #[must_use]
    pub fn tool_calls(&self) -> &[ToolCall] {
        &self.message.tool_calls
    }

    /// Returns `true` if the answer requests capability invocations.
    #[must_use]
    pub fn has_tool_calls(&self) -> bool {
        self.message.has_tool_calls()
    }
}

/// How a provider's stream carries tool calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamToolSupport {
    /// Tool calls cannot be multiplexed into a stream.
    #[default]
    None,
    /// Tool-call fragments are streamed and assembled by the consumer.
    Buffered,
}

/// A model provider.
#[async_trait]
pub trait ChatProvider: Send + Sync {
    /// Send a request and wait for the complete answer.
    async fn chat(&self, request: &ChatRequest) -> LlmResult<ChatResponse>;

    /// Send a request and receive the answer incrementally.
    ///
    /// The default implementation reports streaming as unsupported.
    async fn chat_stream(&self, request: &ChatRequest) -> LlmResult<ChunkStream> {
        let _ = request;
        Err(LlmError::not_supported("streaming").with_provider(self.provider_name()))
    }

    /// Name used in errors and logs.
    fn provider_name(&self) -> &str;

    /// Returns `true` if [`chat_stream`](Self::chat_stream) is implemented.
    fn supports_streaming(&self) -> bool {
        false
    }

    /// How tool calls appear in streamed responses.
    fn streaming_tool_support(&self) -> StreamToolSupport {
        StreamToolSupport::None
    }
}

/// Shared handle to a provider.
pub type SharedChatProvider = Arc<dyn ChatProvider>;

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use serde_json::json;

    use super::*;

    mod chat_request {
        use super::*;

        #[test]
        fn empty_tools_are_dropped() {
            let req = ChatRequest::new("m").with_tools(Vec::new());
            assert!(req.tools.is_none());
            assert!(!req.has_tools());
        }

        #[test]
        fn generation_is_flattened() {
            let req = ChatRequest::new("m").with_generation(GenerationConfig {
                temperature: Some(0.5),
                max_tokens: Some(64),
                ..GenerationConfig::default()
            });
            let value = serde_json::to_value(&req).unwrap();
            assert_eq!(value["temperature"], json!(0.5));
            assert_eq!(value["max_tokens"], json!(64));
            assert_eq!(value["stream"], json!(false));
            assert!(value.get("tools").is_none());
        }
    }

    mod chat_response {
        use super::*;

        #[test]
        fn text_ignores_blank() {
            let call = ToolCall::new("c1", "calculator", json!({"expression": "2+2"}));
            let response = ChatResponse::new(Message::assistant_tool_calls("", vec![call]).unwrap());
            assert!(response.text().is_none());
            assert!(response.has_tool_calls());
            assert_eq!(response.tool_calls()[0].name, "calculator");
        }

        #[test]
        fn text_and_metadata() {
            let response = ChatResponse::new(Message::assistant("Hi").unwrap())
                .with_usage(Usage::new(3, 1))
                .with_model("m")
                .with_stop_reason(StopReason::Length);
            assert_eq!(response.text(), Some("Hi"));
            assert_eq!(response.usage.unwrap().total_tokens, 4);
            assert_eq!(response.stop_reason, StopReason::Length);
            assert!(!response.has_tool_calls());
        }
    }

    mod provider_defaults {
        use super::*;
        use crate::error::LlmErrorKind;

        struct Plain;

        #[async_trait]
        impl ChatProvider for Plain {
            async fn chat(&self, _request: &ChatRequest) -> LlmResult<ChatResponse> {
                Ok(ChatResponse::new(Message::assistant("ok").unwrap()))
            }

            fn provider_name(&self) -> &str {
                "plain"
            }
        }

        #[tokio::test]
        async fn streaming_not_supported_by_default() {
            let provider = Plain;
            assert!(!provider.supports_streaming());
            assert_eq!(provider.streaming_tool_support(), StreamToolSupport::None);
            let Err(err) = provider.chat_stream(&ChatRequest::new("m")).await else {
                panic!("expected an error");
            };
            assert_eq!(err.kind, LlmErrorKind::NotSupported);
            assert_eq!(err.provider.as_deref(), Some("plain"));
        }
    }
}
