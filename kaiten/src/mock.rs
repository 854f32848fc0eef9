//! Scripted provider for tests and examples.
//!
//! [`MockProvider`] replays a queue of replies, one per call, in both
//! blocking and streaming mode. A reply scripted as a full response is
//! split into chunks when streamed; a reply scripted as chunks is
//! aggregated when requested through [`ChatProvider::chat`]. Every request
//! is captured for later inspection.
//!
//! ```rust,ignore
//! let provider = MockProvider::new()
//!     .tool_calls(vec![ToolCall::new("c1", "calculator", json!({"expression": "2+2"}))])
//!     .text("The answer is 4.");
//! ```

use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use serde_json::Value;

use crate::chat::{ChatProvider, ChatRequest, ChatResponse, ChunkStream, StreamToolSupport};
use crate::error::{LlmError, LlmResult};
use crate::message::{Message, Role, ToolCall};
use crate::stream::{StopReason, StreamAggregator, StreamChunk};

/// One scripted reply.
#[derive(Debug, Clone)]
enum Reply {
    Response(ChatResponse),
    Chunks(Vec<LlmResult<StreamChunk>>),
    Error(LlmError),
}

/// A provider that replays scripted replies.
#[derive(Debug)]
pub struct MockProvider {
    name: String,
    script: Mutex<VecDeque<Reply>>,
    requests: Mutex<Vec<ChatRequest>>,
    streaming: bool,
    stream_tools: StreamToolSupport,
}

impl Default for MockProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl MockProvider {
    /// An empty script. Streaming is supported with buffered tool calls.
    #[must_use]
    pub fn new() -> Self {
        Self {
            name: "mock".to_owned(),
            script: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
            streaming: true,
            stream_tools: StreamToolSupport::Buffered,
        }
    }

    /// Report `name` as the provider name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Disable streaming.
    #[must_use]
    pub const fn without_streaming(mut self) -> Self {
        self.streaming = false;
        self
    }

    /// Set how tool calls travel in streams.
    #[must_use]
    pub const fn with_stream_tools(mut self, support: StreamToolSupport) -> Self {
        self.stream_tools = support;
        self
    }

    /// Queue a plain text answer.
    ///
    /// The text is stored as-is, so a blank answer can be scripted.
    #[must_use]
    pub fn text(self, text: impl Into<String>) -> Self {
        let message = Message {
            role: Role::Assistant,
            content: text.into(),
            tool_calls: Vec::new(),
            tool_call_id: None,
        };
        self.response(ChatResponse::new(message))
    }

    /// Queue an answer requesting `calls`.
    #[must_use]
    pub fn tool_calls(self, calls: Vec<ToolCall>) -> Self {
        let message = Message {
            role: Role::Assistant,
            content: String::new(),
            tool_calls: calls,
            tool_call_id: None,
        };
        self.response(ChatResponse::new(message).with_stop_reason(StopReason::ToolCalls))
    }

    /// Queue a complete response.
    #[must_use]
    pub fn response(self, response: ChatResponse) -> Self {
        self.push(Reply::Response(response))
    }

    /// Queue a streamed reply.
    #[must_use]
    pub fn chunks(self, chunks: Vec<StreamChunk>) -> Self {
        self.push(Reply::Chunks(chunks.into_iter().map(Ok).collect()))
    }

    /// Queue a streamed reply that may fail part way.
    #[must_use]
    pub fn chunk_results(self, chunks: Vec<LlmResult<StreamChunk>>) -> Self {
        self.push(Reply::Chunks(chunks))
    }

    /// Queue a failing call.
    #[must_use]
    pub fn error(self, error: LlmError) -> Self {
        self.push(Reply::Error(error))
    }

    /// Number of calls received.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.lock_requests().len()
    }

    /// Requests received so far, in order.
    #[must_use]
    pub fn requests(&self) -> Vec<ChatRequest> {
        self.lock_requests().clone()
    }

    /// Number of replies left in the script.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.script
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn push(self, reply: Reply) -> Self {
        self.script
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(reply);
        self
    }

    fn lock_requests(&self) -> std::sync::MutexGuard<'_, Vec<ChatRequest>> {
        self.requests.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn next_reply(&self, request: &ChatRequest) -> LlmResult<Reply> {
        self.lock_requests().push(request.clone());
        self.script
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
            .ok_or_else(|| LlmError::internal("mock script exhausted").with_provider(&self.name))
    }
}

/// Split a response into the chunks a streaming provider would send.
fn into_chunks(response: ChatResponse) -> Vec<LlmResult<StreamChunk>> {
    let mut chunks: Vec<StreamChunk> = response
        .message
        .content
        .split_inclusive(' ')
        .map(StreamChunk::text)
        .collect();
    for (index, call) in response.message.tool_calls.iter().enumerate() {
        chunks.push(StreamChunk::tool_use_start(index, &call.id, &call.name));
        let arguments = match &call.arguments {
            Value::Null => String::new(),
            _ => call.arguments_string(),
        };
        chunks.push(StreamChunk::tool_use_delta(index, arguments));
        chunks.push(StreamChunk::tool_use_complete(index));
    }
    if let Some(usage) = response.usage {
        chunks.push(StreamChunk::Usage(usage));
    }
    chunks.push(StreamChunk::done(Some(response.stop_reason)));
    chunks.into_iter().map(Ok).collect()
}

#[async_trait]
impl ChatProvider for MockProvider {
    async fn chat(&self, request: &ChatRequest) -> LlmResult<ChatResponse> {
        match self.next_reply(request)? {
            Reply::Response(response) => Ok(response),
            Reply::Error(error) => Err(error),
            Reply::Chunks(chunks) => {
                let mut aggregator = StreamAggregator::new();
                for chunk in chunks {
                    aggregator.apply(&chunk?);
                }
                Ok(aggregator.into_chat_response())
            }
        }
    }

    async fn chat_stream(&self, request: &ChatRequest) -> LlmResult<ChunkStream> {
        if !self.streaming {
            return Err(LlmError::not_supported("streaming").with_provider(&self.name));
        }
        let chunks = match self.next_reply(request)? {
            Reply::Response(response) => into_chunks(response),
            Reply::Chunks(chunks) => chunks,
            Reply::Error(error) => return Err(error),
        };
        Ok(Box::pin(futures::stream::iter(chunks)))
    }

    fn provider_name(&self) -> &str {
        &self.name
    }

    fn supports_streaming(&self) -> bool {
        self.streaming
    }

    fn streaming_tool_support(&self) -> StreamToolSupport {
        self.stream_tools
    }
}
