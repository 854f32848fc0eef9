//! Streaming response types.
//!
//! A provider stream is a sequence of [`StreamChunk`]s. Text arrives as
//! deltas; tool calls arrive as a start marker followed by argument
//! fragments, keyed by their index in the response. [`StreamAggregator`]
//! folds the chunks back into a complete [`ChatResponse`].

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::chat::ChatResponse;
use crate::message::{Message, Role, ToolCall};
use crate::usage::Usage;

/// Why the model stopped generating.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// Natural end of the answer.
    #[default]
    Stop,
    /// Token limit reached.
    Length,
    /// The model requested tool calls.
    ToolCalls,
    /// Output was filtered.
    ContentFilter,
}

/// A chunk of a streamed response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
#[non_exhaustive]
pub enum StreamChunk {
    /// Text delta.
    Text {
        /// The delta.
        text: String,
    },

    /// A tool call begins.
    ToolUseStart {
        /// Position of the call in the response.
        index: usize,
        /// Call id.
        id: String,
        /// Capability name.
        name: String,
    },

    /// A fragment of serialized arguments.
    ToolUseDelta {
        /// Position of the call being extended.
        index: usize,
        /// JSON text fragment.
        partial_json: String,
    },

    /// A tool call's arguments are complete.
    ToolUseComplete {
        /// Position of the completed call.
        index: usize,
    },

    /// Token usage for the response.
    Usage(Usage),

    /// End of the response.
    Done {
        /// Reported stop reason.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        stop_reason: Option<StopReason>,
    },
}

impl StreamChunk {
    /// Creates a text chunk.
    #[inline]
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    /// Creates a tool use start chunk.
    #[must_use]
    pub fn tool_use_start(index: usize, id: impl Into<String>, name: impl Into<String>) -> Self {
        Self::ToolUseStart {
            index,
            id: id.into(),
            name: name.into(),
        }
    }

    /// Creates a tool use delta chunk.
    #[must_use]
    pub fn tool_use_delta(index: usize, partial_json: impl Into<String>) -> Self {
        Self::ToolUseDelta {
            index,
            partial_json: partial_json.into(),
        }
    }

    /// Creates a tool use complete chunk.
    #[must_use]
    pub const fn tool_use_complete(index: usize) -> Self {
        Self::ToolUseComplete { index }
    }

    /// Creates a done chunk.
    #[must_use]
    pub const fn done(stop_reason: Option<StopReason>) -> Self {
        Self::Done { stop_reason }
    }

    /// Returns the text delta if this is a text chunk.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text { text } => Some(text),
            _ => None,
        }
    }

    /// Returns `true` if this chunk belongs to a tool call.
    #[must_use]
    pub const fn is_tool_use(&self) -> bool {
        matches!(
            self,
            Self::ToolUseStart { .. } | Self::ToolUseDelta { .. } | Self::ToolUseComplete { .. }
        )
    }

    /// Returns `true` if this is a done chunk.
    #[must_use]
    pub const fn is_done(&self) -> bool {
        matches!(self, Self::Done { .. })
    }
}

/// Folds stream chunks into a complete response.
#[derive(Debug, Clone, Default)]
pub struct StreamAggregator {
    text: String,
    tool_calls: BTreeMap<usize, ToolCallBuilder>,
    usage: Option<Usage>,
    stop_reason: Option<StopReason>,
}

#[derive(Debug, Clone, Default)]
struct ToolCallBuilder {
    id: String,
    name: String,
    arguments: String,
}

impl StreamAggregator {
    /// Creates a new aggregator.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies a chunk.
    ///
    /// Deltas for an index that was never started are dropped.
    pub fn apply(&mut self, chunk: &StreamChunk) {
        match chunk {
            StreamChunk::Text { text } => self.text.push_str(text),
            StreamChunk::ToolUseStart { index, id, name } => {
                self.tool_calls.insert(
                    *index,
                    ToolCallBuilder {
                        id: id.clone(),
                        name: name.clone(),
                        arguments: String::new(),
                    },
                );
            }
            StreamChunk::ToolUseDelta {
                index,
                partial_json,
            } => {
                if let Some(call) = self.tool_calls.get_mut(index) {
                    call.arguments.push_str(partial_json);
                }
            }
            StreamChunk::ToolUseComplete { .. } => {}
            StreamChunk::Usage(usage) => self.usage = Some(*usage),
            StreamChunk::Done { stop_reason } => self.stop_reason = *stop_reason,
        }
    }

    /// Text accumulated so far.
    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Reported usage.
    #[must_use]
    pub const fn usage(&self) -> Option<Usage> {
        self.usage
    }

    /// Returns `true` if any tool call has started.
    #[must_use]
    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }

    /// Tool calls in index order, arguments still serialized.
    #[must_use]
    pub fn build_tool_calls(&self) -> Vec<ToolCall> {
        self.tool_calls
            .values()
            .map(|tc| ToolCall::serialized(&tc.id, &tc.name, &tc.arguments))
            .collect()
    }

    /// Converts the accumulated chunks into a [`ChatResponse`].
    ///
    /// The message text may be blank; callers decide whether that is an
    /// empty answer.
    #[must_use]
    pub fn into_chat_response(self) -> ChatResponse {
        let tool_calls = self.build_tool_calls();
        let stop_reason = self.stop_reason.unwrap_or(if tool_calls.is_empty() {
            StopReason::Stop
        } else {
            StopReason::ToolCalls
        });
        let message = Message {
            role: Role::Assistant,
            content: self.text,
            tool_calls,
            tool_call_id: None,
        };
        let mut response = ChatResponse::new(message).with_stop_reason(stop_reason);
        response.usage = self.usage;
        response
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use serde_json::json;

    use super::*;

    mod stream_chunk {
        use super::*;

        #[test]
        fn serde_tagged() {
            let chunk = StreamChunk::tool_use_start(0, "c1", "calc");
            let value = serde_json::to_value(&chunk).unwrap();
            assert_eq!(value["type"], "tool_use_start");
            assert_eq!(value["name"], "calc");
            let back: StreamChunk = serde_json::from_value(value).unwrap();
            assert_eq!(back, chunk);
        }

        #[test]
        fn predicates() {
            assert_eq!(StreamChunk::text("hi").as_text(), Some("hi"));
            assert!(StreamChunk::tool_use_delta(0, "{").is_tool_use());
            assert!(StreamChunk::done(None).is_done());
            assert!(!StreamChunk::text("x").is_tool_use());
        }
    }

    mod aggregator {
        use super::*;

        #[test]
        fn text_only() {
            let mut agg = StreamAggregator::new();
            for chunk in [
                StreamChunk::text("The answer "),
                StreamChunk::text("is 4."),
                StreamChunk::Usage(Usage::new(10, 4)),
                StreamChunk::done(Some(StopReason::Stop)),
            ] {
                agg.apply(&chunk);
            }
            assert_eq!(agg.text(), "The answer is 4.");
            let response = agg.into_chat_response();
            assert_eq!(response.text(), Some("The answer is 4."));
            assert_eq!(response.usage, Some(Usage::new(10, 4)));
            assert!(!response.has_tool_calls());
        }

        #[test]
        fn tool_calls_in_index_order() {
            let mut agg = StreamAggregator::new();
            for chunk in [
                StreamChunk::tool_use_start(1, "c2", "search"),
                StreamChunk::tool_use_start(0, "c1", "calculator"),
                StreamChunk::tool_use_delta(0, r#"{"expression":"#),
                StreamChunk::tool_use_delta(1, r#"{"q":"rust"}"#),
                StreamChunk::tool_use_delta(0, r#""2+2"}"#),
                StreamChunk::tool_use_complete(0),
                StreamChunk::tool_use_delta(7, "ignored"),
            ] {
                agg.apply(&chunk);
            }
            assert!(agg.has_tool_calls());
            let response = agg.into_chat_response();
            let calls = response.tool_calls();
            assert_eq!(calls.len(), 2);
            assert_eq!(calls[0].name, "calculator");
            assert_eq!(calls[0].arguments, json!(r#"{"expression":"2+2"}"#));
            assert_eq!(calls[1].id, "c2");
            assert_eq!(response.stop_reason, StopReason::ToolCalls);
        }

        #[test]
        fn empty_stream_gives_blank_text() {
            let response = StreamAggregator::new().into_chat_response();
            assert!(response.text().is_none());
            assert_eq!(response.stop_reason, StopReason::Stop);
        }
    }
}
