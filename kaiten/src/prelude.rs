//! Prelude module for convenient imports.
//!
//! ```rust,ignore
//! use kaiten::prelude::*;
//! ```

#[cfg(feature = "derive")]
pub use kaiten_derive::capability;

pub use crate::agent::{Agent, ExecutionMode, GenerationConfig, LoopConfig, Runner, TokenStream, TurnResult};
pub use crate::chat::{
    ChatProvider, ChatRequest, ChatResponse, ChunkStream, SharedChatProvider, StreamToolSupport,
};
pub use crate::engine::{ExecutionEngine, FailureKind, InvocationRequest, InvocationResult};
pub use crate::error::{ConfigError, Error, LlmError, LlmResult, Result, ToolError};
pub use crate::history::History;
pub use crate::message::{Message, Role, ToolCall};
pub use crate::metrics::{MetricsCollector, MetricsRecorder, NoopMetrics, SharedMetrics};
pub use crate::stream::{StopReason, StreamAggregator, StreamChunk};
pub use crate::tool::{
    Arguments, Capability, CapabilityRegistry, CapabilitySpec, FnCapability, ParamSpec,
    SharedCapability, Tool, ToolDefinition, ToolResult, TypedCapability, derive_schema,
};
pub use crate::trace::{
    JsonlTraceSink, MemoryTraceSink, RunType, SharedTraceSink, TraceContext, TraceEntry,
    TraceEvent, TraceLogLayer, TraceSink, Tracer,
};
pub use crate::usage::Usage;
