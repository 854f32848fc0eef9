//! Persisted trace records.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::context::{RunType, TraceContext};

/// Lifecycle checkpoint recorded by a [`TraceEntry`].
///
/// Serialized as a dotted string: `trace.start`, `tool.result`, `llm.log`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum TraceEvent {
    /// A scope was entered.
    TraceStart,
    /// A scope was left.
    TraceEnd,
    /// A capability is about to be invoked.
    ToolCall,
    /// A capability invocation finished.
    ToolResult,
    /// A provider call is about to be made.
    LlmRequest,
    /// A provider call returned.
    LlmResponse,
    /// A log line emitted inside a run of the given type.
    Log(RunType),
}

impl fmt::Display for TraceEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TraceStart => f.write_str("trace.start"),
            Self::TraceEnd => f.write_str("trace.end"),
            Self::ToolCall => f.write_str("tool.call"),
            Self::ToolResult => f.write_str("tool.result"),
            Self::LlmRequest => f.write_str("llm.request"),
            Self::LlmResponse => f.write_str("llm.response"),
            Self::Log(run_type) => write!(f, "{run_type}.log"),
        }
    }
}

impl From<TraceEvent> for String {
    fn from(event: TraceEvent) -> Self {
        event.to_string()
    }
}

impl TryFrom<String> for TraceEvent {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        match s.as_str() {
            "trace.start" => Ok(Self::TraceStart),
            "trace.end" => Ok(Self::TraceEnd),
            "tool.call" => Ok(Self::ToolCall),
            "tool.result" => Ok(Self::ToolResult),
            "llm.request" => Ok(Self::LlmRequest),
            "llm.response" => Ok(Self::LlmResponse),
            other => other
                .strip_suffix(".log")
                .ok_or_else(|| format!("unknown trace event '{other}'"))?
                .parse()
                .map(Self::Log),
        }
    }
}

/// Outcome recorded on closing entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TraceStatus {
    /// The step completed.
    Ok,
    /// The step failed.
    Error,
}

/// One append-only lifecycle record.
///
/// Carries the identity of the owning [`TraceContext`] plus an
/// event-specific payload. Entries are never mutated once handed to a sink.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceEntry {
    /// Which checkpoint this is.
    pub event: TraceEvent,
    /// Trace the run belongs to.
    pub trace_id: String,
    /// The run that produced the entry.
    pub run_id: String,
    /// The run's parent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_run_id: Option<String>,
    /// Kind of the run.
    pub run_type: RunType,
    /// Operation label of the run.
    pub operation: String,
    /// Session id, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    /// Agent name, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_name: Option<String>,
    /// Model, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// When the entry was created.
    pub timestamp: DateTime<Utc>,
    /// Outcome, on closing entries.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<TraceStatus>,
    /// Duration of the run, on closing entries.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<f64>,
    /// Inputs, outputs or log fields.
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub payload: Value,
}

impl TraceEntry {
    /// Create an entry for `event` owned by `ctx`.
    #[must_use]
    pub fn new(event: TraceEvent, ctx: &TraceContext) -> Self {
        Self {
            event,
            trace_id: ctx.trace_id().to_owned(),
            run_id: ctx.run_id().to_owned(),
            parent_run_id: ctx.parent_run_id().map(str::to_owned),
            run_type: ctx.run_type(),
            operation: ctx.operation().to_owned(),
            session_id: ctx.session_id().map(str::to_owned),
            agent_name: ctx.agent_name().map(str::to_owned),
            model: ctx.model().map(str::to_owned),
            timestamp: Utc::now(),
            status: None,
            duration_ms: None,
            payload: Value::Null,
        }
    }

    /// Attach a payload.
    #[must_use]
    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = payload;
        self
    }

    /// Attach an outcome.
    #[must_use]
    pub const fn with_status(mut self, status: TraceStatus) -> Self {
        self.status = Some(status);
        self
    }

    /// Attach a duration.
    #[must_use]
    pub const fn with_duration_ms(mut self, duration_ms: f64) -> Self {
        self.duration_ms = Some(duration_ms);
        self
    }
}
