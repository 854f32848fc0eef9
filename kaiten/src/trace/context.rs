//! Hierarchical trace identity.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Kind of step a run represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[non_exhaustive]
pub enum RunType {
    /// A user-facing conversational turn.
    Chat,
    /// A single provider call.
    Llm,
    /// A single capability invocation.
    Tool,
    /// A composite step grouping other runs.
    Chain,
    /// An agent-level activity.
    Agent,
}

impl RunType {
    /// Get the string representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Chat => "chat",
            Self::Llm => "llm",
            Self::Tool => "tool",
            Self::Chain => "chain",
            Self::Agent => "agent",
        }
    }
}

impl fmt::Display for RunType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RunType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "chat" => Ok(Self::Chat),
            "llm" => Ok(Self::Llm),
            "tool" => Ok(Self::Tool),
            "chain" => Ok(Self::Chain),
            "agent" => Ok(Self::Agent),
            other => Err(format!("unknown run type '{other}'")),
        }
    }
}

/// Immutable identity of one step within a trace.
///
/// A root context starts a new trace. Children share the root's `trace_id`,
/// point at their parent through `parent_run_id`, get a fresh `run_id`, and
/// inherit `session_id`, `agent_name` and `model`. Every derivation returns a
/// new value; nothing is mutated in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceContext {
    trace_id: String,
    run_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    parent_run_id: Option<String>,
    run_type: RunType,
    operation: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    session_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    agent_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    model: Option<String>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    metadata: Map<String, Value>,
    start_time: DateTime<Utc>,
}

fn new_id() -> String {
    Uuid::new_v4().simple().to_string()
}

impl TraceContext {
    /// Start a new trace with fresh trace and run ids.
    #[must_use]
    pub fn create_root(run_type: RunType, operation: impl Into<String>) -> Self {
        Self {
            trace_id: new_id(),
            run_id: new_id(),
            parent_run_id: None,
            run_type,
            operation: operation.into(),
            session_id: None,
            agent_name: None,
            model: None,
            metadata: Map::new(),
            start_time: Utc::now(),
        }
    }

    /// Derive a child run within the same trace.
    #[must_use]
    pub fn create_child(&self, run_type: RunType, operation: impl Into<String>) -> Self {
        self.create_child_with(run_type, operation, Map::new())
    }

    /// Derive a child run, merging `metadata` over the parent's.
    ///
    /// Child keys override parent keys on conflict.
    #[must_use]
    pub fn create_child_with(
        &self,
        run_type: RunType,
        operation: impl Into<String>,
        metadata: Map<String, Value>,
    ) -> Self {
        let mut merged = self.metadata.clone();
        merged.extend(metadata);
        Self {
            trace_id: self.trace_id.clone(),
            run_id: new_id(),
            parent_run_id: Some(self.run_id.clone()),
            run_type,
            operation: operation.into(),
            session_id: self.session_id.clone(),
            agent_name: self.agent_name.clone(),
            model: self.model.clone(),
            metadata: merged,
            start_time: Utc::now(),
        }
    }

    /// Return a copy with `extra` merged into the metadata.
    ///
    /// Identity fields and start time are preserved.
    #[must_use]
    pub fn with_metadata(&self, extra: Map<String, Value>) -> Self {
        let mut next = self.clone();
        next.metadata.extend(extra);
        next
    }

    /// Return a copy with the session id set.
    #[must_use]
    pub fn with_session_id(&self, session_id: impl Into<String>) -> Self {
        let mut next = self.clone();
        next.session_id = Some(session_id.into());
        next
    }

    /// Return a copy with the agent name set.
    #[must_use]
    pub fn with_agent_name(&self, agent_name: impl Into<String>) -> Self {
        let mut next = self.clone();
        next.agent_name = Some(agent_name.into());
        next
    }

    /// Return a copy with the model set.
    #[must_use]
    pub fn with_model(&self, model: impl Into<String>) -> Self {
        let mut next = self.clone();
        next.model = Some(model.into());
        next
    }

    /// Id shared by every run in the trace.
    #[must_use]
    pub fn trace_id(&self) -> &str {
        &self.trace_id
    }

    /// Id of this run.
    #[must_use]
    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Id of the parent run, `None` for a root.
    #[must_use]
    pub fn parent_run_id(&self) -> Option<&str> {
        self.parent_run_id.as_deref()
    }

    /// Kind of step.
    #[must_use]
    pub const fn run_type(&self) -> RunType {
        self.run_type
    }

    /// Operation label, e.g. the capability or model name.
    #[must_use]
    pub fn operation(&self) -> &str {
        &self.operation
    }

    /// Session id, if any.
    #[must_use]
    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    /// Agent name, if any.
    #[must_use]
    pub fn agent_name(&self) -> Option<&str> {
        self.agent_name.as_deref()
    }

    /// Model name, if any.
    #[must_use]
    pub fn model(&self) -> Option<&str> {
        self.model.as_deref()
    }

    /// Free-form metadata.
    #[must_use]
    pub const fn metadata(&self) -> &Map<String, Value> {
        &self.metadata
    }

    /// When this run started.
    #[must_use]
    pub const fn start_time(&self) -> DateTime<Utc> {
        self.start_time
    }

    /// Returns `true` if this context starts its trace.
    #[must_use]
    pub const fn is_root(&self) -> bool {
        self.parent_run_id.is_none()
    }

    /// Milliseconds since `start_time`, recomputed on every call.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn elapsed_ms(&self) -> f64 {
        let elapsed = Utc::now() - self.start_time;
        elapsed
            .num_microseconds()
            .map_or(elapsed.num_milliseconds() as f64, |us| us as f64 / 1000.0)
            .max(0.0)
    }
}
