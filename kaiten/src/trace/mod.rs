//! Hierarchical trace context and trace sinks.
//!
//! Every turn gets a root [`TraceContext`]; each provider call and each
//! capability invocation runs under a child context sharing the root's
//! `trace_id`. The active context is available ambiently through
//! [`current`], so log lines and metric records can be correlated without
//! threading the context through every call. When a [`TraceSink`] is
//! configured, lifecycle checkpoints are persisted as [`TraceEntry`] records.

mod context;
mod entry;
mod layer;
mod scope;
mod sink;
mod tracer;

pub use context::{RunType, TraceContext};
pub use entry::{TraceEntry, TraceEvent, TraceStatus};
pub use layer::TraceLogLayer;
pub use scope::{current, scope, sync_scope};
pub use sink::{JsonlTraceSink, MemoryTraceSink, SharedTraceSink, TraceSink};
pub use tracer::Tracer;
