//! Lifecycle emission helper.

use serde_json::Value;

use super::context::TraceContext;
use super::entry::{TraceEntry, TraceEvent, TraceStatus};
use super::sink::SharedTraceSink;

/// Emits lifecycle entries to an optional sink.
///
/// With no sink every call is a no-op, so callers never branch on whether
/// tracing is configured.
#[derive(Debug, Clone, Default)]
pub struct Tracer {
    sink: Option<SharedTraceSink>,
}

impl Tracer {
    /// A tracer writing to `sink`.
    #[must_use]
    pub fn new(sink: SharedTraceSink) -> Self {
        Self { sink: Some(sink) }
    }

    /// A tracer that records nothing.
    #[must_use]
    pub const fn disabled() -> Self {
        Self { sink: None }
    }

    /// Returns `true` if a sink is configured.
    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        self.sink.is_some()
    }

    /// Record an opening checkpoint (`trace.start`, `tool.call`, `llm.request`).
    pub fn emit(&self, event: TraceEvent, ctx: &TraceContext, payload: Value) {
        if let Some(sink) = &self.sink {
            sink.save(TraceEntry::new(event, ctx).with_payload(payload));
        }
    }

    /// Record a closing checkpoint with outcome and the run's elapsed time.
    pub fn finish(&self, event: TraceEvent, ctx: &TraceContext, status: TraceStatus, payload: Value) {
        if let Some(sink) = &self.sink {
            sink.save(
                TraceEntry::new(event, ctx)
                    .with_status(status)
                    .with_duration_ms(ctx.elapsed_ms())
                    .with_payload(payload),
            );
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;

    use super::*;
    use crate::trace::{MemoryTraceSink, RunType};

    #[test]
    fn disabled_is_noop() {
        let tracer = Tracer::disabled();
        assert!(!tracer.is_enabled());
        let ctx = TraceContext::create_root(RunType::Chat, "turn");
        tracer.emit(TraceEvent::TraceStart, &ctx, Value::Null);
        tracer.finish(TraceEvent::TraceEnd, &ctx, TraceStatus::Ok, Value::Null);
    }

    #[test]
    fn finish_carries_status_and_duration() {
        let sink = Arc::new(MemoryTraceSink::new());
        let tracer = Tracer::new(Arc::clone(&sink) as SharedTraceSink);
        let ctx = TraceContext::create_root(RunType::Chat, "turn");

        tracer.emit(TraceEvent::TraceStart, &ctx, json!({"input": "hi"}));
        tracer.finish(TraceEvent::TraceEnd, &ctx, TraceStatus::Error, json!({"error": "x"}));

        let entries = sink.entries();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].payload["input"], "hi");
        assert!(entries[0].duration_ms.is_none());
        assert_eq!(entries[1].status, Some(TraceStatus::Error));
        assert!(entries[1].duration_ms.unwrap() >= 0.0);
    }
}
