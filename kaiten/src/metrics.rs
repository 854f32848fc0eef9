//! Metric recording for provider calls and capability invocations.
//!
//! The loop reports every provider call and every capability invocation to a
//! [`MetricsRecorder`]. Recording is fire-and-forget: implementations must
//! not block and cannot fail back into the loop. Export formats are left to
//! the recorder.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::usage::Usage;

/// Receiver of per-call metric records.
pub trait MetricsRecorder: Send + Sync + fmt::Debug {
    /// A provider call for `model` succeeded.
    fn record_success(&self, model: &str, start: Instant, usage: Option<&Usage>);

    /// A provider call for `model` failed.
    fn record_error(&self, model: &str, start: Instant, error: &dyn std::error::Error);

    /// A capability invocation succeeded.
    fn record_tool_success(&self, _capability: &str, _start: Instant) {}

    /// A capability invocation failed.
    fn record_tool_error(&self, _capability: &str, _start: Instant, _error: &str) {}
}

/// Shared handle to a metrics recorder.
pub type SharedMetrics = Arc<dyn MetricsRecorder>;

/// Recorder that discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopMetrics;

impl MetricsRecorder for NoopMetrics {
    fn record_success(&self, _model: &str, _start: Instant, _usage: Option<&Usage>) {}

    fn record_error(&self, _model: &str, _start: Instant, _error: &dyn std::error::Error) {}
}

/// In-process counters.
#[derive(Debug, Default)]
pub struct MetricsCollector {
    /// Successful provider calls.
    pub llm_calls: AtomicU64,
    /// Failed provider calls.
    pub llm_errors: AtomicU64,
    /// Successful capability invocations.
    pub tool_calls: AtomicU64,
    /// Failed capability invocations.
    pub tool_errors: AtomicU64,
    /// Total input tokens.
    pub input_tokens: AtomicU64,
    /// Total output tokens.
    pub output_tokens: AtomicU64,
    /// Cumulative provider latency in microseconds.
    pub llm_latency_us: AtomicU64,
}

impl MetricsCollector {
    /// Create a new metrics collector.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Reset all metrics.
    pub fn reset(&self) {
        for counter in [
            &self.llm_calls,
            &self.llm_errors,
            &self.tool_calls,
            &self.tool_errors,
            &self.input_tokens,
            &self.output_tokens,
            &self.llm_latency_us,
        ] {
            counter.store(0, Ordering::SeqCst);
        }
    }

    /// Get a snapshot of current metrics.
    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            llm_calls: self.llm_calls.load(Ordering::SeqCst),
            llm_errors: self.llm_errors.load(Ordering::SeqCst),
            tool_calls: self.tool_calls.load(Ordering::SeqCst),
            tool_errors: self.tool_errors.load(Ordering::SeqCst),
            input_tokens: self.input_tokens.load(Ordering::SeqCst),
            output_tokens: self.output_tokens.load(Ordering::SeqCst),
            llm_latency_us: self.llm_latency_us.load(Ordering::SeqCst),
        }
    }

    fn add_latency(&self, start: Instant) {
        let micros = u64::try_from(start.elapsed().as_micros()).unwrap_or(u64::MAX);
        self.llm_latency_us.fetch_add(micros, Ordering::SeqCst);
    }
}

impl MetricsRecorder for MetricsCollector {
    fn record_success(&self, _model: &str, start: Instant, usage: Option<&Usage>) {
        self.llm_calls.fetch_add(1, Ordering::SeqCst);
        self.add_latency(start);
        if let Some(usage) = usage {
            self.input_tokens
                .fetch_add(u64::from(usage.input_tokens), Ordering::SeqCst);
            self.output_tokens
                .fetch_add(u64::from(usage.output_tokens), Ordering::SeqCst);
        }
    }

    fn record_error(&self, _model: &str, start: Instant, _error: &dyn std::error::Error) {
        self.llm_errors.fetch_add(1, Ordering::SeqCst);
        self.add_latency(start);
    }

    fn record_tool_success(&self, _capability: &str, _start: Instant) {
        self.tool_calls.fetch_add(1, Ordering::SeqCst);
    }

    fn record_tool_error(&self, _capability: &str, _start: Instant, _error: &str) {
        self.tool_errors.fetch_add(1, Ordering::SeqCst);
    }
}

/// Snapshot of metrics at a point in time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    /// Successful provider calls.
    pub llm_calls: u64,
    /// Failed provider calls.
    pub llm_errors: u64,
    /// Successful capability invocations.
    pub tool_calls: u64,
    /// Failed capability invocations.
    pub tool_errors: u64,
    /// Total input tokens.
    pub input_tokens: u64,
    /// Total output tokens.
    pub output_tokens: u64,
    /// Cumulative provider latency in microseconds.
    pub llm_latency_us: u64,
}

impl MetricsSnapshot {
    /// Total tokens (input + output).
    #[must_use]
    pub const fn total_tokens(&self) -> u64 {
        self.input_tokens + self.output_tokens
    }
}

impl fmt::Display for MetricsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Metrics:")?;
        writeln!(f, "  LLM calls:  {} ({} failed)", self.llm_calls, self.llm_errors)?;
        writeln!(
            f,
            "  Tokens:     {} (in: {}, out: {})",
            self.total_tokens(),
            self.input_tokens,
            self.output_tokens
        )?;
        writeln!(f, "  Tool calls: {} ({} failed)", self.tool_calls, self.tool_errors)?;
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::error::LlmError;

    #[test]
    fn collector_counts_calls_and_tokens() {
        let metrics = MetricsCollector::new();
        let start = Instant::now();
        metrics.record_success("m", start, Some(&Usage::new(10, 5)));
        metrics.record_success("m", start, None);
        metrics.record_error("m", start, &LlmError::network("down"));
        metrics.record_tool_success("calc", start);
        metrics.record_tool_error("calc", start, "boom");

        let snap = metrics.snapshot();
        assert_eq!(snap.llm_calls, 2);
        assert_eq!(snap.llm_errors, 1);
        assert_eq!(snap.tool_calls, 1);
        assert_eq!(snap.tool_errors, 1);
        assert_eq!(snap.total_tokens(), 15);
    }

    #[test]
    fn reset_zeroes_everything() {
        let metrics = MetricsCollector::new();
        metrics.record_success("m", Instant::now(), Some(&Usage::new(1, 1)));
        metrics.reset();
        assert_eq!(metrics.snapshot(), MetricsSnapshot::default());
    }

    #[test]
    fn noop_accepts_everything() {
        let metrics = NoopMetrics;
        metrics.record_success("m", Instant::now(), None);
        metrics.record_tool_error("calc", Instant::now(), "x");
    }

    #[test]
    fn display_lists_counters() {
        let snap = MetricsSnapshot {
            llm_calls: 2,
            tool_calls: 3,
            ..MetricsSnapshot::default()
        };
        let text = snap.to_string();
        assert!(text.contains("LLM calls:  2"));
        assert!(text.contains("Tool calls: 3"));
    }
}
