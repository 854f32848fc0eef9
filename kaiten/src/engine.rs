//! Capability execution engine.
//!
//! [`ExecutionEngine`] turns [`InvocationRequest`]s into
//! [`InvocationResult`]s. Every failure (unknown capability, malformed or
//! invalid arguments, an error or panic inside the capability) is captured
//! in the result of the request that caused it. Nothing escapes the engine,
//! and one failing request never affects its siblings.
//!
//! Each invocation runs under a child [`TraceContext`] of the ambient one
//! (or a fresh root when there is none) and is instrumented with a `tool`
//! span. In parallel mode every invocation of a batch is its own tokio
//! task; synchronous closures additionally run on the blocking pool.

use std::collections::HashMap;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use futures::FutureExt as _;
use tokio::task::JoinHandle;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{Instrument, debug, info_span, warn};
use uuid::Uuid;

use crate::error::ToolError;
use crate::message::{Message, ToolCall};
use crate::metrics::{NoopMetrics, SharedMetrics};
use crate::tool::{CapabilityRegistry, InvocationContext, resolve};
use crate::trace::{self, RunType, TraceContext, TraceEvent, TraceStatus, Tracer};

/// Whether capability panics are caught and reported as
/// [`FailureKind::Panicked`].
///
/// Containment relies on unwinding; a binary built with `panic = "abort"`
/// terminates on the first panicking capability instead.
pub const PANICS_CONTAINED: bool = cfg!(panic = "unwind");

/// How a batch of invocations is scheduled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    /// One after another, in request order.
    #[default]
    Sequential,
    /// All at once (bounded by the engine's concurrency limit).
    Parallel,
}

/// A request to invoke one capability.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvocationRequest {
    /// Id echoed on the result and the tool-result message.
    pub call_id: String,
    /// Name of the capability.
    pub capability_name: String,
    /// JSON object, or a JSON string holding one.
    pub raw_arguments: Value,
}

impl InvocationRequest {
    /// Create a request.
    #[must_use]
    pub fn new(
        call_id: impl Into<String>,
        capability_name: impl Into<String>,
        raw_arguments: impl Into<Value>,
    ) -> Self {
        Self {
            call_id: call_id.into(),
            capability_name: capability_name.into(),
            raw_arguments: raw_arguments.into(),
        }
    }
}

impl From<&ToolCall> for InvocationRequest {
    fn from(call: &ToolCall) -> Self {
        Self::new(&call.id, &call.name, call.arguments.clone())
    }
}

/// Why an invocation failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// No capability with the requested name.
    NotFound,
    /// Serialized arguments were not valid JSON.
    InvalidJson,
    /// Arguments did not match the parameter schema.
    InvalidArguments,
    /// The capability returned an error.
    ExecutionFailed,
    /// The capability panicked.
    Panicked,
}

impl From<&ToolError> for FailureKind {
    fn from(err: &ToolError) -> Self {
        match err {
            ToolError::NotFound(_) => Self::NotFound,
            ToolError::InvalidJson(_) => Self::InvalidJson,
            ToolError::InvalidArguments(_) => Self::InvalidArguments,
            ToolError::Panicked(_) => Self::Panicked,
            _ => Self::ExecutionFailed,
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::NotFound => "not found",
            Self::InvalidJson => "invalid JSON",
            Self::InvalidArguments => "invalid arguments",
            Self::ExecutionFailed => "execution failed",
            Self::Panicked => "panicked",
        })
    }
}

/// Outcome of one invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvocationResult {
    /// Id of the originating request.
    pub call_id: String,
    /// Requested capability name.
    pub capability_name: String,
    /// Whether the invocation succeeded.
    pub success: bool,
    /// Returned value, on success.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    /// Error message, on failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Failure category, on failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_kind: Option<FailureKind>,
    /// Resolution plus invocation time.
    pub duration_ms: f64,
}

impl InvocationResult {
    /// A successful result.
    #[must_use]
    pub fn success(
        call_id: impl Into<String>,
        capability_name: impl Into<String>,
        value: Value,
        duration_ms: f64,
    ) -> Self {
        Self {
            call_id: call_id.into(),
            capability_name: capability_name.into(),
            success: true,
            value: Some(value),
            error: None,
            failure_kind: None,
            duration_ms,
        }
    }

    /// A failed result.
    #[must_use]
    pub fn failure(
        call_id: impl Into<String>,
        capability_name: impl Into<String>,
        error: &ToolError,
        duration_ms: f64,
    ) -> Self {
        Self {
            call_id: call_id.into(),
            capability_name: capability_name.into(),
            success: false,
            value: None,
            error: Some(error.to_string()),
            failure_kind: Some(FailureKind::from(error)),
            duration_ms,
        }
    }

    /// Content of the tool-result message fed back to the provider.
    ///
    /// String values are passed through, other values are JSON-encoded, and
    /// failures read `Error: <message>`. Never blank.
    #[must_use]
    pub fn to_message_content(&self) -> String {
        if !self.success {
            return format!("Error: {}", self.error.as_deref().unwrap_or("unknown error"));
        }
        match &self.value {
            Some(Value::String(s)) if !s.trim().is_empty() => s.clone(),
            Some(value) => value.to_string(),
            None => Value::Null.to_string(),
        }
    }

    /// The tool-result message answering this invocation.
    #[must_use]
    pub fn to_message(&self) -> Message {
        Message {
            role: crate::message::Role::Tool,
            content: self.to_message_content(),
            tool_calls: Vec::new(),
            tool_call_id: Some(self.call_id.clone()),
        }
    }
}

/// Runs capability invocations against a registry.
///
/// Cheap to clone; clones share the registry and injected values.
#[derive(Clone)]
pub struct ExecutionEngine {
    registry: Arc<CapabilityRegistry>,
    injected: Arc<HashMap<String, Value>>,
    max_concurrency: Option<usize>,
    tracer: Tracer,
    metrics: SharedMetrics,
}

impl fmt::Debug for ExecutionEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionEngine")
            .field("registry", &self.registry)
            .field("injected", &self.injected.keys().collect::<Vec<_>>())
            .field("max_concurrency", &self.max_concurrency)
            .finish_non_exhaustive()
    }
}

impl ExecutionEngine {
    /// Create an engine over `registry`.
    #[must_use]
    pub fn new(registry: impl Into<Arc<CapabilityRegistry>>) -> Self {
        if !PANICS_CONTAINED {
            warn!("Built with panic = \"abort\": a panicking capability will terminate the process");
        }
        Self {
            registry: registry.into(),
            injected: Arc::new(HashMap::new()),
            max_concurrency: None,
            tracer: Tracer::disabled(),
            metrics: Arc::new(NoopMetrics),
        }
    }

    /// Register a value for injected parameters named `name`.
    #[must_use]
    pub fn inject(mut self, name: impl Into<String>, value: Value) -> Self {
        Arc::make_mut(&mut self.injected).insert(name.into(), value);
        self
    }

    /// Limit how many invocations run at once in parallel mode.
    ///
    /// `None` (the default) runs a whole batch at once.
    #[must_use]
    pub const fn with_max_concurrency(mut self, max_concurrency: Option<usize>) -> Self {
        self.max_concurrency = max_concurrency;
        self
    }

    /// Emit `tool.call`/`tool.result` entries through `tracer`.
    #[must_use]
    pub fn with_tracer(mut self, tracer: Tracer) -> Self {
        self.tracer = tracer;
        self
    }

    /// Report invocation outcomes to `metrics`.
    #[must_use]
    pub fn with_metrics(mut self, metrics: SharedMetrics) -> Self {
        self.metrics = metrics;
        self
    }

    /// The registry invocations resolve against.
    #[must_use]
    pub fn registry(&self) -> &CapabilityRegistry {
        &self.registry
    }

    /// Invoke `name` with `args` under a generated call id.
    pub async fn execute_one(&self, name: &str, args: impl Into<Value>) -> InvocationResult {
        let call_id = format!("call_{}", Uuid::new_v4().simple());
        self.execute_call(&InvocationRequest::new(call_id, name, args))
            .await
    }

    /// Invoke one request.
    pub async fn execute_call(&self, request: &InvocationRequest) -> InvocationResult {
        let parent = trace::current();
        let ctx = Arc::new(parent.as_deref().map_or_else(
            || TraceContext::create_root(RunType::Tool, &request.capability_name),
            |p| p.create_child(RunType::Tool, &request.capability_name),
        ));

        let span = info_span!(
            "tool",
            tool.name = %request.capability_name,
            tool.id = %request.call_id,
            trace_id = %ctx.trace_id(),
            run_id = %ctx.run_id(),
            parent_run_id = ctx.parent_run_id().unwrap_or_default(),
            tool.success = tracing::field::Empty,
            error = tracing::field::Empty,
        );

        trace::scope(Arc::clone(&ctx), self.run_invocation(request, ctx))
            .instrument(span)
            .await
    }

    /// Invoke a batch, returning results in request order.
    pub async fn execute_many(
        &self,
        requests: &[InvocationRequest],
        mode: ExecutionMode,
    ) -> Vec<InvocationResult> {
        let mut results = Vec::with_capacity(requests.len());
        match mode {
            ExecutionMode::Sequential => {
                for request in requests {
                    results.push(self.execute_call(request).await);
                }
            }
            ExecutionMode::Parallel => {
                let concurrency = self.max_concurrency.unwrap_or(requests.len()).max(1);
                for chunk in requests.chunks(concurrency) {
                    let handles: Vec<_> = chunk.iter().map(|request| self.spawn_call(request)).collect();
                    let joined = futures::future::join_all(handles).await;
                    results.extend(joined.into_iter().zip(chunk).map(|(joined, request)| {
                        joined.unwrap_or_else(|err| {
                            let err = ToolError::Panicked(err.to_string());
                            InvocationResult::failure(&request.call_id, &request.capability_name, &err, 0.0)
                        })
                    }));
                }
            }
        }
        results
    }

    /// Run one request as its own task, under the caller's trace context and span.
    fn spawn_call(&self, request: &InvocationRequest) -> JoinHandle<InvocationResult> {
        let engine = self.clone();
        let request = request.clone();
        let parent = trace::current();
        let task = async move {
            match parent {
                Some(ctx) => trace::scope(ctx, engine.execute_call(&request)).await,
                None => engine.execute_call(&request).await,
            }
        };
        tokio::spawn(task.instrument(tracing::Span::current()))
    }

    async fn run_invocation(
        &self,
        request: &InvocationRequest,
        ctx: Arc<TraceContext>,
    ) -> InvocationResult {
        let start = Instant::now();
        self.tracer.emit(
            TraceEvent::ToolCall,
            &ctx,
            json!({
                "call_id": request.call_id,
                "arguments": request.raw_arguments,
            }),
        );

        let outcome = match self.registry.get(&request.capability_name) {
            None => Err(ToolError::not_found(&request.capability_name)),
            Some(capability) => {
                let invocation = InvocationContext::new(&request.call_id)
                    .with_trace(Arc::clone(&ctx))
                    .with_values(Arc::clone(&self.injected));
                match resolve(capability.spec(), &request.raw_arguments, &invocation) {
                    Ok(args) => AssertUnwindSafe(capability.invoke(args))
                        .catch_unwind()
                        .await
                        .unwrap_or_else(|panic| Err(ToolError::Panicked(panic_message(&*panic)))),
                    Err(e) => Err(e),
                }
            }
        };

        let duration_ms = start.elapsed().as_secs_f64() * 1000.0;
        let span = tracing::Span::current();
        let result = match outcome {
            Ok(value) => {
                span.record("tool.success", true);
                debug!(tool = %request.capability_name, duration_ms, "Capability succeeded");
                self.metrics
                    .record_tool_success(&request.capability_name, start);
                InvocationResult::success(&request.call_id, &request.capability_name, value, duration_ms)
            }
            Err(err) => {
                span.record("tool.success", false);
                span.record("error", tracing::field::display(&err));
                warn!(tool = %request.capability_name, kind = %FailureKind::from(&err), error = %err, "Capability failed");
                self.metrics
                    .record_tool_error(&request.capability_name, start, &err.to_string());
                InvocationResult::failure(&request.call_id, &request.capability_name, &err, duration_ms)
            }
        };

        let status = if result.success {
            TraceStatus::Ok
        } else {
            TraceStatus::Error
        };
        self.tracer.finish(
            TraceEvent::ToolResult,
            &ctx,
            status,
            serde_json::to_value(&result).unwrap_or(Value::Null),
        );
        result
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    panic
        .downcast_ref::<&str>()
        .map(|s| (*s).to_owned())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_owned())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::metrics::MetricsCollector;
    use crate::tool::{CapabilitySpec, FnCapability, ParamSpec, ToolResult};
    use crate::trace::{MemoryTraceSink, SharedTraceSink};

    fn registry() -> CapabilityRegistry {
        let mut registry = CapabilityRegistry::new();
        registry
            .register_all([
                FnCapability::sync(
                    CapabilitySpec::new("echo").with_param(ParamSpec::new("text", "String")),
                    |mut args| Ok(Value::String(args.take("text")?)),
                )
                .shared(),
                FnCapability::with_async(
                    CapabilitySpec::new("sleep")
                        .with_param(ParamSpec::new("ms", "u64"))
                        .with_param(ParamSpec::new("tag", "String")),
                    |mut args| async move {
                        let ms: u64 = args.take("ms")?;
                        tokio::time::sleep(Duration::from_millis(ms)).await;
                        Ok(Value::String(args.take("tag")?))
                    },
                )
                .shared(),
                FnCapability::sync(CapabilitySpec::new("fail"), |_| -> ToolResult<Value> {
                    Err(ToolError::execution("division by zero"))
                })
                .shared(),
                FnCapability::sync(CapabilitySpec::new("explode"), |_| -> ToolResult<Value> {
                    panic!("kaboom")
                })
                .shared(),
                FnCapability::sync(
                    CapabilitySpec::new("whoami").with_injected("call_id").with_injected("tenant"),
                    |args| Ok(json!({"call_id": args.get("call_id"), "tenant": args.get("tenant")})),
                )
                .shared(),
                FnCapability::sync(CapabilitySpec::new("ambient"), |_| {
                    Ok(json!(trace::current().map(|c| c.run_id().to_owned())))
                })
                .shared(),
            ])
            .unwrap();
        registry
    }

    fn engine() -> ExecutionEngine {
        ExecutionEngine::new(registry())
    }

    mod execute_one {
        use super::*;

        #[tokio::test]
        async fn success() {
            let result = engine().execute_one("echo", json!({"text": "hi"})).await;
            assert!(result.success);
            assert_eq!(result.value, Some(json!("hi")));
            assert!(result.call_id.starts_with("call_"));
        }

        #[tokio::test]
        async fn not_found_is_a_result() {
            let result = engine().execute_one("ghost", json!({})).await;
            assert!(!result.success);
            assert_eq!(result.failure_kind, Some(FailureKind::NotFound));
            assert!(result.error.as_deref().unwrap().contains("not found"));
            assert!(result.duration_ms >= 0.0);
        }

        #[tokio::test]
        async fn malformed_json_is_a_result() {
            let result = engine().execute_one("echo", "{not json").await;
            assert!(!result.success);
            assert_eq!(result.failure_kind, Some(FailureKind::InvalidJson));
            assert!(result.error.as_deref().unwrap().contains("Invalid JSON"));
        }

        #[tokio::test]
        async fn invalid_arguments_tagged_distinctly() {
            let result = engine()
                .execute_one("echo", json!({"text": "a", "extra": 1}))
                .await;
            assert_eq!(result.failure_kind, Some(FailureKind::InvalidArguments));
        }

        #[tokio::test]
        async fn execution_error_carries_message() {
            let result = engine().execute_one("fail", json!({})).await;
            assert_eq!(result.failure_kind, Some(FailureKind::ExecutionFailed));
            assert!(result.error.as_deref().unwrap().contains("division by zero"));
            assert_eq!(result.to_message_content(), format!("Error: {}", result.error.unwrap()));
        }

        #[test]
        fn built_with_unwinding() {
            assert!(PANICS_CONTAINED);
        }

        #[tokio::test]
        async fn panic_is_captured() {
            let result = engine().execute_one("explode", json!({})).await;
            assert_eq!(result.failure_kind, Some(FailureKind::Panicked));
            assert!(result.error.as_deref().unwrap().contains("kaboom"));
        }

        #[tokio::test]
        async fn injected_values() {
            let engine = engine().inject("tenant", json!("acme"));
            let request = InvocationRequest::new("call_42", "whoami", json!({}));
            let result = engine.execute_call(&request).await;
            assert_eq!(result.value, Some(json!({"call_id": "call_42", "tenant": "acme"})));
        }

        #[tokio::test]
        async fn runs_under_child_of_ambient_context() {
            let root = Arc::new(TraceContext::create_root(RunType::Chat, "turn"));
            let sink = Arc::new(MemoryTraceSink::new());
            let engine = engine().with_tracer(Tracer::new(Arc::clone(&sink) as SharedTraceSink));

            let result = trace::scope(Arc::clone(&root), engine.execute_one("ambient", json!({}))).await;
            let tool_run_id = result.value.unwrap();
            assert_ne!(tool_run_id, json!(root.run_id()));

            let entries = sink.by_trace(root.trace_id());
            assert_eq!(entries.len(), 2);
            assert_eq!(entries[0].event, TraceEvent::ToolCall);
            assert_eq!(entries[1].event, TraceEvent::ToolResult);
            assert_eq!(entries[1].parent_run_id.as_deref(), Some(root.run_id()));
            assert_eq!(json!(entries[1].run_id), tool_run_id);
            assert_eq!(entries[1].status, Some(TraceStatus::Ok));
        }

        #[tokio::test]
        async fn records_metrics() {
            let metrics = Arc::new(MetricsCollector::new());
            let engine = engine().with_metrics(Arc::clone(&metrics) as SharedMetrics);
            engine.execute_one("echo", json!({"text": "x"})).await;
            engine.execute_one("fail", json!({})).await;
            let snap = metrics.snapshot();
            assert_eq!(snap.tool_calls, 1);
            assert_eq!(snap.tool_errors, 1);
        }
    }

    mod execute_many {
        use super::*;

        fn sleeps() -> Vec<InvocationRequest> {
            vec![
                InvocationRequest::new("a", "sleep", json!({"ms": 60, "tag": "first"})),
                InvocationRequest::new("b", "sleep", json!({"ms": 5, "tag": "second"})),
                InvocationRequest::new("c", "sleep", json!({"ms": 30, "tag": "third"})),
            ]
        }

        #[tokio::test]
        async fn parallel_preserves_request_order() {
            let results = engine().execute_many(&sleeps(), ExecutionMode::Parallel).await;
            let tags: Vec<_> = results.iter().map(|r| r.value.clone().unwrap()).collect();
            assert_eq!(tags, vec![json!("first"), json!("second"), json!("third")]);
            let ids: Vec<_> = results.iter().map(|r| r.call_id.as_str()).collect();
            assert_eq!(ids, vec!["a", "b", "c"]);
        }

        #[tokio::test]
        async fn parallel_runs_concurrently() {
            let start = Instant::now();
            engine().execute_many(&sleeps(), ExecutionMode::Parallel).await;
            // Sequential execution would take at least 95ms.
            assert!(start.elapsed() < Duration::from_millis(90));
        }

        fn naps() -> Vec<InvocationRequest> {
            (0..3)
                .map(|i| InvocationRequest::new(format!("n{i}"), "nap", json!({})))
                .collect()
        }

        #[tokio::test]
        async fn blocking_sync_capabilities_overlap() {
            let mut registry = registry();
            registry
                .register(
                    FnCapability::sync(CapabilitySpec::new("nap"), |_| {
                        std::thread::sleep(Duration::from_millis(100));
                        Ok(json!("rested"))
                    })
                    .shared(),
                )
                .unwrap();
            let engine = ExecutionEngine::new(registry);
            let requests = naps();

            let start = Instant::now();
            let results = engine.execute_many(&requests, ExecutionMode::Parallel).await;
            let elapsed = start.elapsed();

            assert!(results.iter().all(|r| r.success));
            assert!(elapsed < Duration::from_millis(250), "took {elapsed:?}");
        }

        #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
        async fn blocking_async_capabilities_overlap() {
            let mut registry = registry();
            registry
                .register(
                    FnCapability::with_async(CapabilitySpec::new("nap"), |_| async {
                        std::thread::sleep(Duration::from_millis(100));
                        Ok(json!("rested"))
                    })
                    .shared(),
                )
                .unwrap();
            let engine = ExecutionEngine::new(registry);
            let requests = naps();

            let start = Instant::now();
            let results = engine.execute_many(&requests, ExecutionMode::Parallel).await;
            let elapsed = start.elapsed();

            assert_eq!(results.iter().map(|r| r.call_id.as_str()).collect::<Vec<_>>(), vec!["n0", "n1", "n2"]);
            assert!(elapsed < Duration::from_millis(250), "took {elapsed:?}");
        }

        #[tokio::test]
        async fn blocking_sequential_stays_sequential() {
            let mut registry = registry();
            registry
                .register(
                    FnCapability::sync(CapabilitySpec::new("nap"), |_| {
                        std::thread::sleep(Duration::from_millis(30));
                        Ok(json!("rested"))
                    })
                    .shared(),
                )
                .unwrap();
            let engine = ExecutionEngine::new(registry);
            let start = Instant::now();
            engine.execute_many(&naps(), ExecutionMode::Sequential).await;
            assert!(start.elapsed() >= Duration::from_millis(90));
        }

        #[tokio::test]
        async fn sequential_preserves_order() {
            let results = engine().execute_many(&sleeps(), ExecutionMode::Sequential).await;
            assert_eq!(results[0].value, Some(json!("first")));
            assert_eq!(results[2].value, Some(json!("third")));
        }

        #[tokio::test]
        async fn failure_is_isolated() {
            let requests = vec![
                InvocationRequest::new("1", "echo", json!({"text": "ok"})),
                InvocationRequest::new("2", "fail", json!({})),
                InvocationRequest::new("3", "sleep", json!({"ms": 1, "tag": "fine"})),
            ];
            for mode in [ExecutionMode::Sequential, ExecutionMode::Parallel] {
                let results = engine().execute_many(&requests, mode).await;
                assert_eq!(results.iter().filter(|r| r.success).count(), 2);
                assert!(!results[1].success);
                assert_eq!(results[2].value, Some(json!("fine")));
            }
        }

        #[tokio::test]
        async fn malformed_arguments_in_batch() {
            let requests = vec![
                InvocationRequest::new("1", "echo", json!("{not json")),
                InvocationRequest::new("2", "echo", json!(r#"{"text": "fine"}"#)),
            ];
            let results = engine().execute_many(&requests, ExecutionMode::Parallel).await;
            assert_eq!(results[0].failure_kind, Some(FailureKind::InvalidJson));
            assert!(results[1].success);
        }

        #[tokio::test]
        async fn bounded_concurrency_keeps_order() {
            let engine = engine().with_max_concurrency(Some(2));
            let results = engine.execute_many(&sleeps(), ExecutionMode::Parallel).await;
            let ids: Vec<_> = results.iter().map(|r| r.call_id.as_str()).collect();
            assert_eq!(ids, vec!["a", "b", "c"]);
        }

        #[tokio::test]
        async fn parallel_children_get_distinct_runs() {
            let root = Arc::new(TraceContext::create_root(RunType::Chat, "turn"));
            let requests: Vec<_> = (0..4)
                .map(|i| InvocationRequest::new(i.to_string(), "ambient", json!({})))
                .collect();
            let results = trace::scope(
                root,
                engine().execute_many(&requests, ExecutionMode::Parallel),
            )
            .await;
            let mut run_ids: Vec<_> = results
                .into_iter()
                .map(|r| r.value.unwrap().as_str().unwrap().to_owned())
                .collect();
            run_ids.sort();
            run_ids.dedup();
            assert_eq!(run_ids.len(), 4);
        }

        #[tokio::test]
        async fn empty_batch() {
            assert!(engine().execute_many(&[], ExecutionMode::Parallel).await.is_empty());
        }
    }

    mod invocation_result {
        use super::*;

        #[test]
        fn message_content_forms() {
            let text = InvocationResult::success("c", "f", json!("4"), 1.0);
            assert_eq!(text.to_message_content(), "4");

            let number = InvocationResult::success("c", "f", json!(4), 1.0);
            assert_eq!(number.to_message_content(), "4");

            let empty = InvocationResult::success("c", "f", json!(""), 1.0);
            assert_eq!(empty.to_message_content(), "\"\"");

            let failed = InvocationResult::failure("c", "f", &ToolError::not_found("f"), 0.0);
            assert!(failed.to_message_content().starts_with("Error: "));
        }

        #[test]
        fn to_message_is_tool_role() {
            let msg = InvocationResult::success("call_1", "f", json!({"a": 1}), 1.0).to_message();
            assert_eq!(msg.role, crate::message::Role::Tool);
            assert_eq!(msg.tool_call_id.as_deref(), Some("call_1"));
            assert_eq!(msg.content, r#"{"a":1}"#);
        }

        #[test]
        fn from_tool_call() {
            let call = ToolCall::serialized("id", "calc", r#"{"x":1}"#);
            let request = InvocationRequest::from(&call);
            assert_eq!(request.capability_name, "calc");
            assert_eq!(request.raw_arguments, json!(r#"{"x":1}"#));
        }
    }
}
