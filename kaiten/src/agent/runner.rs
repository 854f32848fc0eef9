//! Runner: the provider/capability loop.
//!
//! One turn cycles through
//!
//! 1. awaiting the provider's answer for the current conversation,
//! 2. inspecting it for capability calls,
//! 3. executing those calls and appending the results,
//!
//! and back to 1, until an answer without calls arrives. Its text is the
//! turn's final answer.
//!
//! All per-turn state lives in [`TurnState`], shared by the blocking path
//! ([`Runner::run_turn`]) and the streaming path
//! ([`Runner::stream_turn`](super::streaming)).
//!
//! The turn runs under a root [`TraceContext`] of type `chat`. Every
//! provider call gets an `llm` child and every capability call a `tool`
//! child, so a trace sink receives one tree per turn.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{Instrument, Span, debug, error, info, info_span, warn};

use crate::chat::{ChatRequest, ChatResponse, SharedChatProvider};
use crate::engine::{ExecutionEngine, InvocationRequest};
use crate::error::{Error, LlmError, Result};
use crate::message::Message;
use crate::metrics::{NoopMetrics, SharedMetrics};
use crate::tool::{CapabilityRegistry, ToolDefinition};
use crate::trace::{self, RunType, TraceContext, TraceEvent, TraceStatus, Tracer};
use crate::usage::Usage;

use super::config::LoopConfig;

/// Outcome of a completed turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TurnResult {
    /// The final answer.
    pub output: String,
    /// Usage summed over every provider call of the turn.
    pub usage: Usage,
    /// Number of provider calls made.
    pub iterations: usize,
    /// The full conversation, including capability exchanges and the answer.
    pub messages: Vec<Message>,
}

/// Drives turns against one provider.
///
/// Holds no per-turn state, so one runner can drive many turns
/// concurrently.
#[derive(Clone)]
pub struct Runner {
    pub(super) provider: SharedChatProvider,
    pub(super) tracer: Tracer,
    pub(super) metrics: SharedMetrics,
    injected: HashMap<String, Value>,
    session_id: Option<String>,
    agent_name: Option<String>,
}

impl fmt::Debug for Runner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runner")
            .field("provider", &self.provider.provider_name())
            .field("tracer", &self.tracer)
            .field("session_id", &self.session_id)
            .field("agent_name", &self.agent_name)
            .finish_non_exhaustive()
    }
}

impl Runner {
    /// Creates a runner for `provider` with tracing and metrics disabled.
    #[must_use]
    pub fn new(provider: SharedChatProvider) -> Self {
        Self {
            provider,
            tracer: Tracer::disabled(),
            metrics: Arc::new(NoopMetrics),
            injected: HashMap::new(),
            session_id: None,
            agent_name: None,
        }
    }

    /// Emit trace entries through `tracer`.
    #[must_use]
    pub fn with_tracer(mut self, tracer: Tracer) -> Self {
        self.tracer = tracer;
        self
    }

    /// Report provider calls and capability invocations to `metrics`.
    #[must_use]
    pub fn with_metrics(mut self, metrics: SharedMetrics) -> Self {
        self.metrics = metrics;
        self
    }

    /// Register a value for injected parameters named `name`.
    #[must_use]
    pub fn inject(mut self, name: impl Into<String>, value: Value) -> Self {
        self.injected.insert(name.into(), value);
        self
    }

    /// Tag every turn's trace with `session_id`.
    #[must_use]
    pub fn with_session_id(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    /// Tag every turn's trace with `agent_name`.
    #[must_use]
    pub fn with_agent_name(mut self, agent_name: impl Into<String>) -> Self {
        self.agent_name = Some(agent_name.into());
        self
    }

    /// The provider this runner talks to.
    #[must_use]
    pub fn provider(&self) -> &SharedChatProvider {
        &self.provider
    }

    /// Run one turn and return the final answer.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidMessage`] if a message of `conversation` is blank;
    ///   the provider is never called
    /// - [`Error::Provider`] if a provider call fails; the turn is aborted
    /// - [`Error::EmptyResponse`] if the final answer is blank
    /// - [`Error::MaxIterations`] if `config.max_iterations` provider calls
    ///   did not produce a final answer
    pub async fn run_turn(
        &self,
        model: &str,
        conversation: &[Message],
        config: &LoopConfig,
        capabilities: &CapabilityRegistry,
    ) -> Result<String> {
        self.run(model, conversation.to_vec(), config, capabilities)
            .await
            .map(|result| result.output)
    }

    /// Run one turn and return the answer with usage and the full
    /// conversation.
    ///
    /// # Errors
    ///
    /// Same as [`run_turn`](Self::run_turn).
    pub async fn run(
        &self,
        model: &str,
        conversation: Vec<Message>,
        config: &LoopConfig,
        capabilities: &CapabilityRegistry,
    ) -> Result<TurnResult> {
        let mut state = TurnState::init(self, model, conversation, config, capabilities)?;
        let span = state.turn_span();
        let root = Arc::clone(&state.root);
        trace::scope(root, Self::drive(&mut state))
            .instrument(span)
            .await
    }

    /// Reject a conversation holding a blank message.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidMessage`] naming the first offending message.
    pub fn check_conversation(conversation: &[Message]) -> Result<()> {
        conversation.iter().try_for_each(Message::validate)
    }

    async fn drive(state: &mut TurnState<'_>) -> Result<TurnResult> {
        let result = Self::drive_inner(state).await;
        state.finish(result)
    }

    async fn drive_inner(state: &mut TurnState<'_>) -> Result<TurnResult> {
        for iteration in 1..=state.config.max_iterations {
            debug!(iteration, "Awaiting provider response");
            let call = state.begin_llm(iteration, false);
            let response = match trace::scope(
                Arc::clone(&call.ctx),
                state.runner.provider.chat(&call.request),
            )
            .instrument(call.span.clone())
            .await
            {
                Ok(response) => response,
                Err(err) => return Err(state.llm_failed(&call, err)),
            };
            state.llm_succeeded(&call, &response);

            match state.process(iteration, response).await? {
                StepOutcome::Done(result) => return Ok(result),
                StepOutcome::Continue => {}
            }
        }
        Err(Error::max_iterations(state.config.max_iterations))
    }
}

/// Result of inspecting one provider answer.
pub(super) enum StepOutcome {
    /// The answer carried no capability calls.
    Done(TurnResult),
    /// Capability calls were executed; call the provider again.
    Continue,
}

/// One in-flight provider call.
pub(super) struct LlmCall {
    pub(super) ctx: Arc<TraceContext>,
    pub(super) span: Span,
    pub(super) request: ChatRequest,
    start: Instant,
}

/// Mutable state of a single turn.
pub(super) struct TurnState<'a> {
    pub(super) runner: &'a Runner,
    pub(super) model: &'a str,
    pub(super) config: &'a LoopConfig,
    pub(super) root: Arc<TraceContext>,
    engine: ExecutionEngine,
    definitions: Vec<ToolDefinition>,
    messages: Vec<Message>,
    usage: Usage,
    iterations: usize,
    /// Set once `trace.end` has been recorded.
    closed: AtomicBool,
}

impl<'a> TurnState<'a> {
    /// Validate `conversation` and open the turn's trace.
    pub(super) fn init(
        runner: &'a Runner,
        model: &'a str,
        conversation: Vec<Message>,
        config: &'a LoopConfig,
        capabilities: &CapabilityRegistry,
    ) -> Result<Self> {
        Runner::check_conversation(&conversation)?;

        let mut root = TraceContext::create_root(RunType::Chat, "turn").with_model(model);
        if let Some(session_id) = &runner.session_id {
            root = root.with_session_id(session_id);
        }
        if let Some(agent_name) = &runner.agent_name {
            root = root.with_agent_name(agent_name);
        }

        let engine = runner
            .injected
            .iter()
            .fold(ExecutionEngine::new(capabilities.clone()), |engine, (k, v)| {
                engine.inject(k, v.clone())
            })
            .with_max_concurrency(config.max_tool_concurrency)
            .with_tracer(runner.tracer.clone())
            .with_metrics(Arc::clone(&runner.metrics));

        let state = Self {
            runner,
            model,
            config,
            root: Arc::new(root),
            engine,
            definitions: capabilities.definitions(),
            messages: conversation,
            usage: Usage::zero(),
            iterations: 0,
            closed: AtomicBool::new(false),
        };
        state.runner.tracer.emit(
            TraceEvent::TraceStart,
            &state.root,
            json!({
                "messages": state.messages.len(),
                "capabilities": state.definitions.iter().map(ToolDefinition::name).collect::<Vec<_>>(),
                "execution_mode": config.execution_mode,
            }),
        );
        Ok(state)
    }

    pub(super) fn turn_span(&self) -> Span {
        info_span!(
            "turn",
            model = %self.model,
            provider = %self.runner.provider.provider_name(),
            trace_id = %self.root.trace_id(),
            run_id = %self.root.run_id(),
            iterations = tracing::field::Empty,
            error = tracing::field::Empty,
        )
    }

    /// Open a provider call: child context, span, request and start time.
    pub(super) fn begin_llm(&mut self, iteration: usize, stream: bool) -> LlmCall {
        self.iterations = iteration;
        let ctx = Arc::new(self.root.create_child(RunType::Llm, self.model));
        let span = info_span!(
            "llm",
            model = %self.model,
            iteration,
            trace_id = %ctx.trace_id(),
            run_id = %ctx.run_id(),
            parent_run_id = ctx.parent_run_id().unwrap_or_default(),
            stream,
        );

        let mut request = ChatRequest::new(self.model)
            .with_messages(self.messages.clone())
            .with_tools(self.definitions.clone())
            .with_generation(self.config.generation.clone());
        request.stream = stream;

        self.runner.tracer.emit(
            TraceEvent::LlmRequest,
            &ctx,
            json!({
                "iteration": iteration,
                "messages": request.messages.len(),
                "tools": self.definitions.len(),
                "stream": stream,
            }),
        );

        LlmCall {
            ctx,
            span,
            request,
            start: Instant::now(),
        }
    }

    pub(super) fn llm_succeeded(&mut self, call: &LlmCall, response: &ChatResponse) {
        if let Some(usage) = response.usage {
            self.usage += usage;
        }
        self.runner
            .metrics
            .record_success(self.model, call.start, response.usage.as_ref());
        self.runner.tracer.finish(
            TraceEvent::LlmResponse,
            &call.ctx,
            TraceStatus::Ok,
            json!({
                "tool_calls": response.tool_calls().iter().map(|c| c.name.as_str()).collect::<Vec<_>>(),
                "text_len": response.message.content.len(),
                "usage": response.usage,
                "stop_reason": response.stop_reason,
            }),
        );
    }

    /// Record a failed provider call and wrap the error with context.
    pub(super) fn llm_failed(&self, call: &LlmCall, err: LlmError) -> Error {
        let provider = self.runner.provider.provider_name();
        error!(parent: &call.span, provider, model = %self.model, error = %err, "Provider call failed");
        self.runner.metrics.record_error(self.model, call.start, &err);
        self.runner.tracer.finish(
            TraceEvent::LlmResponse,
            &call.ctx,
            TraceStatus::Error,
            json!({ "error": err.to_string() }),
        );
        Error::provider(provider, self.model, err)
    }

    /// Inspect an answer: run its capability calls or finish the turn.
    pub(super) async fn process(
        &mut self,
        iteration: usize,
        response: ChatResponse,
    ) -> Result<StepOutcome> {
        if !response.has_tool_calls() {
            let Some(text) = response.text().map(str::to_owned) else {
                return Err(Error::empty_response(
                    self.runner.provider.provider_name(),
                    self.model,
                ));
            };
            self.messages.push(response.message);
            return Ok(StepOutcome::Done(TurnResult {
                output: text,
                usage: self.usage,
                iterations: iteration,
                messages: std::mem::take(&mut self.messages),
            }));
        }

        let requests: Vec<InvocationRequest> = response
            .tool_calls()
            .iter()
            .map(InvocationRequest::from)
            .collect();
        debug!(
            iteration,
            calls = requests.len(),
            mode = ?self.config.execution_mode,
            "Executing capability calls"
        );
        self.messages.push(response.message);

        let results = self
            .engine
            .execute_many(&requests, self.config.execution_mode)
            .await;
        let failed = results.iter().filter(|r| !r.success).count();
        debug!(iteration, failed, "Appending capability results");
        self.messages
            .extend(results.iter().map(|result| result.to_message()));
        Ok(StepOutcome::Continue)
    }

    /// Close the turn: log, record `trace.end` and pass the result through.
    pub(super) fn finish(&self, result: Result<TurnResult>) -> Result<TurnResult> {
        match result {
            Ok(turn) => {
                self.complete(&turn);
                Ok(turn)
            }
            Err(err) => Err(self.fail(err)),
        }
    }

    fn complete(&self, turn: &TurnResult) {
        self.closed.store(true, Ordering::Release);
        Span::current().record("iterations", turn.iterations);
        info!(
            model = %self.model,
            iterations = turn.iterations,
            input_tokens = turn.usage.input_tokens,
            output_tokens = turn.usage.output_tokens,
            "Turn completed",
        );
        self.runner.tracer.finish(
            TraceEvent::TraceEnd,
            &self.root,
            TraceStatus::Ok,
            json!({
                "output": turn.output,
                "iterations": turn.iterations,
                "usage": turn.usage,
            }),
        );
    }

    /// Record a failed turn and hand the error back.
    pub(super) fn fail(&self, err: Error) -> Error {
        self.closed.store(true, Ordering::Release);
        let span = Span::current();
        span.record("iterations", self.iterations);
        span.record("error", tracing::field::display(&err));
        error!(model = %self.model, iterations = self.iterations, error = %err, "Turn failed");
        self.runner.tracer.finish(
            TraceEvent::TraceEnd,
            &self.root,
            TraceStatus::Error,
            json!({
                "error": err.to_string(),
                "iterations": self.iterations,
                "usage": self.usage,
            }),
        );
        err
    }
}

// A turn dropped before it finished (a timed-out `run`, an abandoned token
// stream) still closes its trace.
impl Drop for TurnState<'_> {
    fn drop(&mut self) {
        if self.closed.load(Ordering::Acquire) {
            return;
        }
        warn!(model = %self.model, iterations = self.iterations, "Turn cancelled before completion");
        self.runner.tracer.finish(
            TraceEvent::TraceEnd,
            &self.root,
            TraceStatus::Error,
            json!({
                "error": "cancelled",
                "iterations": self.iterations,
                "usage": self.usage,
            }),
        );
    }
}
