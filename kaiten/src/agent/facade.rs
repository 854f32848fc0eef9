//! The [`Agent`] facade.
//!
//! An agent bundles a provider, a model, its capabilities, loop settings and
//! a bounded [`History`]. Each call to [`Agent::ask`] runs one turn on a
//! snapshot of the history; the user message and the final answer are
//! appended only when the turn succeeds, so a failed turn leaves no trace
//! in the history.
//!
//! ```rust,ignore
//! let agent = Agent::new("assistant", "gpt-4o", provider)
//!     .with_instructions("You are a careful calculator.")
//!     .with_capabilities(registry);
//!
//! let answer = agent.ask("What's 2+2?").await?;
//! ```

use futures::StreamExt as _;
use serde_json::Value;

use crate::chat::SharedChatProvider;
use crate::error::{ConfigError, Result};
use crate::history::{DEFAULT_HISTORY_SIZE, History};
use crate::message::Message;
use crate::metrics::SharedMetrics;
use crate::tool::{CapabilityRegistry, SharedCapability};
use crate::trace::Tracer;

use super::config::LoopConfig;
use super::runner::{Runner, TurnResult};
use super::streaming::{TokenStream, TurnEvent};

/// A conversational agent with memory.
#[derive(Debug)]
pub struct Agent {
    name: String,
    model: String,
    instructions: Option<String>,
    runner: Runner,
    registry: CapabilityRegistry,
    config: LoopConfig,
    history: History,
}

impl Agent {
    /// Creates an agent with no capabilities and the default history size.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        model: impl Into<String>,
        provider: SharedChatProvider,
    ) -> Self {
        let name = name.into();
        Self {
            runner: Runner::new(provider).with_agent_name(&name),
            name,
            model: model.into(),
            instructions: None,
            registry: CapabilityRegistry::new(),
            config: LoopConfig::default(),
            history: History::new(DEFAULT_HISTORY_SIZE),
        }
    }

    /// System prompt sent ahead of the history on every turn.
    #[must_use]
    pub fn with_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = Some(instructions.into());
        self
    }

    /// Replace the capability registry.
    #[must_use]
    pub fn with_capabilities(mut self, registry: CapabilityRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Replace the loop configuration.
    #[must_use]
    pub fn with_config(mut self, config: LoopConfig) -> Self {
        self.config = config;
        self
    }

    /// Retain at most `max_size` history messages. Clears the history.
    #[must_use]
    pub fn with_history_size(mut self, max_size: usize) -> Self {
        self.history = History::new(max_size);
        self
    }

    /// Emit trace entries through `tracer`.
    #[must_use]
    pub fn with_tracer(mut self, tracer: Tracer) -> Self {
        self.runner = self.runner.with_tracer(tracer);
        self
    }

    /// Report metrics to `metrics`.
    #[must_use]
    pub fn with_metrics(mut self, metrics: SharedMetrics) -> Self {
        self.runner = self.runner.with_metrics(metrics);
        self
    }

    /// Tag traces with `session_id`.
    #[must_use]
    pub fn with_session_id(mut self, session_id: impl Into<String>) -> Self {
        self.runner = self.runner.with_session_id(session_id);
        self
    }

    /// Register a value for injected parameters named `name`.
    #[must_use]
    pub fn inject(mut self, name: impl Into<String>, value: Value) -> Self {
        self.runner = self.runner.inject(name, value);
        self
    }

    /// Register one capability.
    ///
    /// # Errors
    ///
    /// [`ConfigError::DuplicateCapability`] if the name is taken.
    pub fn register(&mut self, capability: SharedCapability) -> std::result::Result<(), ConfigError> {
        self.registry.register(capability)
    }

    /// Agent name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Model identifier.
    #[must_use]
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Registered capabilities.
    #[must_use]
    pub const fn capabilities(&self) -> &CapabilityRegistry {
        &self.registry
    }

    /// Loop configuration.
    #[must_use]
    pub const fn config(&self) -> &LoopConfig {
        &self.config
    }

    /// Conversation history.
    #[must_use]
    pub const fn history(&self) -> &History {
        &self.history
    }

    /// The underlying runner.
    #[must_use]
    pub const fn runner(&self) -> &Runner {
        &self.runner
    }

    /// Run a turn for `input` and return the final answer.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidMessage`](crate::Error::InvalidMessage) for blank
    /// input, otherwise any error of [`Runner::run_turn`]. The history is
    /// unchanged on error.
    pub async fn ask(&self, input: &str) -> Result<String> {
        self.ask_detailed(input).await.map(|turn| turn.output)
    }

    /// Like [`ask`](Self::ask), returning usage and the full exchange.
    ///
    /// # Errors
    ///
    /// Same as [`ask`](Self::ask).
    pub async fn ask_detailed(&self, input: &str) -> Result<TurnResult> {
        let user = Message::user(input)?;
        let conversation = self.conversation(user.clone()).await?;
        let turn = self
            .runner
            .run(&self.model, conversation, &self.config, &self.registry)
            .await?;
        self.remember(user, &turn.output).await?;
        Ok(turn)
    }

    /// Run a streamed turn for `input`.
    ///
    /// The history is updated once the stream completes successfully.
    ///
    /// # Errors
    ///
    /// Configuration errors and blank input are reported here, before
    /// anything is sent; later failures end the stream.
    #[allow(tail_expr_drop_order)]
    pub fn ask_streamed<'a>(&'a self, input: &str) -> Result<TokenStream<'a>> {
        self.runner.check_streaming(&self.registry)?;
        let user = Message::user(input)?;
        let stream = async_stream::try_stream! {
            let conversation = self.conversation(user.clone()).await?;
            let mut events = Box::pin(self.runner.stream_events(
                &self.model,
                conversation,
                &self.config,
                &self.registry,
            ));
            while let Some(event) = events.next().await {
                match event? {
                    TurnEvent::Token(token) => {
                        yield token;
                    }
                    TurnEvent::Completed(turn) => {
                        self.remember(user.clone(), &turn.output).await?;
                    }
                }
            }
        };
        Ok(Box::pin(stream.fuse()))
    }

    async fn conversation(&self, user: Message) -> Result<Vec<Message>> {
        let mut messages = Vec::new();
        if let Some(instructions) = &self.instructions {
            messages.push(Message::system(instructions)?);
        }
        messages.extend(self.history.messages().await);
        messages.push(user);
        Ok(messages)
    }

    async fn remember(&self, user: Message, answer: &str) -> Result<()> {
        let assistant = Message::assistant(answer)?;
        self.history.extend([user, assistant]).await;
        Ok(())
    }
}
