//! Streaming turns.
//!
//! [`Runner::stream_turn`] yields text deltas as the provider produces them.
//! Each iteration opens a provider stream and forwards its text until the
//! first tool-call chunk appears. From then on the rest of that stream is
//! only buffered; once it ends, the assembled calls are executed exactly as
//! in the blocking loop and a new stream is opened. The caller sees one
//! continuous sequence of tokens.
//!
//! Streams are fused: after the last token (or the first error) they yield
//! `None` forever.

use std::pin::Pin;
use std::sync::Arc;

use futures::{Stream, StreamExt as _};
use tracing::{Instrument as _, debug, info};

use crate::chat::StreamToolSupport;
use crate::error::{ConfigError, Error, Result};
use crate::message::Message;
use crate::stream::StreamAggregator;
use crate::tool::CapabilityRegistry;
use crate::trace;

use super::config::LoopConfig;
use super::runner::{Runner, StepOutcome, TurnResult, TurnState};

/// Text deltas of a streamed turn.
pub type TokenStream<'a> = Pin<Box<dyn Stream<Item = Result<String>> + Send + 'a>>;

/// Item of the internal event stream.
#[derive(Debug)]
pub(crate) enum TurnEvent {
    /// A text delta to forward.
    Token(String),
    /// The turn finished.
    Completed(Box<TurnResult>),
}

impl Runner {
    /// Check that this runner can stream a turn with `capabilities`.
    ///
    /// # Errors
    ///
    /// [`ConfigError::StreamingUnsupported`] if the provider cannot stream,
    /// [`ConfigError::StreamingToolsUnsupported`] if capabilities are supplied
    /// and the provider cannot carry tool calls in a stream.
    pub fn check_streaming(&self, capabilities: &CapabilityRegistry) -> Result<()> {
        let provider = self.provider.provider_name().to_owned();
        if !self.provider.supports_streaming() {
            return Err(ConfigError::StreamingUnsupported { provider }.into());
        }
        if !capabilities.is_empty()
            && self.provider.streaming_tool_support() == StreamToolSupport::None
        {
            return Err(ConfigError::StreamingToolsUnsupported { provider }.into());
        }
        Ok(())
    }

    /// Run one turn, yielding text deltas as they arrive.
    ///
    /// Configuration and conversation are checked eagerly: nothing is sent
    /// to the provider when this returns an error. Provider failures, an
    /// empty final answer or hitting the iteration cap end the stream with
    /// that error. Dropping the stream early closes the turn's trace as
    /// cancelled.
    ///
    /// # Errors
    ///
    /// See [`check_streaming`](Self::check_streaming) and
    /// [`check_conversation`](Self::check_conversation).
    pub fn stream_turn<'a>(
        &'a self,
        model: &'a str,
        conversation: &[Message],
        config: &'a LoopConfig,
        capabilities: &'a CapabilityRegistry,
    ) -> Result<TokenStream<'a>> {
        self.check_streaming(capabilities)?;
        Self::check_conversation(conversation)?;
        let events = self.stream_events(model, conversation.to_vec(), config, capabilities);
        let tokens = events.filter_map(|event| async move {
            match event {
                Ok(TurnEvent::Token(token)) => Some(Ok(token)),
                Ok(TurnEvent::Completed(_)) => None,
                Err(err) => Some(Err(err)),
            }
        });
        Ok(Box::pin(tokens.fuse()))
    }

    /// The streaming loop. Callers must run [`check_streaming`](Self::check_streaming) first.
    //
    // `tail_expr_drop_order` fires inside the `try_stream!` expansion under
    // edition 2024; the generated temporaries are dropped in a harmless order.
    #[allow(tail_expr_drop_order)]
    pub(crate) fn stream_events<'a>(
        &'a self,
        model: &'a str,
        conversation: Vec<Message>,
        config: &'a LoopConfig,
        capabilities: &'a CapabilityRegistry,
    ) -> impl Stream<Item = Result<TurnEvent>> + Send + 'a {
        async_stream::try_stream! {
            let mut state = TurnState::init(self, model, conversation, config, capabilities)?;
            let turn_span = state.turn_span();
            info!(parent: &turn_span, model, "Streamed turn started");

            for iteration in 1..=config.max_iterations {
                debug!(parent: &turn_span, iteration, "Opening provider stream");
                let call = state.begin_llm(iteration, true);
                let opened = trace::scope(
                    Arc::clone(&call.ctx),
                    self.provider.chat_stream(&call.request),
                )
                .instrument(call.span.clone())
                .await;
                let mut chunks = match opened {
                    Ok(chunks) => chunks,
                    Err(err) => {
                        let err = state.llm_failed(&call, err);
                        Err(finish(&state, &turn_span, err))?
                    }
                };

                let mut aggregator = StreamAggregator::new();
                let mut detour = false;
                while let Some(next) = trace::scope(Arc::clone(&call.ctx), chunks.next()).await {
                    let chunk = match next {
                        Ok(chunk) => chunk,
                        Err(err) => {
                            let err = state.llm_failed(&call, err);
                            Err(finish(&state, &turn_span, err))?
                        }
                    };
                    if chunk.is_tool_use() && !detour {
                        debug!(parent: &turn_span, iteration, "Tool call in stream, buffering");
                        detour = true;
                    }
                    if !detour
                        && let Some(text) = chunk.as_text()
                        && !text.is_empty()
                    {
                        yield TurnEvent::Token(text.to_owned());
                    }
                    aggregator.apply(&chunk);
                }

                let response = aggregator.into_chat_response();
                state.llm_succeeded(&call, &response);

                let step = trace::scope(Arc::clone(&state.root), state.process(iteration, response))
                    .instrument(turn_span.clone())
                    .await;
                match step {
                    Ok(StepOutcome::Done(result)) => {
                        let result = turn_span.in_scope(|| state.finish(Ok(result)))?;
                        yield TurnEvent::Completed(Box::new(result));
                        return;
                    }
                    Ok(StepOutcome::Continue) => {}
                    Err(err) => Err(finish(&state, &turn_span, err))?,
                }
            }

            let err = Error::max_iterations(config.max_iterations);
            Err::<(), _>(finish(&state, &turn_span, err))?;
        }
    }
}

fn finish(state: &TurnState<'_>, span: &tracing::Span, err: Error) -> Error {
    span.in_scope(|| state.fail(err))
}
