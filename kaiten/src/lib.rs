//! Kaiten - an agentic tool-calling loop.
//!
//! Given a conversation, a set of capabilities and a provider, the loop
//! repeatedly asks the provider for an answer, runs the capability calls
//! the answer requests (optionally in parallel) and feeds the results back,
//! until a final answer arrives. A streaming variant yields the answer's
//! text as it is produced.
//!
//! Every turn is correlated through a hierarchical [`trace::TraceContext`]
//! propagated ambiently, so provider calls, capability calls and log lines
//! of one turn share a trace id.
//!
//! ```rust,ignore
//! use kaiten::prelude::*;
//!
//! let mut registry = CapabilityRegistry::new();
//! registry.register(TypedCapability::new(Calculator).shared())?;
//!
//! let runner = Runner::new(provider);
//! let answer = runner
//!     .run_turn("gpt-4o", &[Message::user("What's 2+2?")?], &LoopConfig::default(), &registry)
//!     .await?;
//! ```

pub mod agent;
pub mod chat;
pub mod engine;
pub mod error;
pub mod history;
pub mod message;
pub mod metrics;
pub mod mock;
pub mod prelude;
pub mod stream;
pub mod tool;
pub mod trace;
pub mod usage;

pub use error::{ConfigError, Error, LlmError, Result, ToolError};

#[cfg(feature = "derive")]
pub use kaiten_derive::capability;

/// Paths used by code generated with `#[capability]`.
#[doc(hidden)]
pub mod __private {
    pub use async_trait::async_trait;
    pub use serde_json;
}
