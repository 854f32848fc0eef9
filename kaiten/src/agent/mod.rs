//! The orchestration loop.
//!
//! - [`Runner`] drives single turns, blocking ([`Runner::run_turn`]) or
//!   streaming ([`Runner::stream_turn`])
//! - [`Agent`] adds a system prompt, a capability registry and a bounded
//!   history on top of a runner
//! - [`LoopConfig`] holds the per-turn settings

mod config;
mod facade;
mod runner;
mod streaming;

pub use facade::Agent;
pub use config::{DEFAULT_MAX_ITERATIONS, GenerationConfig, LoopConfig};
pub use runner::{Runner, TurnResult};
pub use streaming::TokenStream;

pub use crate::engine::ExecutionMode;
