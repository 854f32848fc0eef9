//! Loop configuration.
//!
//! Both structs deserialize with every field optional, so a partial JSON
//! document (or `{}`) yields a usable configuration.

use serde::{Deserialize, Serialize};

use crate::engine::ExecutionMode;

/// Default cap on provider calls per turn.
pub const DEFAULT_MAX_ITERATIONS: usize = 10;

/// Sampling parameters forwarded to the provider unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    /// Sampling temperature.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,

    /// Maximum tokens to generate per call.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    /// Nucleus sampling parameter.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,

    /// Stop sequences.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop: Option<Vec<String>>,
}

impl GenerationConfig {
    /// Sets the temperature.
    #[must_use]
    pub const fn temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Sets the token limit.
    #[must_use]
    pub const fn max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    /// Sets nucleus sampling.
    #[must_use]
    pub const fn top_p(mut self, top_p: f32) -> Self {
        self.top_p = Some(top_p);
        self
    }

    /// Sets stop sequences.
    #[must_use]
    pub fn stop(mut self, stop: Vec<String>) -> Self {
        self.stop = Some(stop);
        self
    }
}

/// Per-turn loop settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoopConfig {
    /// Maximum provider calls in one turn.
    pub max_iterations: usize,

    /// How the capability calls of one iteration are scheduled.
    pub execution_mode: ExecutionMode,

    /// Bound on concurrently running capabilities in parallel mode.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tool_concurrency: Option<usize>,

    /// Sampling parameters.
    pub generation: GenerationConfig,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            max_iterations: DEFAULT_MAX_ITERATIONS,
            execution_mode: ExecutionMode::default(),
            max_tool_concurrency: None,
            generation: GenerationConfig::default(),
        }
    }
}

impl LoopConfig {
    /// Creates the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the iteration cap.
    #[must_use]
    pub const fn max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    /// Sets the execution mode.
    #[must_use]
    pub const fn execution_mode(mut self, mode: ExecutionMode) -> Self {
        self.execution_mode = mode;
        self
    }

    /// Shorthand for [`ExecutionMode::Parallel`].
    #[must_use]
    pub const fn parallel(self) -> Self {
        self.execution_mode(ExecutionMode::Parallel)
    }

    /// Bounds parallel execution.
    #[must_use]
    pub const fn max_tool_concurrency(mut self, limit: usize) -> Self {
        self.max_tool_concurrency = Some(limit);
        self
    }

    /// Sets sampling parameters.
    #[must_use]
    pub fn generation(mut self, generation: GenerationConfig) -> Self {
        self.generation = generation;
        self
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn defaults() {
        let config = LoopConfig::default();
        assert_eq!(config.max_iterations, 10);
        assert_eq!(config.execution_mode, ExecutionMode::Sequential);
        assert!(config.max_tool_concurrency.is_none());
    }

    #[test]
    fn partial_json() {
        let config: LoopConfig = serde_json::from_value(json!({
            "execution_mode": "parallel",
            "generation": {"temperature": 0.2}
        }))
        .unwrap();
        assert_eq!(config.max_iterations, DEFAULT_MAX_ITERATIONS);
        assert_eq!(config.execution_mode, ExecutionMode::Parallel);
        assert_eq!(config.generation.temperature, Some(0.2));
        assert!(config.generation.max_tokens.is_none());
    }

    #[test]
    fn builders() {
        let config = LoopConfig::new()
            .max_iterations(3)
            .parallel()
            .max_tool_concurrency(2)
            .generation(GenerationConfig::default().max_tokens(100).stop(vec!["END".into()]));
        assert_eq!(config.max_iterations, 3);
        assert_eq!(config.execution_mode, ExecutionMode::Parallel);
        assert_eq!(config.max_tool_concurrency, Some(2));
        assert_eq!(config.generation.max_tokens, Some(100));

        let value = serde_json::to_value(&config).unwrap();
        assert_eq!(value["execution_mode"], "parallel");
    }
}
