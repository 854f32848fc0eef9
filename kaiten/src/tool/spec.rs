//! Declarative capability descriptors.

use std::collections::HashSet;

use serde_json::Map;

use super::definition::ToolDefinition;
use super::docs::DocInfo;
use super::schema::{ParamSpec, ParameterSchema};
use crate::error::ConfigError;

/// Name, description and parameter declarations of a capability.
///
/// Built once with the `with_*` methods and treated as immutable after
/// registration.
///
/// ```rust,ignore
/// let spec = CapabilitySpec::new("calculator")
///     .with_description("Evaluate an arithmetic expression")
///     .with_param(ParamSpec::new("expression", "String"))
///     .with_param(ParamSpec::new("call_id", "String").injected());
/// ```
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CapabilitySpec {
    name: String,
    description: String,
    params: Vec<ParamSpec>,
    docs: Option<String>,
}

impl CapabilitySpec {
    /// Start a descriptor for `name`.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Set the description shown to the provider.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Declare a parameter.
    #[must_use]
    pub fn with_param(mut self, param: ParamSpec) -> Self {
        self.params.push(param);
        self
    }

    /// Declare several parameters.
    #[must_use]
    pub fn with_params(mut self, params: impl IntoIterator<Item = ParamSpec>) -> Self {
        self.params.extend(params);
        self
    }

    /// Declare a runtime-injected parameter of any type.
    #[must_use]
    pub fn with_injected(self, name: impl Into<String>) -> Self {
        self.with_param(ParamSpec::new(name, "Value").injected())
    }

    /// Attach structured documentation (see [`DocInfo`]).
    ///
    /// Used for the description when none was set explicitly, and for
    /// parameters without their own description.
    #[must_use]
    pub fn with_docs(mut self, docs: impl Into<String>) -> Self {
        self.docs = Some(docs.into());
        self
    }

    /// Capability name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Explicit description, falling back to the documentation summary.
    #[must_use]
    pub fn description(&self) -> String {
        if !self.description.trim().is_empty() {
            return self.description.clone();
        }
        self.doc_info()
            .map(|info| info.description)
            .unwrap_or_default()
    }

    /// All declared parameters, injected ones included.
    #[must_use]
    pub fn params(&self) -> &[ParamSpec] {
        &self.params
    }

    /// Look up a parameter by name.
    #[must_use]
    pub fn param(&self, name: &str) -> Option<&ParamSpec> {
        self.params.iter().find(|p| p.name == name)
    }

    /// Names of runtime-injected parameters.
    #[must_use]
    pub fn injected_parameters(&self) -> HashSet<&str> {
        self.params
            .iter()
            .filter(|p| p.injected)
            .map(|p| p.name.as_str())
            .collect()
    }

    /// Raw documentation, if any.
    #[must_use]
    pub fn docs(&self) -> Option<&str> {
        self.docs.as_deref()
    }

    /// Check the name is non-empty and parameter names are unique.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidCapability`] describing the problem.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.name.trim().is_empty() {
            return Err(ConfigError::InvalidCapability(
                "capability name must not be empty".into(),
            ));
        }
        let mut seen = HashSet::new();
        for param in &self.params {
            if !seen.insert(param.name.as_str()) {
                return Err(ConfigError::InvalidCapability(format!(
                    "capability '{}' declares parameter '{}' twice",
                    self.name, param.name
                )));
            }
        }
        Ok(())
    }

    /// Derive the provider-visible parameter schema.
    #[must_use]
    pub fn schema(&self) -> ParameterSchema {
        derive_schema(self)
    }

    /// Provider-formatted definition.
    #[must_use]
    pub fn definition(&self) -> ToolDefinition {
        ToolDefinition::new(&self.name, self.description(), self.schema().to_value())
    }

    /// Parsed documentation; parse failures yield `None`.
    fn doc_info(&self) -> Option<DocInfo> {
        let docs = self.docs.as_deref()?;
        match DocInfo::parse(docs) {
            Ok(info) => Some(info),
            Err(e) => {
                tracing::debug!(capability = %self.name, error = %e, "ignoring malformed documentation");
                None
            }
        }
    }
}

/// Derive the provider-visible parameter schema of a capability.
///
/// Pure and deterministic. Injected parameters are omitted from both the
/// properties and the required list; parameters that are optional or carry a
/// default are omitted from the required list. Descriptions come from the
/// parameter declaration, then from the documentation, and are left out when
/// neither has one. Malformed documentation is ignored.
#[must_use]
pub fn derive_schema(spec: &CapabilitySpec) -> ParameterSchema {
    let docs = spec.doc_info().unwrap_or_default();

    let mut properties = Map::new();
    let mut required = Vec::new();
    for param in spec.params.iter().filter(|p| !p.injected) {
        let description = param
            .description
            .as_deref()
            .filter(|d| !d.trim().is_empty())
            .or_else(|| docs.param(&param.name));
        properties.insert(param.name.clone(), param.to_property(description));
        if param.required {
            required.push(param.name.clone());
        }
    }

    ParameterSchema {
        properties,
        required,
        ..ParameterSchema::default()
    }
}
