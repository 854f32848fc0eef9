//! Provider-facing capability definitions.
//!
//! [`ToolDefinition`] serializes to the OpenAI function calling format,
//! `{"type": "function", "function": {...}}`, which most providers accept
//! either directly or with a thin translation in the client.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Definition of a capability for provider function calling.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(from = "WireDefinition")]
#[non_exhaustive]
pub struct ToolDefinition {
    /// Name of the capability.
    pub name: String,

    /// What the capability does; helps the model decide when to call it.
    pub description: String,

    /// JSON schema of the provider-visible parameters.
    pub parameters: Value,

    /// Whether to request strict schema adherence.
    pub strict: Option<bool>,
}

impl ToolDefinition {
    /// Create a new tool definition.
    #[must_use]
    pub fn new(name: impl Into<String>, description: impl Into<String>, parameters: Value) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters,
            strict: None,
        }
    }

    /// Enable strict schema validation.
    ///
    /// Adds `"additionalProperties": false` to the top-level schema when it is
    /// not already present.
    #[must_use]
    pub fn with_strict(mut self, strict: bool) -> Self {
        self.strict = Some(strict);
        if strict
            && let Some(obj) = self.parameters.as_object_mut()
            && !obj.contains_key("additionalProperties")
        {
            obj.insert("additionalProperties".to_owned(), Value::Bool(false));
        }
        self
    }

    /// Check if strict mode is enabled.
    #[must_use]
    pub const fn is_strict(&self) -> bool {
        matches!(self.strict, Some(true))
    }

    /// Returns the capability name.
    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Serialize for ToolDefinition {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        use serde::ser::SerializeMap;

        let mut function = serde_json::Map::new();
        function.insert("name".to_owned(), Value::String(self.name.clone()));
        function.insert(
            "description".to_owned(),
            Value::String(self.description.clone()),
        );
        function.insert("parameters".to_owned(), self.parameters.clone());
        if let Some(strict) = self.strict {
            function.insert("strict".to_owned(), Value::Bool(strict));
        }

        let mut map = serializer.serialize_map(Some(2))?;
        map.serialize_entry("type", "function")?;
        map.serialize_entry("function", &function)?;
        map.end()
    }
}

/// Accepts both the wrapped function-calling shape and a flat definition.
#[derive(Deserialize)]
#[serde(untagged)]
enum WireDefinition {
    Wrapped { function: FlatDefinition },
    Flat(FlatDefinition),
}

#[derive(Deserialize)]
struct FlatDefinition {
    name: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    parameters: Value,
    #[serde(default)]
    strict: Option<bool>,
}

impl From<WireDefinition> for ToolDefinition {
    fn from(wire: WireDefinition) -> Self {
        let (WireDefinition::Wrapped { function: flat } | WireDefinition::Flat(flat)) = wire;
        Self {
            name: flat.name,
            description: flat.description,
            parameters: flat.parameters,
            strict: flat.strict,
        }
    }
}
