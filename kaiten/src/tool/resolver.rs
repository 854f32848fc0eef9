//! Argument resolution.
//!
//! Turns the raw arguments of an invocation request (a JSON object, or a
//! JSON string holding one) into validated [`Arguments`]:
//!
//! 1. serialized text is parsed; malformed text is [`ToolError::InvalidJson`]
//! 2. unknown names, and names of injected parameters, are rejected
//! 3. missing required parameters and type mismatches are rejected
//! 4. declared defaults fill omitted optional parameters
//! 5. injected parameters are filled from the [`InvocationContext`]

use std::collections::HashMap;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use super::schema::{ParamSpec, SchemaType};
use super::spec::CapabilitySpec;
use crate::error::ToolError;
use crate::trace::TraceContext;

/// Validated arguments for one invocation, injected values included.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Arguments {
    values: Map<String, Value>,
}

impl Arguments {
    /// Wrap an already-validated argument map.
    #[must_use]
    pub const fn from_map(values: Map<String, Value>) -> Self {
        Self { values }
    }

    /// Raw value of `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    /// Deserialize `name` into `T`.
    ///
    /// An absent argument deserializes from `null`, so `Option<T>` targets
    /// yield `None`.
    ///
    /// # Errors
    ///
    /// Returns [`ToolError::InvalidArguments`] if the value does not fit `T`.
    pub fn get_as<T: DeserializeOwned>(&self, name: &str) -> Result<T, ToolError> {
        let value = self.values.get(name).cloned().unwrap_or(Value::Null);
        Self::decode(name, value)
    }

    /// Remove `name` and deserialize it into `T`.
    ///
    /// # Errors
    ///
    /// Returns [`ToolError::InvalidArguments`] if the value does not fit `T`.
    pub fn take<T: DeserializeOwned>(&mut self, name: &str) -> Result<T, ToolError> {
        let value = self.values.remove(name).unwrap_or(Value::Null);
        Self::decode(name, value)
    }

    /// Deserialize the whole argument map into `T`.
    ///
    /// # Errors
    ///
    /// Returns [`ToolError::InvalidArguments`] if the map does not fit `T`.
    pub fn parse<T: DeserializeOwned>(self) -> Result<T, ToolError> {
        serde_json::from_value(Value::Object(self.values))
            .map_err(|e| ToolError::invalid_args(e.to_string()))
    }

    /// The argument map as a JSON object.
    #[must_use]
    pub fn into_value(self) -> Value {
        Value::Object(self.values)
    }

    /// Number of arguments.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns `true` if there are no arguments.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    fn decode<T: DeserializeOwned>(name: &str, value: Value) -> Result<T, ToolError> {
        serde_json::from_value(value)
            .map_err(|e| ToolError::invalid_args(format!("argument '{name}': {e}")))
    }
}

/// Runtime values available to injected parameters.
///
/// Besides values registered by name, the following names resolve
/// automatically: `call_id`, `trace_id`, `run_id` and `trace_context` (the
/// whole active context as JSON).
#[derive(Debug, Clone, Default)]
pub struct InvocationContext {
    call_id: String,
    trace: Option<Arc<TraceContext>>,
    values: Arc<HashMap<String, Value>>,
}

impl InvocationContext {
    /// Context for the call `call_id`.
    #[must_use]
    pub fn new(call_id: impl Into<String>) -> Self {
        Self {
            call_id: call_id.into(),
            ..Self::default()
        }
    }

    /// Attach the trace context the invocation runs under.
    #[must_use]
    pub fn with_trace(mut self, trace: Arc<TraceContext>) -> Self {
        self.trace = Some(trace);
        self
    }

    /// Attach named injectable values.
    #[must_use]
    pub fn with_values(mut self, values: Arc<HashMap<String, Value>>) -> Self {
        self.values = values;
        self
    }

    /// Id of the call being resolved.
    #[must_use]
    pub fn call_id(&self) -> &str {
        &self.call_id
    }

    /// Trace context of the invocation, if any.
    #[must_use]
    pub fn trace(&self) -> Option<&TraceContext> {
        self.trace.as_deref()
    }

    /// Value for the injected parameter `name`.
    #[must_use]
    pub fn lookup(&self, name: &str) -> Option<Value> {
        if let Some(value) = self.values.get(name) {
            return Some(value.clone());
        }
        match name {
            "call_id" => Some(Value::String(self.call_id.clone())),
            "trace_id" => self.trace().map(|t| Value::String(t.trace_id().to_owned())),
            "run_id" => self.trace().map(|t| Value::String(t.run_id().to_owned())),
            "trace_context" => self.trace().and_then(|t| serde_json::to_value(t).ok()),
            _ => None,
        }
    }
}

/// Parse raw arguments into a JSON object.
///
/// # Errors
///
/// [`ToolError::InvalidJson`] for malformed text, [`ToolError::InvalidArguments`]
/// when the arguments are not an object.
pub fn parse_raw(raw: &Value) -> Result<Map<String, Value>, ToolError> {
    match raw {
        Value::Object(map) => Ok(map.clone()),
        Value::Null => Ok(Map::new()),
        Value::String(text) if text.trim().is_empty() => Ok(Map::new()),
        Value::String(text) => match serde_json::from_str::<Value>(text) {
            Ok(Value::Object(map)) => Ok(map),
            Ok(other) => Err(ToolError::invalid_args(format!(
                "arguments must be a JSON object, got {}",
                SchemaType::of_value(&other)
            ))),
            Err(e) => Err(ToolError::InvalidJson(e.to_string())),
        },
        other => Err(ToolError::invalid_args(format!(
            "arguments must be a JSON object, got {}",
            SchemaType::of_value(other)
        ))),
    }
}

/// Resolve raw arguments against `spec`.
///
/// # Errors
///
/// See the module documentation for the failure cases.
pub fn resolve(
    spec: &CapabilitySpec,
    raw: &Value,
    ctx: &InvocationContext,
) -> Result<Arguments, ToolError> {
    let mut supplied = parse_raw(raw)?;

    let mut unexpected: Vec<&str> = supplied
        .keys()
        .map(String::as_str)
        .filter(|key| spec.param(key).is_none_or(|p| p.injected))
        .collect();
    if !unexpected.is_empty() {
        unexpected.sort_unstable();
        return Err(ToolError::invalid_args(format!(
            "unexpected argument(s) for '{}': {}",
            spec.name(),
            unexpected.join(", ")
        )));
    }

    let mut values = Map::new();
    for param in spec.params() {
        if param.injected {
            if let Some(value) = ctx.lookup(&param.name).or_else(|| param.default.clone()) {
                values.insert(param.name.clone(), value);
            } else if param.required {
                return Err(ToolError::invalid_args(format!(
                    "no value available for injected parameter '{}'",
                    param.name
                )));
            }
            continue;
        }

        match supplied.remove(&param.name) {
            Some(value) => {
                check_type(param, &value)?;
                values.insert(param.name.clone(), value);
            }
            None => {
                if let Some(default) = &param.default {
                    values.insert(param.name.clone(), default.clone());
                } else if param.required {
                    return Err(ToolError::invalid_args(format!(
                        "missing required argument '{}'",
                        param.name
                    )));
                }
            }
        }
    }

    Ok(Arguments::from_map(values))
}

fn check_type(param: &ParamSpec, value: &Value) -> Result<(), ToolError> {
    let accepts_null = value.is_null() && param.default.as_ref().is_some_and(Value::is_null);
    if param.type_info.accepts(value) || accepts_null {
        return Ok(());
    }
    Err(ToolError::invalid_args(format!(
        "argument '{}' expected {}, got {}",
        param.name,
        param.type_info.schema_type,
        SchemaType::of_value(value)
    )))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::trace::RunType;
    use serde_json::json;

    fn spec() -> CapabilitySpec {
        CapabilitySpec::new("calculator")
            .with_param(ParamSpec::new("expression", "String"))
            .with_param(ParamSpec::new("precision", "u32").with_default(json!(2)))
            .with_param(ParamSpec::new("scale", "f64").optional())
            .with_param(ParamSpec::new("note", "Option<String>"))
            .with_param(ParamSpec::new("call_id", "String").injected())
    }

    fn ctx() -> InvocationContext {
        InvocationContext::new("call_1")
    }

    mod parse_raw {
        use super::*;

        #[test]
        fn accepts_object_and_text() {
            assert_eq!(parse_raw(&json!({"a": 1})).unwrap()["a"], 1);
            assert_eq!(parse_raw(&json!(r#"{"a": 2}"#)).unwrap()["a"], 2);
            assert!(parse_raw(&json!("")).unwrap().is_empty());
            assert!(parse_raw(&Value::Null).unwrap().is_empty());
        }

        #[test]
        fn malformed_text_is_invalid_json() {
            let err = parse_raw(&json!("{not json")).unwrap_err();
            assert!(matches!(err, ToolError::InvalidJson(_)));
        }

        #[test]
        fn non_object_is_invalid_arguments() {
            assert!(matches!(
                parse_raw(&json!("[1, 2]")).unwrap_err(),
                ToolError::InvalidArguments(_)
            ));
            assert!(matches!(
                parse_raw(&json!(42)).unwrap_err(),
                ToolError::InvalidArguments(_)
            ));
        }
    }

    mod resolve {
        use super::*;

        #[test]
        fn fills_defaults_and_injected() {
            let args = resolve(&spec(), &json!({"expression": "2+2"}), &ctx()).unwrap();
            assert_eq!(args.get("expression"), Some(&json!("2+2")));
            assert_eq!(args.get("precision"), Some(&json!(2)));
            assert_eq!(args.get("call_id"), Some(&json!("call_1")));
            assert!(args.get("scale").is_none());
            assert!(args.get("note").is_none());
        }

        #[test]
        fn serialized_text_is_accepted() {
            let args = resolve(&spec(), &json!(r#"{"expression": "1+1", "scale": 3}"#), &ctx()).unwrap();
            assert_eq!(args.get_as::<f64>("scale").unwrap(), 3.0);
        }

        #[test]
        fn unknown_argument_rejected() {
            let err = resolve(&spec(), &json!({"expression": "1", "bogus": true}), &ctx()).unwrap_err();
            assert!(matches!(err, ToolError::InvalidArguments(ref m) if m.contains("bogus")));
        }

        #[test]
        fn provider_cannot_supply_injected() {
            let err = resolve(&spec(), &json!({"expression": "1", "call_id": "forged"}), &ctx()).unwrap_err();
            assert!(matches!(err, ToolError::InvalidArguments(ref m) if m.contains("call_id")));
        }

        #[test]
        fn missing_required_rejected() {
            let err = resolve(&spec(), &json!({}), &ctx()).unwrap_err();
            assert!(matches!(err, ToolError::InvalidArguments(ref m) if m.contains("expression")));
        }

        #[test]
        fn type_mismatch_rejected() {
            let err = resolve(&spec(), &json!({"expression": 4}), &ctx()).unwrap_err();
            assert!(matches!(err, ToolError::InvalidArguments(ref m) if m.contains("expected string")));
        }

        #[test]
        fn null_accepted_for_nullable() {
            let args = resolve(&spec(), &json!({"expression": "x", "note": null}), &ctx()).unwrap();
            assert_eq!(args.get_as::<Option<String>>("note").unwrap(), None);
        }

        #[test]
        fn malformed_text_propagates_invalid_json() {
            let err = resolve(&spec(), &json!("{not json"), &ctx()).unwrap_err();
            assert!(matches!(err, ToolError::InvalidJson(_)));
        }

        #[test]
        fn injected_without_source_is_error() {
            let spec = CapabilitySpec::new("f").with_param(ParamSpec::new("db", "String").injected());
            let err = resolve(&spec, &json!({}), &ctx()).unwrap_err();
            assert!(matches!(err, ToolError::InvalidArguments(ref m) if m.contains("db")));
        }

        #[test]
        fn injected_from_registered_values_and_trace() {
            let spec = CapabilitySpec::new("f")
                .with_injected("db")
                .with_injected("trace_id")
                .with_injected("trace_context");
            let trace = Arc::new(TraceContext::create_root(RunType::Tool, "f"));
            let values = Arc::new(HashMap::from([("db".to_owned(), json!("postgres://"))]));
            let ctx = ctx().with_trace(Arc::clone(&trace)).with_values(values);

            let args = resolve(&spec, &json!({}), &ctx).unwrap();
            assert_eq!(args.get("db"), Some(&json!("postgres://")));
            assert_eq!(args.get("trace_id"), Some(&json!(trace.trace_id())));
            assert_eq!(args.get("trace_context").unwrap()["run_id"], json!(trace.run_id()));
        }
    }

    mod arguments {
        use super::*;

        #[test]
        fn take_removes_and_decodes() {
            let mut args = Arguments::from_map(json!({"a": 1, "b": "x"}).as_object().unwrap().clone());
            assert_eq!(args.take::<i32>("a").unwrap(), 1);
            assert_eq!(args.len(), 1);
            assert_eq!(args.take::<Option<i32>>("missing").unwrap(), None);
            assert!(args.take::<i32>("b").is_err());
        }

        #[test]
        fn parse_into_struct() {
            #[derive(serde::Deserialize)]
            struct Input {
                a: i32,
            }
            let args = Arguments::from_map(json!({"a": 7}).as_object().unwrap().clone());
            assert_eq!(args.parse::<Input>().unwrap().a, 7);
        }
    }
}
