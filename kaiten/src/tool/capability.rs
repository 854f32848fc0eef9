//! Capability trait and its implementations.
//!
//! Anything the loop can invoke implements [`Capability`]. Three forms are
//! provided:
//!
//! - [`FnCapability`]: a [`CapabilitySpec`] plus a sync or async closure
//! - [`Tool`]: a typed trait whose schema is derived with `schemars`,
//!   registered through [`TypedCapability`]
//! - the `#[capability]` attribute macro (feature `derive`)

use std::fmt;
use std::future::Future;
use std::marker::PhantomData;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use super::definition::ToolDefinition;
use super::resolver::Arguments;
use super::schema::{ParamSpec, TypeInfo};
use super::spec::CapabilitySpec;
use crate::error::ToolError;
use crate::trace;

/// A type alias for `Result<T, ToolError>`.
pub type ToolResult<T> = Result<T, ToolError>;

/// A named, schema-described callable.
#[async_trait]
pub trait Capability: Send + Sync {
    /// Descriptor used for schema derivation and argument resolution.
    fn spec(&self) -> &CapabilitySpec;

    /// Run the capability with resolved arguments.
    async fn invoke(&self, args: Arguments) -> ToolResult<Value>;

    /// Capability name.
    fn name(&self) -> &str {
        self.spec().name()
    }

    /// Provider-formatted definition.
    fn definition(&self) -> ToolDefinition {
        self.spec().definition()
    }
}

/// Shared handle to a capability.
pub type SharedCapability = Arc<dyn Capability>;

type BoxFuture = Pin<Box<dyn Future<Output = ToolResult<Value>> + Send>>;

type SyncFn = dyn Fn(Arguments) -> ToolResult<Value> + Send + Sync;

enum Handler {
    Sync(Arc<SyncFn>),
    Async(Box<dyn Fn(Arguments) -> BoxFuture + Send + Sync>),
}

/// Capability backed by a closure.
pub struct FnCapability {
    spec: CapabilitySpec,
    handler: Handler,
}

impl fmt::Debug for FnCapability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.handler {
            Handler::Sync(_) => "sync",
            Handler::Async(_) => "async",
        };
        f.debug_struct("FnCapability")
            .field("spec", &self.spec)
            .field("handler", &kind)
            .finish()
    }
}

impl FnCapability {
    /// Wrap a synchronous closure.
    ///
    /// The closure runs on tokio's blocking pool, so a slow call never
    /// stalls the invocations running next to it. The ambient trace context
    /// and the current span are carried over.
    pub fn sync<F>(spec: CapabilitySpec, f: F) -> Self
    where
        F: Fn(Arguments) -> ToolResult<Value> + Send + Sync + 'static,
    {
        Self {
            spec,
            handler: Handler::Sync(Arc::new(f)),
        }
    }

    /// Wrap an asynchronous closure.
    pub fn with_async<F, Fut>(spec: CapabilitySpec, f: F) -> Self
    where
        F: Fn(Arguments) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ToolResult<Value>> + Send + 'static,
    {
        Self {
            spec,
            handler: Handler::Async(Box::new(move |args| Box::pin(f(args)))),
        }
    }

    /// Convert into a shared handle.
    #[must_use]
    pub fn shared(self) -> SharedCapability {
        Arc::new(self)
    }
}

#[async_trait]
impl Capability for FnCapability {
    fn spec(&self) -> &CapabilitySpec {
        &self.spec
    }

    async fn invoke(&self, args: Arguments) -> ToolResult<Value> {
        match &self.handler {
            Handler::Sync(f) => {
                let f = Arc::clone(f);
                let ctx = trace::current();
                let span = tracing::Span::current();
                let call = move || {
                    span.in_scope(|| match ctx {
                        Some(ctx) => trace::sync_scope(ctx, || f(args)),
                        None => f(args),
                    })
                };
                match tokio::task::spawn_blocking(call).await {
                    Ok(result) => result,
                    // Re-raised so the engine reports it like any other panic.
                    Err(err) if err.is_panic() => std::panic::resume_unwind(err.into_panic()),
                    Err(err) => Err(ToolError::execution(err.to_string())),
                }
            }
            Handler::Async(f) => f(args).await,
        }
    }
}

/// A capability with typed arguments and output.
///
/// The parameter schema is derived from `Args` with `schemars`; field doc
/// comments become parameter descriptions. Fields named in `INJECTED` are
/// filled by the runtime and hidden from the provider.
///
/// ```rust,ignore
/// #[derive(Deserialize, JsonSchema)]
/// struct WeatherArgs {
///     /// City name.
///     city: String,
///     call_id: String,
/// }
///
/// struct Weather;
///
/// #[async_trait]
/// impl Tool for Weather {
///     const NAME: &'static str = "get_weather";
///     const INJECTED: &'static [&'static str] = &["call_id"];
///     type Args = WeatherArgs;
///     type Output = String;
///     type Error = ToolError;
///
///     fn description(&self) -> String {
///         "Current weather for a city".into()
///     }
///
///     async fn call(&self, args: WeatherArgs) -> Result<String, ToolError> {
///         Ok(format!("Sunny in {}", args.city))
///     }
/// }
/// ```
#[async_trait]
pub trait Tool: Send + Sync {
    /// Static name of the capability.
    const NAME: &'static str;

    /// Fields of `Args` supplied by the runtime.
    const INJECTED: &'static [&'static str] = &[];

    /// Arguments type.
    type Args: DeserializeOwned + JsonSchema + Send;

    /// Output type.
    type Output: Serialize + Send;

    /// Error type.
    type Error: Into<ToolError> + Send;

    /// Description shown to the provider.
    fn description(&self) -> String;

    /// Execute with typed arguments.
    async fn call(&self, args: Self::Args) -> Result<Self::Output, Self::Error>;
}

/// Adapter registering a [`Tool`] as a [`Capability`].
pub struct TypedCapability<T> {
    tool: T,
    spec: CapabilitySpec,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Tool> TypedCapability<T> {
    /// Wrap `tool`, deriving its descriptor from `T::Args`.
    pub fn new(tool: T) -> Self {
        let spec = CapabilitySpec::new(T::NAME)
            .with_description(tool.description())
            .with_params(params_from_schema::<T::Args>(T::INJECTED));
        Self {
            tool,
            spec,
            _marker: PhantomData,
        }
    }

    /// The wrapped tool.
    pub const fn inner(&self) -> &T {
        &self.tool
    }
}

impl<T> fmt::Debug for TypedCapability<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypedCapability")
            .field("spec", &self.spec)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl<T: Tool + 'static> Capability for TypedCapability<T> {
    fn spec(&self) -> &CapabilitySpec {
        &self.spec
    }

    async fn invoke(&self, args: Arguments) -> ToolResult<Value> {
        let typed: T::Args = args.parse()?;
        let output = self.tool.call(typed).await.map_err(Into::into)?;
        serde_json::to_value(output).map_err(|e| ToolError::execution(e.to_string()))
    }
}

/// Convert the `schemars` schema of `A` into parameter declarations.
fn params_from_schema<A: JsonSchema>(injected: &[&str]) -> Vec<ParamSpec> {
    let schema = serde_json::to_value(schemars::schema_for!(A)).unwrap_or(Value::Null);
    let required: Vec<&str> = schema
        .get("required")
        .and_then(Value::as_array)
        .map(|r| r.iter().filter_map(Value::as_str).collect())
        .unwrap_or_default();

    let Some(properties) = schema.get("properties").and_then(Value::as_object) else {
        return Vec::new();
    };

    properties
        .iter()
        .map(|(name, prop)| {
            let mut param = ParamSpec::typed(name.clone(), TypeInfo::from_json_schema(prop));
            param.required = required.contains(&name.as_str());
            if let Some(desc) = prop.get("description").and_then(Value::as_str) {
                param = param.with_description(desc);
            }
            if let Some(default) = prop.get("default") {
                param.default = Some(default.clone());
            }
            if injected.contains(&name.as_str()) {
                param = param.injected();
            }
            param
        })
        .collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use std::collections::HashMap;

    use serde::Deserialize;
    use serde_json::json;

    use super::*;
    use crate::tool::derive_schema;
    use crate::tool::resolver::{InvocationContext, resolve};

    mod fn_capability {
        use super::*;

        fn add_spec() -> CapabilitySpec {
            CapabilitySpec::new("add")
                .with_description("Add two integers")
                .with_param(ParamSpec::new("a", "i64"))
                .with_param(ParamSpec::new("b", "i64"))
        }

        #[tokio::test]
        async fn sync_closure() {
            let cap = FnCapability::sync(add_spec(), |mut args| {
                let a: i64 = args.take("a")?;
                let b: i64 = args.take("b")?;
                Ok(json!(a + b))
            });
            let args = resolve(cap.spec(), &json!({"a": 2, "b": 3}), &InvocationContext::default()).unwrap();
            assert_eq!(cap.invoke(args).await.unwrap(), json!(5));
            assert_eq!(cap.name(), "add");
        }

        #[tokio::test]
        async fn async_closure() {
            let cap = FnCapability::with_async(add_spec(), |mut args| async move {
                tokio::task::yield_now().await;
                let a: i64 = args.take("a")?;
                let b: i64 = args.take("b")?;
                Ok(json!(a * b))
            });
            let args = resolve(cap.spec(), &json!({"a": 4, "b": 3}), &InvocationContext::default()).unwrap();
            assert_eq!(cap.invoke(args).await.unwrap(), json!(12));
        }

        #[test]
        fn definition_from_spec() {
            let cap = FnCapability::sync(add_spec(), |_| Ok(Value::Null)).shared();
            let def = cap.definition();
            assert_eq!(def.name, "add");
            assert_eq!(def.description, "Add two integers");
            assert_eq!(def.parameters["required"], json!(["a", "b"]));
        }
    }

    mod typed {
        use super::*;

        #[derive(Debug, Deserialize, JsonSchema)]
        struct WeatherArgs {
            /// City name.
            city: String,
            /// Temperature unit.
            unit: Option<String>,
            call_id: String,
        }

        struct Weather;

        #[async_trait]
        impl Tool for Weather {
            const NAME: &'static str = "get_weather";
            const INJECTED: &'static [&'static str] = &["call_id"];

            type Args = WeatherArgs;
            type Output = HashMap<String, String>;
            type Error = ToolError;

            fn description(&self) -> String {
                "Current weather for a city".into()
            }

            async fn call(&self, args: WeatherArgs) -> Result<Self::Output, ToolError> {
                if args.city.is_empty() {
                    return Err(ToolError::execution("empty city"));
                }
                Ok(HashMap::from([
                    ("city".to_owned(), args.city),
                    ("unit".to_owned(), args.unit.unwrap_or_else(|| "C".into())),
                    ("call_id".to_owned(), args.call_id),
                ]))
            }
        }

        #[test]
        fn schema_hides_injected_and_keeps_docs() {
            let cap = TypedCapability::new(Weather);
            let schema = derive_schema(cap.spec());
            assert!(schema.has_property("city"));
            assert!(schema.has_property("unit"));
            assert!(!schema.has_property("call_id"));
            assert_eq!(schema.required, vec!["city".to_owned()]);
            assert_eq!(schema.properties["city"]["description"], "City name.");
            assert_eq!(cap.definition().description, "Current weather for a city");
        }

        #[tokio::test]
        async fn invoke_with_injected_call_id() {
            let cap = TypedCapability::new(Weather);
            let ctx = InvocationContext::new("call_7");
            let args = resolve(cap.spec(), &json!({"city": "Kyoto"}), &ctx).unwrap();
            let out = cap.invoke(args).await.unwrap();
            assert_eq!(out["city"], "Kyoto");
            assert_eq!(out["unit"], "C");
            assert_eq!(out["call_id"], "call_7");
        }

        #[tokio::test]
        async fn tool_error_propagates() {
            let cap = TypedCapability::new(Weather);
            let args = resolve(cap.spec(), &json!({"city": ""}), &InvocationContext::new("c")).unwrap();
            let err = cap.invoke(args).await.unwrap_err();
            assert_eq!(err, ToolError::execution("empty city"));
        }
    }
}
