//! Capabilities: descriptors, schema derivation, argument resolution and
//! the registry.
//!
//! A capability is a named callable described by a [`CapabilitySpec`]. Its
//! parameters are split into provider-visible ones, which appear in the
//! derived [`ParameterSchema`], and runtime-injected ones, which are filled
//! from the [`InvocationContext`] and never shown to the provider.

mod capability;
mod definition;
mod docs;
mod registry;
mod resolver;
mod schema;
mod spec;

pub use capability::{
    Capability, FnCapability, SharedCapability, Tool, ToolResult, TypedCapability,
};
pub use definition::ToolDefinition;
pub use docs::{DocInfo, DocParseError};
pub use registry::CapabilityRegistry;
pub use resolver::{Arguments, InvocationContext, parse_raw, resolve};
pub use schema::{ParamSpec, ParameterSchema, SchemaType, TypeInfo};
pub use spec::{CapabilitySpec, derive_schema};
