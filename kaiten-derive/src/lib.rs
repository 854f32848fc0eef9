//! Procedural macros for the kaiten agent loop.
//!
//! This crate provides the `#[capability]` attribute macro, which turns a
//! plain function into a registrable capability.

extern crate proc_macro;

mod capability;

use proc_macro::TokenStream;

/// Turns a function into a `kaiten::tool::Capability`.
///
/// The function is kept as written. Next to it the macro generates a unit
/// struct named after the function in `PascalCase`, whose descriptor lists
/// one parameter per argument, typed from the argument's Rust type and
/// documented from the function's doc comment (`# Arguments` section).
///
/// The function must return `Result<T, E>` with `T: Serialize` and
/// `E: Into<ToolError>`, and take its arguments by value.
///
/// Basic usage:
/// ```rust,ignore
/// use kaiten::capability;
///
/// /// Add two numbers.
/// ///
/// /// # Arguments
/// ///
/// /// * `a` - Left operand
/// /// * `b` - Right operand
/// #[capability]
/// fn add(a: i64, b: i64) -> Result<i64, kaiten::ToolError> {
///     Ok(a + b)
/// }
///
/// registry.register(Add::shared())?;
/// ```
///
/// Runtime-injected arguments are listed in `inject(...)`. They are filled
/// from the engine's injected values and never shown to the provider:
/// ```rust,ignore
/// #[capability(description = "Look up an order", inject(user_id))]
/// async fn find_order(order_id: String, user_id: String) -> Result<Order, ToolError> {
///     orders::find(&user_id, &order_id).await
/// }
/// ```
///
/// Other options: `name = "..."` overrides the capability name and
/// `params(x = "...")` overrides individual parameter descriptions.
#[proc_macro_attribute]
pub fn capability(args: TokenStream, input: TokenStream) -> TokenStream {
    capability::capability_impl(args, input)
}
