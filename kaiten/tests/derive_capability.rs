//! `#[capability]` generated capabilities.

#![allow(clippy::unwrap_used, clippy::panic, clippy::unnecessary_wraps)]

use std::result::Result;
use std::sync::Arc;

use kaiten::capability;
use kaiten::mock::MockProvider;
use kaiten::prelude::*;
use serde::Serialize;
use serde_json::json;

/// Add two integers.
///
/// # Arguments
///
/// * `a` - Left operand
/// * `b` - Right operand
#[capability]
fn add(a: i64, b: i64) -> Result<i64, ToolError> {
    Ok(a + b)
}

#[derive(Debug, Serialize)]
struct Order {
    id: String,
    owner: String,
    express: bool,
}

/// Fetch an order.
#[capability(
    name = "find_order",
    description = "Look up an order by id",
    inject(user_id),
    params(order_id = "The order number")
)]
async fn lookup_order(
    order_id: String,
    express: Option<bool>,
    user_id: String,
) -> Result<Order, String> {
    if order_id.is_empty() {
        return Err("order id is empty".to_owned());
    }
    Ok(Order {
        id: order_id,
        owner: user_id,
        express: express.unwrap_or(false),
    })
}

#[test]
fn descriptor_from_signature_and_docs() {
    let spec = Add.spec();
    assert_eq!(spec.name(), "add");
    assert_eq!(spec.description(), "Add two integers.");

    let schema = spec.schema();
    assert_eq!(schema.required, vec!["a".to_owned(), "b".to_owned()]);
    assert_eq!(schema.properties["a"]["type"], "integer");
    assert_eq!(schema.properties["b"]["description"], "Right operand");
}

#[test]
fn attribute_options() {
    let spec = LookupOrder.spec();
    assert_eq!(spec.name(), "find_order");
    assert_eq!(spec.description(), "Look up an order by id");
    assert!(spec.injected_parameters().contains("user_id"));

    let schema = spec.schema();
    assert_eq!(schema.required, vec!["order_id".to_owned()]);
    assert!(!schema.has_property("user_id"));
    assert_eq!(schema.properties["order_id"]["description"], "The order number");
    assert!(schema.has_property("express"));
}

#[tokio::test]
async fn invoked_through_the_engine() {
    let mut registry = CapabilityRegistry::new();
    registry.register_all([Add::shared(), LookupOrder::shared()]).unwrap();
    let engine = ExecutionEngine::new(registry).inject("user_id", json!("u-7"));

    let sum = engine.execute_one("add", json!({"a": 2, "b": 40})).await;
    assert_eq!(sum.value, Some(json!(42)));

    let order = engine.execute_one("find_order", json!({"order_id": "A1"})).await;
    assert_eq!(
        order.value,
        Some(json!({"id": "A1", "owner": "u-7", "express": false}))
    );

    let failed = engine.execute_one("find_order", json!({"order_id": ""})).await;
    assert_eq!(failed.failure_kind, Some(FailureKind::ExecutionFailed));
    assert!(failed.error.as_deref().unwrap().contains("order id is empty"));

    let mistyped = engine.execute_one("add", json!({"a": "two", "b": 1})).await;
    assert_eq!(mistyped.failure_kind, Some(FailureKind::InvalidArguments));
}

#[tokio::test]
async fn drives_a_turn() {
    let provider = Arc::new(
        MockProvider::new()
            .tool_calls(vec![ToolCall::new("c1", "add", json!({"a": 2, "b": 2}))])
            .text("The answer is 4."),
    );
    let mut agent = Agent::new("math", "m", provider);
    agent.register(Add::shared()).unwrap();
    assert_eq!(agent.ask("What's 2+2?").await.unwrap(), "The answer is 4.");
}
