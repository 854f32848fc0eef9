//! Forward log events to a trace sink.
//!
//! [`TraceLogLayer`] is a `tracing_subscriber` layer. Every event emitted
//! while a trace scope is active becomes a `<run_type>.log` entry on the
//! configured sink, tagged with the ambient context's identity. Events
//! outside any scope are ignored.

use std::fmt::Debug;

use serde_json::{Map, Value, json};
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, Layer};

use super::entry::{TraceEntry, TraceEvent};
use super::scope;
use super::sink::SharedTraceSink;

/// Layer that turns scoped log events into trace entries.
#[derive(Debug, Clone)]
pub struct TraceLogLayer {
    sink: SharedTraceSink,
    min_level: Level,
}

impl TraceLogLayer {
    /// Forward events at `INFO` and above to `sink`.
    #[must_use]
    pub fn new(sink: SharedTraceSink) -> Self {
        Self {
            sink,
            min_level: Level::INFO,
        }
    }

    /// Change the least severe level that is forwarded.
    #[must_use]
    pub const fn with_min_level(mut self, level: Level) -> Self {
        self.min_level = level;
        self
    }
}

impl<S: Subscriber> Layer<S> for TraceLogLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let metadata = event.metadata();
        if *metadata.level() > self.min_level {
            return;
        }
        let Some(trace) = scope::current() else {
            return;
        };

        let mut visitor = FieldVisitor::default();
        event.record(&mut visitor);

        let payload = json!({
            "level": metadata.level().as_str(),
            "target": metadata.target(),
            "message": visitor.message.unwrap_or_default(),
            "fields": Value::Object(visitor.fields),
        });
        self.sink
            .save(TraceEntry::new(TraceEvent::Log(trace.run_type()), &trace).with_payload(payload));
    }
}

#[derive(Default)]
struct FieldVisitor {
    message: Option<String>,
    fields: Map<String, Value>,
}

impl FieldVisitor {
    fn insert(&mut self, field: &Field, value: Value) {
        if field.name() == "message" {
            self.message = Some(match value {
                Value::String(s) => s,
                other => other.to_string(),
            });
        } else {
            self.fields.insert(field.name().to_owned(), value);
        }
    }
}

impl Visit for FieldVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        self.insert(field, Value::String(value.to_owned()));
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.insert(field, Value::Bool(value));
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.insert(field, json!(value));
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.insert(field, json!(value));
    }

    fn record_f64(&mut self, field: &Field, value: f64) {
        self.insert(field, json!(value));
    }

    fn record_debug(&mut self, field: &Field, value: &dyn Debug) {
        self.insert(field, Value::String(format!("{value:?}")));
    }
}
