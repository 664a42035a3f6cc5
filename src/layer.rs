// Copyright (C) 2022-2025 Michael Herstine <sp1ff@pobox.com>
//
// This file is part of tracing-fanout.
//
// tracing-fanout is free software: you can redistribute it and/or modify it under the terms of the
// GNU General Public License as published by the Free Software Foundation, either version 3 of the
// License, or (at your option) any later version.
//
// tracing-fanout is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without
// even the implied warranty of MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the GNU
// General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with tracing-fanout.  If
// not, see <http://www.gnu.org/licenses/>.

//! Feeding [`tracing`] events into the fan-out pipeline.
//!
//! [`FanoutLayer`] is a [`tracing-subscriber`] [`Layer`]: install it in a subscriber & every
//! [`Event`] is forwarded to a [`Registry`]'s active logger, the message becoming the record's
//! message & every other field becoming a key/value pair. Spans are ignored.
//!
//! [`tracing`]: https://docs.rs/tracing/latest/tracing/index.html
//! [`tracing-subscriber`]: https://docs.rs/tracing-subscriber/latest/tracing_subscriber/index.html
//! [`Layer`]: https://docs.rs/tracing-subscriber/latest/tracing_subscriber/layer/trait.Layer.html
//! [`Event`]: https://docs.rs/tracing/latest/tracing/struct.Event.html

use crate::{level::Level, registry::Registry};

use serde_json::Value;
use tracing::{field::Field, Event};
use tracing_subscriber::layer::Context;

use std::sync::Arc;

/// Collects an [`Event`]'s message & fields.
#[derive(Default)]
struct FieldVisitor {
    message: Option<String>,
    fields: Vec<Value>,
}

impl FieldVisitor {
    fn push(&mut self, field: &Field, value: Value) {
        if field.name() == "message" {
            self.message = Some(match value {
                Value::String(s) => s,
                other => other.to_string(),
            });
        } else {
            self.fields.push(Value::from(field.name()));
            self.fields.push(value);
        }
    }
}

impl tracing::field::Visit for FieldVisitor {
    fn record_f64(&mut self, field: &Field, value: f64) {
        self.push(field, Value::from(value))
    }
    fn record_i64(&mut self, field: &Field, value: i64) {
        self.push(field, Value::from(value))
    }
    fn record_u64(&mut self, field: &Field, value: u64) {
        self.push(field, Value::from(value))
    }
    fn record_bool(&mut self, field: &Field, value: bool) {
        self.push(field, Value::from(value))
    }
    fn record_str(&mut self, field: &Field, value: &str) {
        self.push(field, Value::from(value))
    }
    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        // The tracing macros pre-format `message` as `fmt::Arguments`, whose `Debug` output
        // carries no quotes.
        self.push(field, Value::String(format!("{:?}", value)))
    }
}

/// A [`Layer`] forwarding [`Event`]s to a [`Registry`]
///
/// [`Layer`]: https://docs.rs/tracing-subscriber/latest/tracing_subscriber/layer/trait.Layer.html
/// [`Event`]: https://docs.rs/tracing/latest/tracing/struct.Event.html
pub struct FanoutLayer {
    registry: Arc<Registry>,
}

impl FanoutLayer {
    pub fn new(registry: Arc<Registry>) -> FanoutLayer {
        FanoutLayer { registry }
    }
}

/// Forward to the process-wide registry
impl std::default::Default for FanoutLayer {
    fn default() -> Self {
        FanoutLayer::new(crate::registry())
    }
}

impl<S> tracing_subscriber::layer::Layer<S> for FanoutLayer
where
    S: tracing::Subscriber,
{
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let mut visitor = FieldVisitor::default();
        event.record(&mut visitor);
        self.registry.log(
            Level::from(event.metadata().level()),
            visitor.message.as_deref().unwrap_or(""),
            visitor.fields,
        );
    }
}

#[cfg(test)]
mod test {

    use super::*;
    use crate::test_utils::CollectingSink;

    use serde_json::json;
    use tracing_subscriber::layer::SubscriberExt;

    #[test]
    fn forwards_events() {
        let console = Arc::new(CollectingSink::default());
        let registry = Registry::builder()
            .console(console.clone())
            .lookup(|name| match name {
                "LOGGER_FILE_SYNCER_DISABLED" => Some("true".to_string()),
                "LOGGER_MODE" => Some("DEBUG".to_string()),
                _ => None,
            })
            .build();
        let subscriber = tracing_subscriber::registry().with(FanoutLayer::new(registry));

        tracing::subscriber::with_default(subscriber, || {
            tracing::warn!(user = "alice", attempts = 3, ok = false, "login {} failed", "still");
            tracing::trace!(meta = "x", "tracing's trace maps to debug");
        });

        let lines = console.lines();
        assert_eq!(lines.len(), 2);
        let first: Value = serde_json::from_str(&lines[0]).unwrap();
        assert_eq!(first["level"], json!("warn"));
        assert_eq!(first["msg"], json!("login still failed"));
        assert_eq!(first["user"], json!("alice"));
        assert_eq!(first["attempts"], json!(3));
        assert_eq!(first["ok"], json!(false));

        let second: Value = serde_json::from_str(&lines[1]).unwrap();
        assert_eq!(second["level"], json!("debug"));
        // Marshal keys are marshaled here too.
        assert_eq!(second["meta"], json!("\"x\""));
    }
}
