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
//! Structured field normalization.
//!
//! Callers hand us a flat list of key/value pairs: keys at even positions, values at odd. Most
//! values pass straight through to the encoder, but a few keys (see [`MARSHAL_KEYS`]) name
//! structured context whose value is JSON-serialized to a string before it reaches any sink, so
//! downstream encoders (and collectors) see an opaque string rather than a composite value.

use serde_json::Value;

/// Keys whose values are JSON-serialized before emission
pub const MARSHAL_KEYS: &[&str] = &["ctx", "meta"];

/// Rewrite `fields` in place, replacing the value of every pair whose key is one of
/// [`MARSHAL_KEYS`] with its JSON serialization.
///
/// Keys that aren't strings are left alone, as is a trailing key with no value. If
/// serialization fails the value becomes the empty string; logging never fails on a malformed
/// payload.
pub fn normalize(fields: &mut [Value]) {
    for pair in fields.chunks_exact_mut(2) {
        let marshal = match &pair[0] {
            Value::String(key) => MARSHAL_KEYS.contains(&key.as_str()),
            _ => false,
        };
        if marshal {
            let text = serde_json::to_string(&pair[1]).unwrap_or_default();
            pair[1] = Value::String(text);
        }
    }
}

/// Build a flat key/value list suitable for the logging calls.
///
/// ```rust
/// use tracing_fanout::fields;
/// let kv = fields!("user" => "alice", "meta" => serde_json::json!({"a": 1}), "attempt" => 3);
/// assert_eq!(kv.len(), 6);
/// ```
///
/// Values that can't be converted to JSON become `null`.
#[macro_export]
macro_rules! fields {
    () => {
        ::std::vec::Vec::<$crate::serde_json::Value>::new()
    };
    ($($key:expr => $value:expr),+ $(,)?) => {
        vec![$(
            $crate::serde_json::Value::from($key),
            $crate::serde_json::to_value(&$value).unwrap_or_default()
        ),+]
    };
}
