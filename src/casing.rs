//! Outgoing JSON key casing.
//!
//! The service binds request bodies with snake_case field names, while
//! callers may hand the client camelCase objects (`giftCode`). Every JSON
//! body sent through [`crate::net::api::ApiClient::post`] goes through
//! [`snake_case_keys`] first.
//!
//! TRADE-OFFS
//! ==========
//! Only top-level keys are rewritten. Nested objects and arrays are passed
//! through as-is, so a caller needing deep conversion must do it upfront.

use serde_json::{Map, Value};

/// Rewrite one key: each ASCII uppercase letter starts a new `_`-prefixed
/// word, then the whole key is lowercased.
#[must_use]
pub fn snake_case_key(key: &str) -> String {
    let mut out = String::with_capacity(key.len() + 4);
    for ch in key.chars() {
        if ch.is_ascii_uppercase() {
            out.push('_');
        }
        out.push(ch);
    }
    out.to_lowercase()
}

/// Rewrite the top-level keys of a JSON object. Non-object values are
/// returned unchanged.
#[must_use]
pub fn snake_case_keys(value: Value) -> Value {
    match value {
        Value::Object(object) => {
            let rewritten: Map<String, Value> = object
                .into_iter()
                .map(|(key, value)| (snake_case_key(&key), value))
                .collect();
            Value::Object(rewritten)
        }
        other => other,
    }
}

#[cfg(test)]
#[path = "casing_test.rs"]
mod tests;
