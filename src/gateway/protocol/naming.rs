//! Verb and parameter-key normalization
//!
//! Application code names verbs and parameters in snake_case; the gateway
//! expects lowerCamelCase.

use serde_json::{Map, Value};

/// Convert `snake_case` to `lowerCamelCase`.
///
/// Names without an underscore are taken as already normalized and pass
/// through unchanged, so the conversion is idempotent. Otherwise the first
/// word is lowercased and each later word title-cased. Empty segments from
/// doubled or leading underscores are dropped.
pub fn snake_to_camel(name: &str) -> String {
    if !name.contains('_') {
        return name.to_string();
    }

    let mut out = String::with_capacity(name.len());

    for segment in name.split('_').filter(|s| !s.is_empty()) {
        if out.is_empty() {
            out.push_str(&segment.to_lowercase());
            continue;
        }

        let mut chars = segment.chars();
        if let Some(first) = chars.next() {
            out.extend(first.to_uppercase());
            out.push_str(&chars.as_str().to_lowercase());
        }
    }

    out
}

/// Normalize every top-level parameter key
pub fn normalize_params(params: Map<String, Value>) -> Map<String, Value> {
    params
        .into_iter()
        .map(|(key, value)| (snake_to_camel(&key), value))
        .collect()
}
