//! Redaction of credential-like request parameters before they are logged.

use serde_json::{Map, Value};

use crate::models::Params;

const SENSITIVE_KEYS: [&str; 5] = ["password", "api_key", "secret", "token", "key"];

fn is_sensitive(key: &str) -> bool {
    let key = key.to_ascii_lowercase();
    SENSITIVE_KEYS.iter().any(|s| key.contains(s))
}

/// Keep the last four characters of long strings, hide everything else.
fn mask_value(value: &Value) -> Value {
    match value {
        Value::String(s) if s.chars().count() > 4 => {
            let count = s.chars().count();
            let tail: String = s.chars().skip(count - 4).collect();
            Value::String(format!("{}{}", "*".repeat(count - 4), tail))
        }
        _ => Value::String("***".to_string()),
    }
}

fn mask_map(map: &Map<String, Value>) -> Map<String, Value> {
    map.iter()
        .map(|(key, value)| {
            let masked = if is_sensitive(key) {
                mask_value(value)
            } else {
                match value {
                    Value::Object(inner) => Value::Object(mask_map(inner)),
                    other => other.clone(),
                }
            };
            (key.clone(), masked)
        })
        .collect()
}

/// Copy of `params` with sensitive values masked, including inside nested objects.
pub fn mask_params(params: &Params) -> Value {
    Value::Object(mask_map(params))
}
