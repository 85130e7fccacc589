//! Deep-merge of staged payloads.
//!
//! A language-specific payload is layered over its default-language
//! counterpart: present scalars always win, `null` never overrides, objects
//! merge key-by-key and arrays index-by-index.

use serde_json::Value;

/// Merge `overlay` over `default`, recursively.
///
/// Rules, applied per node:
/// - `overlay` null ⇒ keep `default`
/// - `overlay` scalar (string/bool/number) ⇒ take `overlay`
/// - both arrays-ish ⇒ merge index-by-index over the union of indices
/// - otherwise merge key-by-key over the union of keys
pub fn deep_merge(default: &Value, overlay: &Value) -> Value {
    match overlay {
        Value::Null => default.clone(),
        Value::String(_) | Value::Bool(_) | Value::Number(_) => overlay.clone(),
        Value::Array(overlay_items) => {
            let default_items = default.as_array().cloned().unwrap_or_default();
            let len = default_items.len().max(overlay_items.len());
            let mut merged = Vec::with_capacity(len);
            for i in 0..len {
                let d = default_items.get(i).unwrap_or(&Value::Null);
                let o = overlay_items.get(i).unwrap_or(&Value::Null);
                merged.push(deep_merge(d, o));
            }
            Value::Array(merged)
        }
        Value::Object(overlay_map) => {
            let mut merged = default.as_object().cloned().unwrap_or_default();
            for (key, overlay_value) in overlay_map {
                let default_value = merged.get(key).cloned().unwrap_or(Value::Null);
                merged.insert(key.clone(), deep_merge(&default_value, overlay_value));
            }
            Value::Object(merged)
        }
    }
}
