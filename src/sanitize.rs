//! Input sanitization for staged payloads: markup stripping and
//! custom-field/link normalization.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

use crate::models::{CustomField, Link};

static HTML_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]*>").expect("valid regex"));

/// Strip markup tags from a description and decode common entities.
pub fn strip_html(input: &str) -> String {
    let stripped = HTML_TAG.replace_all(input, "");
    stripped
        .replace("&nbsp;", " ")
        .replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
}

/// Stringify a staged scalar, ignoring empty/falsy values.
fn coerce(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => {
            if n.as_f64() == Some(0.0) {
                None
            } else {
                Some(n.to_string())
            }
        }
        Value::Bool(true) => Some("true".to_string()),
        _ => None,
    }
}

/// Custom fields from a staged value, suitable for publishing.
///
/// Incomplete pairs are dropped.
pub fn sanitize_custom_fields(value: Option<&Value>) -> Vec<CustomField> {
    let Some(items) = value.and_then(Value::as_array) else {
        return Vec::new();
    };
    items
        .iter()
        .filter_map(|x| {
            let name = coerce(x.get("name"))?;
            let value = coerce(x.get("value"))?;
            Some(CustomField { name, value })
        })
        .collect()
}

/// Links from a staged value, suitable for publishing.
///
/// Incomplete links are dropped; URIs are trimmed.
pub fn sanitize_links(value: Option<&Value>) -> Vec<Link> {
    let Some(items) = value.and_then(Value::as_array) else {
        return Vec::new();
    };
    items
        .iter()
        .filter_map(|x| {
            let link_type = coerce(x.get("type"))?;
            let uri = coerce(x.get("uri"))?.trim().to_string();
            if uri.is_empty() {
                return None;
            }
            Some(Link { link_type, uri })
        })
        .collect()
}
