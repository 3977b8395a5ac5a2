//! JSON helpers shared by backend translators

use crate::model::{Extensions, Labels};
use serde_json::Value;

/// Extract short name from a resource URL
/// e.g., "https://www.googleapis.com/compute/v1/projects/my-project/zones/us-central1-a" -> "us-central1-a"
pub fn extract_short_name(url: &str) -> String {
    url.rsplit('/').next().unwrap_or(url).to_string()
}

/// String field or empty string
pub fn str_field(item: &Value, key: &str) -> String {
    item.get(key)
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string()
}

/// Optional non-empty string field
pub fn opt_str_field(item: &Value, key: &str) -> Option<String> {
    item.get(key)
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Read a string-valued object into a label map, stringifying scalars
pub fn labels_from(value: Option<&Value>) -> Labels {
    let Some(Value::Object(map)) = value else {
        return Labels::new();
    };
    map.iter()
        .filter_map(|(k, v)| {
            let s = match v {
                Value::String(s) => s.clone(),
                Value::Number(n) => n.to_string(),
                Value::Bool(b) => b.to_string(),
                _ => return None,
            };
            Some((k.clone(), s))
        })
        .collect()
}

/// Labels as a JSON object
pub fn labels_to_value(labels: &Labels) -> Value {
    Value::Object(
        labels
            .iter()
            .map(|(k, v)| (k.clone(), Value::String(v.clone())))
            .collect(),
    )
}

/// Extract an array from a response using a dot-notation path
pub fn extract_items(response: &Value, path: &str) -> Vec<Value> {
    let mut current = response;
    for part in path.split('.').filter(|p| !p.is_empty()) {
        current = match current.get(part) {
            Some(v) => v,
            None => return vec![],
        };
    }
    current.as_array().cloned().unwrap_or_default()
}

/// Build an extensions map from key/value pairs, skipping nulls
pub fn extensions<I>(pairs: I) -> Extensions
where
    I: IntoIterator<Item = (&'static str, Value)>,
{
    pairs
        .into_iter()
        .filter(|(_, v)| !v.is_null())
        .map(|(k, v)| (k.to_string(), v))
        .collect()
}

/// Extension value as a string
pub fn ext_str(extensions: &Extensions, key: &str) -> Option<String> {
    extensions
        .get(key)
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Extension value as an integer, accepting numeric strings
pub fn ext_u64(extensions: &Extensions, key: &str) -> Option<u64> {
    match extensions.get(key)? {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}
