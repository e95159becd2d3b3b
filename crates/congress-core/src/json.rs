//! Fail-soft helpers over loosely typed API responses.

use serde_json::{Map, Value};

/// Walk `value` along a dot-separated `path`.
///
/// Object segments are looked up by key and array segments by index. Any
/// missing segment resolves to an empty object instead of an error, so callers
/// can treat "absent" and "empty" the same way. An empty path returns the
/// whole value.
pub fn navigate(value: &Value, path: &str) -> Value {
    let mut current = value;
    for segment in path.split('.').filter(|s| !s.is_empty()) {
        let next = match current {
            Value::Object(map) => map.get(segment),
            Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
            _ => None,
        };
        match next {
            Some(v) => current = v,
            None => return Value::Object(Map::new()),
        }
    }
    current.clone()
}

/// Article-qualified name of a JSON value's type, for error messages.
pub fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// True for `null`, `{}`, `[]` and `""`.
pub fn is_empty(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Object(map) => map.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::String(s) => s.is_empty(),
        _ => false,
    }
}

/// Replace each `{field}` in `template` with the matching top-level field of
/// `fields`.
///
/// Strings are inserted without quotes; other values use their JSON text.
/// Placeholders with no matching field are copied through unchanged.
pub fn render_template(template: &str, fields: &Value) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let Some(close) = after.find('}') else {
            out.push_str(&rest[open..]);
            return out;
        };
        let name = &after[..close];
        match lookup(fields, name) {
            Some(v) => out.push_str(&v),
            None => {
                out.push('{');
                out.push_str(name);
                out.push('}');
            }
        }
        rest = &after[close + 1..];
    }
    out.push_str(rest);
    out
}

fn lookup(fields: &Value, name: &str) -> Option<String> {
    if name.is_empty() || name.contains('{') {
        return None;
    }
    match fields.get(name)? {
        Value::String(s) => Some(s.clone()),
        Value::Null => None,
        other => Some(other.to_string()),
    }
}
