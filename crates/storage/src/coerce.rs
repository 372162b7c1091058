//! Legacy JSON coercion shim
//!
//! The raw/legacy entry path historically accepted payloads as strings and
//! sniffed them for JSON shape. This module replaces that duck typing with an
//! explicit tagged parse: a string is re-read as object > array > number >
//! boolean, in that precedence, falling back to the string itself. It is a
//! narrow compatibility shim for the raw path, not a general parsing utility.

use serde_json::Value;

/// Coerce a raw payload the way the legacy path did.
///
/// Non-string values pass through untouched.
pub fn ensure_json_value(value: Value) -> Value {
    match value {
        Value::String(s) => coerce_string(s),
        other => other,
    }
}

fn coerce_string(s: String) -> Value {
    let trimmed = s.trim();

    if trimmed.starts_with('{') {
        if let Ok(parsed @ Value::Object(_)) = serde_json::from_str(trimmed) {
            return parsed;
        }
    }
    if trimmed.starts_with('[') {
        if let Ok(parsed @ Value::Array(_)) = serde_json::from_str(trimmed) {
            return parsed;
        }
    }
    if let Ok(parsed @ Value::Number(_)) = serde_json::from_str(trimmed) {
        return parsed;
    }
    match trimmed {
        "true" => return Value::Bool(true),
        "false" => return Value::Bool(false),
        _ => {}
    }

    Value::String(s)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn object_string_becomes_object() {
        assert_eq!(
            ensure_json_value(json!(r#"{"a": 1}"#)),
            json!({"a": 1})
        );
    }

    #[test]
    fn array_string_becomes_array() {
        assert_eq!(ensure_json_value(json!("[1, 2, 3]")), json!([1, 2, 3]));
    }

    #[test]
    fn numeric_string_becomes_number() {
        assert_eq!(ensure_json_value(json!("42")), json!(42));
        assert_eq!(ensure_json_value(json!("-3.5")), json!(-3.5));
    }

    #[test]
    fn boolean_string_becomes_bool() {
        assert_eq!(ensure_json_value(json!("true")), json!(true));
        assert_eq!(ensure_json_value(json!("false")), json!(false));
    }

    #[test]
    fn plain_string_stays_string() {
        assert_eq!(
            ensure_json_value(json!("just a message")),
            json!("just a message")
        );
    }

    #[test]
    fn malformed_object_stays_string() {
        assert_eq!(ensure_json_value(json!("{broken")), json!("{broken"));
    }

    #[test]
    fn non_string_passes_through() {
        assert_eq!(ensure_json_value(json!({"k": "v"})), json!({"k": "v"}));
        assert_eq!(ensure_json_value(json!(7)), json!(7));
        assert_eq!(ensure_json_value(Value::Null), Value::Null);
    }
}
