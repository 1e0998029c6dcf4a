//! # JSON Coercion
//!
//! Clients frequently send numbers and booleans as JSON strings (`{"docId": "42"}`),
//! which the protobuf JSON mapping rejects for most kinds. Before unmarshalling, the body
//! is walked alongside the target descriptor and such strings are converted to the
//! declared kind. Strings that do not parse are left as they are, so the unmarshal step
//! reports them.
//!
//! Objects inside repeated message arrays additionally get zero values for the singular
//! scalar fields they omit.
use crate::validation::validator::is_well_known;
use prost_reflect::{FieldDescriptor, Kind, MessageDescriptor};
use serde_json::{Map, Number, Value};

#[derive(Debug, thiserror::Error)]
pub enum CoerceError {
    #[error("Body is not valid JSON: '{0}'")]
    Parse(#[source] serde_json::Error),

    #[error("Body is a JSON {0}, expected an object")]
    NotAnObject(&'static str),

    #[error("Failed to encode coerced body: '{0}'")]
    Encode(#[source] serde_json::Error),
}

/// Coerces a raw JSON body for `descriptor` and re-encodes it.
pub fn coerce_json(body: &[u8], descriptor: &MessageDescriptor) -> Result<Vec<u8>, CoerceError> {
    let mut root: Value = serde_json::from_slice(body).map_err(CoerceError::Parse)?;

    let Value::Object(object) = &mut root else {
        return Err(CoerceError::NotAnObject(json_type(&root)));
    };
    coerce_object(object, descriptor);

    serde_json::to_vec(&root).map_err(CoerceError::Encode)
}

/// Coerces the fields of `descriptor` present in `object`, in place.
pub fn coerce_object(object: &mut Map<String, Value>, descriptor: &MessageDescriptor) {
    for field in descriptor.fields() {
        if let Some(value) = lookup_mut(object, &field) {
            coerce_field(value, &field);
        }
    }
}

/// JSON name first, then the proto name.
fn lookup_mut<'o>(object: &'o mut Map<String, Value>, field: &FieldDescriptor) -> Option<&'o mut Value> {
    if object.contains_key(field.json_name()) {
        object.get_mut(field.json_name())
    } else {
        object.get_mut(field.name())
    }
}

fn coerce_field(value: &mut Value, field: &FieldDescriptor) {
    if field.is_map() {
        let Kind::Message(entry) = field.kind() else {
            return;
        };
        let value_kind = entry.map_entry_value_field().kind();
        if let Value::Object(entries) = value {
            for entry_value in entries.values_mut() {
                coerce_kind(entry_value, &value_kind, false);
            }
        }
    } else if field.is_list() {
        let kind = field.kind();
        if let Value::Array(items) = value {
            for item in items {
                coerce_kind(item, &kind, true);
            }
        }
    } else {
        coerce_kind(value, &field.kind(), false);
    }
}

fn coerce_kind(value: &mut Value, kind: &Kind, array_item: bool) {
    match kind {
        Kind::Message(descriptor) => {
            if is_well_known(descriptor) {
                return;
            }
            if let Value::Object(nested) = value {
                coerce_object(nested, descriptor);
                if array_item {
                    fill_defaults(nested, descriptor);
                }
            }
        }
        scalar => {
            if let Some(coerced) = value.as_str().and_then(|text| coerce_scalar(text, scalar)) {
                *value = coerced;
            }
        }
    }
}

/// The JSON value of `text` for a scalar kind, if it parses.
pub fn coerce_scalar(text: &str, kind: &Kind) -> Option<Value> {
    match kind {
        Kind::Int32 | Kind::Int64 | Kind::Sint32 | Kind::Sint64 | Kind::Sfixed32 | Kind::Sfixed64 => {
            text.parse::<i64>().ok().map(Value::from)
        }
        Kind::Uint32 | Kind::Uint64 | Kind::Fixed32 | Kind::Fixed64 => {
            let digits = text.trim_start_matches('0');
            let digits = if digits.is_empty() { "0" } else { digits };
            digits.parse::<u64>().ok().map(Value::from)
        }
        Kind::Float | Kind::Double => text
            .parse::<f64>()
            .ok()
            .and_then(Number::from_f64)
            .map(Value::Number),
        Kind::Bool => parse_bool(text).map(Value::Bool),
        _ => None,
    }
}

/// Zero values for the singular scalar fields an array element omits.
///
/// Members of real oneofs are left out: setting several of them would be rejected.
fn fill_defaults(object: &mut Map<String, Value>, descriptor: &MessageDescriptor) {
    for field in descriptor.fields() {
        if field.is_list()
            || field.is_map()
            || field
                .containing_oneof()
                .is_some_and(|oneof| !oneof.is_synthetic())
        {
            continue;
        }

        if object.contains_key(field.json_name()) || object.contains_key(field.name()) {
            continue;
        }

        let zero = match field.kind() {
            Kind::Int32 | Kind::Int64 | Kind::Sint32 | Kind::Sint64 | Kind::Sfixed32 | Kind::Sfixed64 => {
                Value::from(0i64)
            }
            Kind::Uint32 | Kind::Uint64 | Kind::Fixed32 | Kind::Fixed64 => Value::from(0u64),
            Kind::Float | Kind::Double => Value::from(0.0),
            Kind::Bool => Value::Bool(false),
            Kind::String => Value::String(String::new()),
            _ => continue,
        };
        object.insert(field.json_name().to_string(), zero);
    }
}

/// Accepts `1, t, T, TRUE, true, True` and `0, f, F, FALSE, false, False`.
pub fn parse_bool(text: &str) -> Option<bool> {
    match text {
        "1" | "t" | "T" | "TRUE" | "true" | "True" => Some(true),
        "0" | "f" | "F" | "FALSE" | "false" | "False" => Some(false),
        _ => None,
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_bool() {
        for text in ["1", "t", "T", "TRUE", "true", "True"] {
            assert_eq!(parse_bool(text), Some(true), "{text}");
        }
        for text in ["0", "f", "F", "FALSE", "false", "False"] {
            assert_eq!(parse_bool(text), Some(false), "{text}");
        }
        assert_eq!(parse_bool("yes"), None);
        assert_eq!(parse_bool("tRUE"), None);
    }

    #[test]
    fn test_coerce_scalar() {
        assert_eq!(coerce_scalar("-42", &Kind::Int64), Some(json!(-42)));
        assert_eq!(coerce_scalar("007", &Kind::Uint64), Some(json!(7)));
        assert_eq!(coerce_scalar("000", &Kind::Uint32), Some(json!(0)));
        assert_eq!(coerce_scalar("-1", &Kind::Uint32), None);
        assert_eq!(coerce_scalar("2.5", &Kind::Double), Some(json!(2.5)));
        assert_eq!(coerce_scalar("NaN", &Kind::Float), None);
        assert_eq!(coerce_scalar("abc", &Kind::Int32), None);
        assert_eq!(coerce_scalar("true", &Kind::String), None);
    }

    #[test]
    fn test_non_object_body_is_rejected() {
        let pool = fixture_protos::descriptor_pool();
        let descriptor = pool
            .get_message_by_name("odoc.doc.UpdateDocRequest")
            .unwrap();

        assert!(matches!(
            coerce_json(b"[1, 2]", &descriptor),
            Err(CoerceError::NotAnObject("array"))
        ));
        assert!(matches!(
            coerce_json(b"{ broken", &descriptor),
            Err(CoerceError::Parse(_))
        ));
    }
}
