//! # Query Binding
//!
//! Binds URL query parameters onto a [`DynamicMessage`].
//!
//! Query keys and proto field names are both translated to PascalCase before they are
//! matched, so `user_id`, `userId` and `UserId` all reach the field `user_id`. Each
//! message gets a [`BindingPlan`] mapping those names to a typed [`FieldBinder`]; plans
//! for a whole descriptor pool are built once into a [`BindingTable`].
//!
//! Parameters of the form `field[key]=value` are collected per field and written as a
//! single `map<string, string>` value.
//!
//! Values that cannot be bound never fail the request. They are reported back as
//! [`SkippedParam`]s.
use super::coerce::parse_bool;
use prost_reflect::{
    DescriptorPool, DynamicMessage, FieldDescriptor, Kind, MapKey, MessageDescriptor, ReflectMessage,
    Value,
};
use regex::Regex;
use std::borrow::Cow;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::LazyLock;

static MAP_PARAM: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([A-Za-z0-9_]+)\[([^\]]+)\]$").expect("map parameter regex is valid")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The value does not parse as the field's kind.
    InvalidValue,
    /// The field cannot be bound from a query string.
    UnsupportedField,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidValue => write!(f, "invalid value"),
            Self::UnsupportedField => write!(f, "unsupported field"),
        }
    }
}

/// A query value left out of the message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedParam {
    pub key: String,
    pub value: String,
    pub reason: SkipReason,
}

impl SkippedParam {
    fn new(key: &str, value: &str, reason: SkipReason) -> Self {
        Self {
            key: key.to_string(),
            value: value.to_string(),
            reason,
        }
    }
}

/// How one field is bound from query values.
#[derive(Debug, Clone)]
pub enum FieldBinder {
    /// Singular scalar or enum with implicit presence: first value.
    Scalar(FieldDescriptor),
    /// Singular scalar or enum with explicit presence: first value, unset on failure.
    Optional(FieldDescriptor),
    /// Repeated scalar or enum: every value that parses, replacing the list.
    List(FieldDescriptor),
    /// Singular bytes: every value as one byte.
    Bytes(FieldDescriptor),
    /// `map<string, string>`, bound from `field[key]=value`.
    StringMap(FieldDescriptor),
    /// Messages and other map shapes.
    Unsupported(FieldDescriptor),
}

impl FieldBinder {
    pub fn for_field(field: FieldDescriptor) -> Self {
        if field.is_map() {
            let Kind::Message(entry) = field.kind() else {
                return Self::Unsupported(field);
            };
            let key = entry.map_entry_key_field().kind();
            let value = entry.map_entry_value_field().kind();
            return match (key, value) {
                (Kind::String, Kind::String) => Self::StringMap(field),
                _ => Self::Unsupported(field),
            };
        }

        match field.kind() {
            Kind::Message(_) => Self::Unsupported(field),
            _ if field.is_list() => Self::List(field),
            Kind::Bytes => Self::Bytes(field),
            _ if field.supports_presence() => Self::Optional(field),
            _ => Self::Scalar(field),
        }
    }

    pub fn field(&self) -> &FieldDescriptor {
        match self {
            Self::Scalar(field)
            | Self::Optional(field)
            | Self::List(field)
            | Self::Bytes(field)
            | Self::StringMap(field)
            | Self::Unsupported(field) => field,
        }
    }

    fn bind(
        &self,
        key: &str,
        values: &[String],
        message: &mut DynamicMessage,
        skipped: &mut Vec<SkippedParam>,
    ) {
        match self {
            Self::Scalar(field) | Self::Optional(field) => {
                let Some(text) = values.first() else {
                    return;
                };
                match parse_scalar(text, &field.kind()) {
                    Some(value) => set(message, field, value, key, text, skipped),
                    None => skipped.push(SkippedParam::new(key, text, SkipReason::InvalidValue)),
                }
            }
            Self::List(field) => {
                let kind = field.kind();
                let mut items = Vec::with_capacity(values.len());
                for text in values {
                    match parse_scalar(text, &kind) {
                        Some(item) => items.push(item),
                        None => skipped.push(SkippedParam::new(key, text, SkipReason::InvalidValue)),
                    }
                }
                set(message, field, Value::List(items), key, &values.join(","), skipped);
            }
            Self::Bytes(field) => {
                let mut bytes = Vec::with_capacity(values.len());
                for text in values {
                    match text.parse::<u8>() {
                        Ok(byte) => bytes.push(byte),
                        Err(_) => skipped.push(SkippedParam::new(key, text, SkipReason::InvalidValue)),
                    }
                }
                set(message, field, Value::Bytes(bytes.into()), key, &values.join(","), skipped);
            }
            Self::StringMap(_) | Self::Unsupported(_) => {
                skipped.extend(
                    values
                        .iter()
                        .map(|text| SkippedParam::new(key, text, SkipReason::UnsupportedField)),
                );
            }
        }
    }
}

fn set(
    message: &mut DynamicMessage,
    field: &FieldDescriptor,
    value: Value,
    key: &str,
    text: &str,
    skipped: &mut Vec<SkippedParam>,
) {
    if let Err(err) = message.try_set_field(field, value) {
        tracing::debug!(field = field.full_name(), %err, "query value rejected by message");
        skipped.push(SkippedParam::new(key, text, SkipReason::InvalidValue));
    }
}

/// The binders of one message, keyed by PascalCase field name.
#[derive(Debug, Clone)]
pub struct BindingPlan {
    descriptor: MessageDescriptor,
    fields: HashMap<String, FieldBinder>,
}

impl BindingPlan {
    pub fn for_message(descriptor: &MessageDescriptor) -> Self {
        let fields = descriptor
            .fields()
            .map(|field| (to_pascal_case(field.name()), FieldBinder::for_field(field)))
            .collect();

        Self {
            descriptor: descriptor.clone(),
            fields,
        }
    }

    pub fn message(&self) -> &str {
        self.descriptor.full_name()
    }

    /// Looks up the binder of a query key (any casing convention).
    pub fn binder(&self, key: &str) -> Option<&FieldBinder> {
        self.fields.get(&to_pascal_case(key))
    }

    /// Binds `query` (the raw query string, without `?`) onto `message`.
    pub fn bind(&self, query: &str, message: &mut DynamicMessage) -> Vec<SkippedParam> {
        let mut skipped = Vec::new();
        let mut staged_maps: BTreeMap<String, BTreeMap<String, String>> = BTreeMap::new();

        for (key, values) in group_params(query) {
            if let Some(caps) = MAP_PARAM.captures(&key) {
                if let Some(first) = values.first() {
                    staged_maps
                        .entry(to_pascal_case(&caps[1]))
                        .or_default()
                        .entry(caps[2].to_string())
                        .or_insert_with(|| first.clone());
                }
                continue;
            }

            if let Some(binder) = self.binder(&key) {
                binder.bind(&key, &values, message, &mut skipped);
            }
        }

        for (name, entries) in staged_maps {
            match self.binder(&name) {
                Some(FieldBinder::StringMap(field)) => {
                    let map = entries
                        .into_iter()
                        .map(|(k, v)| (MapKey::String(k), Value::String(v)))
                        .collect();
                    set(message, field, Value::Map(map), &name, "", &mut skipped);
                }
                Some(_) => skipped.extend(entries.into_iter().map(|(k, v)| {
                    SkippedParam::new(&format!("{name}[{k}]"), &v, SkipReason::UnsupportedField)
                })),
                None => {}
            }
        }

        if !skipped.is_empty() {
            tracing::debug!(
                message_type = self.message(),
                skipped = ?skipped,
                "some query parameters were not bound"
            );
        }

        skipped
    }
}

/// Binding plans of every message of a descriptor pool.
#[derive(Debug, Clone, Default)]
pub struct BindingTable {
    plans: HashMap<String, BindingPlan>,
}

impl BindingTable {
    pub fn build(pool: &DescriptorPool) -> Self {
        let plans = pool
            .all_messages()
            .filter(|message| !message.is_map_entry())
            .map(|message| (message.full_name().to_string(), BindingPlan::for_message(&message)))
            .collect();

        Self { plans }
    }

    /// Plan of a message. Messages of another pool get a plan built on demand.
    pub fn plan_for(&self, descriptor: &MessageDescriptor) -> Cow<'_, BindingPlan> {
        match self.plans.get(descriptor.full_name()) {
            Some(plan) if plan.descriptor == *descriptor => Cow::Borrowed(plan),
            _ => Cow::Owned(BindingPlan::for_message(descriptor)),
        }
    }

    pub fn len(&self) -> usize {
        self.plans.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plans.is_empty()
    }
}

/// Binds `query` onto `message` with a freshly built plan.
pub fn bind_query(query: &str, message: &mut DynamicMessage) -> Vec<SkippedParam> {
    BindingPlan::for_message(&message.descriptor()).bind(query, message)
}

/// `user_id` → `UserId`, `userId` → `UserId`.
pub fn to_pascal_case(name: &str) -> String {
    name.split('_')
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .collect()
}

/// Parses one query value as `kind`. 32-bit kinds reject out-of-range values.
pub fn parse_scalar(text: &str, kind: &Kind) -> Option<Value> {
    let value = match kind {
        Kind::Double => Value::F64(text.parse().ok()?),
        Kind::Float => Value::F32(text.parse().ok()?),
        Kind::Int32 | Kind::Sint32 | Kind::Sfixed32 => Value::I32(text.parse().ok()?),
        Kind::Int64 | Kind::Sint64 | Kind::Sfixed64 => Value::I64(text.parse().ok()?),
        Kind::Uint32 | Kind::Fixed32 => Value::U32(text.parse().ok()?),
        Kind::Uint64 | Kind::Fixed64 => Value::U64(text.parse().ok()?),
        Kind::Bool => Value::Bool(parse_bool(text)?),
        Kind::String => Value::String(text.to_string()),
        Kind::Bytes => Value::Bytes(text.as_bytes().to_vec().into()),
        Kind::Enum(descriptor) => match text.parse::<i32>() {
            Ok(number) => Value::EnumNumber(number),
            Err(_) => Value::EnumNumber(descriptor.get_value_by_name(text)?.number()),
        },
        Kind::Message(_) => return None,
    };
    Some(value)
}

/// Query pairs grouped by key, in order of first appearance.
fn group_params(query: &str) -> Vec<(String, Vec<String>)> {
    let pairs = match serde_urlencoded::from_str::<Vec<(String, String)>>(query) {
        Ok(pairs) => pairs,
        Err(err) => {
            tracing::debug!(%err, "failed to decode query string");
            return Vec::new();
        }
    };

    let mut grouped: Vec<(String, Vec<String>)> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();
    for (key, value) in pairs {
        match index.get(&key) {
            Some(&slot) => grouped[slot].1.push(value),
            None => {
                index.insert(key.clone(), grouped.len());
                grouped.push((key, vec![value]));
            }
        }
    }
    grouped
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_pascal_case() {
        assert_eq!(to_pascal_case("user_id"), "UserId");
        assert_eq!(to_pascal_case("userId"), "UserId");
        assert_eq!(to_pascal_case("UserId"), "UserId");
        assert_eq!(to_pascal_case("tag_id_list"), "TagIdList");
        assert_eq!(to_pascal_case("a__b"), "AB");
        assert_eq!(to_pascal_case(""), "");
    }

    #[test]
    fn test_parse_scalar_rejects_overflow() {
        assert_eq!(parse_scalar("2147483647", &Kind::Int32), Some(Value::I32(i32::MAX)));
        assert_eq!(parse_scalar("2147483648", &Kind::Int32), None);
        assert_eq!(parse_scalar("4294967296", &Kind::Uint32), None);
        assert_eq!(parse_scalar("-1", &Kind::Uint64), None);
        assert_eq!(parse_scalar("2147483648", &Kind::Int64), Some(Value::I64(2147483648)));
        assert_eq!(parse_scalar("T", &Kind::Bool), Some(Value::Bool(true)));
    }

    #[test]
    fn test_group_params_with_many_distinct_keys() {
        let query = (0..20_000)
            .map(|i| format!("k{i}={i}"))
            .collect::<Vec<_>>()
            .join("&");
        let query = format!("{query}&k7=again");

        let grouped = group_params(&query);

        assert_eq!(grouped.len(), 20_000);
        assert_eq!(grouped[0].0, "k0");
        assert_eq!(grouped[19_999].0, "k19999");
        assert_eq!(grouped[7].1, vec!["7".to_string(), "again".to_string()]);
    }

    #[test]
    fn test_group_params_keeps_order() {
        let grouped = group_params("b=1&a=2&b=3&tag%5Bx%5D=y");

        assert_eq!(
            grouped,
            vec![
                ("b".to_string(), vec!["1".to_string(), "3".to_string()]),
                ("a".to_string(), vec!["2".to_string()]),
                ("tag[x]".to_string(), vec!["y".to_string()]),
            ]
        );
    }
}
