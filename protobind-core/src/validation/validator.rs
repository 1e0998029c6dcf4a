//! # Message Validator
//!
//! Walks a [`DynamicMessage`] field by field, checking each against its compiled
//! [`FieldRules`](super::rules::FieldRules), and recurses into singular nested messages.
//! The first failure is returned as a localized error.
use super::ValidationError;
use super::rules::{FieldRules, RuleBook};
use crate::i18n::{Localization, LocalizedError, TemplateData, message_id};
use prost_reflect::{
    DynamicMessage, FieldDescriptor, Kind, MessageDescriptor, ReflectMessage, Value,
};

const WELL_KNOWN_PACKAGE: &str = "google.protobuf.";

/// Outcome of looking for a nested message to descend into.
#[derive(Debug)]
pub enum Nested<'m> {
    /// A singular, set, non well-known message.
    Message(&'m DynamicMessage),
    /// The field is declared as a message but its value is not a single message.
    SkipNotAMessage,
    /// Scalars, maps, unset fields and well-known types.
    NotApplicable,
}

pub struct MessageValidator<'a> {
    rules: &'a RuleBook,
    localization: Localization<'a>,
}

impl<'a> MessageValidator<'a> {
    pub fn new(rules: &'a RuleBook, localization: Localization<'a>) -> Self {
        Self {
            rules,
            localization,
        }
    }

    pub fn validate(&self, message: &DynamicMessage) -> Result<(), ValidationError> {
        let descriptor = message.descriptor();
        let rules = self.rules.rules_for(&descriptor)?;

        for field in descriptor.fields() {
            let value = message.get_field(&field);

            if let Some(field_rules) = rules.field(field.number()) {
                self.check_field(message, &field, &value, field_rules)?;
            }

            match nested_message(message, &field, &value) {
                Nested::Message(nested) => self
                    .validate(nested)
                    .map_err(|err| err.nested_in(field.name()))?,
                Nested::SkipNotAMessage => {
                    tracing::trace!(field = field.full_name(), "skipping non-message value");
                }
                Nested::NotApplicable => {}
            }
        }

        Ok(())
    }

    fn check_field(
        &self,
        message: &DynamicMessage,
        field: &FieldDescriptor,
        value: &Value,
        rules: &FieldRules,
    ) -> Result<(), LocalizedError> {
        let name = field.name();

        if rules.required && is_empty_value(message, field, value) {
            return Err(self.fail(message_id::REQUIRED, name, None));
        }

        if let Value::String(text) = value {
            if let Some(min_len) = rules.min_len
                && text.len() < min_len
            {
                return Err(self.fail(message_id::MIN_LENGTH, name, Some(("MinLength", min_len))));
            }

            if let Some(max_len) = rules.max_len
                && text.len() > max_len
            {
                return Err(self.fail(message_id::MAX_LENGTH, name, Some(("MaxLength", max_len))));
            }

            if rules.email && !is_email(text) {
                return Err(self.fail(message_id::EMAIL, name, None));
            }

            if let Some(pattern) = &rules.pattern
                && !pattern.is_match(text)
            {
                return Err(self.fail(message_id::PATTERN, name, None));
            }
        }

        if let Some(not_in) = &rules.not_in
            && let Some(text) = display_value(value)
            && not_in.contains(&text)
        {
            return Err(self.fail(message_id::NOT_IN, name, None));
        }

        Ok(())
    }

    fn fail(&self, id: &str, field: &str, limit: Option<(&str, usize)>) -> LocalizedError {
        let mut data = TemplateData::from([("Field".to_string(), field.into())]);
        if let Some((key, limit)) = limit {
            data.insert(key.to_string(), limit.into());
        }
        self.localization.error(id, data)
    }
}

/// Finds the nested message of `field`, if validation should descend into it.
pub fn nested_message<'m>(
    message: &DynamicMessage,
    field: &FieldDescriptor,
    value: &'m Value,
) -> Nested<'m> {
    let Kind::Message(descriptor) = field.kind() else {
        return Nested::NotApplicable;
    };

    if field.is_map() || is_well_known(&descriptor) || !message.has_field(field) {
        return Nested::NotApplicable;
    }

    match value {
        Value::Message(nested) => Nested::Message(nested),
        _ => Nested::SkipNotAMessage,
    }
}

pub fn is_well_known(descriptor: &MessageDescriptor) -> bool {
    descriptor.full_name().starts_with(WELL_KNOWN_PACKAGE)
}

/// Whether a value counts as missing for the `required` rule.
///
/// Enum values are never empty: zero is a legitimate enum value.
pub fn is_empty_value(message: &DynamicMessage, field: &FieldDescriptor, value: &Value) -> bool {
    match value {
        Value::Bool(v) => !v,
        Value::I32(v) => *v == 0,
        Value::I64(v) => *v == 0,
        Value::U32(v) => *v == 0,
        Value::U64(v) => *v == 0,
        Value::F32(v) => *v == 0.0,
        Value::F64(v) => *v == 0.0,
        Value::String(v) => v.is_empty(),
        Value::Bytes(v) => v.is_empty(),
        Value::EnumNumber(_) => false,
        Value::Message(_) => !message.has_field(field),
        Value::List(items) => items.is_empty(),
        Value::Map(entries) => entries.is_empty(),
    }
}

/// Textual form of a singular value, as compared by `not_in`.
pub fn display_value(value: &Value) -> Option<String> {
    let text = match value {
        Value::Bool(v) => v.to_string(),
        Value::I32(v) => v.to_string(),
        Value::I64(v) => v.to_string(),
        Value::U32(v) => v.to_string(),
        Value::U64(v) => v.to_string(),
        Value::F32(v) => v.to_string(),
        Value::F64(v) => v.to_string(),
        Value::String(v) => v.clone(),
        Value::Bytes(v) => String::from_utf8_lossy(v).into_owned(),
        Value::EnumNumber(v) => v.to_string(),
        Value::Message(_) | Value::List(_) | Value::Map(_) => return None,
    };
    Some(text)
}

fn is_email(text: &str) -> bool {
    text.contains('@') && text.contains('.')
}
