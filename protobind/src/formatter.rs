use colored::*;
use protobind_core::{
    BindError, LocalizedError,
    config::ConfigError,
    prost_reflect::{self, FieldDescriptor, Kind, MessageDescriptor},
    validation::{RuleError, RuleSet},
};
use std::fmt::Display;

/// A wrapper struct for a formatted, colored string.
///
/// Implements `Display` so it can be printed directly.
pub struct FormattedString(pub String);

/// The effective rules of every field of a message.
pub struct RuleTable(pub MessageDescriptor, pub Vec<(FieldDescriptor, RuleSet)>);

pub struct GenericError<T: Display>(pub &'static str, pub T);

impl std::fmt::Display for FormattedString {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f)?;
        writeln!(f, "{}", self.0)?;
        Ok(())
    }
}

impl From<serde_json::Value> for FormattedString {
    fn from(value: serde_json::Value) -> Self {
        FormattedString(serde_json::to_string_pretty(&value).unwrap_or_else(|_| value.to_string()))
    }
}

impl From<LocalizedError> for FormattedString {
    fn from(err: LocalizedError) -> Self {
        FormattedString(format!(
            "{} {}\n\n{}",
            "Validation Failed:".red().bold(),
            err.message_id().dimmed(),
            err
        ))
    }
}

impl From<BindError> for FormattedString {
    fn from(err: BindError) -> Self {
        match err {
            BindError::Validation(err) => FormattedString::from(err),
            BindError::Rejected(text) => {
                FormattedString(format!("{}\n\n'{}'", "Rejected:".red().bold(), text))
            }
            BindError::Unmarshal(err) => FormattedString(format!(
                "{}\n\n'{}'",
                "Failed to decode body:".red().bold(),
                err
            )),
            err => FormattedString(format!("{}\n\n'{}'", "Binding Failed:".red().bold(), err)),
        }
    }
}

impl From<RuleError> for FormattedString {
    fn from(err: RuleError) -> Self {
        FormattedString(format!(
            "{}\n\n'{}'",
            "Invalid validation rules:".red().bold(),
            err
        ))
    }
}

impl From<ConfigError> for FormattedString {
    fn from(err: ConfigError) -> Self {
        FormattedString(format!(
            "{}\n\n'{}'",
            "Failed to load configuration:".red().bold(),
            err
        ))
    }
}

impl From<prost_reflect::DescriptorError> for FormattedString {
    fn from(err: prost_reflect::DescriptorError) -> Self {
        FormattedString(format!(
            "{}\n\n'{}'",
            "Failed to parse file descriptor:".red().bold(),
            err
        ))
    }
}

impl From<anyhow::Error> for FormattedString {
    fn from(err: anyhow::Error) -> Self {
        FormattedString(format!("{}\n\n'{:#}'", "Error:".red().bold(), err))
    }
}

impl<T: Display> From<GenericError<T>> for FormattedString {
    fn from(GenericError(msg, err): GenericError<T>) -> Self {
        FormattedString(format!("{}:\n\n'{}'", msg.red().bold(), err))
    }
}

impl From<RuleTable> for FormattedString {
    fn from(RuleTable(message, fields): RuleTable) -> Self {
        let mut out = String::new();
        out.push_str(&format!(
            "{} {} {{\n",
            "message".cyan(),
            message.full_name().green()
        ));

        for (field, rules) in fields {
            let label = if field.is_map() {
                format!("{} ", "map".cyan())
            } else if field.is_list() {
                format!("{} ", "repeated".cyan())
            } else {
                "".to_string()
            };

            let rendered = if rules.is_empty() {
                "-".dimmed().to_string()
            } else {
                rules
                    .iter()
                    .map(|(key, value)| format!("{}={}", key.yellow(), value))
                    .collect::<Vec<_>>()
                    .join(" ")
            };

            out.push_str(&format!(
                "  {}{} {} = {};  {}\n",
                label,
                kind_name(&field.kind()),
                field.name(),
                field.number(),
                rendered
            ));
        }
        out.push('}');
        FormattedString(out)
    }
}

fn kind_name(kind: &Kind) -> String {
    match kind {
        Kind::Double => "double".to_string(),
        Kind::Float => "float".to_string(),
        Kind::Int32 => "int32".to_string(),
        Kind::Int64 => "int64".to_string(),
        Kind::Uint32 => "uint32".to_string(),
        Kind::Uint64 => "uint64".to_string(),
        Kind::Sint32 => "sint32".to_string(),
        Kind::Sint64 => "sint64".to_string(),
        Kind::Fixed32 => "fixed32".to_string(),
        Kind::Fixed64 => "fixed64".to_string(),
        Kind::Sfixed32 => "sfixed32".to_string(),
        Kind::Sfixed64 => "sfixed64".to_string(),
        Kind::Bool => "bool".to_string(),
        Kind::String => "string".to_string(),
        Kind::Bytes => "bytes".to_string(),
        Kind::Message(m) => m.full_name().to_string(),
        Kind::Enum(e) => e.full_name().to_string(),
    }
}
