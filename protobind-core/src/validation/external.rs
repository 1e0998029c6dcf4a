//! # External Validators
//!
//! Some message types ship their own validation (for example code generated by
//! protoc-gen-validate). An [`ExternalValidator`] registered for a message full name
//! replaces the rule walk for that message. Its error text is classified back into the
//! validator's message IDs when it follows the protoc-gen-validate phrasing:
//!
//! ```text
//! invalid CreateUserRequest.User: embedded message failed validation | caused by: invalid User.Username: value length must be between 3 and 50 runes, inclusive
//! ```
//!
//! Anything unrecognized is surfaced unchanged.
use crate::i18n::{TemplateData, message_id};
use prost_reflect::DynamicMessage;
use regex::Regex;
use serde_json::Value;
use std::sync::LazyLock;

static BETWEEN_LENGTH: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"between (\d+) and").expect("length regex is valid"));

static AT_LEAST_LENGTH: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"at least (\d+)").expect("length regex is valid"));

const CAUSED_BY: &str = "caused by:";
const DEFAULT_MIN_LENGTH: &str = "3";

/// Validation provided by the message type itself.
pub trait ExternalValidator: Send + Sync {
    /// Returns the failure text on rejection.
    fn validate(&self, message: &DynamicMessage) -> Result<(), String>;
}

impl<F> ExternalValidator for F
where
    F: Fn(&DynamicMessage) -> Result<(), String> + Send + Sync,
{
    fn validate(&self, message: &DynamicMessage) -> Result<(), String> {
        self(message)
    }
}

/// Maps a protoc-gen-validate style error onto a message ID and its template data.
pub fn classify_external_error(error: &str) -> Option<(&'static str, TemplateData)> {
    if let Some((_, detail)) = error.split_once(CAUSED_BY) {
        let detail = detail.trim();
        // Later "caused by:" segments are not inspected.
        let detail = detail.split(CAUSED_BY).next().unwrap_or(detail);

        if detail.contains("email") {
            return Some(email_error(field_of(detail)));
        }

        if detail.contains("length must be between") {
            let min_len = detail
                .split_once(':')
                .and_then(|(_, reason)| BETWEEN_LENGTH.captures(reason))
                .map(|caps| caps[1].to_string());
            return Some(min_length_error(field_of(detail), min_len));
        }
    }

    if error.contains("valid email address") {
        let field = error
            .split('|')
            .find(|part| part.contains("invalid") && part.contains("Email"))
            .map(|part| field_of(part.trim()))
            .unwrap_or("Email");
        return Some(email_error(field));
    }

    if error.contains("min_len") {
        let (field, min_len) = match error.split('|').find(|part| part.contains("invalid")) {
            Some(part) => {
                let part = part.trim();
                let min_len = part
                    .split_once(':')
                    .map(|(_, reason)| reason.split(':').next().unwrap_or(reason))
                    .filter(|reason| reason.contains("at least"))
                    .and_then(|reason| AT_LEAST_LENGTH.captures(reason))
                    .map(|caps| caps[1].to_string());
                (field_of(part), min_len)
            }
            None => ("", None),
        };
        return Some(min_length_error(field, min_len));
    }

    None
}

/// `invalid User.Email: value must be ...` → `User.Email`.
fn field_of(detail: &str) -> &str {
    let head = detail.split(':').next().unwrap_or(detail);
    head.strip_prefix("invalid ").unwrap_or(head)
}

fn email_error(field: &str) -> (&'static str, TemplateData) {
    (
        message_id::EMAIL,
        TemplateData::from([("Field".to_string(), Value::String(field.to_string()))]),
    )
}

fn min_length_error(field: &str, min_len: Option<String>) -> (&'static str, TemplateData) {
    (
        message_id::MIN_LENGTH,
        TemplateData::from([
            ("Field".to_string(), Value::String(field.to_string())),
            (
                "MinLength".to_string(),
                Value::String(min_len.unwrap_or_else(|| DEFAULT_MIN_LENGTH.to_string())),
            ),
        ]),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_caused_by_length_error() {
        let (id, data) = classify_external_error(
            "invalid CreateUserRequest.User: embedded message failed validation | caused by: invalid User.Username: value length must be between 4 and 50 runes, inclusive",
        )
        .unwrap();

        assert_eq!(id, message_id::MIN_LENGTH);
        assert_eq!(data["Field"], json!("User.Username"));
        assert_eq!(data["MinLength"], json!("4"));
    }

    #[test]
    fn test_caused_by_email_error() {
        let (id, data) = classify_external_error(
            "invalid CreateUserRequest.User: embedded message failed validation | caused by: invalid User.Email: value must be a valid email address",
        )
        .unwrap();

        assert_eq!(id, message_id::EMAIL);
        assert_eq!(data["Field"], json!("User.Email"));
    }

    #[test]
    fn test_flat_errors() {
        let (id, data) = classify_external_error(
            "invalid SignupRequest.Email: value must be a valid email address | reason",
        )
        .unwrap();
        assert_eq!(id, message_id::EMAIL);
        assert_eq!(data["Field"], json!("SignupRequest.Email"));

        let (id, data) = classify_external_error(
            "invalid SignupRequest.Name: value length must be at least 5 runes (min_len)",
        )
        .unwrap();
        assert_eq!(id, message_id::MIN_LENGTH);
        assert_eq!(data["Field"], json!("SignupRequest.Name"));
        assert_eq!(data["MinLength"], json!("5"));
    }

    #[test]
    fn test_unknown_errors_are_not_classified() {
        assert!(classify_external_error("quota exceeded").is_none());
    }
}
