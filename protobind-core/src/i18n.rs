//! # Localization
//!
//! Validation failures are reported as [`LocalizedError`]s. The text of the error is
//! resolved through a [`Localizer`] using the language hinted by the request
//! (`Accept-Language` header, then the `lang` query parameter).
//!
//! A localizer is optional. Without one, the built-in zh-CN / en-US phrasing of the
//! known validation message IDs is used, and unknown IDs render as a generic
//! "validation error" line.
pub mod catalog;
pub mod language;

pub use catalog::CatalogLocalizer;

use http::Request;
use serde::Serialize;
use std::collections::BTreeMap;

/// Template values attached to a localized message (e.g. `Field`, `MinLength`).
pub type TemplateData = BTreeMap<String, serde_json::Value>;

/// Message IDs emitted by the validator.
pub mod message_id {
    pub const REQUIRED: &str = "validation.field.required";
    pub const MIN_LENGTH: &str = "validation.field.min_length";
    pub const MAX_LENGTH: &str = "validation.field.max_length";
    pub const EMAIL: &str = "validation.field.email";
    pub const PATTERN: &str = "validation.field.pattern";
    pub const NOT_IN: &str = "validation.field.not_in";
}

/// Resolves message IDs into user-facing text.
pub trait Localizer: Send + Sync {
    fn localize_with_data(
        &self,
        message_id: &str,
        data: &TemplateData,
        hint: &LocaleHint,
    ) -> String;
}

/// The language information carried by a request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LocaleHint {
    pub accept_language: Option<String>,
    pub lang_param: Option<String>,
}

impl LocaleHint {
    pub fn from_request<B>(request: &Request<B>) -> Self {
        let accept_language = request
            .headers()
            .get(http::header::ACCEPT_LANGUAGE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        let lang_param = request.uri().query().and_then(|query| {
            serde_urlencoded::from_str::<Vec<(String, String)>>(query)
                .ok()?
                .into_iter()
                .find(|(key, _)| key == "lang")
                .map(|(_, value)| value)
        });

        Self {
            accept_language,
            lang_param,
        }
    }

    /// The raw language requested, header first.
    pub fn language(&self) -> Option<&str> {
        [&self.accept_language, &self.lang_param]
            .into_iter()
            .filter_map(|v| v.as_deref())
            .map(str::trim)
            .find(|v| !v.is_empty())
    }
}

/// A validation failure with its resolved, user-facing message.
#[derive(Debug, Clone, PartialEq, Serialize, thiserror::Error)]
#[serde(rename_all = "camelCase")]
#[error("{message}")]
pub struct LocalizedError {
    pub message_id: String,
    pub message: String,
    pub data: TemplateData,
}

impl LocalizedError {
    pub fn message_id(&self) -> &str {
        &self.message_id
    }

    pub fn data(&self) -> &TemplateData {
        &self.data
    }

    /// Prefixes the error with the name of the field holding the failing nested message.
    pub(crate) fn nested_in(mut self, field: &str) -> Self {
        let inner = self
            .data
            .get("Path")
            .or_else(|| self.data.get("Field"))
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();

        self.data.insert(
            "Path".to_string(),
            serde_json::Value::String(format!("{field}.{inner}")),
        );
        self.message = format!("{field}.{}", self.message);
        self
    }
}

/// Everything needed to turn a message ID into a [`LocalizedError`] for one request.
#[derive(Clone, Copy)]
pub struct Localization<'a> {
    localizer: Option<&'a dyn Localizer>,
    hint: &'a LocaleHint,
    default_language: &'a str,
}

impl<'a> Localization<'a> {
    pub fn new(
        localizer: Option<&'a dyn Localizer>,
        hint: &'a LocaleHint,
        default_language: &'a str,
    ) -> Self {
        Self {
            localizer,
            hint,
            default_language,
        }
    }

    pub fn error(&self, message_id: &str, data: TemplateData) -> LocalizedError {
        tracing::debug!(message_id, ?data, "localizing validation error");

        let message = match self.localizer {
            Some(localizer) => {
                tracing::debug!(
                    accept_language = self.hint.accept_language.as_deref(),
                    "localizing with configured localizer"
                );
                localizer.localize_with_data(message_id, &data, self.hint)
            }
            None => {
                let lang = match self.hint.language() {
                    Some(requested) => language::normalize_language(requested),
                    None => self.default_language,
                };
                default_message(message_id, &data, lang)
            }
        };

        LocalizedError {
            message_id: message_id.to_string(),
            message,
            data,
        }
    }
}

/// Built-in phrasing used when no localizer is configured.
pub fn default_message(message_id: &str, data: &TemplateData, lang: &str) -> String {
    let field = render_value(data.get("Field"));
    let chinese = language::normalize_language(lang) == language::ZH_CN;

    match (message_id, chinese) {
        (message_id::REQUIRED, true) => format!("字段 {field} 不能为空"),
        (message_id::REQUIRED, false) => format!("field {field} is required"),
        (message_id::MIN_LENGTH, true) => format!(
            "字段 {field} 长度不能小于 {}",
            render_value(data.get("MinLength"))
        ),
        (message_id::MIN_LENGTH, false) => format!(
            "field {field} must be at least {} long",
            render_value(data.get("MinLength"))
        ),
        (message_id::MAX_LENGTH, true) => format!(
            "字段 {field} 长度不能大于 {}",
            render_value(data.get("MaxLength"))
        ),
        (message_id::MAX_LENGTH, false) => format!(
            "field {field} must be at most {} long",
            render_value(data.get("MaxLength"))
        ),
        (message_id::EMAIL, true) => format!("字段 {field} 不是有效的邮箱格式"),
        (message_id::EMAIL, false) => format!("field {field} is not a valid email address"),
        (message_id::PATTERN, true) => format!("字段 {field} 格式不正确"),
        (message_id::PATTERN, false) => format!("field {field} has an invalid format"),
        (message_id::NOT_IN, true) => format!("字段 {field} 的值不被允许"),
        (message_id::NOT_IN, false) => format!("field {field} has a forbidden value"),
        (other, true) => format!("验证错误: {other}"),
        (other, false) => format!("validation error: {other}"),
    }
}

/// Missing keys render as `<no value>`.
pub(crate) fn render_value(value: Option<&serde_json::Value>) -> String {
    match value {
        Some(serde_json::Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
        None => "<no value>".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn field_data(field: &str) -> TemplateData {
        TemplateData::from([("Field".to_string(), json!(field))])
    }

    #[test]
    fn test_hint_prefers_header_over_query() {
        let request = Request::builder()
            .uri("/notes?lang=en")
            .header("accept-language", "zh-CN")
            .body(())
            .unwrap();

        let hint = LocaleHint::from_request(&request);
        assert_eq!(hint.lang_param.as_deref(), Some("en"));
        assert_eq!(hint.language(), Some("zh-CN"));

        let request = Request::builder().uri("/notes?lang=en").body(()).unwrap();
        assert_eq!(LocaleHint::from_request(&request).language(), Some("en"));
    }

    #[test]
    fn test_fallback_messages_follow_language() {
        let hint = LocaleHint::default();
        let localization = Localization::new(None, &hint, language::ZH_CN);

        let err = localization.error(message_id::REQUIRED, field_data("name"));
        assert_eq!(err.message, "字段 name 不能为空");
        assert_eq!(err.message_id(), message_id::REQUIRED);

        let hint = LocaleHint {
            accept_language: Some("en-US".into()),
            lang_param: None,
        };
        let localization = Localization::new(None, &hint, language::ZH_CN);
        let err = localization.error("validation.field.unknown", field_data("name"));
        assert_eq!(err.message, "validation error: validation.field.unknown");

        let err = localization.error(message_id::PATTERN, field_data("doi"));
        assert_eq!(err.message, "field doi has an invalid format");
        let err = localization.error(message_id::NOT_IN, field_data("status"));
        assert_eq!(err.message, "field status has a forbidden value");
    }

    #[test]
    fn test_nested_error_prefixes_path() {
        let hint = LocaleHint::default();
        let localization = Localization::new(None, &hint, language::EN_US);

        let err = localization
            .error(message_id::REQUIRED, field_data("selection"))
            .nested_in("anchor")
            .nested_in("note");

        assert_eq!(err.message, "note.anchor.field selection is required");
        assert_eq!(err.data["Path"], json!("note.anchor.selection"));
        assert_eq!(err.data["Field"], json!("selection"));
    }
}
