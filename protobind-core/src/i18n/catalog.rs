//! # Catalog Localizer
//!
//! A [`Localizer`] backed by per-language message catalogs. Catalogs are plain JSON
//! objects keyed by language, mapping message IDs to templates:
//!
//! ```json
//! {
//!   "en-US": { "validation.field.required": "{{.Field}} is required" },
//!   "zh-CN": { "validation.field.required": "{{.Field}} 不能为空" }
//! }
//! ```
//!
//! Lookup order: the request language (normalized), then the fallback language, then the
//! message ID itself.
use super::{LocaleHint, Localizer, TemplateData, language, message_id, render_value};
use regex::{Captures, Regex};
use std::collections::HashMap;
use std::sync::LazyLock;

static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{\{\s*\.(\w+)\s*\}\}").expect("placeholder regex is valid"));

type Catalog = HashMap<String, String>;

#[derive(Debug, Clone)]
pub struct CatalogLocalizer {
    catalogs: HashMap<String, Catalog>,
    default_language: String,
    fallback_language: String,
}

impl CatalogLocalizer {
    pub fn new(default_language: impl Into<String>, fallback_language: impl Into<String>) -> Self {
        Self {
            catalogs: HashMap::new(),
            default_language: default_language.into(),
            fallback_language: fallback_language.into(),
        }
    }

    /// Adds (or extends) the catalog of `lang`.
    pub fn with_messages<I, K, V>(mut self, lang: &str, messages: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.catalogs
            .entry(lang.to_string())
            .or_default()
            .extend(messages.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    /// Loads every catalog found in a JSON document on top of the current ones.
    pub fn with_json(mut self, content: &str) -> Result<Self, serde_json::Error> {
        let catalogs: HashMap<String, Catalog> = serde_json::from_str(content)?;
        for (lang, messages) in catalogs {
            self = self.with_messages(&lang, messages);
        }
        Ok(self)
    }

    /// en-US / zh-CN catalogs for the validator's message IDs; en-US is the default.
    pub fn builtin() -> Self {
        Self::new(language::EN_US, language::EN_US)
            .with_messages(
                language::EN_US,
                [
                    (message_id::REQUIRED, "{{.Field}} is required"),
                    (
                        message_id::MIN_LENGTH,
                        "{{.Field}} must be at least {{.MinLength}} characters",
                    ),
                    (
                        message_id::MAX_LENGTH,
                        "{{.Field}} must be at most {{.MaxLength}} characters",
                    ),
                    (message_id::EMAIL, "{{.Field}} must be a valid email address"),
                    (message_id::PATTERN, "{{.Field}} has an invalid format"),
                    (message_id::NOT_IN, "{{.Field}} has a value that is not allowed"),
                ],
            )
            .with_messages(
                language::ZH_CN,
                [
                    (message_id::REQUIRED, "{{.Field}} 不能为空"),
                    (message_id::MIN_LENGTH, "{{.Field}} 长度不能小于 {{.MinLength}}"),
                    (message_id::MAX_LENGTH, "{{.Field}} 长度不能大于 {{.MaxLength}}"),
                    (message_id::EMAIL, "{{.Field}} 不是有效的邮箱格式"),
                    (message_id::PATTERN, "{{.Field}} 格式不正确"),
                    (message_id::NOT_IN, "{{.Field}} 的值不被允许"),
                ],
            )
    }

    pub fn default_language(&self) -> &str {
        &self.default_language
    }

    pub fn supported_languages(&self) -> Vec<&str> {
        let mut langs: Vec<&str> = self.catalogs.keys().map(String::as_str).collect();
        langs.sort_unstable();
        langs
    }

    /// The catalog language used for a request.
    pub fn resolve_language(&self, hint: &LocaleHint) -> &str {
        let Some(requested) = hint.language() else {
            return &self.default_language;
        };

        let normalized = language::normalize_language(requested);
        if self.catalogs.contains_key(normalized) {
            normalized
        } else {
            tracing::debug!(
                requested,
                normalized,
                default_language = %self.default_language,
                "unsupported language, using default language"
            );
            &self.default_language
        }
    }

    fn render(&self, lang: &str, message_id: &str, data: &TemplateData) -> Option<String> {
        let template = self.catalogs.get(lang)?.get(message_id)?;
        let rendered = PLACEHOLDER.replace_all(template, |caps: &Captures<'_>| {
            render_value(data.get(&caps[1]))
        });
        Some(rendered.into_owned())
    }
}

impl Localizer for CatalogLocalizer {
    fn localize_with_data(
        &self,
        message_id: &str,
        data: &TemplateData,
        hint: &LocaleHint,
    ) -> String {
        let lang = self.resolve_language(hint);

        if let Some(message) = self.render(lang, message_id, data) {
            return message;
        }

        tracing::debug!(message_id, lang, "message missing from catalog");

        if lang != self.fallback_language
            && let Some(message) = self.render(&self.fallback_language, message_id, data)
        {
            return message;
        }

        message_id.to_string()
    }
}
