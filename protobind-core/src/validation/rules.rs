//! # Rule Extraction
//!
//! Field rules come from two sources:
//!
//! 1. **Declared rules** ([`DeclaredRules`]): a table keyed by message and field name,
//!    usually loaded from a JSON file shipped next to the schema. They play the role of
//!    field options.
//! 2. **Comment rules**: a `@validate` annotation in the field's leading comment of the
//!    `.proto` source, e.g.
//!
//!    ```proto
//!    // Display name of the document.
//!    // @validate required=true min_len=2 max_len=32
//!    string name = 2;
//!    ```
//!
//! Comment rules take precedence over declared rules. Rules are compiled once per
//! descriptor pool into a [`RuleBook`], so malformed lengths or patterns are reported when
//! the binder is built rather than while a request is being served.
use prost_reflect::{DescriptorPool, FieldDescriptor, MessageDescriptor};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::collections::{BTreeMap, HashMap};

/// Raw rules of a single field, rule key to value.
pub type RuleSet = BTreeMap<String, String>;

const VALIDATE_MARKER: &str = "@validate";

pub mod rule_key {
    pub const REQUIRED: &str = "required";
    pub const MIN_LEN: &str = "min_len";
    pub const MAX_LEN: &str = "max_len";
    pub const PATTERN: &str = "pattern";
    pub const EMAIL: &str = "email";
    pub const NOT_IN: &str = "not_in";
}

#[derive(Debug, thiserror::Error)]
pub enum RuleError {
    #[error("Invalid '{rule}' value '{value}' on field '{field}': expected a non-negative integer")]
    InvalidLength {
        field: String,
        rule: &'static str,
        value: String,
    },

    #[error("Invalid pattern '{pattern}' on field '{field}': '{source}'")]
    InvalidPattern {
        field: String,
        pattern: String,
        source: regex::Error,
    },

    #[error("Failed to parse declared rules: '{0}'")]
    Declared(#[from] serde_json::Error),
}

/// Rules declared outside the `.proto` source: message full name → field name → rules.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeclaredRules(HashMap<String, HashMap<String, RuleSet>>);

impl DeclaredRules {
    pub fn from_json(content: &str) -> Result<Self, RuleError> {
        Ok(serde_json::from_str(content)?)
    }

    /// Declares (or overrides) one rule of a field.
    pub fn with_rule(mut self, message: &str, field: &str, key: &str, value: &str) -> Self {
        self.0
            .entry(message.to_string())
            .or_default()
            .entry(field.to_string())
            .or_default()
            .insert(key.to_string(), value.to_string());
        self
    }

    pub fn get(&self, field: &FieldDescriptor) -> Option<&RuleSet> {
        self.0
            .get(field.parent_message().full_name())?
            .get(field.name())
    }
}

/// Derives the raw [`RuleSet`] of a field from both rule sources.
#[derive(Debug, Clone, Default)]
pub struct RuleExtractor {
    declared: DeclaredRules,
}

impl RuleExtractor {
    pub fn new(declared: DeclaredRules) -> Self {
        Self { declared }
    }

    pub fn declared_rules(&self, field: &FieldDescriptor) -> RuleSet {
        self.declared.get(field).cloned().unwrap_or_default()
    }

    pub fn comment_rules(&self, field: &FieldDescriptor) -> RuleSet {
        leading_comment(field)
            .map(|comment| parse_comment_rules(&comment))
            .unwrap_or_default()
    }

    /// Declared rules overlaid with comment rules.
    pub fn extract(&self, field: &FieldDescriptor) -> RuleSet {
        let mut rules = self.declared_rules(field);
        rules.extend(self.comment_rules(field));
        rules
    }
}

/// The leading comment attached to a field in the source info of its file, if any.
pub fn leading_comment(field: &FieldDescriptor) -> Option<String> {
    let file = field.parent_file();
    let source_info = file.file_descriptor_proto().source_code_info.as_ref()?;

    source_info
        .location
        .iter()
        .find(|location| location.path == field.path())
        .and_then(|location| location.leading_comments.clone())
        .filter(|comment| !comment.trim().is_empty())
}

/// Parses the `@validate key=value ...` annotation of a comment.
///
/// Only the line holding the marker is read. Tokens without `=` are ignored and values
/// wrapped in single or double quotes are unquoted.
pub fn parse_comment_rules(comment: &str) -> RuleSet {
    let Some(idx) = comment.find(VALIDATE_MARKER) else {
        return RuleSet::new();
    };

    let annotation = &comment[idx + VALIDATE_MARKER.len()..];
    let annotation = annotation.lines().next().unwrap_or_default().trim();

    annotation
        .split_whitespace()
        .filter_map(|pair| pair.split_once('='))
        .map(|(key, value)| {
            (
                key.trim().to_string(),
                strip_quotes(value.trim()).to_string(),
            )
        })
        .collect()
}

/// Parses a `not_in` list such as `["0", "none", 'null']`.
pub fn parse_string_list(list: &str) -> Vec<String> {
    let list = list.trim();
    let inner = list
        .strip_prefix('[')
        .and_then(|rest| rest.strip_suffix(']'))
        .unwrap_or(list);

    inner
        .split(',')
        .map(|element| strip_quotes(element.trim()).to_string())
        .collect()
}

fn strip_quotes(value: &str) -> &str {
    for quote in ['"', '\''] {
        if value.len() >= 2
            && let Some(inner) = value
                .strip_prefix(quote)
                .and_then(|rest| rest.strip_suffix(quote))
        {
            return inner;
        }
    }
    value
}

/// The typed form of a [`RuleSet`].
#[derive(Debug, Clone, Default)]
pub struct FieldRules {
    pub required: bool,
    pub min_len: Option<usize>,
    pub max_len: Option<usize>,
    pub email: bool,
    pub pattern: Option<Regex>,
    pub not_in: Option<Vec<String>>,
    raw: RuleSet,
}

impl FieldRules {
    pub fn compile(field: &FieldDescriptor, raw: RuleSet) -> Result<Self, RuleError> {
        let length = |rule: &'static str| -> Result<Option<usize>, RuleError> {
            raw.get(rule)
                .map(|value| {
                    value.trim().parse().map_err(|_| RuleError::InvalidLength {
                        field: field.full_name().to_string(),
                        rule,
                        value: value.clone(),
                    })
                })
                .transpose()
        };

        let min_len = length(rule_key::MIN_LEN)?;
        let max_len = length(rule_key::MAX_LEN)?;

        let pattern = raw
            .get(rule_key::PATTERN)
            .map(|pattern| {
                Regex::new(pattern).map_err(|source| RuleError::InvalidPattern {
                    field: field.full_name().to_string(),
                    pattern: pattern.clone(),
                    source,
                })
            })
            .transpose()?;

        Ok(Self {
            required: raw.get(rule_key::REQUIRED).is_some_and(|v| v == "true"),
            email: raw.get(rule_key::EMAIL).is_some_and(|v| v == "true"),
            not_in: raw.get(rule_key::NOT_IN).map(|v| parse_string_list(v)),
            min_len,
            max_len,
            pattern,
            raw,
        })
    }

    pub fn raw(&self) -> &RuleSet {
        &self.raw
    }

    pub fn is_empty(&self) -> bool {
        self.raw.is_empty()
    }
}

/// Compiled rules of one message, keyed by field number.
#[derive(Debug, Clone)]
pub struct MessageRules {
    descriptor: MessageDescriptor,
    fields: HashMap<u32, FieldRules>,
}

impl MessageRules {
    pub fn compile(
        message: &MessageDescriptor,
        extractor: &RuleExtractor,
    ) -> Result<Self, RuleError> {
        let mut fields = HashMap::new();

        for field in message.fields() {
            let raw = extractor.extract(&field);
            if raw.is_empty() {
                continue;
            }
            fields.insert(field.number(), FieldRules::compile(&field, raw)?);
        }

        Ok(Self {
            descriptor: message.clone(),
            fields,
        })
    }

    /// The message these rules were compiled from.
    pub fn message(&self) -> &MessageDescriptor {
        &self.descriptor
    }

    pub fn field(&self, number: u32) -> Option<&FieldRules> {
        self.fields.get(&number)
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// Compiled rules of every message of a descriptor pool.
#[derive(Debug, Clone, Default)]
pub struct RuleBook {
    extractor: RuleExtractor,
    messages: HashMap<String, MessageRules>,
}

impl RuleBook {
    pub fn compile(pool: &DescriptorPool, extractor: RuleExtractor) -> Result<Self, RuleError> {
        let mut messages = HashMap::new();

        for message in pool.all_messages() {
            let rules = MessageRules::compile(&message, &extractor)?;
            if !rules.is_empty() {
                tracing::debug!(
                    message_type = message.full_name(),
                    fields = rules.fields.len(),
                    "compiled field rules"
                );
            }
            messages.insert(message.full_name().to_string(), rules);
        }

        Ok(Self {
            extractor,
            messages,
        })
    }

    /// Rules of a message. Messages outside the compiled pool (including same-named messages
    /// of another pool) are compiled on demand.
    pub fn rules_for(
        &self,
        message: &MessageDescriptor,
    ) -> Result<Cow<'_, MessageRules>, RuleError> {
        match self.messages.get(message.full_name()) {
            Some(rules) if rules.descriptor == *message => Ok(Cow::Borrowed(rules)),
            _ => MessageRules::compile(message, &self.extractor).map(Cow::Owned),
        }
    }

    pub fn contains(&self, message: &str) -> bool {
        self.messages.contains_key(message)
    }
}
