//! # Validation
//!
//! Rule extraction ([`rules`]), the recursive [`MessageValidator`] and the hook for
//! message types that bring their own validation ([`external`]).
pub mod external;
pub mod rules;
pub mod validator;

pub use external::{ExternalValidator, classify_external_error};
pub use rules::{DeclaredRules, FieldRules, RuleBook, RuleError, RuleExtractor, RuleSet};
pub use validator::{MessageValidator, Nested};

use crate::i18n::{Localization, LocalizedError};
use prost_reflect::DynamicMessage;

#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error(transparent)]
    Invalid(#[from] LocalizedError),

    #[error(transparent)]
    Rules(#[from] RuleError),

    /// Unclassified rejection of an [`ExternalValidator`], text unchanged.
    #[error("{0}")]
    Rejected(String),
}

impl ValidationError {
    fn nested_in(self, field: &str) -> Self {
        match self {
            Self::Invalid(err) => Self::Invalid(err.nested_in(field)),
            other => other,
        }
    }
}

/// Validates a message, preferring its external validator when one is registered.
pub fn validate_message(
    message: &DynamicMessage,
    rules: &RuleBook,
    external: Option<&dyn ExternalValidator>,
    localization: Localization<'_>,
) -> Result<(), ValidationError> {
    let Some(external) = external else {
        return MessageValidator::new(rules, localization).validate(message);
    };

    let Err(text) = external.validate(message) else {
        return Ok(());
    };

    match classify_external_error(&text) {
        Some((message_id, data)) => {
            tracing::debug!(message_id, "classified external validation error");
            Err(localization.error(message_id, data).into())
        }
        None => {
            tracing::debug!(error = %text, "could not classify external validation error");
            Err(ValidationError::Rejected(text))
        }
    }
}
