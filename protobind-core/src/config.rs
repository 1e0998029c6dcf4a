//! # Binder Configuration
//!
//! Serde-backed settings consumed by the [`crate::ProtoBinder`]. Field names follow the
//! camelCase JSON layout of the platform configuration files:
//!
//! ```json
//! {
//!   "defaultLanguage": "zh-CN",
//!   "debug": {
//!     "enableRequestLogging": true,
//!     "logRequestBody": true,
//!     "maxRequestBodySize": 2048
//!   }
//! }
//! ```
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Body bytes kept in request logs when no explicit limit is configured.
pub const DEFAULT_MAX_REQUEST_BODY_SIZE: usize = 1024;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': '{source}'")]
    Read {
        path: String,
        source: std::io::Error,
    },

    #[error("Invalid config JSON: '{0}'")]
    Parse(#[from] serde_json::Error),
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct BinderConfig {
    /// Diagnostic switches for bound requests.
    pub debug: DebugConfig,
    /// Language used for validation messages when the request carries no usable hint.
    pub default_language: Option<String>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct DebugConfig {
    pub enable_request_logging: bool,
    pub log_request_body: bool,
    /// Values of zero fall back to [`DEFAULT_MAX_REQUEST_BODY_SIZE`].
    pub max_request_body_size: usize,
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            enable_request_logging: false,
            log_request_body: false,
            max_request_body_size: DEFAULT_MAX_REQUEST_BODY_SIZE,
        }
    }
}

impl DebugConfig {
    pub fn body_limit(&self) -> usize {
        if self.max_request_body_size == 0 {
            DEFAULT_MAX_REQUEST_BODY_SIZE
        } else {
            self.max_request_body_size
        }
    }
}

impl BinderConfig {
    pub fn from_json(content: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(content)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_config_keeps_defaults() {
        let config =
            BinderConfig::from_json(r#"{ "debug": { "enableRequestLogging": true } }"#).unwrap();

        assert!(config.debug.enable_request_logging);
        assert!(!config.debug.log_request_body);
        assert_eq!(config.debug.max_request_body_size, DEFAULT_MAX_REQUEST_BODY_SIZE);
        assert_eq!(config.default_language, None);
    }

    #[test]
    fn test_zero_body_limit_falls_back() {
        let config = BinderConfig::from_json(
            r#"{ "defaultLanguage": "en-US", "debug": { "maxRequestBodySize": 0 } }"#,
        )
        .unwrap();

        assert_eq!(config.debug.body_limit(), DEFAULT_MAX_REQUEST_BODY_SIZE);
        assert_eq!(config.default_language.as_deref(), Some("en-US"));
    }

    #[test]
    fn test_invalid_json_is_reported() {
        assert!(matches!(
            BinderConfig::from_json("{ nope"),
            Err(ConfigError::Parse(_))
        ));
    }
}
