//! # Protobind Core
//!
//! `protobind-core` adapts HTTP requests to Protobuf messages. It binds URL query
//! parameters and JSON bodies onto any message known to a `prost_reflect::DescriptorPool`
//! and validates the result against field rules, without compile-time knowledge of the
//! Protobuf schema.
//!
//! ## Key Components
//!
//! * **[`ProtoBinder`]:** The main entry point. It orchestrates query binding, body
//!   buffering, JSON coercion, merge-unmarshal and validation in a single call.
//! * **[`LocalizedError`]:** The error returned when a message breaks one of its rules,
//!   carrying a message ID, template data and the user-facing text.
//!
//! ## Building blocks
//!
//! The components used internally by the binder are exposed as well:
//!
//! * **[`binding::query`]:** Per-message binding plans turning `field=value` and
//!   `field[key]=value` query parameters into field values.
//! * **[`binding::coerce`]:** Rewrites string-encoded numbers and booleans of a JSON body
//!   into the kinds declared by the schema.
//! * **[`validation`]:** Rule extraction (`@validate` comments and declared rules), rule
//!   compilation and the recursive message validator.
//! * **[`i18n`]:** The [`i18n::Localizer`] abstraction and a catalog based implementation.
//!
//! ## Re-exports
//!
//! This crate re-exports `prost` and `prost-reflect` to ensure that consumers
//! use compatible versions of these underlying dependencies.
pub mod binding;
pub mod config;
pub mod i18n;
pub mod validation;

pub use binding::{BindError, ProtoBinder, ProtoBinderBuilder, RequestBindError};
pub use config::{BinderConfig, DebugConfig};
pub use i18n::LocalizedError;

// Re-exports
pub use prost;
pub use prost_reflect;

/// Type alias for the standard boxed error used in generic bounds.
type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;
