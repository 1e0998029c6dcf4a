//! # Proto Binder
//!
//! The [`ProtoBinder`] turns an HTTP request into a validated Protobuf message:
//!
//! 1. **Query**: URL query parameters are bound through the message's binding plan.
//! 2. **Body**: the body is buffered so it stays readable after binding.
//! 3. **Coercion**: string-encoded numbers and booleans are converted to the declared
//!    kinds. A body that cannot be coerced is used as is.
//! 4. **Unmarshal**: the body is decoded into a fresh message, unknown fields discarded.
//! 5. **Merge**: the decoded message is merged into the target, so fields absent from the
//!    body keep the value they had (e.g. from the query string).
//! 6. **Validation**: the target is checked against its rules (or its external validator).
//!
//! An empty body skips steps 3 to 5; the message is still validated.
//!
//! ## Example
//!
//! ```rust,no_run
//! use protobind_core::{ProtoBinder, prost_reflect::{DescriptorPool, DynamicMessage}};
//!
//! # async fn run(request: http::Request<String>) -> Result<(), Box<dyn std::error::Error>> {
//! let bytes = std::fs::read("descriptor.bin")?;
//! let pool = DescriptorPool::decode(bytes.as_slice())?;
//! let binder = ProtoBinder::builder(pool.clone()).build()?;
//!
//! let descriptor = pool.get_message_by_name("odoc.doc.UpdateDocRequest").unwrap();
//! let mut message = DynamicMessage::new(descriptor);
//! // The returned request carries the buffered body.
//! let request = binder.bind(request, &mut message).await?;
//! println!("{} bytes bound onto {:?}", request.body().len(), message);
//! # Ok(())
//! # }
//! ```
pub mod coerce;
pub mod query;

pub use coerce::{CoerceError, coerce_json};
pub use query::{BindingPlan, BindingTable, FieldBinder, SkipReason, SkippedParam, bind_query};

use crate::BoxError;
use crate::config::BinderConfig;
use crate::i18n::{Localization, LocaleHint, LocalizedError, Localizer, language};
use crate::validation::{
    DeclaredRules, ExternalValidator, RuleBook, RuleError, RuleExtractor, ValidationError,
    validate_message,
};
use bytes::{BufMut, Bytes, BytesMut};
use http::Request;
use http_body::Body;
use prost_reflect::{
    DescriptorPool, DeserializeOptions, DynamicMessage, MessageDescriptor, ReflectMessage,
};
use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{Instrument, Span};

const TRUNCATED_SUFFIX: &str = "... (truncated)";

#[derive(Debug, thiserror::Error)]
pub enum BindError {
    #[error("Failed to read request body: '{0}'")]
    BodyRead(#[source] BoxError),

    #[error(transparent)]
    Unmarshal(#[from] serde_json::Error),

    #[error("Failed to merge request body into message: '{0}'")]
    Merge(#[from] prost::DecodeError),

    #[error("Failed to convert bound message back to '{message}': '{source}'")]
    Transcode {
        message: String,
        source: prost::DecodeError,
    },

    #[error("Invalid validation rules: '{0}'")]
    Rules(#[from] RuleError),

    #[error(transparent)]
    Validation(#[from] LocalizedError),

    /// Rejection of an external validator that could not be localized.
    #[error("{0}")]
    Rejected(String),
}

impl From<ValidationError> for BindError {
    fn from(err: ValidationError) -> Self {
        match err {
            ValidationError::Invalid(err) => Self::Validation(err),
            ValidationError::Rules(err) => Self::Rules(err),
            ValidationError::Rejected(text) => Self::Rejected(text),
        }
    }
}

/// A failed [`ProtoBinder::bind`], with the buffered request when there is one.
#[derive(Debug, thiserror::Error)]
#[error("{error}")]
pub struct RequestBindError {
    /// `None` when the body could not be read.
    pub request: Option<Request<Bytes>>,
    pub error: BindError,
}

impl RequestBindError {
    pub fn into_parts(self) -> (Option<Request<Bytes>>, BindError) {
        (self.request, self.error)
    }
}

impl From<RequestBindError> for BindError {
    fn from(err: RequestBindError) -> Self {
        err.error
    }
}

/// Binds and validates requests against the messages of one descriptor pool.
///
/// Immutable once built; share it behind an `Arc`.
pub struct ProtoBinder {
    pool: DescriptorPool,
    config: BinderConfig,
    bindings: BindingTable,
    rules: RuleBook,
    localizer: Option<Arc<dyn Localizer>>,
    external: HashMap<String, Arc<dyn ExternalValidator>>,
    span: Span,
}

pub struct ProtoBinderBuilder {
    pool: DescriptorPool,
    config: BinderConfig,
    declared: DeclaredRules,
    localizer: Option<Arc<dyn Localizer>>,
    external: HashMap<String, Arc<dyn ExternalValidator>>,
    span: Span,
}

impl ProtoBinderBuilder {
    pub fn config(mut self, config: BinderConfig) -> Self {
        self.config = config;
        self
    }

    /// Rules applied on top of the pool, overridden by `@validate` comments.
    pub fn declared_rules(mut self, declared: DeclaredRules) -> Self {
        self.declared = declared;
        self
    }

    pub fn localizer(mut self, localizer: impl Localizer + 'static) -> Self {
        self.localizer = Some(Arc::new(localizer));
        self
    }

    pub fn shared_localizer(mut self, localizer: Arc<dyn Localizer>) -> Self {
        self.localizer = Some(localizer);
        self
    }

    /// Replaces rule validation of `message` (a full name) with `validator`.
    pub fn external_validator(
        mut self,
        message: impl Into<String>,
        validator: impl ExternalValidator + 'static,
    ) -> Self {
        self.external.insert(message.into(), Arc::new(validator));
        self
    }

    /// Span entered while binding; events of the binder are recorded inside it.
    pub fn span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    /// Builds the binding table and compiles the rules of every message in the pool.
    ///
    /// # Returns
    ///
    /// * `Ok(ProtoBinder)` - The ready binder.
    /// * `Err(RuleError)` - If a length is not a number or a pattern does not compile.
    pub fn build(self) -> Result<ProtoBinder, RuleError> {
        let rules = RuleBook::compile(&self.pool, RuleExtractor::new(self.declared))?;
        let bindings = BindingTable::build(&self.pool);

        tracing::debug!(messages = bindings.len(), "built binding table");

        Ok(ProtoBinder {
            pool: self.pool,
            config: self.config,
            bindings,
            rules,
            localizer: self.localizer,
            external: self.external,
            span: self.span,
        })
    }
}

impl ProtoBinder {
    pub fn builder(pool: DescriptorPool) -> ProtoBinderBuilder {
        ProtoBinderBuilder {
            pool,
            config: BinderConfig::default(),
            declared: DeclaredRules::default(),
            localizer: None,
            external: HashMap::new(),
            span: Span::none(),
        }
    }

    pub fn pool(&self) -> &DescriptorPool {
        &self.pool
    }

    pub fn config(&self) -> &BinderConfig {
        &self.config
    }

    pub fn rules(&self) -> &RuleBook {
        &self.rules
    }

    /// An empty message of the given full name, if the pool knows it.
    pub fn new_message(&self, name: &str) -> Option<DynamicMessage> {
        self.pool.get_message_by_name(name).map(DynamicMessage::new)
    }

    /// Buffers the body of `request`, then binds it with [`ProtoBinder::bind_proto`].
    ///
    /// The buffered request is handed back whatever the outcome, so the body can be read
    /// again downstream (e.g. to log or forward a rejected request).
    ///
    /// # Returns
    ///
    /// * `Ok(Request<Bytes>)` - The request with its buffered body.
    /// * `Err(RequestBindError)` - If the body could not be read, decoded or validated. It
    ///   carries the buffered request unless reading the body failed.
    pub async fn bind<B>(
        &self,
        request: Request<B>,
        target: &mut DynamicMessage,
    ) -> Result<Request<Bytes>, RequestBindError>
    where
        B: Body,
        B::Error: Into<BoxError>,
    {
        let (parts, body) = request.into_parts();

        let body = match read_body(body).instrument(self.span.clone()).await {
            Ok(body) => body,
            Err(err) => {
                self.span.in_scope(|| {
                    tracing::debug!(path = parts.uri.path(), %err, "failed to read request body");
                });
                return Err(RequestBindError {
                    request: None,
                    error: BindError::BodyRead(err),
                });
            }
        };

        let request = Request::from_parts(parts, body);
        match self.bind_proto(&request, target) {
            Ok(()) => Ok(request),
            Err(error) => Err(RequestBindError {
                request: Some(request),
                error,
            }),
        }
    }

    /// Binds a buffered request onto `target` and validates the result.
    ///
    /// # Arguments
    ///
    /// * `request` - The request, query string and JSON body.
    /// * `target` - The message to populate. Existing values are kept unless the request
    ///   overrides them.
    pub fn bind_proto(
        &self,
        request: &Request<Bytes>,
        target: &mut DynamicMessage,
    ) -> Result<(), BindError> {
        self.span.in_scope(|| {
            if let Some(query) = request.uri().query() {
                self.bindings
                    .plan_for(&target.descriptor())
                    .bind(query, target);
            }

            if self.config.debug.enable_request_logging {
                self.log_request(request);
            }

            self.merge_body(request.body(), target).inspect_err(|err| {
                tracing::debug!(path = request.uri().path(), %err, "failed to bind request body");
            })?;

            self.validate(target, &LocaleHint::from_request(request))
        })
    }

    /// Binds a JSON body alone (no query string) and validates the result.
    pub fn bind_json(
        &self,
        body: &[u8],
        target: &mut DynamicMessage,
        hint: &LocaleHint,
    ) -> Result<(), BindError> {
        self.span.in_scope(|| {
            self.merge_body(body, target).inspect_err(|err| {
                tracing::debug!(%err, "failed to bind JSON body");
            })?;
            self.validate(target, hint)
        })
    }

    /// [`ProtoBinder::bind_proto`] for generated message types.
    ///
    /// `target` is left untouched when binding fails.
    pub fn bind_message<M>(&self, request: &Request<Bytes>, target: &mut M) -> Result<(), BindError>
    where
        M: ReflectMessage + Default,
    {
        let mut dynamic = target.transcode_to_dynamic();
        self.bind_proto(request, &mut dynamic)?;

        *target = dynamic
            .transcode_to::<M>()
            .map_err(|source| BindError::Transcode {
                message: dynamic.descriptor().full_name().to_string(),
                source,
            })?;
        Ok(())
    }

    /// Validates `message` without binding anything.
    pub fn validate(&self, message: &DynamicMessage, hint: &LocaleHint) -> Result<(), BindError> {
        let localization =
            Localization::new(self.localizer.as_deref(), hint, self.default_language());
        let external = self
            .external
            .get(message.descriptor().full_name())
            .map(|validator| &**validator);

        validate_message(message, &self.rules, external, localization).map_err(Into::into)
    }

    fn default_language(&self) -> &str {
        self.config
            .default_language
            .as_deref()
            .unwrap_or(language::ZH_CN)
    }

    fn merge_body(&self, body: &[u8], target: &mut DynamicMessage) -> Result<(), BindError> {
        if body.is_empty() {
            return Ok(());
        }

        let descriptor = target.descriptor();
        let body = coerce_body(body, &descriptor);

        let mut deserializer = serde_json::Deserializer::from_slice(&body);
        let decoded = DynamicMessage::deserialize_with_options(
            descriptor,
            &mut deserializer,
            &DeserializeOptions::new().deny_unknown_fields(false),
        )?;
        deserializer.end()?;

        let encoded = prost::Message::encode_to_vec(&decoded);
        prost::Message::merge(target, encoded.as_slice())?;
        Ok(())
    }

    fn log_request(&self, request: &Request<Bytes>) {
        let debug_config = &self.config.debug;
        let client_ip = client_ip(request);
        let client_ip = client_ip.as_deref().unwrap_or("unknown");

        if debug_config.log_request_body {
            tracing::debug!(
                client_ip,
                path = request.uri().path(),
                method = %request.method(),
                request_body = %truncate_body(request.body(), debug_config.body_limit()),
                "request details"
            );
        } else {
            tracing::debug!(
                client_ip,
                path = request.uri().path(),
                method = %request.method(),
                "request details"
            );
        }
    }
}

impl fmt::Debug for ProtoBinder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProtoBinder")
            .field("config", &self.config)
            .field("messages", &self.bindings.len())
            .field("localizer", &self.localizer.is_some())
            .field("external", &self.external.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

fn coerce_body<'a>(body: &'a [u8], descriptor: &MessageDescriptor) -> Cow<'a, [u8]> {
    match coerce_json(body, descriptor) {
        Ok(coerced) => Cow::Owned(coerced),
        Err(err) => {
            tracing::debug!(%err, "body coercion failed, using the raw body");
            Cow::Borrowed(body)
        }
    }
}

async fn read_body<B>(body: B) -> Result<Bytes, BoxError>
where
    B: Body,
    B::Error: Into<BoxError>,
{
    let mut body = std::pin::pin!(body);
    let mut buffer = BytesMut::new();

    while let Some(frame) = std::future::poll_fn(|cx| body.as_mut().poll_frame(cx)).await {
        if let Ok(data) = frame.map_err(Into::<BoxError>::into)?.into_data() {
            buffer.put(data);
        }
    }

    Ok(buffer.freeze())
}

/// `X-Forwarded-For` (first hop), then `X-Real-IP`, then the peer address extension.
fn client_ip<B>(request: &Request<B>) -> Option<String> {
    let header = |name: &str| {
        request
            .headers()
            .get(name)
            .and_then(|value| value.to_str().ok())
    };

    if let Some(forwarded) = header("x-forwarded-for")
        && let Some(first) = forwarded.split(',').map(str::trim).find(|ip| !ip.is_empty())
    {
        return Some(first.to_string());
    }

    if let Some(real_ip) = header("x-real-ip").map(str::trim).filter(|ip| !ip.is_empty()) {
        return Some(real_ip.to_string());
    }

    request
        .extensions()
        .get::<SocketAddr>()
        .map(|addr| addr.ip().to_string())
}

/// Cuts the body at `limit` bytes (on a character boundary).
fn truncate_body(body: &[u8], limit: usize) -> String {
    let text = String::from_utf8_lossy(body);
    if text.len() <= limit {
        return text.into_owned();
    }

    let mut end = limit;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}{TRUNCATED_SUFFIX}", &text[..end])
}
