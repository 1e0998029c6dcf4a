//! # Protobind CLI Entry Point
//!
//! The main executable for the protobind tool. This file drives the application lifecycle:
//!
//! 1. **Initialization**: Parses command-line arguments using [`cli::Cli`] and installs the log subscriber.
//! 2. **Setup**: Loads the descriptor set, configuration, declared rules and catalogs into a `ProtoBinder`.
//! 3. **Execution**: Binds the request described on the command line, or inspects the rules of a message.
//! 4. **Presentation**: Formats and prints the bound message or the error to standard output/error.

mod cli;
mod formatter;

use anyhow::Context;
use clap::Parser;
use cli::{BindArgs, Cli, Commands};
use formatter::{FormattedString, GenericError, RuleTable};
use protobind_core::{
    BinderConfig, ProtoBinder,
    i18n::CatalogLocalizer,
    prost_reflect::{DescriptorPool, MessageDescriptor},
    validation::DeclaredRules,
};
use std::path::{Path, PathBuf};
use std::process;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    let args = Cli::parse();
    init_tracing(args.verbose);

    match args.command {
        Commands::Bind(args) => run_bind(args).await,
        Commands::Rules {
            descriptor_set,
            message,
            rules,
        } => print_rules(&descriptor_set, &message, rules),
    }
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("protobind_core=debug")
    } else {
        EnvFilter::from_default_env()
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
}

fn exit_with(err: impl Into<FormattedString>) -> ! {
    eprintln!("{}", err.into());
    process::exit(1);
}

fn load_pool(path: &Path) -> DescriptorPool {
    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(err) => exit_with(GenericError("Failed to read file", err)),
    };

    match DescriptorPool::decode(bytes.as_slice()) {
        Ok(pool) => pool,
        Err(err) => exit_with(err),
    }
}

fn load_declared_rules(path: Option<PathBuf>) -> anyhow::Result<DeclaredRules> {
    let Some(path) = path else {
        return Ok(DeclaredRules::default());
    };

    let content = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read rules file '{}'", path.display()))?;
    DeclaredRules::from_json(&content)
        .with_context(|| format!("Invalid rules file '{}'", path.display()))
}

fn load_localizer(path: Option<PathBuf>) -> anyhow::Result<CatalogLocalizer> {
    let localizer = CatalogLocalizer::builtin();
    let Some(path) = path else {
        return Ok(localizer);
    };

    let content = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read catalog file '{}'", path.display()))?;
    localizer
        .with_json(&content)
        .with_context(|| format!("Invalid catalog file '{}'", path.display()))
}

fn find_message(pool: &DescriptorPool, name: &str) -> MessageDescriptor {
    match pool.get_message_by_name(name) {
        Some(descriptor) => descriptor,
        None => exit_with(GenericError("Message not found", name)),
    }
}

/// Translates the command-line request into the HTTP request a server would receive.
fn build_request(args: &BindArgs) -> anyhow::Result<http::Request<String>> {
    let query = args.query.trim_start_matches('?');
    let uri = if query.is_empty() {
        "/".to_string()
    } else {
        format!("/?{query}")
    };

    let mut builder = http::Request::builder()
        .method(http::Method::POST)
        .uri(uri)
        .header(http::header::CONTENT_TYPE, "application/json");

    if let Some(lang) = &args.lang {
        builder = builder.header(http::header::ACCEPT_LANGUAGE, lang);
    }
    for (key, value) in &args.headers {
        builder = builder.header(key, value);
    }

    let body = args
        .body
        .as_ref()
        .map(|body| body.to_string())
        .unwrap_or_default();

    builder.body(body).context("Invalid request")
}

async fn run_bind(args: BindArgs) {
    let pool = load_pool(&args.descriptor_set);
    let descriptor = find_message(&pool, &args.message);

    let config = match args.config.as_deref().map(BinderConfig::load).transpose() {
        Ok(config) => config.unwrap_or_default(),
        Err(err) => exit_with(err),
    };
    let declared = load_declared_rules(args.rules.clone()).unwrap_or_else(|err| exit_with(err));
    let localizer = load_localizer(args.catalog.clone()).unwrap_or_else(|err| exit_with(err));
    let request = build_request(&args).unwrap_or_else(|err| exit_with(err));

    let binder = match ProtoBinder::builder(pool)
        .config(config)
        .declared_rules(declared)
        .localizer(localizer)
        .span(tracing::info_span!("bind", message_type = %args.message))
        .build()
    {
        Ok(binder) => binder,
        Err(err) => exit_with(err),
    };

    let mut message = protobind_core::prost_reflect::DynamicMessage::new(descriptor);

    match binder.bind(request, &mut message).await {
        Ok(_) => match serde_json::to_value(&message) {
            Ok(value) => println!("{}", FormattedString::from(value)),
            Err(err) => exit_with(GenericError("Failed to encode message", err)),
        },
        Err(err) => exit_with(err.error),
    }
}

fn print_rules(descriptor_set: &Path, message: &str, rules: Option<PathBuf>) {
    let pool = load_pool(descriptor_set);
    let descriptor = find_message(&pool, message);
    let declared = load_declared_rules(rules).unwrap_or_else(|err| exit_with(err));

    let binder = match ProtoBinder::builder(pool).declared_rules(declared).build() {
        Ok(binder) => binder,
        Err(err) => exit_with(err),
    };

    let compiled = match binder.rules().rules_for(&descriptor) {
        Ok(compiled) => compiled,
        Err(err) => exit_with(err),
    };

    let fields = descriptor
        .fields()
        .map(|field| {
            let raw = compiled
                .field(field.number())
                .map(|rules| rules.raw().clone())
                .unwrap_or_default();
            (field, raw)
        })
        .collect();

    println!("{}", FormattedString::from(RuleTable(descriptor, fields)));
}
