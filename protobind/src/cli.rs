//! # CLI
//!
//! This module defines the command-line interface of `protobind` using `clap`.
//!
//! It is responsible for parsing user input and performing validation (e.g., ensuring the body is valid JSON
//! and headers are `key:value`).
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "protobind",
    version,
    about = "Bind and validate HTTP requests against protobuf schemas"
)]
pub struct Cli {
    /// Print binder internals to stderr (same as RUST_LOG=protobind_core=debug)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Bind a request onto a message and validate it
    ///
    /// The query string and the JSON body are bound the same way a server would bind them,
    /// then the validation rules of the message are checked.
    ///
    /// ## Examples:
    ///
    /// ```bash
    /// protobind bind docs.bin odoc.doc.UpdateDocRequest --query 'docId=7' --body '{"serviceId": "S1"}'
    /// ```
    Bind(BindArgs),

    /// Print the effective validation rules of every field of a message
    Rules {
        /// Path to the descriptor set (.bin), compiled with source info
        descriptor_set: PathBuf,
        /// Fully qualified message name (e.g. my.package.Message)
        message: String,
        /// Declared rules (JSON: message -> field -> rule -> value)
        #[arg(long)]
        rules: Option<PathBuf>,
    },
}

#[derive(Args)]
pub struct BindArgs {
    /// Path to the descriptor set (.bin), compiled with source info
    pub descriptor_set: PathBuf,
    /// Fully qualified message name (e.g. my.package.Message)
    pub message: String,

    /// Query string, with or without the leading '?'
    #[arg(short, long, default_value = "")]
    pub query: String,

    /// JSON body
    #[arg(short, long, value_parser = parse_body)]
    pub body: Option<serde_json::Value>,

    #[arg(short = 'H', long = "header", value_parser = parse_header)]
    pub headers: Vec<(String, String)>,

    /// Language of validation messages, sent as Accept-Language (e.g. en-US)
    #[arg(short, long)]
    pub lang: Option<String>,

    /// Binder configuration (JSON)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Declared rules (JSON: message -> field -> rule -> value)
    #[arg(long)]
    pub rules: Option<PathBuf>,

    /// Extra message catalogs (JSON: language -> message ID -> template)
    #[arg(long)]
    pub catalog: Option<PathBuf>,
}

fn parse_header(s: &str) -> Result<(String, String), String> {
    s.split_once(':')
        .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
        .ok_or_else(|| "Format must be 'key:value'".to_string())
}

fn parse_body(value: &str) -> Result<serde_json::Value, String> {
    serde_json::from_str(value).map_err(|e| format!("Invalid JSON: {e}"))
}
