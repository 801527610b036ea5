use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use recscope_api::PayloadEncoding;

#[derive(Parser)]
#[command(name = "recscope", about = "Decode and encode Kafka record payloads")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Detect the encoding of a record's key and value and print it as JSON
    Decode(DecodeArgs),
    /// Produce key and value bytes for a record
    Encode(EncodeArgs),
}

#[derive(Args, Clone, Debug)]
pub struct ConfigArgs {
    /// Path to the TOML serde config; defaults apply when omitted
    #[arg(long, env = "RECSCOPE_CONFIG")]
    pub config: Option<String>,
}

/// Raw bytes for one side of a record. At most one source may be given;
/// none means a Kafka null.
#[derive(Args, Clone, Debug, Default)]
pub struct KeyInput {
    /// Key as UTF-8 text
    #[arg(long, conflicts_with_all = ["key_base64", "key_file"])]
    pub key: Option<String>,
    /// Key as base64
    #[arg(long, conflicts_with = "key_file")]
    pub key_base64: Option<String>,
    /// Read the key from a file
    #[arg(long)]
    pub key_file: Option<PathBuf>,
}

#[derive(Args, Clone, Debug, Default)]
pub struct ValueInput {
    /// Value as UTF-8 text
    #[arg(long, conflicts_with_all = ["value_base64", "value_file"])]
    pub value: Option<String>,
    /// Value as base64
    #[arg(long, conflicts_with = "value_file")]
    pub value_base64: Option<String>,
    /// Read the value from a file
    #[arg(long)]
    pub value_file: Option<PathBuf>,
}

#[derive(Args, Clone, Debug)]
pub struct DecodeArgs {
    #[command(flatten)]
    pub config: ConfigArgs,

    #[arg(long)]
    pub topic: String,

    #[command(flatten)]
    pub key: KeyInput,

    #[command(flatten)]
    pub value: ValueInput,

    /// Record header as `key=value`; repeatable
    #[arg(long = "header", value_name = "KEY=VALUE")]
    pub headers: Vec<String>,

    /// Skip probing and decode the key with this encoding
    #[arg(long, default_value = "unspecified")]
    pub key_encoding: PayloadEncoding,

    /// Skip probing and decode the value with this encoding
    #[arg(long, default_value = "unspecified")]
    pub value_encoding: PayloadEncoding,

    /// Override `max_payload_size` from the config
    #[arg(long)]
    pub max_payload_size: Option<usize>,

    /// Include failed codec attempts
    #[arg(long)]
    pub troubleshoot: bool,

    /// Include the raw bytes, base64-encoded
    #[arg(long)]
    pub include_raw: bool,
}

#[derive(Args, Clone, Debug)]
pub struct EncodeArgs {
    #[command(flatten)]
    pub config: ConfigArgs,

    #[arg(long)]
    pub topic: String,

    /// Key encoding; `null` produces no key
    #[arg(long, default_value = "null")]
    pub key_encoding: PayloadEncoding,

    /// Key object: JSON or text, depending on the encoding
    #[arg(long)]
    pub key: Option<String>,

    /// Value encoding; `null` produces a tombstone
    #[arg(long)]
    pub value_encoding: PayloadEncoding,

    /// Value object: JSON or text, depending on the encoding
    #[arg(long)]
    pub value: Option<String>,

    /// Schema ID for Confluent-framed value encodings
    #[arg(long)]
    pub schema_id: Option<u32>,

    /// Registry subject whose latest schema is used when no ID is given
    #[arg(long)]
    pub subject: Option<String>,

    /// Protobuf message-index path, e.g. `1,0`
    #[arg(long, value_delimiter = ',')]
    pub index: Option<Vec<i64>>,

    /// Fully-qualified protobuf message type
    #[arg(long)]
    pub message_type: Option<String>,

    /// BSR commit the message type resolves against
    #[arg(long)]
    pub commit: Option<String>,

    /// Width in bytes for `uint` payloads: 1, 2, 4 or 8
    #[arg(long, default_value_t = 8)]
    pub uint_size: u8,
}
