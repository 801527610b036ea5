//! Protobuf codecs.
//!
//! Three byte-level conventions, each its own codec:
//! - plain messages whose type comes from a topic mapping ([`ProtobufSerde`]),
//! - Confluent-framed messages resolved by schema ID ([`ProtobufSchemaSerde`]),
//! - header-free messages resolved through the Buf Schema Registry
//!   ([`ProtobufBsrSerde`]).

mod bsr;
mod compile;
mod config;
mod confluent;
mod message;
mod registry;
mod schema_id;
mod topic;

pub use bsr::ProtobufBsrSerde;
pub use compile::{compile_directory, compile_in_memory, find_proto_files, InMemorySources};
pub use config::{FileSystemConfig, ProtobufConfig, ProtobufRegistrySource, TopicMapping};
pub use confluent::ProtobufSchemaSerde;
pub use message::{decode_to_json, encode_object, message_to_json};
pub use registry::DescriptorRegistry;
pub use schema_id::{index_path, message_at, SchemaIdResolver};
pub use topic::ProtobufSerde;
