//! Schema sources shared by the registry-backed codecs: the Confluent schema
//! registry, the Buf Schema Registry and the single-flight cache both sit on.

pub mod bsr;
pub mod cache;
pub mod error;
pub mod schema_registry;

#[cfg(test)]
pub(crate) mod stub;

pub use bsr::{
    BsrClient, BsrConfig, FileDescriptorSetFetcher, HttpFileDescriptorSetFetcher,
    BSR_COMMIT_HEADER, BSR_MESSAGE_HEADER,
};
pub use cache::{CachePolicy, SingleFlightCache};
pub use error::RegistryError;
pub use schema_registry::{
    resolve_references, schema_id_for, InMemoryRegistry, ResolvedReference, Schema, SchemaReference,
    SchemaRegistry, SchemaRegistryClient, SchemaRegistryConfig, SchemaType, SubjectSchema,
    TlsConfig,
};
