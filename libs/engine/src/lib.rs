//! Record serde orchestration: the probe chain over every codec, the
//! `__consumer_offsets` decoder and service bootstrap from configuration.

mod bootstrap;
pub mod config;
pub mod error;
pub mod offsets;
pub mod service;

pub use config::{SerdeConfig, DEFAULT_MAX_PAYLOAD_SIZE};
pub use error::EngineError;
pub use offsets::CONSUMER_OFFSETS_TOPIC;
pub use service::{
    DeserializationOptions, SerializeInput, SerializeOutput, SerializeSide, Service, ServiceBuilder,
};
