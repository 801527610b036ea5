use std::future::Future;
use std::pin::Pin;

pub mod context;
pub mod error;
pub mod options;
pub mod record;
pub mod types;
pub mod util;
pub mod wire;

pub use context::SerdeContext;
pub use error::{ErrorKind, SerdeError};
pub use options::{Object, SerializeOptions, UintSize};
pub use record::{
    payload_from_record, DeserializedPayload, KafkaHeader, KafkaRecord, Record, RecordHeader,
    RecordPayload, TroubleshootingReport,
};
pub use types::{PayloadEncoding, PayloadType};
pub use util::{trim_left_whitespace, TopicMatcher};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Box an already computed result. Used by the CPU-only codecs.
pub fn ready<'a, T: Send + 'a>(value: T) -> BoxFuture<'a, T> {
    Box::pin(std::future::ready(value))
}

// ════════════════════════════════════════════════════════════════
//  Serde — one wire format
// ════════════════════════════════════════════════════════════════

/// A record codec: bytes ↔ normalized payload for one wire format.
///
/// `deserialize_payload()` must reject cheaply (magic byte, length, leading
/// character) before doing any real decoding, and must never panic: every
/// failure is a returned `SerdeError`. Only registry-backed codecs await
/// anything; they honour `ctx` cancellation.
pub trait Serde: Send + Sync {
    /// Static identity of the codec.
    fn name(&self) -> PayloadEncoding;

    /// Try to interpret the key or value of `record` as this codec's format.
    fn deserialize_payload<'a>(
        &'a self,
        ctx: &'a SerdeContext,
        record: &'a KafkaRecord,
        payload_type: PayloadType,
    ) -> BoxFuture<'a, Result<RecordPayload, SerdeError>>;

    /// Produce wire bytes from a native object.
    fn serialize_object<'a>(
        &'a self,
        ctx: &'a SerdeContext,
        obj: Object,
        payload_type: PayloadType,
        opts: &'a SerializeOptions,
    ) -> BoxFuture<'a, Result<Vec<u8>, SerdeError>>;
}

/// Selected payload bytes, or a mismatch error for a Kafka null.
///
/// Every codec except `Null` treats an absent payload as "not mine".
pub fn require_payload(record: &KafkaRecord, payload_type: PayloadType) -> Result<&[u8], SerdeError> {
    payload_from_record(record, payload_type)
        .ok_or_else(|| SerdeError::mismatch(format!("{payload_type} payload is null")))
}
