//! CBOR codec for topics matched by configuration.

mod convert;

use serde::Deserialize;

use recscope_api::{
    ready, require_payload, BoxFuture, KafkaRecord, Object, PayloadEncoding, PayloadType,
    RecordPayload, Serde, SerdeContext, SerdeError, SerializeOptions, TopicMatcher,
};

pub use convert::{cbor_to_json, json_to_cbor};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CborConfig {
    pub enabled: bool,
    /// Literal name or `/regex/` pattern.
    pub topic_name: Option<TopicMatcher>,
}

pub struct CborSerde {
    topic: Option<TopicMatcher>,
}

impl CborSerde {
    /// A disabled config matches no topic.
    pub fn new(config: &CborConfig) -> Self {
        Self {
            topic: config.topic_name.clone().filter(|_| config.enabled),
        }
    }

    fn decode(&self, record: &KafkaRecord, payload_type: PayloadType) -> Result<RecordPayload, SerdeError> {
        if !self.topic.as_ref().is_some_and(|m| m.matches(&record.topic)) {
            return Err(SerdeError::mismatch(format!(
                "cbor encoding not configured for topic: {}",
                record.topic
            )));
        }
        let payload = require_payload(record, payload_type)?;
        if payload.is_empty() {
            return Err(SerdeError::mismatch("payload is empty"));
        }
        let value = cbor_to_json(payload)?;
        Ok(RecordPayload::from_json_value(PayloadEncoding::Cbor, value)?)
    }

    fn encode(&self, obj: Object) -> Result<Vec<u8>, SerdeError> {
        let value = match obj {
            Object::Bytes(b) => {
                cbor_to_json(&b)
                    .map_err(|e| SerdeError::new(format!("input is not valid CBOR: {}", e.message())))?;
                return Ok(b);
            }
            other => other.to_json_value()?,
        };
        json_to_cbor(&value)
    }
}

impl Serde for CborSerde {
    fn name(&self) -> PayloadEncoding {
        PayloadEncoding::Cbor
    }

    fn deserialize_payload<'a>(
        &'a self,
        _ctx: &'a SerdeContext,
        record: &'a KafkaRecord,
        payload_type: PayloadType,
    ) -> BoxFuture<'a, Result<RecordPayload, SerdeError>> {
        ready(self.decode(record, payload_type))
    }

    fn serialize_object<'a>(
        &'a self,
        _ctx: &'a SerdeContext,
        obj: Object,
        _payload_type: PayloadType,
        _opts: &'a SerializeOptions,
    ) -> BoxFuture<'a, Result<Vec<u8>, SerdeError>> {
        ready(self.encode(obj))
    }
}
