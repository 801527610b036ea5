//! MessagePack codec, restricted to an allow-list of topics.
//!
//! MessagePack has no magic bytes and almost any byte string decodes as
//! something, so the codec only runs for topics the operator named.

mod value;

use serde::Deserialize;

use recscope_api::{
    ready, require_payload, BoxFuture, KafkaRecord, Object, PayloadEncoding, PayloadType,
    RecordPayload, Serde, SerdeContext, SerdeError, SerializeOptions, TopicMatcher,
};

pub use value::decode_to_json;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct MsgPackConfig {
    pub enabled: bool,
    /// Literal names or `/regex/` patterns.
    pub topic_names: Vec<TopicMatcher>,
}

pub struct MsgPackSerde {
    topics: Vec<TopicMatcher>,
}

impl MsgPackSerde {
    /// A disabled config allows no topic.
    pub fn new(config: &MsgPackConfig) -> Self {
        let topics = if config.enabled { config.topic_names.clone() } else { Vec::new() };
        Self { topics }
    }

    fn topic_allowed(&self, topic: &str) -> bool {
        self.topics.iter().any(|m| m.matches(topic))
    }

    fn decode(&self, record: &KafkaRecord, payload_type: PayloadType) -> Result<RecordPayload, SerdeError> {
        if !self.topic_allowed(&record.topic) {
            return Err(SerdeError::mismatch(format!(
                "message pack encoding not configured for topic: {}",
                record.topic
            )));
        }
        let payload = require_payload(record, payload_type)?;
        let value = decode_to_json(payload)?;
        Ok(RecordPayload::from_json_value(PayloadEncoding::MsgPack, value)?)
    }

    /// Bytes must already be MessagePack and are kept verbatim; a string is
    /// read as JSON and encoded, as is a structured value.
    fn encode(&self, obj: Object) -> Result<Vec<u8>, SerdeError> {
        let value = match obj {
            Object::Bytes(b) => {
                decode_to_json(&b).map_err(|e| {
                    SerdeError::new(format!("input is not valid MessagePack: {}", e.message()))
                })?;
                return Ok(b);
            }
            other => other.to_json_value()?,
        };
        rmp_serde::to_vec_named(&value)
            .map_err(|e| SerdeError::new(format!("failed to encode MessagePack: {e}")))
    }
}

impl Serde for MsgPackSerde {
    fn name(&self) -> PayloadEncoding {
        PayloadEncoding::MsgPack
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

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn serde_for(topics: &[&str]) -> MsgPackSerde {
        MsgPackSerde::new(&MsgPackConfig {
            enabled: true,
            topic_names: topics.iter().map(|t| TopicMatcher::parse(t).unwrap()).collect(),
        })
    }

    async fn decode(serde: &MsgPackSerde, topic: &str, value: &[u8]) -> Result<RecordPayload, SerdeError> {
        let record = KafkaRecord::new(topic).with_value(value.to_vec());
        serde
            .deserialize_payload(&SerdeContext::new(), &record, PayloadType::Value)
            .await
    }

    #[tokio::test]
    async fn only_allowed_topics_are_decoded() {
        let serde = serde_for(&["/^metrics-.*/"]);
        let bytes = rmp_serde::to_vec_named(&json!({"cpu": 0.5})).unwrap();

        let err = decode(&serde, "orders", &bytes).await.unwrap_err();
        assert!(err.message().contains("not configured for topic"));

        let p = decode(&serde, "metrics-host1", &bytes).await.unwrap();
        assert_eq!(p.encoding, PayloadEncoding::MsgPack);
        assert_eq!(p.normalized_json(), Some(json!({"cpu": 0.5})));
    }

    #[tokio::test]
    async fn bytes_round_trip_verbatim() {
        let serde = serde_for(&["t"]);
        // {"a": [1, "x"]}
        let raw = vec![0x81, 0xa1, b'a', 0x92, 0x01, 0xa1, b'x'];
        let p = decode(&serde, "t", &raw).await.unwrap();
        assert_eq!(p.normalized_json(), Some(json!({"a": [1, "x"]})));

        let again = serde
            .serialize_object(&SerdeContext::new(), Object::Bytes(raw.clone()), PayloadType::Value, &Default::default())
            .await
            .unwrap();
        assert_eq!(again, raw);
    }

    #[tokio::test]
    async fn json_string_is_encoded() {
        let serde = serde_for(&["t"]);
        let bytes = serde
            .serialize_object(&SerdeContext::new(), Object::from(r#"{"n":1}"#), PayloadType::Value, &Default::default())
            .await
            .unwrap();
        assert_eq!(bytes, vec![0x81, 0xa1, b'n', 0x01]);
    }

    #[tokio::test]
    async fn truncated_payload_fails() {
        let serde = serde_for(&["t"]);
        assert!(decode(&serde, "t", &[0x92, 0x01]).await.is_err());
    }
}
