use std::sync::Arc;

use recscope_api::{
    ready, require_payload, BoxFuture, KafkaRecord, Object, PayloadEncoding, PayloadType, RecordPayload,
    Serde, SerdeContext, SerdeError, SerializeOptions,
};

use crate::message::{decode_to_json, encode_object};
use crate::registry::DescriptorRegistry;

/// Plain protobuf whose message type comes from the topic mapping.
pub struct ProtobufSerde {
    registry: Arc<DescriptorRegistry>,
}

impl ProtobufSerde {
    pub fn new(registry: Arc<DescriptorRegistry>) -> Self {
        Self { registry }
    }

    fn decode(&self, record: &KafkaRecord, payload_type: PayloadType) -> Result<RecordPayload, SerdeError> {
        let payload = require_payload(record, payload_type)?;
        let descriptor = self.registry.descriptor_for(&record.topic, payload_type)?;
        let type_name = descriptor.full_name().to_string();
        let value = decode_to_json(descriptor, payload)?;
        Ok(RecordPayload::from_json_value(PayloadEncoding::Protobuf, value)?.with_metadata("messageType", type_name))
    }

    fn encode(&self, obj: Object, payload_type: PayloadType, opts: &SerializeOptions) -> Result<Vec<u8>, SerdeError> {
        let descriptor = match (&opts.message_type, &opts.topic) {
            (Some(name), _) => self.registry.message_by_name(name)?,
            (None, Some(topic)) => self.registry.descriptor_for(topic, payload_type)?,
            (None, None) => {
                return Err(SerdeError::new("protobuf serialization needs a message type or a topic"));
            }
        };
        encode_object(descriptor, obj)
    }
}

impl Serde for ProtobufSerde {
    fn name(&self) -> PayloadEncoding {
        PayloadEncoding::Protobuf
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
        payload_type: PayloadType,
        opts: &'a SerializeOptions,
    ) -> BoxFuture<'a, Result<Vec<u8>, SerdeError>> {
        ready(self.encode(obj, payload_type, opts))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use recscope_api::{ErrorKind, TopicMatcher};
    use serde_json::json;

    use crate::compile::{compile_in_memory, InMemorySources};
    use crate::config::TopicMapping;

    fn serde() -> ProtobufSerde {
        let sources = InMemorySources::new().with(
            "quote.proto",
            "syntax = \"proto3\"; package market; message Quote { string symbol = 1; double price = 2; }",
        );
        let pool = compile_in_memory(sources, &["quote.proto"]).unwrap();
        let mappings = vec![TopicMapping {
            topic_name: TopicMatcher::parse("/^quotes\\./").unwrap(),
            key_proto_type: None,
            value_proto_type: Some("market.Quote".into()),
        }];
        ProtobufSerde::new(Arc::new(DescriptorRegistry::from_pool(pool, mappings)))
    }

    #[tokio::test]
    async fn decodes_mapped_topic() {
        let serde = serde();
        let ctx = SerdeContext::new();
        let opts = SerializeOptions::default().topic("quotes.nyse");
        let bytes = serde
            .serialize_object(&ctx, Object::from(json!({"symbol": "ABC", "price": 1.5})), PayloadType::Value, &opts)
            .await
            .unwrap();

        let record = KafkaRecord::new("quotes.nyse").with_value(bytes);
        let p = serde.deserialize_payload(&ctx, &record, PayloadType::Value).await.unwrap();
        assert_eq!(p.encoding, PayloadEncoding::Protobuf);
        assert_eq!(p.normalized_json(), Some(json!({"symbol": "ABC", "price": 1.5})));
        assert_eq!(p.extra_metadata.get("messageType").map(String::as_str), Some("market.Quote"));
    }

    #[tokio::test]
    async fn unmapped_side_or_topic_is_a_mismatch() {
        let serde = serde();
        let ctx = SerdeContext::new();
        let record = KafkaRecord::new("quotes.nyse").with_key(vec![0x0a, 0x00]).with_value(vec![0x0a, 0x00]);
        let err = serde.deserialize_payload(&ctx, &record, PayloadType::Key).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Mismatch);

        let other = KafkaRecord::new("orders").with_value(vec![0x0a, 0x00]);
        let err = serde.deserialize_payload(&ctx, &other, PayloadType::Value).await.unwrap_err();
        assert!(err.message().contains("no prototype found"));
    }

    #[tokio::test]
    async fn serialization_by_explicit_type() {
        let opts = SerializeOptions::default().message_type("market.Quote");
        let bytes = serde()
            .serialize_object(&SerdeContext::new(), Object::from(r#"{"symbol":"X"}"#), PayloadType::Value, &opts)
            .await
            .unwrap();
        assert_eq!(bytes, vec![0x0a, 0x01, b'X']);

        let err = serde()
            .serialize_object(&SerdeContext::new(), Object::from("{}"), PayloadType::Value, &SerializeOptions::default())
            .await
            .unwrap_err();
        assert!(err.message().contains("message type or a topic"));
    }
}
