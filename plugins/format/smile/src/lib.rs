//! Smile (binary JSON) codec with its own reader and writer.

mod reader;
mod writer;

pub use reader::smile_to_json;
pub use writer::json_to_smile;

use recscope_api::{
    ready, require_payload, trim_left_whitespace, BoxFuture, KafkaRecord, Object, PayloadEncoding,
    PayloadType, RecordPayload, Serde, SerdeContext, SerdeError, SerializeOptions,
};

/// `:)\n`
pub const MAGIC: [u8; 3] = [0x3a, 0x29, 0x0a];
const MAX_SHARED: usize = 1024;

pub struct SmileSerde;

impl SmileSerde {
    fn decode(&self, record: &KafkaRecord, payload_type: PayloadType) -> Result<RecordPayload, SerdeError> {
        let payload = require_payload(record, payload_type)?;
        let trimmed = trim_left_whitespace(payload);
        if trimmed.is_empty() {
            return Err(SerdeError::mismatch("payload is empty after trimming whitespace"));
        }
        if trimmed.len() < MAGIC.len() || trimmed[..MAGIC.len()] != MAGIC {
            return Err(SerdeError::mismatch("first bytes do not match the smile header"));
        }
        let value = smile_to_json(trimmed)?;
        Ok(RecordPayload::from_json_value(PayloadEncoding::Smile, value)?)
    }

    fn encode(&self, obj: Object) -> Result<Vec<u8>, SerdeError> {
        let value = match obj {
            Object::Bytes(b) => {
                smile_to_json(&b)
                    .map_err(|e| SerdeError::new(format!("input is not valid smile: {}", e.message())))?;
                return Ok(b);
            }
            other => other.to_json_value()?,
        };
        Ok(json_to_smile(&value))
    }
}

impl Serde for SmileSerde {
    fn name(&self) -> PayloadEncoding {
        PayloadEncoding::Smile
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

    async fn decode(value: &[u8]) -> Result<RecordPayload, SerdeError> {
        let record = KafkaRecord::new("t").with_value(value.to_vec());
        SmileSerde
            .deserialize_payload(&SerdeContext::new(), &record, PayloadType::Value)
            .await
    }

    #[tokio::test]
    async fn decodes_to_json_equivalent() {
        let data = [0x3a, 0x29, 0x0a, 0x01, 0xfa, 0x82, b'f', b'o', b'o', 0x22, 0xfb];
        let p = decode(&data).await.unwrap();
        assert_eq!(p.encoding, PayloadEncoding::Smile);
        assert_eq!(p.normalized_payload.as_deref(), Some(&br#"{"foo":false}"#[..]));
    }

    #[tokio::test]
    async fn rejects_without_magic() {
        assert!(decode(b"{}").await.unwrap_err().message().contains("header"));
        assert!(decode(b":)").await.is_err());
        assert!(decode(b" ").await.unwrap_err().message().contains("empty"));
    }

    #[tokio::test]
    async fn serializes_json_string() {
        let bytes = SmileSerde
            .serialize_object(&SerdeContext::new(), Object::from(r#"{"foo":false}"#), PayloadType::Value, &Default::default())
            .await
            .unwrap();
        assert_eq!(&bytes[..3], &MAGIC);
        assert_eq!(smile_to_json(&bytes).unwrap(), json!({"foo": false}));
    }
}
