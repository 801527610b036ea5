mod schema;

pub use schema::JsonSchemaSerde;

use recscope_api::{
    ready, require_payload, trim_left_whitespace, BoxFuture, KafkaRecord, Object, PayloadEncoding,
    PayloadType, RecordPayload, Serde, SerdeContext, SerdeError, SerializeOptions,
};

/// Parse a JSON document, rejecting anything that does not open with an
/// object or array before touching the parser.
pub(crate) fn decode_document(payload: &[u8]) -> Result<serde_json::Value, SerdeError> {
    let trimmed = trim_left_whitespace(payload);
    match trimmed.first() {
        None => Err(SerdeError::mismatch("payload is empty after trimming whitespace")),
        Some(b'[' | b'{') => serde_json::from_slice(trimmed)
            .map_err(|e| SerdeError::mismatch(format!("failed to parse JSON payload: {e}"))),
        Some(_) => Err(SerdeError::mismatch("first byte indicates this is not valid JSON, expected brackets")),
    }
}

/// JSON bytes for `obj`: strings and bytes must already be JSON and are
/// kept verbatim, structured values are rendered compactly.
pub(crate) fn encode_document(obj: Object) -> Result<Vec<u8>, SerdeError> {
    match obj {
        Object::Str(s) => {
            serde_json::from_str::<serde::de::IgnoredAny>(&s)
                .map_err(|e| SerdeError::new(format!("input is not valid JSON: {e}")))?;
            Ok(s.into_bytes())
        }
        Object::Bytes(b) => {
            serde_json::from_slice::<serde::de::IgnoredAny>(&b)
                .map_err(|e| SerdeError::new(format!("input is not valid JSON: {e}")))?;
            Ok(b)
        }
        Object::Value(v) => Ok(serde_json::to_vec(&v)?),
    }
}

pub struct JsonSerde;

impl JsonSerde {
    fn decode(&self, record: &KafkaRecord, payload_type: PayloadType) -> Result<RecordPayload, SerdeError> {
        let payload = require_payload(record, payload_type)?;
        let value = decode_document(payload)?;
        Ok(RecordPayload::from_json_value(PayloadEncoding::Json, value)?)
    }
}

impl Serde for JsonSerde {
    fn name(&self) -> PayloadEncoding {
        PayloadEncoding::Json
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
        ready(encode_document(obj))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use recscope_api::ErrorKind;
    use serde_json::json;

    async fn decode(value: &[u8]) -> Result<RecordPayload, SerdeError> {
        let record = KafkaRecord::new("orders").with_value(value.to_vec());
        JsonSerde
            .deserialize_payload(&SerdeContext::new(), &record, PayloadType::Value)
            .await
    }

    #[tokio::test]
    async fn decodes_object() {
        let p = decode(br#"{"name":"John","age":30}"#).await.unwrap();
        assert_eq!(p.encoding, PayloadEncoding::Json);
        let v = p.deserialized_payload.unwrap();
        assert_eq!(v.as_value().unwrap(), &json!({"name": "John", "age": 30}));
    }

    #[tokio::test]
    async fn leading_whitespace_is_ignored() {
        let p = decode(b"\n  [1, 2]").await.unwrap();
        assert_eq!(p.normalized_payload.as_deref(), Some(&b"[1,2]"[..]));
    }

    #[tokio::test]
    async fn cheap_rejections() {
        let err = decode(b"   ").await.unwrap_err();
        assert!(err.message().contains("empty"));
        let err = decode(b"42").await.unwrap_err();
        assert!(err.message().contains("brackets"));
        assert_eq!(err.kind(), ErrorKind::Mismatch);
        assert!(decode(b"{broken").await.is_err());
    }

    #[tokio::test]
    async fn serializes_strings_verbatim_and_values_compactly() {
        let ctx = SerdeContext::new();
        let opts = SerializeOptions::default();
        let raw = JsonSerde
            .serialize_object(&ctx, Object::from(r#"{ "a": 1 }"#), PayloadType::Value, &opts)
            .await
            .unwrap();
        assert_eq!(raw, br#"{ "a": 1 }"#);

        let compact = JsonSerde
            .serialize_object(&ctx, Object::from(json!({"a": [true]})), PayloadType::Value, &opts)
            .await
            .unwrap();
        assert_eq!(compact, br#"{"a":[true]}"#);

        assert!(JsonSerde
            .serialize_object(&ctx, Object::from("not json"), PayloadType::Value, &opts)
            .await
            .is_err());
    }
}
