use recscope_api::{
    ready, require_payload, trim_left_whitespace, BoxFuture, DeserializedPayload, KafkaRecord,
    Object, PayloadEncoding, PayloadType, RecordPayload, Serde, SerdeContext, SerdeError,
    SerializeOptions,
};

fn text_payload(encoding: PayloadEncoding, text: &str) -> RecordPayload {
    RecordPayload::decoded(
        encoding,
        text.as_bytes().to_vec(),
        DeserializedPayload::Value(serde_json::Value::String(text.to_string())),
    )
}

/// String objects and UTF-8 byte objects pass through; a JSON string value
/// is written without quotes.
fn encode_text(obj: Object, encoding: PayloadEncoding) -> Result<Vec<u8>, SerdeError> {
    match obj {
        Object::Str(s) => Ok(s.into_bytes()),
        Object::Bytes(b) => {
            std::str::from_utf8(&b)
                .map_err(|e| SerdeError::new(format!("{encoding} input is not valid UTF-8: {e}")))?;
            Ok(b)
        }
        Object::Value(serde_json::Value::String(s)) => Ok(s.into_bytes()),
        Object::Value(other) => Err(SerdeError::new(format!(
            "unsupported type for {encoding} serialization: {}",
            json_type_name(&other)
        ))),
    }
}

pub(crate) fn json_type_name(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "bool",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}

// ════════════════════════════════════════════════════════════════
//  Text
// ════════════════════════════════════════════════════════════════

/// Any valid UTF-8. Whitespace-only payloads decode as empty text.
pub struct TextSerde;

impl TextSerde {
    fn decode(&self, record: &KafkaRecord, payload_type: PayloadType) -> Result<RecordPayload, SerdeError> {
        let payload = require_payload(record, payload_type)?;
        if trim_left_whitespace(payload).is_empty() {
            return Ok(text_payload(PayloadEncoding::Text, ""));
        }
        let text = std::str::from_utf8(payload)
            .map_err(|_| SerdeError::mismatch("payload is not UTF-8"))?;
        Ok(text_payload(PayloadEncoding::Text, text))
    }
}

impl Serde for TextSerde {
    fn name(&self) -> PayloadEncoding {
        PayloadEncoding::Text
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
        ready(encode_text(obj, PayloadEncoding::Text))
    }
}

// ════════════════════════════════════════════════════════════════
//  UTF-8 with control characters
// ════════════════════════════════════════════════════════════════

/// Valid UTF-8 that contains at least one C0 or C1 control character.
pub struct Utf8Serde;

fn is_control(c: char) -> bool {
    matches!(c as u32, 0x00..=0x1f | 0x7f..=0x9f)
}

impl Utf8Serde {
    fn decode(&self, record: &KafkaRecord, payload_type: PayloadType) -> Result<RecordPayload, SerdeError> {
        let payload = require_payload(record, payload_type)?;
        if trim_left_whitespace(payload).is_empty() {
            return Err(SerdeError::mismatch("payload is empty after trimming whitespace"));
        }
        let text = std::str::from_utf8(payload)
            .map_err(|_| SerdeError::mismatch("payload is not UTF-8"))?;
        if !text.chars().any(is_control) {
            return Err(SerdeError::mismatch("payload does not contain UTF-8 control characters"));
        }
        Ok(text_payload(PayloadEncoding::Utf8, text))
    }
}

impl Serde for Utf8Serde {
    fn name(&self) -> PayloadEncoding {
        PayloadEncoding::Utf8
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
        ready(encode_text(obj, PayloadEncoding::Utf8))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{decode_value, encode};

    #[tokio::test]
    async fn text_accepts_utf8_and_blank() {
        let p = decode_value(&TextSerde, "héllo".as_bytes()).await.unwrap();
        assert_eq!(p.encoding, PayloadEncoding::Text);
        assert_eq!(p.normalized_payload.as_deref(), Some("héllo".as_bytes()));

        let blank = decode_value(&TextSerde, b"  \n").await.unwrap();
        assert_eq!(blank.normalized_payload.as_deref(), Some(&b""[..]));

        let err = decode_value(&TextSerde, &[0xff, 0xfe]).await.unwrap_err();
        assert!(err.message().contains("UTF-8"));
    }

    #[tokio::test]
    async fn utf8_requires_control_character() {
        assert!(decode_value(&Utf8Serde, b"plain").await.is_err());
        assert!(decode_value(&Utf8Serde, b"   ").await.is_err());

        let p = decode_value(&Utf8Serde, b"a\x01b").await.unwrap();
        assert_eq!(p.encoding, PayloadEncoding::Utf8);

        // U+0085 NEXT LINE is a C1 control
        let p = decode_value(&Utf8Serde, "a\u{85}b".as_bytes()).await.unwrap();
        assert_eq!(p.encoding, PayloadEncoding::Utf8);
    }

    #[tokio::test]
    async fn text_serialization_passes_bytes_through() {
        let bytes = encode(&TextSerde, "hello", Default::default()).await.unwrap();
        assert_eq!(bytes, b"hello");

        let decoded = decode_value(&TextSerde, &bytes).await.unwrap();
        assert_eq!(decoded.normalized_payload.unwrap(), bytes);

        let err = encode(&TextSerde, vec![0xffu8], Default::default()).await.unwrap_err();
        assert!(err.message().contains("UTF-8"));

        let err = encode(&TextSerde, serde_json::json!({"a": 1}), Default::default())
            .await
            .unwrap_err();
        assert!(err.message().contains("object"));
    }
}
