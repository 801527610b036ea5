use recscope_api::{
    ready, require_payload, BoxFuture, DeserializedPayload, KafkaRecord, Object, PayloadEncoding,
    PayloadType, RecordPayload, Serde, SerdeContext, SerdeError, SerializeOptions, UintSize,
};

use crate::text::json_type_name;

/// Big-endian unsigned integer of 1, 2, 4 or 8 bytes.
///
/// Other widths are never attempted even though they could be decoded: a
/// looser check would claim too many genuinely binary payloads.
pub struct UintSerde;

impl UintSerde {
    fn decode(&self, record: &KafkaRecord, payload_type: PayloadType) -> Result<RecordPayload, SerdeError> {
        let payload = require_payload(record, payload_type)?;
        let value: u64 = match payload.len() {
            1 => u64::from(payload[0]),
            2 => u64::from(u16::from_be_bytes([payload[0], payload[1]])),
            4 => u64::from(u32::from_be_bytes([payload[0], payload[1], payload[2], payload[3]])),
            8 => {
                let mut buf = [0u8; 8];
                buf.copy_from_slice(payload);
                u64::from_be_bytes(buf)
            }
            n => {
                return Err(SerdeError::mismatch(format!(
                    "payload length {n} is not a valid unsigned integer width (1, 2, 4 or 8 bytes)"
                )));
            }
        };
        Ok(RecordPayload::decoded(
            PayloadEncoding::Uint,
            value.to_string().into_bytes(),
            DeserializedPayload::Value(serde_json::Value::from(value)),
        ))
    }

    fn encode(&self, obj: Object, size: UintSize) -> Result<Vec<u8>, SerdeError> {
        let value: u64 = match &obj {
            Object::Str(s) => parse_decimal(s)?,
            Object::Bytes(b) => parse_decimal(
                std::str::from_utf8(b).map_err(|e| SerdeError::new(format!("uint input is not UTF-8: {e}")))?,
            )?,
            Object::Value(serde_json::Value::Number(n)) => n
                .as_u64()
                .ok_or_else(|| SerdeError::new(format!("{n} is not an unsigned integer")))?,
            Object::Value(serde_json::Value::String(s)) => parse_decimal(s)?,
            Object::Value(other) => {
                return Err(SerdeError::new(format!(
                    "unsupported type for uint serialization: {}",
                    json_type_name(other)
                )));
            }
        };

        let bytes = value.to_be_bytes();
        let width = size.byte_len();
        if bytes[..8 - width].iter().any(|b| *b != 0) {
            return Err(SerdeError::new(format!(
                "value {value} does not fit in {width} byte(s)"
            )));
        }
        Ok(bytes[8 - width..].to_vec())
    }
}

fn parse_decimal(s: &str) -> Result<u64, SerdeError> {
    s.trim()
        .parse::<u64>()
        .map_err(|e| SerdeError::new(format!("'{s}' is not an unsigned integer: {e}")))
}

impl Serde for UintSerde {
    fn name(&self) -> PayloadEncoding {
        PayloadEncoding::Uint
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
        opts: &'a SerializeOptions,
    ) -> BoxFuture<'a, Result<Vec<u8>, SerdeError>> {
        ready(self.encode(obj, opts.uint_size))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{decode_value, encode};

    #[tokio::test]
    async fn decodes_big_endian_u32() {
        let p = decode_value(&UintSerde, &[0x74, 0x55, 0xA2, 0xF4]).await.unwrap();
        assert_eq!(p.encoding, PayloadEncoding::Uint);
        assert_eq!(p.normalized_payload.as_deref(), Some(&b"1951769332"[..]));
        assert_eq!(
            p.deserialized_payload.unwrap().as_value().unwrap(),
            &serde_json::json!(1951769332u64)
        );
    }

    #[tokio::test]
    async fn rejects_odd_widths() {
        for len in [0usize, 3, 5, 6, 7, 9] {
            let err = decode_value(&UintSerde, &vec![1u8; len]).await.unwrap_err();
            assert!(err.message().contains("width"), "len {len}: {err}");
        }
    }

    #[tokio::test]
    async fn serializes_with_requested_width() {
        let opts = SerializeOptions::default().uint_size(UintSize::U32);
        let bytes = encode(&UintSerde, "1951769332", opts).await.unwrap();
        assert_eq!(bytes, vec![0x74, 0x55, 0xA2, 0xF4]);

        let bytes = encode(&UintSerde, serde_json::json!(513), SerializeOptions::default().uint_size(UintSize::U16))
            .await
            .unwrap();
        assert_eq!(bytes, vec![0x02, 0x01]);

        let bytes = encode(&UintSerde, "7", SerializeOptions::default()).await.unwrap();
        assert_eq!(bytes, vec![0, 0, 0, 0, 0, 0, 0, 7]);
    }

    #[tokio::test]
    async fn round_trips_bytes() {
        let raw = vec![0x00, 0x00, 0x01, 0x00];
        let decoded = decode_value(&UintSerde, &raw).await.unwrap();
        let text = String::from_utf8(decoded.normalized_payload.unwrap()).unwrap();
        let again = encode(&UintSerde, text, SerializeOptions::default().uint_size(UintSize::U32))
            .await
            .unwrap();
        assert_eq!(again, raw);
    }

    #[tokio::test]
    async fn overflow_is_rejected() {
        let err = encode(&UintSerde, "256", SerializeOptions::default().uint_size(UintSize::U8))
            .await
            .unwrap_err();
        assert!(err.message().contains("does not fit"));
        assert!(encode(&UintSerde, "-1", SerializeOptions::default()).await.is_err());
    }
}
