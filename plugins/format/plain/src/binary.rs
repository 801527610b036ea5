use recscope_api::{
    ready, require_payload, BoxFuture, DeserializedPayload, KafkaRecord, Object, PayloadEncoding,
    PayloadType, RecordPayload, Serde, SerdeContext, SerdeError, SerializeOptions,
};

/// Terminal fallback: any present payload, kept as raw bytes. Presentation
/// (hex, base64) is left to the caller.
pub struct BinarySerde;

impl BinarySerde {
    fn decode(&self, record: &KafkaRecord, payload_type: PayloadType) -> Result<RecordPayload, SerdeError> {
        let payload = require_payload(record, payload_type)?;
        Ok(RecordPayload::decoded(
            PayloadEncoding::Binary,
            payload.to_vec(),
            DeserializedPayload::Bytes(payload.to_vec()),
        ))
    }
}

impl Serde for BinarySerde {
    fn name(&self) -> PayloadEncoding {
        PayloadEncoding::Binary
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
        let result = match obj {
            Object::Bytes(b) => Ok(b),
            Object::Str(s) => Ok(s.into_bytes()),
            Object::Value(_) => Err(SerdeError::new("binary serialization requires string or bytes input")),
        };
        ready(result)
    }
}
