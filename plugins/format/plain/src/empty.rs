use recscope_api::{
    payload_from_record, ready, require_payload, BoxFuture, DeserializedPayload, KafkaRecord,
    Object, PayloadEncoding, PayloadType, RecordPayload, Serde, SerdeContext, SerdeError,
    SerializeOptions,
};

/// Zero-length payload.
pub struct NoneSerde;

impl NoneSerde {
    fn decode(&self, record: &KafkaRecord, payload_type: PayloadType) -> Result<RecordPayload, SerdeError> {
        let payload = require_payload(record, payload_type)?;
        if !payload.is_empty() {
            return Err(SerdeError::mismatch("payload is not empty as expected for none encoding"));
        }
        Ok(RecordPayload::decoded(
            PayloadEncoding::None,
            Vec::new(),
            DeserializedPayload::Bytes(Vec::new()),
        ))
    }
}

impl Serde for NoneSerde {
    fn name(&self) -> PayloadEncoding {
        PayloadEncoding::None
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
        _obj: Object,
        _payload_type: PayloadType,
        _opts: &'a SerializeOptions,
    ) -> BoxFuture<'a, Result<Vec<u8>, SerdeError>> {
        ready(Ok(Vec::new()))
    }
}

/// Kafka null (absent payload, e.g. a tombstone value).
pub struct NullSerde;

impl NullSerde {
    fn decode(&self, record: &KafkaRecord, payload_type: PayloadType) -> Result<RecordPayload, SerdeError> {
        match payload_from_record(record, payload_type) {
            None => Ok(RecordPayload::null()),
            Some(_) => Err(SerdeError::mismatch("payload is not null")),
        }
    }
}

impl Serde for NullSerde {
    fn name(&self) -> PayloadEncoding {
        PayloadEncoding::Null
    }

    fn deserialize_payload<'a>(
        &'a self,
        _ctx: &'a SerdeContext,
        record: &'a KafkaRecord,
        payload_type: PayloadType,
    ) -> BoxFuture<'a, Result<RecordPayload, SerdeError>> {
        ready(self.decode(record, payload_type))
    }

    /// The bytes are irrelevant: the caller produces an absent payload.
    fn serialize_object<'a>(
        &'a self,
        _ctx: &'a SerdeContext,
        _obj: Object,
        _payload_type: PayloadType,
        _opts: &'a SerializeOptions,
    ) -> BoxFuture<'a, Result<Vec<u8>, SerdeError>> {
        ready(Ok(Vec::new()))
    }
}
