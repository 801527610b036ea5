use std::sync::Arc;

use recscope_api::{
    require_payload, BoxFuture, KafkaRecord, Object, PayloadEncoding, PayloadType, RecordPayload, Serde,
    SerdeContext, SerdeError, SerializeOptions,
};
use recscope_registry::{BsrClient, BSR_COMMIT_HEADER, BSR_MESSAGE_HEADER};

use crate::message::{decode_to_json, encode_object};

/// Message type and commit as carried in the record headers.
///
/// Both keys and values read the value-side header names.
struct BsrHeaders<'a> {
    message: &'a str,
    commit: &'a str,
}

impl<'a> BsrHeaders<'a> {
    fn from_record(record: &'a KafkaRecord) -> Result<Self, SerdeError> {
        let read = |key: &str| -> Result<&'a str, SerdeError> {
            let raw = record
                .header(key)
                .ok_or_else(|| SerdeError::mismatch(format!("missing required header '{key}'")))?;
            let value = std::str::from_utf8(raw)
                .map_err(|_| SerdeError::mismatch(format!("header '{key}' is not valid UTF-8")))?
                .trim();
            if value.is_empty() {
                return Err(SerdeError::mismatch(format!("header '{key}' is empty")));
            }
            Ok(value)
        };
        Ok(Self {
            message: read(BSR_MESSAGE_HEADER)?,
            commit: read(BSR_COMMIT_HEADER)?,
        })
    }
}

/// Header-free protobuf whose type is resolved through the Buf Schema
/// Registry.
pub struct ProtobufBsrSerde {
    client: Arc<BsrClient>,
}

impl ProtobufBsrSerde {
    pub fn new(client: Arc<BsrClient>) -> Self {
        Self { client }
    }

    async fn decode(
        &self,
        ctx: &SerdeContext,
        record: &KafkaRecord,
        payload_type: PayloadType,
    ) -> Result<RecordPayload, SerdeError> {
        let headers = BsrHeaders::from_record(record)?;
        let payload = require_payload(record, payload_type)?;
        if payload.is_empty() {
            return Err(SerdeError::mismatch("payload is empty"));
        }
        let descriptor = self.client.message_descriptor(ctx, headers.message, headers.commit).await?;
        let value = decode_to_json(descriptor, payload)?;
        Ok(RecordPayload::from_json_value(PayloadEncoding::ProtobufBsr, value)?
            .with_metadata("messageType", headers.message)
            .with_metadata("commit", headers.commit))
    }

    async fn encode(&self, ctx: &SerdeContext, obj: Object, opts: &SerializeOptions) -> Result<Vec<u8>, SerdeError> {
        let (Some(message), Some(commit)) = (opts.message_type.as_deref(), opts.commit.as_deref()) else {
            return Err(SerdeError::new("bsr serialization needs both a message type and a commit"));
        };
        let descriptor = self.client.message_descriptor(ctx, message, commit).await?;
        encode_object(descriptor, obj)
    }
}

impl Serde for ProtobufBsrSerde {
    fn name(&self) -> PayloadEncoding {
        PayloadEncoding::ProtobufBsr
    }

    fn deserialize_payload<'a>(
        &'a self,
        ctx: &'a SerdeContext,
        record: &'a KafkaRecord,
        payload_type: PayloadType,
    ) -> BoxFuture<'a, Result<RecordPayload, SerdeError>> {
        Box::pin(self.decode(ctx, record, payload_type))
    }

    fn serialize_object<'a>(
        &'a self,
        ctx: &'a SerdeContext,
        obj: Object,
        _payload_type: PayloadType,
        opts: &'a SerializeOptions,
    ) -> BoxFuture<'a, Result<Vec<u8>, SerdeError>> {
        Box::pin(self.encode(ctx, obj, opts))
    }
}
