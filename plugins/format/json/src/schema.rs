use std::sync::Arc;

use recscope_api::wire::{split_header, write_header};
use recscope_api::{
    require_payload, BoxFuture, KafkaRecord, Object, PayloadEncoding, PayloadType, RecordPayload,
    Serde, SerdeContext, SerdeError, SerializeOptions,
};
use recscope_registry::{schema_id_for, SchemaRegistry};

use crate::{decode_document, encode_document};

/// JSON framed with the Confluent 5-byte header.
///
/// Decoding does not consult the registry: the body is plain JSON. The
/// registry is only used to look up a subject's schema ID when serializing.
pub struct JsonSchemaSerde {
    registry: Option<Arc<dyn SchemaRegistry>>,
}

impl JsonSchemaSerde {
    pub fn new(registry: Option<Arc<dyn SchemaRegistry>>) -> Self {
        Self { registry }
    }

    fn decode(&self, record: &KafkaRecord, payload_type: PayloadType) -> Result<RecordPayload, SerdeError> {
        let payload = require_payload(record, payload_type)?;
        let (schema_id, body) = split_header(payload, "JSON schema")?;
        let value = decode_document(body)?;
        Ok(RecordPayload::from_json_value(PayloadEncoding::JsonSchema, value)?.with_schema_id(schema_id))
    }
}

impl Serde for JsonSchemaSerde {
    fn name(&self) -> PayloadEncoding {
        PayloadEncoding::JsonSchema
    }

    fn deserialize_payload<'a>(
        &'a self,
        _ctx: &'a SerdeContext,
        record: &'a KafkaRecord,
        payload_type: PayloadType,
    ) -> BoxFuture<'a, Result<RecordPayload, SerdeError>> {
        recscope_api::ready(self.decode(record, payload_type))
    }

    fn serialize_object<'a>(
        &'a self,
        ctx: &'a SerdeContext,
        obj: Object,
        _payload_type: PayloadType,
        opts: &'a SerializeOptions,
    ) -> BoxFuture<'a, Result<Vec<u8>, SerdeError>> {
        Box::pin(async move {
            let body = encode_document(obj)?;
            let schema_id = schema_id_for(ctx, self.registry.as_deref(), opts).await?;
            let mut out = Vec::with_capacity(body.len() + 5);
            write_header(schema_id, &mut out);
            out.extend_from_slice(&body);
            Ok(out)
        })
    }
}
