use std::sync::Arc;

use recscope_api::wire::{read_message_indexes, split_header, write_header, write_message_indexes, HEADER_LEN};
use recscope_api::{
    require_payload, BoxFuture, KafkaRecord, Object, PayloadEncoding, PayloadType, RecordPayload, Serde,
    SerdeContext, SerdeError, SerializeOptions,
};
use recscope_registry::{schema_id_for, SchemaRegistry};

use crate::message::{decode_to_json, encode_object};
use crate::schema_id::{index_path, message_at, SchemaIdResolver};

/// Protobuf framed with the Confluent header and message-index path.
pub struct ProtobufSchemaSerde {
    resolver: Option<SchemaIdResolver>,
}

impl ProtobufSchemaSerde {
    pub fn new(registry: Option<Arc<dyn SchemaRegistry>>) -> Self {
        Self {
            resolver: registry.map(SchemaIdResolver::new),
        }
    }

    fn resolver(&self) -> Result<&SchemaIdResolver, SerdeError> {
        self.resolver
            .as_ref()
            .ok_or_else(|| SerdeError::config("protobuf-schema requires a schema registry, which is not configured"))
    }

    async fn decode(
        &self,
        ctx: &SerdeContext,
        record: &KafkaRecord,
        payload_type: PayloadType,
    ) -> Result<RecordPayload, SerdeError> {
        let payload = require_payload(record, payload_type)?;
        let (schema_id, body) = split_header(payload, "protobuf")?;
        let (indexes, message) = read_message_indexes(body)?;
        let descriptor = self.resolver()?.message_descriptor(ctx, schema_id, &indexes).await?;
        let type_name = descriptor.full_name().to_string();
        let value = decode_to_json(descriptor, message)?;
        Ok(RecordPayload::from_json_value(PayloadEncoding::ProtobufSchema, value)?
            .with_schema_id(schema_id)
            .with_metadata("messageType", type_name))
    }

    async fn encode(&self, ctx: &SerdeContext, obj: Object, opts: &SerializeOptions) -> Result<Vec<u8>, SerdeError> {
        let resolver = self.resolver()?;
        let schema_id = schema_id_for(ctx, Some(resolver.registry()), opts).await?;
        let file = resolver.file_descriptor(ctx, schema_id).await?;
        let indexes = match (&opts.index, &opts.message_type) {
            (Some(index), _) => index.clone(),
            (None, Some(name)) => index_path(&file, name).ok_or_else(|| {
                SerdeError::new(format!("message type '{name}' is not defined by schema {schema_id}"))
            })?,
            (None, None) => vec![0],
        };
        let descriptor = message_at(&file, &indexes)?;
        let message = encode_object(descriptor, obj)?;

        let mut out = Vec::with_capacity(HEADER_LEN + indexes.len() + 1 + message.len());
        write_header(schema_id, &mut out);
        write_message_indexes(&indexes, &mut out);
        out.extend_from_slice(&message);
        Ok(out)
    }
}

impl Serde for ProtobufSchemaSerde {
    fn name(&self) -> PayloadEncoding {
        PayloadEncoding::ProtobufSchema
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
