//! Avro datums framed with the Confluent header, schemas fetched from the
//! schema registry by ID.

mod convert;

use std::sync::Arc;

use apache_avro::Schema;

use recscope_api::wire::{split_header, write_header, HEADER_LEN};
use recscope_api::{
    require_payload, BoxFuture, KafkaRecord, Object, PayloadEncoding, PayloadType, RecordPayload,
    Serde, SerdeContext, SerdeError, SerializeOptions,
};
use recscope_registry::{
    resolve_references, schema_id_for, CachePolicy, SchemaRegistry, SchemaType, SingleFlightCache,
};

pub use convert::{avro_to_json, json_to_avro, NamedTypes};

/// A registry schema parsed together with everything it references.
pub struct CompiledSchema {
    root: Schema,
    references: Vec<Schema>,
    named: NamedTypes,
}

impl CompiledSchema {
    /// Parse `root`, with `references` as the named types it may refer to.
    pub fn parse(root: &str, references: &[&str]) -> Result<Self, SerdeError> {
        let parse_err = |e: apache_avro::Error| SerdeError::new(format!("failed to parse avro schema: {e}"));
        let (root, references) = if references.is_empty() {
            (Schema::parse_str(root).map_err(parse_err)?, Vec::new())
        } else {
            let mut sources: Vec<&str> = references.to_vec();
            sources.push(root);
            let mut parsed = Schema::parse_list(&sources[..]).map_err(parse_err)?;
            let root = parsed
                .pop()
                .ok_or_else(|| SerdeError::new("failed to parse avro schema: empty schema list"))?;
            (root, parsed)
        };
        let named = NamedTypes::collect(references.iter().chain(std::iter::once(&root)));
        Ok(Self { root, references, named })
    }

    pub fn root(&self) -> &Schema {
        &self.root
    }

    pub fn decode(&self, mut body: &[u8]) -> Result<serde_json::Value, SerdeError> {
        let value = apache_avro::from_avro_datum_schemata(
            &self.root,
            self.references.iter().collect(),
            &mut body,
            None,
        )
        .map_err(|e| SerdeError::mismatch(format!("failed to decode avro payload: {e}")))?;
        Ok(avro_to_json(&value))
    }

    pub fn encode(&self, value: &serde_json::Value) -> Result<Vec<u8>, SerdeError> {
        let datum = json_to_avro(value, &self.root, &self.named)?;
        apache_avro::to_avro_datum_schemata(&self.root, self.references.iter().collect(), datum)
            .map_err(|e| SerdeError::new(format!("failed to encode avro datum: {e}")))
    }
}

/// Confluent-framed Avro.
///
/// Parsed schemas are cached by ID for the lifetime of the codec: registry
/// schema IDs are immutable.
pub struct AvroSerde {
    registry: Option<Arc<dyn SchemaRegistry>>,
    schemas: SingleFlightCache<u32, Arc<CompiledSchema>>,
}

impl AvroSerde {
    pub fn new(registry: Option<Arc<dyn SchemaRegistry>>) -> Self {
        Self {
            registry,
            schemas: SingleFlightCache::new(CachePolicy::immutable()),
        }
    }

    fn registry(&self) -> Result<&dyn SchemaRegistry, SerdeError> {
        self.registry
            .as_deref()
            .ok_or_else(|| SerdeError::config("avro requires a schema registry, which is not configured"))
    }

    async fn compiled(&self, ctx: &SerdeContext, schema_id: u32) -> Result<Arc<CompiledSchema>, SerdeError> {
        let registry = self.registry()?;
        self.schemas
            .get_or_fetch(ctx, schema_id, move || async move {
                let schema = registry
                    .schema_by_id(schema_id)
                    .await
                    .map_err(|e| SerdeError::from(e).with_context(format!("schema id {schema_id}")))?;
                if schema.schema_type != SchemaType::Avro {
                    return Err(SerdeError::mismatch(format!(
                        "schema id {schema_id} is a {:?} schema, not avro",
                        schema.schema_type
                    )));
                }
                let references = resolve_references(registry, &schema).await?;
                let sources: Vec<&str> = references.iter().map(|r| r.schema.schema.as_str()).collect();
                let compiled = CompiledSchema::parse(&schema.schema, &sources)?;
                tracing::debug!(schema_id, references = references.len(), "compiled avro schema");
                Ok(Arc::new(compiled))
            })
            .await
    }

    async fn decode(
        &self,
        ctx: &SerdeContext,
        record: &KafkaRecord,
        payload_type: PayloadType,
    ) -> Result<RecordPayload, SerdeError> {
        let payload = require_payload(record, payload_type)?;
        let (schema_id, body) = split_header(payload, "avro")?;
        let schema = self.compiled(ctx, schema_id).await?;
        let value = schema.decode(body)?;
        Ok(RecordPayload::from_json_value(PayloadEncoding::Avro, value)?.with_schema_id(schema_id))
    }

    async fn encode(&self, ctx: &SerdeContext, obj: Object, opts: &SerializeOptions) -> Result<Vec<u8>, SerdeError> {
        let schema_id = schema_id_for(ctx, self.registry.as_deref(), opts).await?;
        let schema = self.compiled(ctx, schema_id).await?;
        let value = obj.to_json_value()?;
        let datum = schema.encode(&value)?;
        let mut out = Vec::with_capacity(HEADER_LEN + datum.len());
        write_header(schema_id, &mut out);
        out.extend_from_slice(&datum);
        Ok(out)
    }
}

impl Serde for AvroSerde {
    fn name(&self) -> PayloadEncoding {
        PayloadEncoding::Avro
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

#[cfg(test)]
mod tests {
    use super::*;
    use recscope_api::ErrorKind;
    use recscope_registry::{InMemoryRegistry, Schema as RegistrySchema};
    use serde_json::json;

    const ORDER: &str = r#"{
        "type": "record",
        "name": "Order",
        "namespace": "shop",
        "fields": [
            {"name": "id", "type": "string"},
            {"name": "qty", "type": "int"},
            {"name": "note", "type": ["null", "string"], "default": null}
        ]
    }"#;

    fn registry_with_order() -> (Arc<InMemoryRegistry>, u32) {
        let registry = Arc::new(InMemoryRegistry::new());
        let id = registry.register("orders-value", RegistrySchema::new(SchemaType::Avro, ORDER));
        (registry, id)
    }

    async fn decode(serde: &AvroSerde, value: &[u8]) -> Result<RecordPayload, SerdeError> {
        let record = KafkaRecord::new("orders").with_value(value.to_vec());
        serde
            .deserialize_payload(&SerdeContext::new(), &record, PayloadType::Value)
            .await
    }

    fn framed(id: u32, body: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        write_header(id, &mut out);
        out.extend_from_slice(body);
        out
    }

    #[tokio::test]
    async fn decodes_registry_framed_datum() {
        let (registry, id) = registry_with_order();
        let serde = AvroSerde::new(Some(registry));

        // "a1" (len 2 zigzag → 4), qty 3 (→ 6), note branch 1 "hi"
        let body = [0x04, b'a', b'1', 0x06, 0x02, 0x04, b'h', b'i'];
        let p = decode(&serde, &framed(id, &body)).await.unwrap();
        assert_eq!(p.encoding, PayloadEncoding::Avro);
        assert_eq!(p.schema_id, Some(id));
        assert_eq!(p.normalized_json(), Some(json!({"id": "a1", "qty": 3, "note": "hi"})));
    }

    #[tokio::test]
    async fn unknown_schema_id_is_a_dependency_failure() {
        let (registry, _) = registry_with_order();
        let serde = AvroSerde::new(Some(registry));
        let err = decode(&serde, &[0, 0, 0, 0, 42, 0]).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Dependency);
        assert!(err.message().contains("not found"));
    }

    #[tokio::test]
    async fn header_only_payload_is_too_small() {
        let (registry, _) = registry_with_order();
        let err = decode(&AvroSerde::new(Some(registry)), &[0, 0, 0, 0, 1]).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Mismatch);
    }

    #[tokio::test]
    async fn missing_registry_is_a_config_error() {
        let err = decode(&AvroSerde::new(None), &[0, 0, 0, 0, 1, 0]).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Config);
    }

    #[tokio::test]
    async fn non_avro_schema_is_rejected() {
        let registry = Arc::new(InMemoryRegistry::new());
        let id = registry.register("x", RegistrySchema::new(SchemaType::Json, "{}"));
        let err = decode(&AvroSerde::new(Some(registry)), &framed(id, &[0])).await.unwrap_err();
        assert!(err.message().contains("not avro"));
    }

    #[tokio::test]
    async fn serializes_by_subject_and_decodes_back() {
        let (registry, id) = registry_with_order();
        let serde = AvroSerde::new(Some(registry));
        let opts = SerializeOptions::default().subject("orders-value");

        let bytes = serde
            .serialize_object(
                &SerdeContext::new(),
                Object::from(json!({"id": "b", "qty": 10})),
                PayloadType::Value,
                &opts,
            )
            .await
            .unwrap();
        assert_eq!(&bytes[..HEADER_LEN], &framed(id, &[])[..]);

        let back = decode(&serde, &bytes).await.unwrap();
        assert_eq!(back.normalized_json(), Some(json!({"id": "b", "qty": 10, "note": null})));
    }

    #[tokio::test]
    async fn invalid_value_is_reported() {
        let (registry, id) = registry_with_order();
        let serde = AvroSerde::new(Some(registry));
        let err = serde
            .serialize_object(
                &SerdeContext::new(),
                Object::from(json!({"id": 1, "qty": 1})),
                PayloadType::Value,
                &SerializeOptions::default().schema_id(id),
            )
            .await
            .unwrap_err();
        assert!(err.message().contains("field 'id'"));
    }

    #[tokio::test]
    async fn resolves_schema_references() {
        let registry = Arc::new(InMemoryRegistry::new());
        registry.register(
            "money",
            RegistrySchema::new(
                SchemaType::Avro,
                r#"{"type":"record","name":"Money","namespace":"shop","fields":[{"name":"cents","type":"long"}]}"#,
            ),
        );
        let id = registry.register(
            "invoice-value",
            RegistrySchema::new(
                SchemaType::Avro,
                r#"{"type":"record","name":"Invoice","namespace":"shop","fields":[{"name":"total","type":"shop.Money"}]}"#,
            )
            .with_reference("shop.Money", "money", 1),
        );
        let serde = AvroSerde::new(Some(registry));

        let bytes = serde
            .serialize_object(
                &SerdeContext::new(),
                Object::from(json!({"total": {"cents": 250}})),
                PayloadType::Value,
                &SerializeOptions::default().schema_id(id),
            )
            .await
            .unwrap();
        let back = decode(&serde, &bytes).await.unwrap();
        assert_eq!(back.normalized_json(), Some(json!({"total": {"cents": 250}})));
    }
}
