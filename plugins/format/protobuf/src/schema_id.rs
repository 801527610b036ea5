use std::sync::Arc;

use prost_reflect::{FileDescriptor, MessageDescriptor};

use recscope_api::{SerdeContext, SerdeError};
use recscope_registry::{resolve_references, CachePolicy, Schema, SchemaRegistry, SchemaType, SingleFlightCache};

use crate::compile::{compile_in_memory, InMemorySources};

/// Compile a registry `.proto` schema, with its references as importable
/// files, and return the file it defines.
pub(crate) async fn compile_registry_schema(
    registry: &dyn SchemaRegistry,
    file_name: &str,
    schema: &Schema,
) -> Result<FileDescriptor, SerdeError> {
    let references = resolve_references(registry, schema).await?;
    let mut sources = InMemorySources::new();
    for reference in &references {
        sources.insert(reference.name.clone(), reference.schema.schema.clone());
    }
    sources.insert(file_name, schema.schema.clone());
    let pool = compile_in_memory(sources, &[file_name])?;
    pool.get_file_by_name(file_name)
        .ok_or_else(|| SerdeError::new(format!("compiled pool has no file '{file_name}'")))
}

/// Walk the Confluent message-index path: the first index selects a
/// top-level message of the file, each following one a nested message.
pub fn message_at(file: &FileDescriptor, indexes: &[i64]) -> Result<MessageDescriptor, SerdeError> {
    let Some((first, rest)) = indexes.split_first() else {
        return Err(SerdeError::new("empty message index path"));
    };
    let out_of_range = |idx: i64, parent: &str| {
        SerdeError::mismatch(format!("message index {idx} is out of range in '{parent}'"))
    };
    let mut message = usize::try_from(*first)
        .ok()
        .and_then(|i| file.messages().nth(i))
        .ok_or_else(|| out_of_range(*first, file.name()))?;
    for &idx in rest {
        let child = usize::try_from(idx)
            .ok()
            .and_then(|i| message.child_messages().nth(i))
            .ok_or_else(|| out_of_range(idx, message.full_name()))?;
        message = child;
    }
    Ok(message)
}

/// Index path of the message named `full_name` within `file`.
pub fn index_path(file: &FileDescriptor, full_name: &str) -> Option<Vec<i64>> {
    fn search(messages: impl Iterator<Item = MessageDescriptor>, full_name: &str, path: &mut Vec<i64>) -> bool {
        for (i, message) in messages.enumerate() {
            path.push(i as i64);
            if message.full_name() == full_name || search(message.child_messages(), full_name, path) {
                return true;
            }
            path.pop();
        }
        false
    }
    let mut path = Vec::new();
    search(file.messages(), full_name, &mut path).then_some(path)
}

// ════════════════════════════════════════════════════════════════
//  SchemaIdResolver
// ════════════════════════════════════════════════════════════════

/// Protobuf files compiled from schema-registry schemas, cached by ID.
pub struct SchemaIdResolver {
    registry: Arc<dyn SchemaRegistry>,
    files: SingleFlightCache<u32, FileDescriptor>,
}

impl SchemaIdResolver {
    pub fn new(registry: Arc<dyn SchemaRegistry>) -> Self {
        Self {
            registry,
            files: SingleFlightCache::new(CachePolicy::immutable()),
        }
    }

    pub fn registry(&self) -> &dyn SchemaRegistry {
        self.registry.as_ref()
    }

    pub async fn file_descriptor(&self, ctx: &SerdeContext, schema_id: u32) -> Result<FileDescriptor, SerdeError> {
        let registry = self.registry.as_ref();
        self.files
            .get_or_fetch(ctx, schema_id, move || async move {
                let schema = registry
                    .schema_by_id(schema_id)
                    .await
                    .map_err(|e| SerdeError::from(e).with_context(format!("schema id {schema_id}")))?;
                if schema.schema_type != SchemaType::Protobuf {
                    return Err(SerdeError::mismatch(format!(
                        "schema id {schema_id} is a {:?} schema, not protobuf",
                        schema.schema_type
                    )));
                }
                let file = compile_registry_schema(registry, &format!("schema-{schema_id}.proto"), &schema)
                    .await
                    .map_err(|e| {
                        tracing::warn!(schema_id, error = %e, "failed to compile protobuf schema from registry");
                        SerdeError::dependency(e.message())
                    })?;
                tracing::debug!(schema_id, messages = file.messages().count(), "compiled protobuf schema");
                Ok(file)
            })
            .await
    }

    pub async fn message_descriptor(
        &self,
        ctx: &SerdeContext,
        schema_id: u32,
        indexes: &[i64],
    ) -> Result<MessageDescriptor, SerdeError> {
        let file = self.file_descriptor(ctx, schema_id).await?;
        message_at(&file, indexes)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use recscope_api::ErrorKind;
    use recscope_registry::InMemoryRegistry;

    pub(crate) const SHOP: &str = r#"syntax = "proto3";
        package shop;
        message Order {
            string id = 1;
            message Line { string sku = 1; int32 qty = 2; }
            repeated Line lines = 2;
        }
        message Refund { string order_id = 1; }"#;

    pub(crate) fn shop_registry() -> (Arc<InMemoryRegistry>, u32) {
        let registry = Arc::new(InMemoryRegistry::new());
        let id = registry.register("shop-value", Schema::new(SchemaType::Protobuf, SHOP));
        (registry, id)
    }

    #[tokio::test]
    async fn walks_message_index_paths() {
        let (registry, id) = shop_registry();
        let resolver = SchemaIdResolver::new(registry);
        let ctx = SerdeContext::new();

        let order = resolver.message_descriptor(&ctx, id, &[0]).await.unwrap();
        assert_eq!(order.full_name(), "shop.Order");
        let refund = resolver.message_descriptor(&ctx, id, &[1]).await.unwrap();
        assert_eq!(refund.full_name(), "shop.Refund");
        let line = resolver.message_descriptor(&ctx, id, &[0, 0]).await.unwrap();
        assert_eq!(line.full_name(), "shop.Order.Line");

        let err = resolver.message_descriptor(&ctx, id, &[2]).await.unwrap_err();
        assert!(err.message().contains("out of range"));
    }

    #[tokio::test]
    async fn index_path_finds_nested_messages() {
        let (registry, id) = shop_registry();
        let resolver = SchemaIdResolver::new(registry);
        let file = resolver.file_descriptor(&SerdeContext::new(), id).await.unwrap();
        assert_eq!(index_path(&file, "shop.Refund"), Some(vec![1]));
        assert_eq!(index_path(&file, "shop.Order.Line"), Some(vec![0, 0]));
        assert_eq!(index_path(&file, "shop.Missing"), None);
    }

    #[tokio::test]
    async fn resolves_imports_through_references() {
        let registry = Arc::new(InMemoryRegistry::new());
        registry.register(
            "money",
            Schema::new(SchemaType::Protobuf, "syntax = \"proto3\"; package fin; message Money { int64 cents = 1; }"),
        );
        let id = registry.register(
            "invoice-value",
            Schema::new(
                SchemaType::Protobuf,
                "syntax = \"proto3\"; package fin; import \"fin/money.proto\"; message Invoice { Money total = 1; }",
            )
            .with_reference("fin/money.proto", "money", 1),
        );
        let resolver = SchemaIdResolver::new(registry);
        let invoice = resolver.message_descriptor(&SerdeContext::new(), id, &[0]).await.unwrap();
        assert_eq!(invoice.full_name(), "fin.Invoice");
    }

    #[tokio::test]
    async fn unknown_id_and_wrong_type() {
        let (registry, _) = shop_registry();
        let json_id = registry.register("j", Schema::new(SchemaType::Json, "{}"));
        let resolver = SchemaIdResolver::new(registry);
        let ctx = SerdeContext::new();

        let err = resolver.file_descriptor(&ctx, 99).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Dependency);
        assert!(err.message().contains("not found"));

        let err = resolver.file_descriptor(&ctx, json_id).await.unwrap_err();
        assert!(err.message().contains("not protobuf"));
    }
}
