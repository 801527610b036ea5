use std::sync::{Arc, RwLock};
use std::time::Duration;

use prost_reflect::{DescriptorPool, MessageDescriptor};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use recscope_api::{PayloadType, SerdeError};
use recscope_registry::{SchemaRegistry, SchemaType};

use crate::compile::{compile_directory, merge_pool};
use crate::config::{ProtobufConfig, TopicMapping};
use crate::schema_id::compile_registry_schema;

// ════════════════════════════════════════════════════════════════
//  DescriptorRegistry — topic → message type over a refreshable pool
// ════════════════════════════════════════════════════════════════

/// Message descriptors for the topic-mapped protobuf codec.
///
/// Readers take a clone of the current pool; a refresh compiles a new pool
/// off to the side and swaps it in. A failed refresh keeps the old one.
pub struct DescriptorRegistry {
    config: ProtobufConfig,
    schema_registry: Option<Arc<dyn SchemaRegistry>>,
    pool: RwLock<DescriptorPool>,
}

impl DescriptorRegistry {
    /// Compile every configured source. Failing to build the first snapshot
    /// is an error.
    pub async fn load(
        config: &ProtobufConfig,
        schema_registry: Option<Arc<dyn SchemaRegistry>>,
    ) -> Result<Self, SerdeError> {
        let pool = build_pool(config, schema_registry.as_deref()).await?;
        tracing::info!(
            files = pool.files().len(),
            messages = pool.all_messages().count(),
            mappings = config.mappings.len(),
            "protobuf descriptor registry loaded"
        );
        Ok(Self {
            config: config.clone(),
            schema_registry,
            pool: RwLock::new(pool),
        })
    }

    /// Registry over an already built pool. Nothing to refresh from.
    pub fn from_pool(pool: DescriptorPool, mappings: Vec<TopicMapping>) -> Self {
        Self {
            config: ProtobufConfig {
                enabled: true,
                mappings,
                ..Default::default()
            },
            schema_registry: None,
            pool: RwLock::new(pool),
        }
    }

    pub fn pool(&self) -> DescriptorPool {
        match self.pool.read() {
            Ok(g) => g.clone(),
            Err(poisoned) => {
                tracing::warn!("descriptor pool lock was poisoned, recovering");
                poisoned.into_inner().clone()
            }
        }
    }

    fn swap(&self, pool: DescriptorPool) {
        match self.pool.write() {
            Ok(mut g) => *g = pool,
            Err(poisoned) => {
                tracing::warn!("descriptor pool lock was poisoned, recovering");
                *poisoned.into_inner() = pool;
            }
        }
    }

    /// Recompile all sources and swap the result in.
    pub async fn refresh(&self) -> Result<(), SerdeError> {
        let pool = build_pool(&self.config, self.schema_registry.as_deref()).await?;
        let files = pool.files().len();
        self.swap(pool);
        tracing::info!(files, "protobuf descriptors refreshed");
        Ok(())
    }

    /// Refresh on the configured interval until `token` is cancelled.
    /// Returns `None` when refreshing is disabled.
    pub fn spawn_refresh(self: &Arc<Self>, token: CancellationToken) -> Option<JoinHandle<()>> {
        let secs = self.config.file_system.refresh_interval_secs;
        if !self.config.has_sources() || secs == 0 {
            return None;
        }
        let registry = Arc::clone(self);
        Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_secs(secs));
            // The first tick completes immediately; the initial load already happened.
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Err(e) = registry.refresh().await {
                            tracing::warn!(error = %e, "protobuf descriptor refresh failed, keeping previous descriptors");
                        }
                    }
                    _ = token.cancelled() => break,
                }
            }
            tracing::debug!("protobuf descriptor refresh stopped");
        }))
    }

    pub fn message_by_name(&self, name: &str) -> Result<MessageDescriptor, SerdeError> {
        self.pool().get_message_by_name(name).ok_or_else(|| {
            SerdeError::config(format!("protobuf message type '{name}' is not in the descriptor registry"))
        })
    }

    /// Type name mapped for this topic and side, if any.
    pub fn type_for(&self, topic: &str, payload_type: PayloadType) -> Option<&str> {
        let mapping = self.config.mappings.iter().find(|m| m.topic_name.matches(topic))?;
        match payload_type {
            PayloadType::Key => mapping.key_proto_type.as_deref(),
            PayloadType::Value => mapping.value_proto_type.as_deref(),
        }
    }

    pub fn descriptor_for(&self, topic: &str, payload_type: PayloadType) -> Result<MessageDescriptor, SerdeError> {
        let Some(name) = self.type_for(topic, payload_type) else {
            return Err(SerdeError::mismatch(format!(
                "failed to get message descriptor for payload: no prototype found for topic '{topic}' ({payload_type})"
            )));
        };
        self.message_by_name(name)
    }
}

async fn build_pool(
    config: &ProtobufConfig,
    schema_registry: Option<&dyn SchemaRegistry>,
) -> Result<DescriptorPool, SerdeError> {
    let mut pool = DescriptorPool::new();

    for path in &config.descriptor_sets {
        let bytes = std::fs::read(path).map_err(|e| {
            SerdeError::config(format!("failed to read descriptor set {}: {e}", path.display()))
        })?;
        pool.decode_file_descriptor_set(bytes.as_slice()).map_err(|e| {
            SerdeError::config(format!("invalid descriptor set {}: {e}", path.display()))
        })?;
    }

    if config.file_system.enabled {
        for root in &config.file_system.paths {
            let compiled = compile_directory(root, &config.import_paths)
                .map_err(|e| e.with_context(root.display()))?;
            merge_pool(&mut pool, &compiled)?;
        }
    }

    if config.schema_registry.enabled {
        let Some(registry) = schema_registry else {
            return Err(SerdeError::config(
                "protobuf schema-registry source is enabled but no schema registry is configured",
            ));
        };
        let subjects = registry.subjects().await.map_err(SerdeError::from)?;
        for subject in subjects {
            let latest = registry.subject_version(&subject, None).await.map_err(SerdeError::from)?;
            if latest.schema.schema_type != SchemaType::Protobuf {
                continue;
            }
            let file_name = format!("{subject}.proto");
            // One broken subject must not hide the others.
            let merged = compile_registry_schema(registry, &file_name, &latest.schema)
                .await
                .and_then(|file| merge_pool(&mut pool, file.parent_pool()));
            if let Err(e) = merged {
                tracing::warn!(subject = %subject, error = %e, "skipping protobuf subject");
            }
        }
    }

    Ok(pool)
}
