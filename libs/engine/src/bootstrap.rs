use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use codec_avro::AvroSerde;
use codec_cbor::CborSerde;
use codec_json::{JsonSchemaSerde, JsonSerde};
use codec_msgpack::MsgPackSerde;
use codec_plain::{BinarySerde, NoneSerde, NullSerde, TextSerde, UintSerde, Utf8Serde};
use codec_protobuf::{DescriptorRegistry, ProtobufBsrSerde, ProtobufSchemaSerde, ProtobufSerde};
use codec_smile::SmileSerde;
use codec_xml::XmlSerde;
use recscope_registry::{BsrClient, SchemaRegistry, SchemaRegistryClient};

use crate::config::SerdeConfig;
use crate::error::EngineError;
use crate::service::Service;

const BSR_PURGE_INTERVAL: Duration = Duration::from_secs(60);

impl Service {
    /// Build the service from a parsed configuration.
    ///
    /// Connects the registries, compiles protobuf descriptors and spawns the
    /// background refresh tasks. Must be called inside a tokio runtime.
    pub async fn from_config(config: &SerdeConfig) -> Result<Self, EngineError> {
        let token = CancellationToken::new();
        let mut builder = Service::builder().token(token.clone());

        // --- 1. Schema registry ---
        let schema_registry: Option<Arc<dyn SchemaRegistry>> = if config.schema_registry.enabled {
            let client = SchemaRegistryClient::new(&config.schema_registry)
                .map_err(|e| EngineError::Config(format!("schema_registry: {e}")))?;
            tracing::info!(urls = ?config.schema_registry.urls, "schema registry client configured");
            Some(Arc::new(client))
        } else {
            None
        };

        // --- 2. Topic-mapped protobuf descriptors ---
        let protobuf = if config.protobuf.enabled {
            let registry = DescriptorRegistry::load(&config.protobuf, schema_registry.clone())
                .await
                .map_err(|e| EngineError::from(e).with_context("protobuf"))?;
            let registry = Arc::new(registry);
            if let Some(handle) = registry.spawn_refresh(token.child_token()) {
                builder = builder.task(handle);
            }
            Some(ProtobufSerde::new(registry))
        } else {
            None
        };

        // --- 3. Buf Schema Registry ---
        let bsr = if config.bsr.enabled {
            let client =
                BsrClient::new(&config.bsr).map_err(|e| EngineError::Config(format!("bsr: {e}")))?;
            let client = Arc::new(client);
            builder = builder.task(spawn_bsr_purge(Arc::clone(&client), token.child_token()));
            tracing::info!(url = %config.bsr.url, "buf schema registry client configured");
            Some(ProtobufBsrSerde::new(client))
        } else {
            None
        };

        // --- 4. Probe chain ---
        builder = builder
            .probe(NoneSerde)
            .probe(JsonSerde)
            .probe(JsonSchemaSerde::new(schema_registry.clone()))
            .probe(XmlSerde)
            .probe(AvroSerde::new(schema_registry.clone()));
        if let Some(codec) = protobuf {
            builder = builder.probe(codec);
        }
        builder = builder.probe(ProtobufSchemaSerde::new(schema_registry));
        if let Some(codec) = bsr {
            builder = builder.probe(codec);
        }
        builder = builder.probe(MsgPackSerde::new(&config.messagepack));
        let cbor = CborSerde::new(&config.cbor);
        builder = if config.cbor.enabled {
            builder.probe(cbor)
        } else {
            builder.forced_only(cbor)
        };
        builder = builder
            .probe(SmileSerde)
            .probe(Utf8Serde)
            .probe(TextSerde)
            .forced_only(UintSerde)
            .forced_only(NullSerde)
            .forced_only(BinarySerde);

        let service = builder.build();
        tracing::info!(
            chain = ?service.chain_order(),
            max_payload_size = config.max_payload_size,
            "serde service ready"
        );
        Ok(service)
    }
}

fn spawn_bsr_purge(client: Arc<BsrClient>, token: CancellationToken) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(BSR_PURGE_INTERVAL);
        loop {
            tokio::select! {
                _ = ticker.tick() => client.purge_expired(),
                _ = token.cancelled() => break,
            }
        }
        tracing::debug!("bsr cache purge stopped");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use recscope_api::PayloadEncoding;

    #[tokio::test]
    async fn default_config_builds_the_plain_chain() {
        let service = Service::from_config(&SerdeConfig::default()).await.unwrap();
        assert_eq!(
            service.chain_order(),
            vec![
                PayloadEncoding::None,
                PayloadEncoding::Json,
                PayloadEncoding::JsonSchema,
                PayloadEncoding::Xml,
                PayloadEncoding::Avro,
                PayloadEncoding::ProtobufSchema,
                PayloadEncoding::MsgPack,
                PayloadEncoding::Smile,
                PayloadEncoding::Utf8,
                PayloadEncoding::Text,
            ]
        );
        assert!(service.codec(PayloadEncoding::Cbor).is_some());
        assert!(service.codec(PayloadEncoding::Uint).is_some());
        assert!(service.codec(PayloadEncoding::ProtobufBsr).is_none());
        service.shutdown().await;
    }

    #[tokio::test]
    async fn optional_codecs_join_the_chain_when_enabled() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("order.proto"),
            "syntax = \"proto3\"; package shop; message Order { string id = 1; }",
        )
        .unwrap();
        let config = SerdeConfig::parse(&format!(
            r#"
            [protobuf]
            enabled = true
            [[protobuf.mappings]]
            topic_name = "orders"
            value_proto_type = "shop.Order"
            [protobuf.file_system]
            enabled = true
            paths = [{path:?}]

            [cbor]
            enabled = true
            topic_name = "sensors"

            [bsr]
            enabled = true
            url = "http://127.0.0.1:9"
            "#,
            path = dir.path().display().to_string()
        ))
        .unwrap();

        let service = Service::from_config(&config).await.unwrap();
        let chain = service.chain_order();
        let pos = |e| chain.iter().position(|c| *c == e).unwrap();
        assert!(pos(PayloadEncoding::Avro) < pos(PayloadEncoding::Protobuf));
        assert!(pos(PayloadEncoding::Protobuf) < pos(PayloadEncoding::ProtobufSchema));
        assert!(pos(PayloadEncoding::ProtobufSchema) < pos(PayloadEncoding::ProtobufBsr));
        assert!(pos(PayloadEncoding::MsgPack) < pos(PayloadEncoding::Cbor));
        assert!(pos(PayloadEncoding::Cbor) < pos(PayloadEncoding::Smile));
        service.shutdown().await;
    }

    #[tokio::test]
    async fn broken_protobuf_sources_fail_bootstrap() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("bad.proto"), "message {").unwrap();
        let mut config = SerdeConfig::default();
        config.protobuf.enabled = true;
        config.protobuf.file_system.enabled = true;
        config.protobuf.file_system.paths = vec![dir.path().to_path_buf()];

        let err = Service::from_config(&config).await.unwrap_err();
        assert!(matches!(err, EngineError::Config(_)));
        assert!(err.to_string().contains("protobuf"));
    }
}
