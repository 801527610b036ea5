use serde::Deserialize;

use codec_cbor::CborConfig;
use codec_msgpack::MsgPackConfig;
use codec_protobuf::ProtobufConfig;
use recscope_registry::{BsrConfig, SchemaRegistryConfig};

use crate::error::EngineError;

/// Default limit above which a payload is flagged as too large.
pub const DEFAULT_MAX_PAYLOAD_SIZE: usize = 20 * 1024;

/// Root configuration, parsed from TOML. Immutable once the service runs.
#[derive(Debug, Clone, Deserialize)]
pub struct SerdeConfig {
    #[serde(default)]
    pub schema_registry: SchemaRegistryConfig,

    #[serde(default)]
    pub protobuf: ProtobufConfig,

    #[serde(default)]
    pub messagepack: MsgPackConfig,

    #[serde(default)]
    pub cbor: CborConfig,

    /// Buf Schema Registry.
    #[serde(default)]
    pub bsr: BsrConfig,

    /// Default for [`DeserializationOptions::max_payload_size`](crate::DeserializationOptions).
    #[serde(default = "default_max_payload_size")]
    pub max_payload_size: usize,
}

fn default_max_payload_size() -> usize {
    DEFAULT_MAX_PAYLOAD_SIZE
}

impl Default for SerdeConfig {
    fn default() -> Self {
        Self {
            schema_registry: SchemaRegistryConfig::default(),
            protobuf: ProtobufConfig::default(),
            messagepack: MsgPackConfig::default(),
            cbor: CborConfig::default(),
            bsr: BsrConfig::default(),
            max_payload_size: DEFAULT_MAX_PAYLOAD_SIZE,
        }
    }
}

impl SerdeConfig {
    pub fn load(path: &str) -> Result<Self, EngineError> {
        let content =
            std::fs::read_to_string(path).map_err(|e| EngineError::Config(format!("{path}: {e}")))?;
        Self::parse(&content).map_err(|e| e.with_context(path))
    }

    pub fn parse(toml_str: &str) -> Result<Self, EngineError> {
        toml::from_str(toml_str).map_err(|e| EngineError::Config(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_uses_defaults() {
        let config = SerdeConfig::parse("").unwrap();
        assert_eq!(config.max_payload_size, DEFAULT_MAX_PAYLOAD_SIZE);
        assert!(!config.schema_registry.enabled);
        assert_eq!(config.schema_registry.timeout_secs, 10);
        assert!(!config.protobuf.enabled);
        assert_eq!(config.protobuf.file_system.refresh_interval_secs, 300);
        assert!(config.messagepack.topic_names.is_empty());
        assert!(config.cbor.topic_name.is_none());
    }

    #[test]
    fn parses_every_section() {
        let config = SerdeConfig::parse(
            r#"
            max_payload_size = 1024

            [schema_registry]
            enabled = true
            urls = ["http://localhost:8081"]
            username = "svc"
            password = "secret"

            [protobuf]
            enabled = true
            import_paths = ["/usr/include"]

            [[protobuf.mappings]]
            topic_name = "/^orders-.*/"
            value_proto_type = "shop.Order"

            [protobuf.file_system]
            enabled = true
            paths = ["/protos"]
            refresh_interval_secs = 60

            [messagepack]
            enabled = true
            topic_names = ["metrics", "/^telemetry\\./"]

            [cbor]
            enabled = true
            topic_name = "sensors"

            [bsr]
            enabled = true
            url = "https://buf.build"
            token = "t0k"
            "#,
        )
        .unwrap();

        assert_eq!(config.max_payload_size, 1024);
        assert_eq!(config.schema_registry.urls, vec!["http://localhost:8081"]);
        assert_eq!(config.schema_registry.username.as_deref(), Some("svc"));

        let mapping = &config.protobuf.mappings[0];
        assert!(mapping.topic_name.matches("orders-eu"));
        assert!(!mapping.topic_name.matches("payments"));
        assert_eq!(mapping.value_proto_type.as_deref(), Some("shop.Order"));
        assert!(mapping.key_proto_type.is_none());
        assert_eq!(config.protobuf.file_system.refresh_interval_secs, 60);

        assert!(config.messagepack.topic_names[0].matches("metrics"));
        assert!(config.messagepack.topic_names[1].matches("telemetry.cpu"));
        assert!(config.cbor.topic_name.as_ref().unwrap().matches("sensors"));
        assert_eq!(config.bsr.token.as_deref(), Some("t0k"));
    }

    #[test]
    fn invalid_regex_is_a_config_error() {
        let err = SerdeConfig::parse("[cbor]\ntopic_name = \"/[unclosed/\"").unwrap_err();
        assert!(matches!(err, EngineError::Config(_)));
    }

    #[test]
    fn load_reports_the_path() {
        let err = SerdeConfig::load("/definitely/not/here.toml").unwrap_err();
        assert!(err.to_string().contains("/definitely/not/here.toml"));

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("serde.toml");
        std::fs::write(&path, "max_payload_size = 7").unwrap();
        let config = SerdeConfig::load(path.to_str().unwrap()).unwrap();
        assert_eq!(config.max_payload_size, 7);
    }
}
