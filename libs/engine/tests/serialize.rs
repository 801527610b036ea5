use std::sync::Arc;

use codec_avro::AvroSerde;
use codec_json::JsonSerde;
use codec_plain::{NoneSerde, TextSerde, UintSerde};
use recscope_api::{
    KafkaRecord, Object, PayloadEncoding, SerdeContext, SerializeOptions, UintSize,
};
use recscope_engine::{
    DeserializationOptions, EngineError, SerdeConfig, SerializeInput, SerializeSide, Service,
};
use recscope_registry::{InMemoryRegistry, Schema, SchemaType};
use serde_json::json;

const USER: &str = r#"{
    "type": "record",
    "name": "User",
    "fields": [
        {"name": "name", "type": "string"},
        {"name": "age", "type": ["null", "int"], "default": null}
    ]
}"#;

fn avro_service() -> Service {
    let registry = Arc::new(InMemoryRegistry::new());
    registry.register("users-value", Schema::new(SchemaType::Avro, USER));
    Service::builder()
        .probe(NoneSerde)
        .probe(JsonSerde)
        .probe(AvroSerde::new(Some(registry)))
        .probe(TextSerde)
        .forced_only(UintSerde)
        .build()
}

#[tokio::test]
async fn produced_record_decodes_back() {
    let service = avro_service();
    let ctx = SerdeContext::new();
    let input = SerializeInput {
        topic: "users".into(),
        key: SerializeSide::new(PayloadEncoding::Uint, json!(7))
            .with_options(SerializeOptions::default().uint_size(UintSize::U16)),
        value: SerializeSide::new(PayloadEncoding::Avro, json!({"name": "Ann", "age": 41}))
            .with_options(SerializeOptions::default().subject("users-value")),
    };
    let out = service.serialize_record(&ctx, input).await.unwrap();
    assert_eq!(out.key.as_deref(), Some(&[0x00, 0x07][..]));

    let record = KafkaRecord {
        topic: "users".into(),
        key: out.key,
        value: out.value,
        headers: Vec::new(),
    };
    let opts = DeserializationOptions {
        key_encoding: PayloadEncoding::Uint,
        ..Default::default()
    };
    let decoded = service.deserialize_record(&ctx, &record, &opts).await.unwrap();
    assert_eq!(decoded.key.normalized_payload.as_deref(), Some(&b"7"[..]));
    assert_eq!(decoded.value.encoding, PayloadEncoding::Avro);
    assert_eq!(decoded.value.normalized_json(), Some(json!({"name": "Ann", "age": 41})));
}

#[tokio::test]
async fn null_and_none_sides() {
    let service = Service::from_config(&SerdeConfig::default()).await.unwrap();
    let input = SerializeInput {
        topic: "t".into(),
        key: SerializeSide::null(),
        value: SerializeSide {
            encoding: PayloadEncoding::None,
            object: Some(Object::from("ignored")),
            ..Default::default()
        },
    };
    let out = service.serialize_record(&SerdeContext::new(), input).await.unwrap();
    assert_eq!(out.key, None);
    assert_eq!(out.value, Some(Vec::new()));
    service.shutdown().await;
}

#[tokio::test]
async fn missing_encoding_or_object_is_rejected() {
    let service = Service::from_config(&SerdeConfig::default()).await.unwrap();
    let ctx = SerdeContext::new();

    let input = SerializeInput {
        topic: "t".into(),
        key: SerializeSide::null(),
        value: SerializeSide::default(),
    };
    let err = service.serialize_record(&ctx, input).await.unwrap_err();
    assert!(matches!(err, EngineError::Serialize { .. }));
    assert!(err.to_string().contains("encoding is required"));

    let input = SerializeInput {
        topic: "t".into(),
        key: SerializeSide {
            encoding: PayloadEncoding::Text,
            ..Default::default()
        },
        value: SerializeSide::null(),
    };
    let err = service.serialize_record(&ctx, input).await.unwrap_err();
    assert!(err.to_string().contains("nothing to serialize"));
    service.shutdown().await;
}

#[tokio::test]
async fn avro_without_registry_fails() {
    let service = Service::from_config(&SerdeConfig::default()).await.unwrap();
    let input = SerializeInput {
        topic: "users".into(),
        key: SerializeSide::null(),
        value: SerializeSide::new(PayloadEncoding::Avro, json!({"name": "Ann"}))
            .with_options(SerializeOptions::default().schema_id(1)),
    };
    let err = service
        .serialize_record(&SerdeContext::new(), input)
        .await
        .unwrap_err();
    let EngineError::Serialize { source, .. } = err else {
        panic!("unexpected error: {err}");
    };
    assert_eq!(source.kind(), recscope_api::ErrorKind::Config);
}
