use prost::Message;
use prost_reflect::{DynamicMessage, MessageDescriptor, SerializeOptions as JsonOptions};

use recscope_api::{Object, SerdeError};

/// Decode `bytes` as `descriptor` and render it as JSON.
///
/// Unpopulated fields are emitted with their defaults so every declared
/// field shows up. 64-bit integers are rendered as strings.
pub fn decode_to_json(descriptor: MessageDescriptor, bytes: &[u8]) -> Result<serde_json::Value, SerdeError> {
    let full_name = descriptor.full_name().to_string();
    let message = DynamicMessage::decode(descriptor, bytes).map_err(|e| {
        SerdeError::mismatch(format!("failed to unmarshal payload as protobuf message '{full_name}': {e}"))
    })?;
    message_to_json(&message)
}

pub fn message_to_json(message: &DynamicMessage) -> Result<serde_json::Value, SerdeError> {
    let opts = JsonOptions::new().skip_default_fields(false);
    message
        .serialize_with_options(serde_json::value::Serializer, &opts)
        .map_err(|e| SerdeError::new(format!("failed to render protobuf message as JSON: {e}")))
}

/// Encode an object as `descriptor`.
///
/// Bytes are taken to be an already encoded message: they are checked
/// against the descriptor and returned unchanged. Strings and values are
/// read as protobuf JSON.
pub fn encode_object(descriptor: MessageDescriptor, obj: Object) -> Result<Vec<u8>, SerdeError> {
    let full_name = descriptor.full_name().to_string();
    if let Object::Bytes(bytes) = obj {
        DynamicMessage::decode(descriptor, bytes.as_slice()).map_err(|e| {
            SerdeError::new(format!("input is not a valid '{full_name}' protobuf message: {e}"))
        })?;
        return Ok(bytes);
    }
    let value = obj.to_json_value()?;
    let message = DynamicMessage::deserialize(descriptor, &value)
        .map_err(|e| SerdeError::new(format!("cannot convert JSON to protobuf message '{full_name}': {e}")))?;
    Ok(message.encode_to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compile::{compile_in_memory, InMemorySources};
    use serde_json::json;

    fn order() -> MessageDescriptor {
        let sources = InMemorySources::new().with(
            "order.proto",
            "syntax = \"proto3\"; package shop; message Order { string id = 1; int32 qty = 2; bool paid = 3; }",
        );
        compile_in_memory(sources, &["order.proto"])
            .unwrap()
            .get_message_by_name("shop.Order")
            .unwrap()
    }

    #[test]
    fn renders_defaults_and_round_trips() {
        let bytes = encode_object(order(), Object::from(json!({"id": "a", "qty": 2}))).unwrap();
        assert_eq!(bytes, vec![0x0a, 0x01, b'a', 0x10, 0x02]);
        let value = decode_to_json(order(), &bytes).unwrap();
        assert_eq!(value, json!({"id": "a", "qty": 2, "paid": false}));
    }

    #[test]
    fn bytes_input_is_validated_and_kept() {
        let raw = vec![0x10, 0x05];
        assert_eq!(encode_object(order(), Object::Bytes(raw.clone())).unwrap(), raw);
        assert!(encode_object(order(), Object::Bytes(vec![0x0a, 0x05])).is_err());
    }

    #[test]
    fn garbage_is_a_mismatch() {
        let err = decode_to_json(order(), &[0xff, 0xff, 0xff]).unwrap_err();
        assert_eq!(err.kind(), recscope_api::ErrorKind::Mismatch);
    }

    #[test]
    fn unknown_json_field_is_rejected() {
        assert!(encode_object(order(), Object::from(r#"{"nope": 1}"#)).is_err());
    }
}
