use serde::{Deserialize, Serialize};

use crate::error::SerdeError;

// ════════════════════════════════════════════════════════════════
//  Payload Encoding
// ════════════════════════════════════════════════════════════════

/// Wire format of a record key or value.
///
/// Closed set. The tag is the discriminant used by the probe chain and by
/// any outer protocol mapping (e.g. an RPC enum).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum PayloadEncoding {
    #[default]
    Unspecified,
    None,
    Null,
    Avro,
    Protobuf,
    ProtobufSchema,
    #[serde(rename = "protobuf-bsr")]
    ProtobufBsr,
    Json,
    JsonSchema,
    Xml,
    Text,
    #[serde(rename = "utf8-with-control-chars")]
    Utf8,
    ConsumerOffsets,
    Binary,
    #[serde(rename = "msgpack")]
    MsgPack,
    Smile,
    Uint,
    Cbor,
}

impl PayloadEncoding {
    pub const ALL: [PayloadEncoding; 18] = [
        PayloadEncoding::Unspecified,
        PayloadEncoding::None,
        PayloadEncoding::Null,
        PayloadEncoding::Avro,
        PayloadEncoding::Protobuf,
        PayloadEncoding::ProtobufSchema,
        PayloadEncoding::ProtobufBsr,
        PayloadEncoding::Json,
        PayloadEncoding::JsonSchema,
        PayloadEncoding::Xml,
        PayloadEncoding::Text,
        PayloadEncoding::Utf8,
        PayloadEncoding::ConsumerOffsets,
        PayloadEncoding::Binary,
        PayloadEncoding::MsgPack,
        PayloadEncoding::Smile,
        PayloadEncoding::Uint,
        PayloadEncoding::Cbor,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PayloadEncoding::Unspecified => "unspecified",
            PayloadEncoding::None => "none",
            PayloadEncoding::Null => "null",
            PayloadEncoding::Avro => "avro",
            PayloadEncoding::Protobuf => "protobuf",
            PayloadEncoding::ProtobufSchema => "protobuf-schema",
            PayloadEncoding::ProtobufBsr => "protobuf-bsr",
            PayloadEncoding::Json => "json",
            PayloadEncoding::JsonSchema => "json-schema",
            PayloadEncoding::Xml => "xml",
            PayloadEncoding::Text => "text",
            PayloadEncoding::Utf8 => "utf8-with-control-chars",
            PayloadEncoding::ConsumerOffsets => "consumer-offsets",
            PayloadEncoding::Binary => "binary",
            PayloadEncoding::MsgPack => "msgpack",
            PayloadEncoding::Smile => "smile",
            PayloadEncoding::Uint => "uint",
            PayloadEncoding::Cbor => "cbor",
        }
    }

    /// Encodings whose normalized payload is a JSON document.
    pub fn is_json_like(&self) -> bool {
        matches!(
            self,
            PayloadEncoding::Avro
                | PayloadEncoding::Protobuf
                | PayloadEncoding::ProtobufSchema
                | PayloadEncoding::ProtobufBsr
                | PayloadEncoding::Json
                | PayloadEncoding::JsonSchema
                | PayloadEncoding::Xml
                | PayloadEncoding::ConsumerOffsets
                | PayloadEncoding::MsgPack
                | PayloadEncoding::Smile
                | PayloadEncoding::Cbor
        )
    }
}

impl std::fmt::Display for PayloadEncoding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for PayloadEncoding {
    type Err = SerdeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lowered = s.trim().to_ascii_lowercase();
        // Accept the canonical tag plus a few spellings users reach for.
        let alias = match lowered.as_str() {
            "utf8" => "utf8-with-control-chars",
            "messagepack" => "msgpack",
            "bsr" => "protobuf-bsr",
            "" => "unspecified",
            other => other,
        };
        PayloadEncoding::ALL
            .iter()
            .copied()
            .find(|e| e.as_str() == alias)
            .ok_or_else(|| SerdeError::new(format!("unknown payload encoding '{s}'")))
    }
}

// ════════════════════════════════════════════════════════════════
//  Payload Type
// ════════════════════════════════════════════════════════════════

/// Which side of a record is being (de)serialized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PayloadType {
    Key,
    Value,
}

impl std::fmt::Display for PayloadType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PayloadType::Key => f.write_str("key"),
            PayloadType::Value => f.write_str("value"),
        }
    }
}
