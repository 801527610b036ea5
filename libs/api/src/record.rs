use std::collections::BTreeMap;

use base64::Engine;
use serde::ser::SerializeStruct;
use serde::{Deserialize, Serialize};

use crate::types::{PayloadEncoding, PayloadType};

// ════════════════════════════════════════════════════════════════
//  Input: raw Kafka record
// ════════════════════════════════════════════════════════════════

/// A single record header as delivered by the Kafka client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KafkaHeader {
    pub key: String,
    pub value: Vec<u8>,
}

/// Raw record handed over by the Kafka client layer.
///
/// `key` / `value` distinguish absent (`None`, a Kafka null) from empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KafkaRecord {
    pub topic: String,
    pub key: Option<Vec<u8>>,
    pub value: Option<Vec<u8>>,
    #[serde(default)]
    pub headers: Vec<KafkaHeader>,
}

impl KafkaRecord {
    pub fn new(topic: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            ..Default::default()
        }
    }

    pub fn with_key(mut self, key: impl Into<Vec<u8>>) -> Self {
        self.key = Some(key.into());
        self
    }

    pub fn with_value(mut self, value: impl Into<Vec<u8>>) -> Self {
        self.value = Some(value.into());
        self
    }

    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<Vec<u8>>) -> Self {
        self.headers.push(KafkaHeader {
            key: key.into(),
            value: value.into(),
        });
        self
    }

    /// Value of the first header with the given key.
    pub fn header(&self, key: &str) -> Option<&[u8]> {
        self.headers
            .iter()
            .find(|h| h.key == key)
            .map(|h| h.value.as_slice())
    }
}

/// Select key or value bytes of a record. `None` is a Kafka null.
pub fn payload_from_record(record: &KafkaRecord, payload_type: PayloadType) -> Option<&[u8]> {
    match payload_type {
        PayloadType::Key => record.key.as_deref(),
        PayloadType::Value => record.value.as_deref(),
    }
}

// ════════════════════════════════════════════════════════════════
//  Output: decoded payloads
// ════════════════════════════════════════════════════════════════

/// Native decoded tree, used for downstream filtering.
#[derive(Debug, Clone, PartialEq)]
pub enum DeserializedPayload {
    Value(serde_json::Value),
    Bytes(Vec<u8>),
}

impl DeserializedPayload {
    pub fn as_value(&self) -> Option<&serde_json::Value> {
        match self {
            DeserializedPayload::Value(v) => Some(v),
            DeserializedPayload::Bytes(_) => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            DeserializedPayload::Bytes(b) => Some(b),
            DeserializedPayload::Value(_) => None,
        }
    }
}

/// One failed codec attempt, in encounter order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TroubleshootingReport {
    pub serde_name: PayloadEncoding,
    pub message: String,
}

/// Result of decoding one side (key or value) of a record.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordPayload {
    /// Raw bytes as received. Omitted unless the caller asks for raw data.
    pub original_payload: Option<Vec<u8>>,
    pub payload_size_bytes: usize,
    /// Human-readable (JSON-renderable for structured encodings) form.
    pub normalized_payload: Option<Vec<u8>>,
    /// Native tree. Never serialized.
    pub deserialized_payload: Option<DeserializedPayload>,
    pub encoding: PayloadEncoding,
    pub schema_id: Option<u32>,
    pub is_payload_too_large: bool,
    pub is_payload_null: bool,
    pub troubleshooting: Vec<TroubleshootingReport>,
    pub extra_metadata: BTreeMap<String, String>,
}

impl RecordPayload {
    /// Successful decode by a codec.
    pub fn decoded(
        encoding: PayloadEncoding,
        normalized: Vec<u8>,
        deserialized: DeserializedPayload,
    ) -> Self {
        Self {
            normalized_payload: Some(normalized),
            deserialized_payload: Some(deserialized),
            encoding,
            ..Default::default()
        }
    }

    /// Decoded structured value; the normalized form is its compact JSON.
    pub fn from_json_value(
        encoding: PayloadEncoding,
        value: serde_json::Value,
    ) -> Result<Self, serde_json::Error> {
        let normalized = serde_json::to_vec(&value)?;
        Ok(Self::decoded(encoding, normalized, DeserializedPayload::Value(value)))
    }

    /// A Kafka null.
    pub fn null() -> Self {
        Self {
            encoding: PayloadEncoding::Null,
            is_payload_null: true,
            ..Default::default()
        }
    }

    pub fn with_schema_id(mut self, schema_id: u32) -> Self {
        self.schema_id = Some(schema_id);
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra_metadata.insert(key.into(), value.into());
        self
    }

    /// Normalized payload parsed as JSON, when the encoding produces JSON.
    pub fn normalized_json(&self) -> Option<serde_json::Value> {
        if !self.encoding.is_json_like() {
            return None;
        }
        self.normalized_payload
            .as_deref()
            .and_then(|b| serde_json::from_slice(b).ok())
    }
}

impl Serialize for RecordPayload {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut s = serializer.serialize_struct("RecordPayload", 9)?;
        let b64 = base64::engine::general_purpose::STANDARD;
        s.serialize_field(
            "originalPayload",
            &self.original_payload.as_ref().map(|b| b64.encode(b)),
        )?;
        s.serialize_field("payloadSizeBytes", &self.payload_size_bytes)?;
        // Inline JSON for structured encodings, text as a string, base64 otherwise.
        let normalized = match &self.normalized_payload {
            None => serde_json::Value::Null,
            Some(bytes) => match self.normalized_json() {
                Some(value) => value,
                None => match std::str::from_utf8(bytes) {
                    Ok(text) if self.encoding != PayloadEncoding::Binary => {
                        serde_json::Value::String(text.to_string())
                    }
                    _ => serde_json::Value::String(b64.encode(bytes)),
                },
            },
        };
        s.serialize_field("normalizedPayload", &normalized)?;
        s.serialize_field("encoding", &self.encoding)?;
        s.serialize_field("schemaId", &self.schema_id)?;
        s.serialize_field("isPayloadTooLarge", &self.is_payload_too_large)?;
        s.serialize_field("isPayloadNull", &self.is_payload_null)?;
        s.serialize_field("troubleshooting", &self.troubleshooting)?;
        s.serialize_field("extraMetadata", &self.extra_metadata)?;
        s.end()
    }
}

/// A decoded record header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordHeader {
    pub key: String,
    pub value: Option<Vec<u8>>,
    /// `None`, `Utf8` or `Binary`.
    pub encoding: PayloadEncoding,
    pub is_value_too_large: bool,
}

impl Serialize for RecordHeader {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut s = serializer.serialize_struct("RecordHeader", 4)?;
        s.serialize_field("key", &self.key)?;
        let value = self.value.as_ref().map(|v| match self.encoding {
            PayloadEncoding::Binary => base64::engine::general_purpose::STANDARD.encode(v),
            _ => String::from_utf8_lossy(v).into_owned(),
        });
        s.serialize_field("value", &value)?;
        s.serialize_field("encoding", &self.encoding)?;
        s.serialize_field("isValueTooLarge", &self.is_value_too_large)?;
        s.end()
    }
}

/// Normalized result of decoding a Kafka record.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Record {
    pub key: RecordPayload,
    pub value: RecordPayload,
    pub headers: Vec<RecordHeader>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_extraction_picks_side() {
        let record = KafkaRecord::new("orders").with_key(b"k".to_vec());
        assert_eq!(payload_from_record(&record, PayloadType::Key), Some(&b"k"[..]));
        assert_eq!(payload_from_record(&record, PayloadType::Value), None);
    }

    #[test]
    fn serializes_json_inline_and_skips_native_tree() {
        let payload = RecordPayload::from_json_value(
            PayloadEncoding::Json,
            serde_json::json!({"name": "John"}),
        )
        .unwrap();
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["normalizedPayload"]["name"], "John");
        assert_eq!(json["encoding"], "json");
        assert!(json.get("deserializedPayload").is_none());
    }

    #[test]
    fn serializes_binary_as_base64() {
        let payload = RecordPayload::decoded(
            PayloadEncoding::Binary,
            vec![0xff, 0x00],
            DeserializedPayload::Bytes(vec![0xff, 0x00]),
        );
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["normalizedPayload"], "/wA=");
    }
}
