use crate::error::SerdeError;

/// Native value handed to a serializer.
#[derive(Debug, Clone, PartialEq)]
pub enum Object {
    Str(String),
    Bytes(Vec<u8>),
    Value(serde_json::Value),
}

impl Object {
    /// Raw bytes of string/bytes objects. Structured values have none.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Object::Str(s) => Some(s.as_bytes()),
            Object::Bytes(b) => Some(b),
            Object::Value(_) => None,
        }
    }

    /// Interpret the object as a JSON document: strings and bytes are parsed,
    /// structured values are returned as-is.
    pub fn to_json_value(&self) -> Result<serde_json::Value, SerdeError> {
        match self {
            Object::Str(s) => serde_json::from_str(s)
                .map_err(|e| SerdeError::new(format!("failed to parse JSON input: {e}"))),
            Object::Bytes(b) => serde_json::from_slice(b)
                .map_err(|e| SerdeError::new(format!("failed to parse JSON input: {e}"))),
            Object::Value(v) => Ok(v.clone()),
        }
    }
}

impl From<&str> for Object {
    fn from(s: &str) -> Self {
        Object::Str(s.to_string())
    }
}

impl From<String> for Object {
    fn from(s: String) -> Self {
        Object::Str(s)
    }
}

impl From<Vec<u8>> for Object {
    fn from(b: Vec<u8>) -> Self {
        Object::Bytes(b)
    }
}

impl From<&[u8]> for Object {
    fn from(b: &[u8]) -> Self {
        Object::Bytes(b.to_vec())
    }
}

impl From<serde_json::Value> for Object {
    fn from(v: serde_json::Value) -> Self {
        Object::Value(v)
    }
}

/// Width of an unsigned integer written by the uint serializer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UintSize {
    U8,
    U16,
    U32,
    #[default]
    U64,
}

impl UintSize {
    pub fn byte_len(&self) -> usize {
        match self {
            UintSize::U8 => 1,
            UintSize::U16 => 2,
            UintSize::U32 => 4,
            UintSize::U64 => 8,
        }
    }
}

/// Serializer options. Each setter consumes and returns `self`, so options
/// compose: `SerializeOptions::default().schema_id(7).index(vec![1, 0])`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SerializeOptions {
    pub schema_id: Option<u32>,
    /// Nested protobuf message-index path (Confluent convention).
    pub index: Option<Vec<i64>>,
    pub subject: Option<String>,
    pub topic: Option<String>,
    pub uint_size: UintSize,
    /// Fully-qualified protobuf type for BSR payloads.
    pub message_type: Option<String>,
    /// BSR commit the message type is resolved against.
    pub commit: Option<String>,
}

impl SerializeOptions {
    pub fn schema_id(mut self, id: u32) -> Self {
        self.schema_id = Some(id);
        self
    }

    pub fn index(mut self, index: Vec<i64>) -> Self {
        self.index = Some(index);
        self
    }

    pub fn subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }

    pub fn topic(mut self, topic: impl Into<String>) -> Self {
        self.topic = Some(topic.into());
        self
    }

    pub fn uint_size(mut self, size: UintSize) -> Self {
        self.uint_size = size;
        self
    }

    pub fn message_type(mut self, name: impl Into<String>) -> Self {
        self.message_type = Some(name.into());
        self
    }

    pub fn commit(mut self, commit: impl Into<String>) -> Self {
        self.commit = Some(commit.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn options_compose() {
        let opts = SerializeOptions::default()
            .schema_id(3)
            .index(vec![1, 0])
            .topic("orders")
            .uint_size(UintSize::U16);
        assert_eq!(opts.schema_id, Some(3));
        assert_eq!(opts.index.as_deref(), Some(&[1, 0][..]));
        assert_eq!(opts.topic.as_deref(), Some("orders"));
        assert_eq!(opts.uint_size.byte_len(), 2);
    }

    #[test]
    fn object_json_conversion() {
        let obj = Object::from(r#"{"a":1}"#);
        assert_eq!(obj.to_json_value().unwrap(), serde_json::json!({"a": 1}));
        assert!(Object::from("not json").to_json_value().is_err());
    }
}
