//! XML payloads rendered as JSON.
//!
//! Conversion rules: the root element becomes the single top-level key,
//! attributes become `-name` keys, text next to attributes or child elements
//! goes under `#content`, repeated child elements collapse into an array and
//! a leaf element is its text. All scalar values stay strings.

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use serde_json::{Map, Value};

use recscope_api::{
    ready, require_payload, trim_left_whitespace, BoxFuture, KafkaRecord, Object, PayloadEncoding,
    PayloadType, RecordPayload, Serde, SerdeContext, SerdeError, SerializeOptions,
};

#[derive(Debug, Default)]
struct Element {
    name: String,
    attributes: Vec<(String, String)>,
    children: Vec<Element>,
    text: String,
}

impl Element {
    fn open(start: &BytesStart<'_>) -> Result<Self, SerdeError> {
        let name = std::str::from_utf8(start.name().as_ref())?.to_string();
        let mut attributes = Vec::new();
        for attr in start.attributes() {
            let attr = attr.map_err(|e| SerdeError::mismatch(format!("invalid XML attribute: {e}")))?;
            let key = std::str::from_utf8(attr.key.as_ref())?.to_string();
            let value = attr
                .unescape_value()
                .map_err(|e| SerdeError::mismatch(format!("invalid XML attribute value: {e}")))?;
            attributes.push((key, value.into_owned()));
        }
        Ok(Self {
            name,
            attributes,
            ..Default::default()
        })
    }

    fn into_json(self) -> Value {
        let text = self.text.trim().to_string();
        if self.attributes.is_empty() && self.children.is_empty() {
            return Value::String(text);
        }

        let mut map = Map::new();
        for (key, value) in self.attributes {
            map.insert(format!("-{key}"), Value::String(value));
        }
        for child in self.children {
            let name = child.name.clone();
            let value = child.into_json();
            match map.get_mut(&name) {
                Some(Value::Array(items)) => items.push(value),
                Some(existing) => {
                    let first = existing.take();
                    *existing = Value::Array(vec![first, value]);
                }
                None => {
                    map.insert(name, value);
                }
            }
        }
        if !text.is_empty() {
            map.insert("#content".into(), Value::String(text));
        }
        Value::Object(map)
    }
}

/// Parse an XML document into its JSON rendering.
pub fn xml_to_json(payload: &[u8]) -> Result<Value, SerdeError> {
    let mut reader = Reader::from_reader(payload);
    let mut stack: Vec<Element> = Vec::new();
    let mut root: Option<Element> = None;
    let mut buf = Vec::new();

    loop {
        let event = reader
            .read_event_into(&mut buf)
            .map_err(|e| SerdeError::mismatch(format!("failed to parse XML at position {}: {e}", reader.buffer_position())))?;
        match event {
            Event::Start(start) => stack.push(Element::open(&start)?),
            Event::Empty(start) => {
                let element = Element::open(&start)?;
                attach(&mut stack, &mut root, element)?;
            }
            Event::End(_) => {
                let element = stack
                    .pop()
                    .ok_or_else(|| SerdeError::mismatch("unexpected closing XML tag"))?;
                attach(&mut stack, &mut root, element)?;
            }
            Event::Text(text) => {
                let text = text
                    .unescape()
                    .map_err(|e| SerdeError::mismatch(format!("invalid XML text: {e}")))?;
                if let Some(current) = stack.last_mut() {
                    current.text.push_str(&text);
                }
            }
            Event::CData(data) => {
                if let Some(current) = stack.last_mut() {
                    current.text.push_str(std::str::from_utf8(&data)?);
                }
            }
            Event::Eof => break,
            // declarations, comments, processing instructions, doctype
            _ => {}
        }
        buf.clear();
    }

    if !stack.is_empty() {
        return Err(SerdeError::mismatch("unexpected end of XML document: unclosed elements"));
    }
    let root = root.ok_or_else(|| SerdeError::mismatch("XML document has no root element"))?;
    let mut map = Map::new();
    let name = root.name.clone();
    map.insert(name, root.into_json());
    Ok(Value::Object(map))
}

fn attach(stack: &mut [Element], root: &mut Option<Element>, element: Element) -> Result<(), SerdeError> {
    match stack.last_mut() {
        Some(parent) => parent.children.push(element),
        None if root.is_none() => *root = Some(element),
        None => return Err(SerdeError::mismatch("XML document has more than one root element")),
    }
    Ok(())
}

pub struct XmlSerde;

impl XmlSerde {
    fn decode(&self, record: &KafkaRecord, payload_type: PayloadType) -> Result<RecordPayload, SerdeError> {
        let payload = require_payload(record, payload_type)?;
        let trimmed = trim_left_whitespace(payload);
        match trimmed.first() {
            None => return Err(SerdeError::mismatch("payload is empty after trimming whitespace")),
            Some(b'<') => {}
            Some(_) => {
                return Err(SerdeError::mismatch("first byte indicates this is not valid XML"));
            }
        }
        let value = xml_to_json(trimmed)?;
        Ok(RecordPayload::from_json_value(PayloadEncoding::Xml, value)?)
    }

    /// XML documents are passed through after a well-formedness check.
    fn encode(&self, obj: Object) -> Result<Vec<u8>, SerdeError> {
        let bytes = match obj {
            Object::Str(s) => s.into_bytes(),
            Object::Bytes(b) => b,
            Object::Value(Value::String(s)) => s.into_bytes(),
            Object::Value(_) => {
                return Err(SerdeError::new("XML serialization requires an XML document as string or bytes"));
            }
        };
        xml_to_json(trim_left_whitespace(&bytes))
            .map_err(|e| SerdeError::new(format!("input is not a valid XML document: {}", e.message())))?;
        Ok(bytes)
    }
}

impl Serde for XmlSerde {
    fn name(&self) -> PayloadEncoding {
        PayloadEncoding::Xml
    }

    fn deserialize_payload<'a>(
        &'a self,
        _ctx: &'a SerdeContext,
        record: &'a KafkaRecord,
        payload_type: PayloadType,
    ) -> BoxFuture<'a, Result<RecordPayload, SerdeError>> {
        ready(self.decode(record, payload_type))
    }

    fn serialize_object<'a>(
        &'a self,
        _ctx: &'a SerdeContext,
        obj: Object,
        _payload_type: PayloadType,
        _opts: &'a SerializeOptions,
    ) -> BoxFuture<'a, Result<Vec<u8>, SerdeError>> {
        ready(self.encode(obj))
    }
}
