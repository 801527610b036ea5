use base64::Engine;
use minicbor::data::Type;
use minicbor::{Decoder, Encoder};
use serde_json::{Map, Number, Value};

use recscope_api::SerdeError;

const MAX_DEPTH: usize = 256;
const BREAK: u8 = 0xff;

fn decode_err(e: minicbor::decode::Error) -> SerdeError {
    SerdeError::mismatch(format!("failed to decode CBOR payload: {e}"))
}

/// Decode a single CBOR item covering the whole payload.
///
/// Map keys of any type are rendered as strings, byte strings as base64,
/// tags are transparent and non-finite floats become null.
pub fn cbor_to_json(payload: &[u8]) -> Result<Value, SerdeError> {
    let mut dec = Decoder::new(payload);
    let value = decode_item(&mut dec, 0)?;
    let rest = payload.len() - dec.position();
    if rest > 0 {
        return Err(SerdeError::mismatch(format!("cbor: {rest} bytes of extraneous data")));
    }
    Ok(value)
}

fn float(v: f64) -> Value {
    Number::from_f64(v).map_or(Value::Null, Value::Number)
}

fn key_string(key: Value) -> String {
    match key {
        Value::String(s) => s,
        other => other.to_string(),
    }
}

fn at_break(dec: &Decoder<'_>) -> bool {
    dec.input().get(dec.position()) == Some(&BREAK)
}

fn decode_item(dec: &mut Decoder<'_>, depth: usize) -> Result<Value, SerdeError> {
    if depth > MAX_DEPTH {
        return Err(SerdeError::mismatch("cbor: nesting too deep"));
    }
    let b64 = base64::engine::general_purpose::STANDARD;

    let value = match dec.datatype().map_err(decode_err)? {
        Type::Bool => Value::Bool(dec.bool().map_err(decode_err)?),
        Type::Null => {
            dec.null().map_err(decode_err)?;
            Value::Null
        }
        Type::Undefined => {
            dec.undefined().map_err(decode_err)?;
            Value::Null
        }
        Type::U8 | Type::U16 | Type::U32 | Type::U64 => Value::from(dec.u64().map_err(decode_err)?),
        Type::I8 | Type::I16 | Type::I32 | Type::I64 => Value::from(dec.i64().map_err(decode_err)?),
        Type::Int => {
            // negative values below i64::MIN
            let int = dec.int().map_err(decode_err)?;
            let wide = i128::from(int);
            Value::String(wide.to_string())
        }
        Type::F16 => float(f64::from(dec.f16().map_err(decode_err)?)),
        Type::F32 => float(f64::from(dec.f32().map_err(decode_err)?)),
        Type::F64 => float(dec.f64().map_err(decode_err)?),
        Type::Simple => Value::from(dec.simple().map_err(decode_err)?),
        Type::Bytes => Value::String(b64.encode(dec.bytes().map_err(decode_err)?)),
        Type::BytesIndef => {
            let mut buf = Vec::new();
            for chunk in dec.bytes_iter().map_err(decode_err)? {
                buf.extend_from_slice(chunk.map_err(decode_err)?);
            }
            Value::String(b64.encode(buf))
        }
        Type::String => Value::String(dec.str().map_err(decode_err)?.to_string()),
        Type::StringIndef => {
            let mut s = String::new();
            for chunk in dec.str_iter().map_err(decode_err)? {
                s.push_str(chunk.map_err(decode_err)?);
            }
            Value::String(s)
        }
        Type::Array | Type::ArrayIndef => {
            let len = dec.array().map_err(decode_err)?;
            let mut items = Vec::new();
            match len {
                Some(n) => {
                    for _ in 0..n {
                        items.push(decode_item(dec, depth + 1)?);
                    }
                }
                None => {
                    while !at_break(dec) {
                        items.push(decode_item(dec, depth + 1)?);
                    }
                    dec.set_position(dec.position() + 1);
                }
            }
            Value::Array(items)
        }
        Type::Map | Type::MapIndef => {
            let len = dec.map().map_err(decode_err)?;
            let mut map = Map::new();
            let mut entry = |dec: &mut Decoder<'_>| -> Result<(), SerdeError> {
                let key = decode_item(dec, depth + 1)?;
                let value = decode_item(dec, depth + 1)?;
                map.insert(key_string(key), value);
                Ok(())
            };
            match len {
                Some(n) => {
                    for _ in 0..n {
                        entry(dec)?;
                    }
                }
                None => {
                    while !at_break(dec) {
                        entry(dec)?;
                    }
                    dec.set_position(dec.position() + 1);
                }
            }
            Value::Object(map)
        }
        Type::Tag => {
            dec.tag().map_err(decode_err)?;
            decode_item(dec, depth + 1)?
        }
        other => {
            return Err(SerdeError::mismatch(format!("cbor: unexpected data item {other:?}")));
        }
    };
    Ok(value)
}

/// Encode a JSON tree as CBOR, using the smallest integer encodings.
pub fn json_to_cbor(value: &Value) -> Result<Vec<u8>, SerdeError> {
    let mut buf = Vec::new();
    let mut enc = Encoder::new(&mut buf);
    encode_item(&mut enc, value)
        .map_err(|e| SerdeError::new(format!("failed to encode CBOR: {e}")))?;
    Ok(buf)
}

fn encode_item(
    enc: &mut Encoder<&mut Vec<u8>>,
    value: &Value,
) -> Result<(), minicbor::encode::Error<std::convert::Infallible>> {
    match value {
        Value::Null => {
            enc.null()?;
        }
        Value::Bool(b) => {
            enc.bool(*b)?;
        }
        Value::Number(n) => {
            if let Some(u) = n.as_u64() {
                enc.u64(u)?;
            } else if let Some(i) = n.as_i64() {
                enc.i64(i)?;
            } else if let Some(f) = n.as_f64() {
                enc.f64(f)?;
            }
        }
        Value::String(s) => {
            enc.str(s)?;
        }
        Value::Array(items) => {
            enc.array(items.len() as u64)?;
            for item in items {
                encode_item(enc, item)?;
            }
        }
        Value::Object(map) => {
            enc.map(map.len() as u64)?;
            for (k, v) in map {
                enc.str(k)?;
                encode_item(enc, v)?;
            }
        }
    }
    Ok(())
}
