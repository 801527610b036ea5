use base64::Engine;
use serde_json::{Map, Number, Value};

use recscope_api::SerdeError;

use crate::{MAGIC, MAX_SHARED};

const FLAG_SHARED_NAMES: u8 = 0x01;
const FLAG_SHARED_VALUES: u8 = 0x02;
const FLAG_RAW_BINARY: u8 = 0x04;

const STRING_END: u8 = 0xfc;
const MAX_SHAREABLE_VALUE: usize = 64;
const MAX_DEPTH: usize = 256;

fn err(msg: impl Into<String>) -> SerdeError {
    SerdeError::mismatch(format!("smile: {}", msg.into()))
}

fn zigzag(n: u64) -> i64 {
    ((n >> 1) as i64) ^ -((n & 1) as i64)
}

/// Back-reference table for names or values.
struct Shared {
    enabled: bool,
    entries: Vec<String>,
}

impl Shared {
    fn new(enabled: bool) -> Self {
        Self {
            enabled,
            entries: Vec::new(),
        }
    }

    fn push(&mut self, s: &str) {
        if !self.enabled {
            return;
        }
        if self.entries.len() >= MAX_SHARED {
            self.entries.clear();
        }
        self.entries.push(s.to_string());
    }

    fn get(&self, index: usize, what: &str) -> Result<String, SerdeError> {
        if !self.enabled {
            return Err(err(format!("{what} back-reference but sharing is disabled")));
        }
        self.entries
            .get(index)
            .cloned()
            .ok_or_else(|| err(format!("invalid {what} back-reference {index}")))
    }
}

/// Decode a Smile document (header included) into a JSON tree.
pub fn smile_to_json(data: &[u8]) -> Result<Value, SerdeError> {
    if data.len() < 4 || data[..3] != MAGIC {
        return Err(err("missing header"));
    }
    let flags = data[3];
    if flags >> 4 != 0 {
        return Err(err(format!("unsupported format version {}", flags >> 4)));
    }
    let mut reader = Reader {
        data,
        pos: 4,
        names: Shared::new(flags & FLAG_SHARED_NAMES != 0),
        values: Shared::new(flags & FLAG_SHARED_VALUES != 0),
        raw_binary: flags & FLAG_RAW_BINARY != 0,
    };
    let token = reader.next()?;
    if token == 0xff {
        return Err(err("document has no content"));
    }
    reader.value(token, 0)
}

struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
    names: Shared,
    values: Shared,
    raw_binary: bool,
}

impl<'a> Reader<'a> {
    fn next(&mut self) -> Result<u8, SerdeError> {
        let b = *self.data.get(self.pos).ok_or_else(|| err("unexpected end of input"))?;
        self.pos += 1;
        Ok(b)
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], SerdeError> {
        let end = self.pos.checked_add(n).filter(|e| *e <= self.data.len());
        let end = end.ok_or_else(|| err("unexpected end of input"))?;
        let slice = &self.data[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn text(&mut self, n: usize) -> Result<String, SerdeError> {
        let bytes = self.take(n)?;
        std::str::from_utf8(bytes)
            .map(str::to_string)
            .map_err(|e| err(format!("invalid UTF-8 in string: {e}")))
    }

    /// String terminated by 0xFC.
    fn terminated_text(&mut self) -> Result<String, SerdeError> {
        let rest = &self.data[self.pos..];
        let len = rest
            .iter()
            .position(|b| *b == STRING_END)
            .ok_or_else(|| err("unterminated long string"))?;
        let s = self.text(len)?;
        self.pos += 1;
        Ok(s)
    }

    /// Variable-length unsigned int: 7 bits per byte, last byte flagged
    /// with the high bit and carrying 6 bits.
    fn vint(&mut self, max_bytes: usize) -> Result<u64, SerdeError> {
        let mut value: u64 = 0;
        for _ in 0..max_bytes {
            let b = self.next()?;
            if b & 0x80 != 0 {
                return Ok((value << 6) | u64::from(b & 0x3f));
            }
            value = (value << 7) | u64::from(b);
        }
        Err(err("variable-length integer too long"))
    }

    fn fixed7(&mut self, n: usize) -> Result<u64, SerdeError> {
        let mut value: u64 = 0;
        for _ in 0..n {
            let b = self.next()?;
            if b & 0x80 != 0 {
                return Err(err("invalid 7-bit encoded number"));
            }
            value = (value << 7) | u64::from(b);
        }
        Ok(value)
    }

    /// `len` raw bytes stored 7 bits per byte, in chunks of 7.
    fn seven_bit_binary(&mut self, len: usize) -> Result<Vec<u8>, SerdeError> {
        let mut out = Vec::with_capacity(len.min(self.data.len()));
        let mut remaining = len;
        while remaining > 0 {
            let chunk = remaining.min(7);
            let mut acc: u64 = 0;
            for _ in 0..chunk {
                acc = (acc << 7) | u64::from(self.next()? & 0x7f);
            }
            let last = self.next()?;
            acc = (acc << chunk) | u64::from(last & ((1u8 << chunk) - 1));
            for i in (0..chunk).rev() {
                out.push((acc >> (8 * i)) as u8);
            }
            remaining -= chunk;
        }
        Ok(out)
    }

    fn length(&mut self) -> Result<usize, SerdeError> {
        let len = self.vint(10)?;
        usize::try_from(len)
            .ok()
            .filter(|l| *l <= self.data.len().saturating_mul(2))
            .ok_or_else(|| err(format!("length {len} exceeds input")))
    }

    fn shareable(&mut self, s: String) -> Value {
        if s.len() <= MAX_SHAREABLE_VALUE {
            self.values.push(&s);
        }
        Value::String(s)
    }

    fn value(&mut self, token: u8, depth: usize) -> Result<Value, SerdeError> {
        if depth > MAX_DEPTH {
            return Err(err("nesting too deep"));
        }
        let b64 = base64::engine::general_purpose::STANDARD;
        let value = match token {
            0x00 => return Err(err("invalid shared value reference 0x00")),
            0x01..=0x1f => Value::String(self.values.get(usize::from(token) - 1, "value")?),
            0x20 => Value::String(String::new()),
            0x21 => Value::Null,
            0x22 => Value::Bool(false),
            0x23 => Value::Bool(true),
            0x24 => Value::from(zigzag(self.vint(5)?) as i32),
            0x25 => Value::from(zigzag(self.vint(10)?)),
            0x26 => {
                let len = self.length()?;
                let bytes = self.seven_bit_binary(len)?;
                big_integer(&bytes)?
            }
            0x28 => {
                let bits = self.fixed7(5)?;
                let f = f32::from_bits(bits as u32);
                Number::from_f64(f64::from(f)).map_or(Value::Null, Value::Number)
            }
            0x29 => {
                let bits = self.fixed7(10)?;
                Number::from_f64(f64::from_bits(bits)).map_or(Value::Null, Value::Number)
            }
            0x2a => {
                let scale = zigzag(self.vint(5)?) as i32;
                let len = self.length()?;
                let bytes = self.seven_bit_binary(len)?;
                big_decimal(&bytes, scale)?
            }
            0x40..=0x5f => {
                let s = self.text(usize::from(token & 0x1f) + 1)?;
                self.shareable(s)
            }
            0x60..=0x7f => {
                let s = self.text(usize::from(token & 0x1f) + 33)?;
                self.shareable(s)
            }
            0x80..=0x9f => {
                let s = self.text(usize::from(token & 0x1f) + 2)?;
                self.shareable(s)
            }
            0xa0..=0xbf => {
                let s = self.text(usize::from(token & 0x1f) + 34)?;
                self.shareable(s)
            }
            0xc0..=0xdf => Value::from(zigzag(u64::from(token & 0x1f))),
            0xe0 | 0xe4 => Value::String(self.terminated_text()?),
            0xe8 => {
                let len = self.length()?;
                Value::String(b64.encode(self.seven_bit_binary(len)?))
            }
            0xec..=0xef => {
                let index = (usize::from(token & 0x03) << 8) | usize::from(self.next()?);
                Value::String(self.values.get(index, "value")?)
            }
            0xf8 => {
                let mut items = Vec::new();
                loop {
                    let t = self.next()?;
                    if t == 0xf9 {
                        break;
                    }
                    items.push(self.value(t, depth + 1)?);
                }
                Value::Array(items)
            }
            0xfa => self.object(depth)?,
            0xfd => {
                if !self.raw_binary {
                    return Err(err("raw binary found but not enabled in header"));
                }
                let len = self.length()?;
                Value::String(b64.encode(self.take(len)?))
            }
            other => return Err(err(format!("unexpected value token 0x{other:02x}"))),
        };
        Ok(value)
    }

    fn key(&mut self, token: u8) -> Result<String, SerdeError> {
        let name = match token {
            0x20 => return Ok(String::new()),
            0x30..=0x33 => {
                let index = (usize::from(token & 0x03) << 8) | usize::from(self.next()?);
                return self.names.get(index, "name");
            }
            0x34 => self.terminated_text()?,
            0x40..=0x7f => return self.names.get(usize::from(token & 0x3f), "name"),
            0x80..=0xbf => self.text(usize::from(token & 0x3f) + 1)?,
            0xc0..=0xf7 => self.text(usize::from(token & 0x3f) + 2)?,
            other => return Err(err(format!("unexpected key token 0x{other:02x}"))),
        };
        self.names.push(&name);
        Ok(name)
    }

    fn object(&mut self, depth: usize) -> Result<Value, SerdeError> {
        let mut map = Map::new();
        loop {
            let t = self.next()?;
            if t == 0xfb {
                break;
            }
            let key = self.key(t)?;
            let vt = self.next()?;
            let value = self.value(vt, depth + 1)?;
            map.insert(key, value);
        }
        Ok(Value::Object(map))
    }
}

/// Two's complement big-endian integer. Values outside i64/u64 are
/// rendered as decimal strings.
fn big_integer(bytes: &[u8]) -> Result<Value, SerdeError> {
    let n = twos_complement(bytes)?;
    Ok(if let Ok(i) = i64::try_from(n) {
        Value::from(i)
    } else if let Ok(u) = u64::try_from(n) {
        Value::from(u)
    } else {
        Value::String(n.to_string())
    })
}

fn big_decimal(bytes: &[u8], scale: i32) -> Result<Value, SerdeError> {
    let unscaled = twos_complement(bytes)?;
    let f: f64 = format!("{unscaled}e{}", -i64::from(scale))
        .parse()
        .map_err(|e| err(format!("invalid big decimal: {e}")))?;
    Ok(Number::from_f64(f).map_or(Value::Null, Value::Number))
}

fn twos_complement(bytes: &[u8]) -> Result<i128, SerdeError> {
    if bytes.is_empty() {
        return Ok(0);
    }
    if bytes.len() > 16 {
        return Err(err("big integer wider than 128 bits"));
    }
    let fill = if bytes[0] & 0x80 != 0 { 0xff } else { 0x00 };
    let mut buf = [fill; 16];
    buf[16 - bytes.len()..].copy_from_slice(bytes);
    Ok(i128::from_be_bytes(buf))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(flags: u8, body: &[u8]) -> Vec<u8> {
        let mut v = MAGIC.to_vec();
        v.push(flags);
        v.extend_from_slice(body);
        v
    }

    #[test]
    fn decodes_simple_object() {
        let data = [0x3a, 0x29, 0x0a, 0x01, 0xfa, 0x82, b'f', b'o', b'o', 0x22, 0xfb];
        assert_eq!(smile_to_json(&data).unwrap(), json!({"foo": false}));
    }

    #[test]
    fn shared_names_are_back_referenced() {
        // [{"ab": 1}, {@0: 2}]
        let data = doc(
            0x01,
            &[0xf8, 0xfa, 0x81, b'a', b'b', 0xc2, 0xfb, 0xfa, 0x40, 0xc4, 0xfb, 0xf9],
        );
        assert_eq!(smile_to_json(&data).unwrap(), json!([{"ab": 1}, {"ab": 2}]));
    }

    #[test]
    fn shared_values_are_back_referenced() {
        // ["xy", @0]
        let data = doc(0x03, &[0xf8, 0x41, b'x', b'y', 0x01, 0xf9]);
        assert_eq!(smile_to_json(&data).unwrap(), json!(["xy", "xy"]));

        let disabled = doc(0x01, &[0xf8, 0x41, b'x', b'y', 0x01, 0xf9]);
        assert!(smile_to_json(&disabled).is_err());
    }

    #[test]
    fn numbers() {
        // small int -3, int32 1000, double 1.5
        assert_eq!(smile_to_json(&doc(0, &[0xc5])).unwrap(), json!(-3));
        // zigzag(1000) = 2000 = 0b1_1111_010000 -> 0x1f, 0x80|0x10
        assert_eq!(smile_to_json(&doc(0, &[0x24, 0x1f, 0x90])).unwrap(), json!(1000));
        let bits = 1.5f64.to_bits();
        let mut body = vec![0x29];
        for i in (0..10).rev() {
            body.push(((bits >> (7 * i)) & 0x7f) as u8);
        }
        assert_eq!(smile_to_json(&doc(0, &body)).unwrap(), json!(1.5));
    }

    #[test]
    fn seven_bit_binary_partial_chunk() {
        // bytes [0xff, 0x01]: 7 bits 1111111, 7 bits 1000000, then 2 bits 01
        let data = doc(0, &[0xe8, 0x82, 0x7f, 0x40, 0x01]);
        assert_eq!(smile_to_json(&data).unwrap(), json!("/wE="));
    }

    #[test]
    fn long_strings_and_errors() {
        let data = doc(0, &[0xe0, b'h', b'i', 0xfc]);
        assert_eq!(smile_to_json(&data).unwrap(), json!("hi"));
        assert!(smile_to_json(&doc(0, &[0xe0, b'h'])).is_err());
        assert!(smile_to_json(&doc(0, &[0xfa, 0x82, b'f'])).is_err());
        assert!(smile_to_json(b":)\n").is_err());
    }
}
