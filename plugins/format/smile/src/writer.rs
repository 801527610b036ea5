use serde_json::Value;

use crate::MAGIC;

const STRING_END: u8 = 0xfc;

/// Encode a JSON tree as a Smile document.
///
/// The header advertises no shared names, no shared values and no raw
/// binary, so every name and string is written in full.
pub fn json_to_smile(value: &Value) -> Vec<u8> {
    let mut out = MAGIC.to_vec();
    out.push(0x00);
    write_value(&mut out, value);
    out
}

fn zigzag(n: i64) -> u64 {
    ((n << 1) ^ (n >> 63)) as u64
}

/// Last byte carries 6 bits and the high bit, earlier bytes 7 bits each.
fn write_vint(out: &mut Vec<u8>, mut n: u64) {
    let last = 0x80 | (n & 0x3f) as u8;
    n >>= 6;
    let mut groups = Vec::new();
    while n > 0 {
        groups.push((n & 0x7f) as u8);
        n >>= 7;
    }
    out.extend(groups.iter().rev());
    out.push(last);
}

fn write_double(out: &mut Vec<u8>, f: f64) {
    out.push(0x29);
    let bits = f.to_bits();
    for i in (0..10).rev() {
        out.push(((bits >> (7 * i)) & 0x7f) as u8);
    }
}

fn write_big_integer(out: &mut Vec<u8>, n: u64) {
    // Two's complement needs a leading zero byte once the top bit is set.
    let mut bytes = vec![0u8];
    bytes.extend_from_slice(&n.to_be_bytes());
    out.push(0x26);
    write_vint(out, bytes.len() as u64);
    write_seven_bit(out, &bytes);
}

fn write_seven_bit(out: &mut Vec<u8>, data: &[u8]) {
    for chunk in data.chunks(7) {
        let n = chunk.len();
        let acc = chunk.iter().fold(0u64, |acc, b| (acc << 8) | u64::from(*b));
        // n groups of 7 bits, then the remaining n bits right-aligned.
        for i in 0..n {
            let shift = 8 * n - 7 * (i + 1);
            out.push(((acc >> shift) & 0x7f) as u8);
        }
        out.push((acc & ((1u64 << n) - 1)) as u8);
    }
}

fn write_string(out: &mut Vec<u8>, s: &str) {
    let len = s.len();
    let ascii = s.is_ascii();
    match (len, ascii) {
        (0, _) => out.push(0x20),
        (1..=32, true) => out.push(0x40 + (len - 1) as u8),
        (33..=64, true) => out.push(0x60 + (len - 33) as u8),
        (2..=33, false) => out.push(0x80 + (len - 2) as u8),
        (34..=64, false) => out.push(0xa0 + (len - 34) as u8),
        (_, true) => {
            out.push(0xe0);
            out.extend_from_slice(s.as_bytes());
            out.push(STRING_END);
            return;
        }
        (_, false) => {
            out.push(0xe4);
            out.extend_from_slice(s.as_bytes());
            out.push(STRING_END);
            return;
        }
    }
    out.extend_from_slice(s.as_bytes());
}

fn write_key(out: &mut Vec<u8>, key: &str) {
    let len = key.len();
    match (len, key.is_ascii()) {
        (0, _) => {
            out.push(0x20);
            return;
        }
        (1..=64, true) => out.push(0x80 + (len - 1) as u8),
        (2..=57, false) => out.push(0xc0 + (len - 2) as u8),
        _ => {
            out.push(0x34);
            out.extend_from_slice(key.as_bytes());
            out.push(STRING_END);
            return;
        }
    }
    out.extend_from_slice(key.as_bytes());
}

fn write_value(out: &mut Vec<u8>, value: &Value) {
    match value {
        Value::Null => out.push(0x21),
        Value::Bool(false) => out.push(0x22),
        Value::Bool(true) => out.push(0x23),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                if (-16..=15).contains(&i) {
                    out.push(0xc0 | zigzag(i) as u8);
                } else if i32::try_from(i).is_ok() {
                    out.push(0x24);
                    write_vint(out, zigzag(i));
                } else {
                    out.push(0x25);
                    write_vint(out, zigzag(i));
                }
            } else if let Some(u) = n.as_u64() {
                write_big_integer(out, u);
            } else if let Some(f) = n.as_f64() {
                write_double(out, f);
            }
        }
        Value::String(s) => write_string(out, s),
        Value::Array(items) => {
            out.push(0xf8);
            for item in items {
                write_value(out, item);
            }
            out.push(0xf9);
        }
        Value::Object(map) => {
            out.push(0xfa);
            for (k, v) in map {
                write_key(out, k);
                write_value(out, v);
            }
            out.push(0xfb);
        }
    }
}
