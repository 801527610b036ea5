//! Confluent schema-registry wire framing.
//!
//! Byte 0 is the magic byte (0), bytes 1-4 a big-endian u32 schema ID.
//! Protobuf payloads additionally carry a zig-zag varint array with the
//! message-index path right after the header.

use crate::error::SerdeError;

pub const MAGIC_BYTE: u8 = 0;
pub const HEADER_LEN: usize = 5;

/// Split a Confluent-framed payload into `(schema_id, body)`.
///
/// Rejects payloads of `HEADER_LEN` bytes or less: a header without a body
/// is never decoded.
pub fn split_header<'a>(payload: &'a [u8], protocol: &str) -> Result<(u32, &'a [u8]), SerdeError> {
    if payload.len() <= HEADER_LEN {
        return Err(SerdeError::mismatch(format!(
            "payload size is too small for a Confluent-style {protocol} datum: expected more than {HEADER_LEN} bytes, got {}",
            payload.len()
        )));
    }
    if payload[0] != MAGIC_BYTE {
        return Err(SerdeError::mismatch(format!(
            "wrong Confluent-style {protocol} magic byte: expected {MAGIC_BYTE}, got {}",
            payload[0]
        )));
    }
    let schema_id = u32::from_be_bytes([payload[1], payload[2], payload[3], payload[4]]);
    Ok((schema_id, &payload[HEADER_LEN..]))
}

pub fn write_header(schema_id: u32, buf: &mut Vec<u8>) {
    buf.push(MAGIC_BYTE);
    buf.extend_from_slice(&schema_id.to_be_bytes());
}

/// Read a zig-zag encoded signed varint. Returns the value and bytes consumed.
pub fn read_varint(buf: &[u8]) -> Result<(i64, usize), SerdeError> {
    let (raw, n) = read_uvarint(buf)?;
    let value = ((raw >> 1) as i64) ^ -((raw & 1) as i64);
    Ok((value, n))
}

/// Read an unsigned LEB128 varint. Returns the value and bytes consumed.
pub fn read_uvarint(buf: &[u8]) -> Result<(u64, usize), SerdeError> {
    let mut value: u64 = 0;
    for (i, &b) in buf.iter().enumerate() {
        if i == 10 {
            break;
        }
        value |= u64::from(b & 0x7f) << (7 * i);
        if b & 0x80 == 0 {
            return Ok((value, i + 1));
        }
    }
    Err(SerdeError::mismatch("invalid varint: truncated or overflowing"))
}

pub fn write_varint(value: i64, buf: &mut Vec<u8>) {
    write_uvarint(((value << 1) ^ (value >> 63)) as u64, buf);
}

pub fn write_uvarint(mut value: u64, buf: &mut Vec<u8>) {
    while value >= 0x80 {
        buf.push((value as u8) | 0x80);
        value >>= 7;
    }
    buf.push(value as u8);
}

/// Read the protobuf message-index array that follows the header.
///
/// A count of zero is the shorthand for `[0]` (first top-level message).
pub fn read_message_indexes(buf: &[u8]) -> Result<(Vec<i64>, &[u8]), SerdeError> {
    let (count, mut offset) = read_varint(buf)?;
    if count == 0 {
        return Ok((vec![0], &buf[offset..]));
    }
    // Each index takes at least one byte.
    if count < 0 || count as usize > buf.len() - offset {
        return Err(SerdeError::mismatch(format!(
            "invalid message index count {count} for remaining {} bytes",
            buf.len() - offset
        )));
    }
    let mut indexes = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let (idx, n) = read_varint(&buf[offset..])?;
        if idx < 0 {
            return Err(SerdeError::mismatch(format!("negative message index {idx}")));
        }
        indexes.push(idx);
        offset += n;
    }
    Ok((indexes, &buf[offset..]))
}

pub fn write_message_indexes(indexes: &[i64], buf: &mut Vec<u8>) {
    if indexes.is_empty() || indexes == [0] {
        buf.push(0);
        return;
    }
    write_varint(indexes.len() as i64, buf);
    for &idx in indexes {
        write_varint(idx, buf);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn header_of_exactly_five_bytes_is_too_small() {
        let err = split_header(&[0, 0, 0, 0, 1], "avro").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Mismatch);
        assert!(err.message().contains("too small"));
    }

    #[test]
    fn wrong_magic_is_rejected() {
        let err = split_header(&[1, 0, 0, 0, 1, 2], "avro").unwrap_err();
        assert!(err.message().contains("magic"));
    }

    #[test]
    fn splits_schema_id_and_body() {
        let (id, body) = split_header(&[0, 0, 0, 1, 0, 9, 8], "avro").unwrap();
        assert_eq!(id, 256);
        assert_eq!(body, &[9, 8]);
    }

    #[test]
    fn message_index_shorthand() {
        let (idx, rest) = read_message_indexes(&[0, 0xaa]).unwrap();
        assert_eq!(idx, vec![0]);
        assert_eq!(rest, &[0xaa]);

        let mut buf = Vec::new();
        write_message_indexes(&[0], &mut buf);
        assert_eq!(buf, vec![0]);
    }

    #[test]
    fn nested_message_indexes() {
        let mut buf = Vec::new();
        write_message_indexes(&[1, 0, 2], &mut buf);
        // count 3 → zigzag 6, then 1 → 2, 0 → 0, 2 → 4
        assert_eq!(buf, vec![6, 2, 0, 4]);
        buf.push(0x42);
        let (idx, rest) = read_message_indexes(&buf).unwrap();
        assert_eq!(idx, vec![1, 0, 2]);
        assert_eq!(rest, &[0x42]);
    }

    #[test]
    fn oversized_index_count_is_rejected() {
        // zigzag 100 → 200, encoded as two bytes
        assert!(read_message_indexes(&[0xc8, 0x01, 2]).is_err());
    }

    #[test]
    fn truncated_varint() {
        assert!(read_uvarint(&[0x80, 0x80]).is_err());
    }
}
