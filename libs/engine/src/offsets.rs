//! Decoder for the internal `__consumer_offsets` topic.
//!
//! Keys start with a big-endian `i16` version that selects the record kind:
//! 0 and 1 are offset commits, 2 is group metadata. Values carry their own
//! version; version 4 of both value kinds uses the flexible encoding
//! (compact strings, compact arrays, tagged fields).

use base64::Engine;
use serde::Serialize;

use recscope_api::{KafkaRecord, PayloadEncoding, Record, RecordPayload, SerdeError};

pub const CONSUMER_OFFSETS_TOPIC: &str = "__consumer_offsets";

// ════════════════════════════════════════════════════════════════
//  Decoded shapes
// ════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum OffsetsKey {
    OffsetCommit(OffsetCommitKey),
    GroupMetadata(GroupMetadataKey),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OffsetCommitKey {
    pub version: i16,
    pub group: String,
    pub topic: String,
    pub partition: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupMetadataKey {
    pub version: i16,
    pub group: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OffsetCommitValue {
    pub version: i16,
    pub offset: i64,
    /// Version 3 and later; `-1` when the producer did not know it.
    pub leader_epoch: Option<i32>,
    pub metadata: String,
    pub commit_timestamp: i64,
    /// Version 1 only.
    pub expire_timestamp: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupMetadataValue {
    pub version: i16,
    pub protocol_type: String,
    pub generation: i32,
    pub protocol: Option<String>,
    pub leader: Option<String>,
    /// Version 2 and later.
    pub current_state_timestamp: Option<i64>,
    pub members: Vec<GroupMember>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupMember {
    pub member_id: String,
    /// Version 3 and later.
    pub group_instance_id: Option<String>,
    pub client_id: String,
    pub client_host: String,
    /// Version 1 and later.
    pub rebalance_timeout: Option<i32>,
    pub session_timeout: i32,
    pub subscription: MemberData<ConsumerSubscription>,
    pub assignment: MemberData<ConsumerAssignment>,
}

/// Protocol-specific member bytes: decoded for the `consumer` protocol type,
/// base64 otherwise or when they do not parse.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum MemberData<T> {
    Decoded(T),
    Raw(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TopicPartitions {
    pub topic: String,
    pub partitions: Vec<i32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsumerSubscription {
    pub version: i16,
    pub topics: Vec<String>,
    pub user_data: Option<String>,
    pub owned_partitions: Vec<TopicPartitions>,
    pub generation_id: Option<i32>,
    pub rack_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsumerAssignment {
    pub version: i16,
    pub assigned_partitions: Vec<TopicPartitions>,
    pub user_data: Option<String>,
}

// ════════════════════════════════════════════════════════════════
//  Reader
// ════════════════════════════════════════════════════════════════

/// Cursor over Kafka protocol primitives. Every read is bounds-checked.
struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
    what: &'static str,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8], what: &'static str) -> Self {
        Self { buf, pos: 0, what }
    }

    fn take(&mut self, n: usize, field: &str) -> Result<&'a [u8], SerdeError> {
        let end = self.pos.checked_add(n).filter(|&end| end <= self.buf.len());
        let Some(end) = end else {
            return Err(SerdeError::structural(format!(
                "{}: truncated while reading {field} at byte {} (need {n}, have {})",
                self.what,
                self.pos,
                self.buf.len() - self.pos
            )));
        };
        let bytes = &self.buf[self.pos..end];
        self.pos = end;
        Ok(bytes)
    }

    fn array<const N: usize>(&mut self, field: &str) -> Result<[u8; N], SerdeError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N, field)?);
        Ok(out)
    }

    fn i16(&mut self, field: &str) -> Result<i16, SerdeError> {
        Ok(i16::from_be_bytes(self.array(field)?))
    }

    fn i32(&mut self, field: &str) -> Result<i32, SerdeError> {
        Ok(i32::from_be_bytes(self.array(field)?))
    }

    fn i64(&mut self, field: &str) -> Result<i64, SerdeError> {
        Ok(i64::from_be_bytes(self.array(field)?))
    }

    fn uvarint(&mut self, field: &str) -> Result<u64, SerdeError> {
        let mut value = 0u64;
        for shift in (0..64).step_by(7) {
            let [byte] = self.array::<1>(field)?;
            // The tenth byte holds only bit 63.
            if shift == 63 && byte > 0x01 {
                return Err(self.malformed(field, "varint overflows 64 bits"));
            }
            value |= u64::from(byte & 0x7f) << shift;
            if byte & 0x80 == 0 {
                return Ok(value);
            }
        }
        Err(self.malformed(field, "varint is too long"))
    }

    fn malformed(&self, field: &str, why: impl std::fmt::Display) -> SerdeError {
        SerdeError::structural(format!("{}: malformed {field}: {why}", self.what))
    }

    fn utf8(&self, bytes: &[u8], field: &str) -> Result<String, SerdeError> {
        String::from_utf8(bytes.to_vec()).map_err(|e| self.malformed(field, e))
    }

    /// Length of a nullable item: `None` for null.
    fn length(&mut self, flexible: bool, wide: bool, field: &str) -> Result<Option<usize>, SerdeError> {
        if flexible {
            // Compact encoding stores length + 1, zero being null.
            return match self.uvarint(field)? {
                0 => Ok(None),
                raw => usize::try_from(raw - 1)
                    .map(Some)
                    .map_err(|_| self.malformed(field, format!("length {} is too large", raw - 1))),
            };
        }
        let len = if wide {
            i64::from(self.i32(field)?)
        } else {
            i64::from(self.i16(field)?)
        };
        match len {
            -1 => Ok(None),
            n if n < 0 => Err(self.malformed(field, format!("negative length {n}"))),
            n => Ok(Some(n as usize)),
        }
    }

    fn nullable_string(&mut self, flexible: bool, field: &str) -> Result<Option<String>, SerdeError> {
        match self.length(flexible, false, field)? {
            None => Ok(None),
            Some(n) => {
                let bytes = self.take(n, field)?;
                self.utf8(bytes, field).map(Some)
            }
        }
    }

    fn string(&mut self, flexible: bool, field: &str) -> Result<String, SerdeError> {
        self.nullable_string(flexible, field)?
            .ok_or_else(|| self.malformed(field, "unexpected null string"))
    }

    fn nullable_bytes(&mut self, flexible: bool, field: &str) -> Result<Option<&'a [u8]>, SerdeError> {
        match self.length(flexible, true, field)? {
            None => Ok(None),
            Some(n) => self.take(n, field).map(Some),
        }
    }

    fn bytes(&mut self, flexible: bool, field: &str) -> Result<&'a [u8], SerdeError> {
        Ok(self.nullable_bytes(flexible, field)?.unwrap_or_default())
    }

    fn array_len(&mut self, flexible: bool, field: &str) -> Result<usize, SerdeError> {
        let len = self.length(flexible, true, field)?.unwrap_or(0);
        // Every element takes at least one byte.
        if len > self.buf.len() - self.pos {
            return Err(self.malformed(field, format!("array length {len} exceeds remaining bytes")));
        }
        Ok(len)
    }

    /// Skip a tagged-field section. Tags unknown to this decoder are ignored.
    fn tagged_fields(&mut self) -> Result<(), SerdeError> {
        let count = self.uvarint("tagged fields")?;
        for _ in 0..count {
            self.uvarint("tag")?;
            let size = self.uvarint("tag size")?;
            let size = usize::try_from(size).map_err(|e| self.malformed("tag size", e))?;
            self.take(size, "tagged field")?;
        }
        Ok(())
    }
}

fn unknown_version(what: &str, version: i16) -> SerdeError {
    SerdeError::structural(format!("unknown {what} message version {version}"))
}

// ════════════════════════════════════════════════════════════════
//  Keys
// ════════════════════════════════════════════════════════════════

pub fn decode_key(key: &[u8]) -> Result<OffsetsKey, SerdeError> {
    if key.len() < 2 {
        return Err(SerdeError::structural(format!(
            "key is {} byte(s), too short to hold a version",
            key.len()
        )));
    }
    let mut r = Reader::new(key, "key");
    let version = r.i16("version")?;
    match version {
        0 | 1 => Ok(OffsetsKey::OffsetCommit(OffsetCommitKey {
            version,
            group: r.string(false, "group")?,
            topic: r.string(false, "topic")?,
            partition: r.i32("partition")?,
        })),
        2 => Ok(OffsetsKey::GroupMetadata(GroupMetadataKey {
            version,
            group: r.string(false, "group")?,
        })),
        other => Err(unknown_version("key", other)),
    }
}

// ════════════════════════════════════════════════════════════════
//  Values
// ════════════════════════════════════════════════════════════════

pub fn decode_offset_commit_value(value: &[u8]) -> Result<OffsetCommitValue, SerdeError> {
    let mut r = Reader::new(value, "offset commit value");
    let version = r.i16("version")?;
    if !(0..=4).contains(&version) {
        return Err(unknown_version("offset commit value", version));
    }
    let flexible = version >= 4;

    let offset = r.i64("offset")?;
    let leader_epoch = if version >= 3 { Some(r.i32("leader epoch")?) } else { None };
    let metadata = r.string(flexible, "metadata")?;
    let commit_timestamp = r.i64("commit timestamp")?;
    let expire_timestamp = if version == 1 { Some(r.i64("expire timestamp")?) } else { None };
    if flexible {
        r.tagged_fields()?;
    }

    Ok(OffsetCommitValue {
        version,
        offset,
        leader_epoch,
        metadata,
        commit_timestamp,
        expire_timestamp,
    })
}

pub fn decode_group_metadata_value(value: &[u8]) -> Result<GroupMetadataValue, SerdeError> {
    let mut r = Reader::new(value, "group metadata value");
    let version = r.i16("version")?;
    if !(0..=4).contains(&version) {
        return Err(unknown_version("group metadata value", version));
    }
    let flexible = version >= 4;

    let protocol_type = r.string(flexible, "protocol type")?;
    let generation = r.i32("generation")?;
    let protocol = r.nullable_string(flexible, "protocol")?;
    let leader = r.nullable_string(flexible, "leader")?;
    let current_state_timestamp = if version >= 2 { Some(r.i64("current state timestamp")?) } else { None };

    let count = r.array_len(flexible, "members")?;
    let mut members = Vec::with_capacity(count);
    for _ in 0..count {
        let member_id = r.string(flexible, "member id")?;
        let group_instance_id = if version >= 3 {
            r.nullable_string(flexible, "group instance id")?
        } else {
            None
        };
        let client_id = r.string(flexible, "client id")?;
        let client_host = r.string(flexible, "client host")?;
        let rebalance_timeout = if version >= 1 { Some(r.i32("rebalance timeout")?) } else { None };
        let session_timeout = r.i32("session timeout")?;
        let subscription = r.bytes(flexible, "subscription")?;
        let assignment = r.bytes(flexible, "assignment")?;
        if flexible {
            r.tagged_fields()?;
        }

        let consumer = protocol_type == "consumer";
        members.push(GroupMember {
            member_id,
            group_instance_id,
            client_id,
            client_host,
            rebalance_timeout,
            session_timeout,
            subscription: member_data(consumer, subscription, decode_subscription),
            assignment: member_data(consumer, assignment, decode_assignment),
        });
    }
    if flexible {
        r.tagged_fields()?;
    }

    Ok(GroupMetadataValue {
        version,
        protocol_type,
        generation,
        protocol,
        leader,
        current_state_timestamp,
        members,
    })
}

// ---- consumer protocol member data ----

fn b64(bytes: &[u8]) -> String {
    base64::engine::general_purpose::STANDARD.encode(bytes)
}

fn member_data<T>(
    consumer: bool,
    bytes: &[u8],
    decode: fn(&[u8]) -> Result<T, SerdeError>,
) -> MemberData<T> {
    if consumer && !bytes.is_empty() {
        match decode(bytes) {
            Ok(decoded) => return MemberData::Decoded(decoded),
            Err(e) => tracing::debug!(error = %e, "keeping consumer member data as raw bytes"),
        }
    }
    MemberData::Raw(b64(bytes))
}

fn topic_partitions(r: &mut Reader<'_>) -> Result<Vec<TopicPartitions>, SerdeError> {
    let count = r.array_len(false, "topic partitions")?;
    let mut out = Vec::with_capacity(count);
    for _ in 0..count {
        let topic = r.string(false, "topic")?;
        let partitions = r.array_len(false, "partitions")?;
        let partitions = (0..partitions)
            .map(|_| r.i32("partition"))
            .collect::<Result<Vec<_>, _>>()?;
        out.push(TopicPartitions { topic, partitions });
    }
    Ok(out)
}

fn decode_subscription(bytes: &[u8]) -> Result<ConsumerSubscription, SerdeError> {
    let mut r = Reader::new(bytes, "consumer subscription");
    let version = r.i16("version")?;
    let topics = r.array_len(false, "topics")?;
    let topics = (0..topics)
        .map(|_| r.string(false, "topic"))
        .collect::<Result<Vec<_>, _>>()?;
    let user_data = r.nullable_bytes(false, "user data")?.map(b64);
    let owned_partitions = if version >= 1 { topic_partitions(&mut r)? } else { Vec::new() };
    let generation_id = if version >= 2 { Some(r.i32("generation id")?) } else { None };
    let rack_id = if version >= 3 { r.nullable_string(false, "rack id")? } else { None };
    Ok(ConsumerSubscription {
        version,
        topics,
        user_data,
        owned_partitions,
        generation_id,
        rack_id,
    })
}

fn decode_assignment(bytes: &[u8]) -> Result<ConsumerAssignment, SerdeError> {
    let mut r = Reader::new(bytes, "consumer assignment");
    let version = r.i16("version")?;
    let assigned_partitions = topic_partitions(&mut r)?;
    let user_data = r.nullable_bytes(false, "user data")?.map(b64);
    Ok(ConsumerAssignment {
        version,
        assigned_partitions,
        user_data,
    })
}

// ════════════════════════════════════════════════════════════════
//  Record
// ════════════════════════════════════════════════════════════════

fn offsets_payload<T: Serialize>(decoded: &T) -> Result<RecordPayload, SerdeError> {
    let value = serde_json::to_value(decoded).map_err(|e| SerdeError::new(e.to_string()))?;
    RecordPayload::from_json_value(PayloadEncoding::ConsumerOffsets, value)
        .map_err(|e| SerdeError::new(e.to_string()))
}

/// Decode a `__consumer_offsets` record. Headers are left empty; the caller
/// attaches them. A null value is a tombstone and yields a `Null` payload.
pub fn decode_record(record: &KafkaRecord) -> Result<Record, SerdeError> {
    let Some(raw_key) = record.key.as_deref() else {
        return Err(SerdeError::structural("key is null"));
    };
    let key = decode_key(raw_key)?;
    let key_payload = offsets_payload(&key)?;

    let value_payload = match record.value.as_deref() {
        None => RecordPayload::null(),
        Some([]) => RecordPayload {
            encoding: PayloadEncoding::None,
            normalized_payload: Some(Vec::new()),
            ..Default::default()
        },
        Some(raw) => match &key {
            OffsetsKey::OffsetCommit(_) => offsets_payload(&decode_offset_commit_value(raw)?)?,
            OffsetsKey::GroupMetadata(_) => offsets_payload(&decode_group_metadata_value(raw)?)?,
        },
    };

    Ok(Record {
        key: key_payload,
        value: value_payload,
        headers: Vec::new(),
    })
}
