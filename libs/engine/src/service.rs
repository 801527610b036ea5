use std::collections::HashMap;
use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use codec_plain::{BinarySerde, NoneSerde};
use recscope_api::{
    payload_from_record, DeserializedPayload, KafkaHeader, KafkaRecord, Object, PayloadEncoding,
    PayloadType, Record, RecordHeader, RecordPayload, Serde, SerdeContext, SerdeError,
    SerializeOptions, TroubleshootingReport,
};

use crate::config::DEFAULT_MAX_PAYLOAD_SIZE;
use crate::error::EngineError;
use crate::offsets::{self, CONSUMER_OFFSETS_TOPIC};

// ════════════════════════════════════════════════════════════════
//  Options
// ════════════════════════════════════════════════════════════════

/// Per-call knobs for [`Service::deserialize_record`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeserializationOptions {
    /// Payloads (and header values) above this many bytes are flagged as
    /// too large and their rendered form is dropped.
    pub max_payload_size: usize,
    /// Keep the failed codec attempts on each payload.
    pub troubleshoot: bool,
    /// Keep the raw bytes on each payload.
    pub include_raw_data: bool,
    /// `Unspecified` probes the chain; anything else runs only that codec.
    pub key_encoding: PayloadEncoding,
    pub value_encoding: PayloadEncoding,
}

impl Default for DeserializationOptions {
    fn default() -> Self {
        Self {
            max_payload_size: DEFAULT_MAX_PAYLOAD_SIZE,
            troubleshoot: false,
            include_raw_data: false,
            key_encoding: PayloadEncoding::Unspecified,
            value_encoding: PayloadEncoding::Unspecified,
        }
    }
}

impl DeserializationOptions {
    fn forced(&self, payload_type: PayloadType) -> PayloadEncoding {
        match payload_type {
            PayloadType::Key => self.key_encoding,
            PayloadType::Value => self.value_encoding,
        }
    }
}

/// One side of a record to produce.
#[derive(Debug, Clone, Default)]
pub struct SerializeSide {
    pub encoding: PayloadEncoding,
    /// Ignored for `None` and `Null`.
    pub object: Option<Object>,
    pub options: SerializeOptions,
}

impl SerializeSide {
    pub fn new(encoding: PayloadEncoding, object: impl Into<Object>) -> Self {
        Self {
            encoding,
            object: Some(object.into()),
            options: SerializeOptions::default(),
        }
    }

    /// A Kafka null.
    pub fn null() -> Self {
        Self {
            encoding: PayloadEncoding::Null,
            ..Default::default()
        }
    }

    pub fn with_options(mut self, options: SerializeOptions) -> Self {
        self.options = options;
        self
    }
}

#[derive(Debug, Clone, Default)]
pub struct SerializeInput {
    pub topic: String,
    pub key: SerializeSide,
    pub value: SerializeSide,
}

/// Wire bytes of a produced record; `None` is a Kafka null.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SerializeOutput {
    pub key: Option<Vec<u8>>,
    pub value: Option<Vec<u8>>,
}

// ════════════════════════════════════════════════════════════════
//  Builder
// ════════════════════════════════════════════════════════════════

/// Assembles a [`Service`]. Probed codecs run in the order they are added.
#[derive(Default)]
pub struct ServiceBuilder {
    chain: Vec<Arc<dyn Serde>>,
    codecs: HashMap<PayloadEncoding, Arc<dyn Serde>>,
    token: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl ServiceBuilder {
    /// Add a codec to the end of the probe chain.
    pub fn probe(mut self, codec: impl Serde + 'static) -> Self {
        let codec: Arc<dyn Serde> = Arc::new(codec);
        self.chain.push(Arc::clone(&codec));
        self.codecs.insert(codec.name(), codec);
        self
    }

    /// Register a codec that runs only when forced or for serialization.
    pub fn forced_only(mut self, codec: impl Serde + 'static) -> Self {
        let codec: Arc<dyn Serde> = Arc::new(codec);
        self.codecs.insert(codec.name(), codec);
        self
    }

    /// Token cancelled by [`Service::shutdown`].
    pub fn token(mut self, token: CancellationToken) -> Self {
        self.token = token;
        self
    }

    /// Background task stopped by [`Service::shutdown`].
    pub fn task(mut self, handle: JoinHandle<()>) -> Self {
        self.tasks.push(handle);
        self
    }

    pub fn build(mut self) -> Service {
        self.codecs
            .entry(PayloadEncoding::Binary)
            .or_insert_with(|| Arc::new(BinarySerde));
        self.codecs
            .entry(PayloadEncoding::None)
            .or_insert_with(|| Arc::new(NoneSerde));
        Service {
            chain: self.chain,
            codecs: self.codecs,
            token: self.token,
            tasks: self.tasks,
        }
    }
}

// ════════════════════════════════════════════════════════════════
//  Service
// ════════════════════════════════════════════════════════════════

/// Decodes records of unknown encoding through an ordered probe chain, and
/// produces records through the codec named per side.
pub struct Service {
    chain: Vec<Arc<dyn Serde>>,
    codecs: HashMap<PayloadEncoding, Arc<dyn Serde>>,
    token: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl std::fmt::Debug for Service {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Service")
            .field("chain", &self.chain_order())
            .field("tasks", &self.tasks.len())
            .finish()
    }
}

impl Service {
    pub fn builder() -> ServiceBuilder {
        ServiceBuilder::default()
    }

    /// Encodings of the probe chain, in probing order.
    pub fn chain_order(&self) -> Vec<PayloadEncoding> {
        self.chain.iter().map(|c| c.name()).collect()
    }

    pub fn codec(&self, encoding: PayloadEncoding) -> Option<&Arc<dyn Serde>> {
        self.codecs.get(&encoding)
    }

    /// Cancel in-flight registry calls and stop background tasks.
    pub async fn shutdown(self) {
        self.token.cancel();
        for handle in self.tasks {
            if let Err(e) = handle.await {
                tracing::warn!(error = %e, "background task ended abnormally");
            }
        }
        tracing::info!("serde service stopped");
    }

    /// Context bound to the service lifetime.
    pub fn context(&self) -> SerdeContext {
        SerdeContext::with_token(self.token.child_token())
    }

    // ---- deserialize ----

    /// Decode key, value and headers of `record`.
    ///
    /// Only `__consumer_offsets` contract violations fail; every other
    /// payload ends up at least as `Binary`.
    pub async fn deserialize_record(
        &self,
        ctx: &SerdeContext,
        record: &KafkaRecord,
        opts: &DeserializationOptions,
    ) -> Result<Record, EngineError> {
        let headers = decode_headers(&record.headers, opts.max_payload_size);

        if record.topic == CONSUMER_OFFSETS_TOPIC {
            let mut decoded = offsets::decode_record(record).map_err(EngineError::Offsets)?;
            if let Some(raw) = record.key.as_deref() {
                finish(&mut decoded.key, raw, opts);
            }
            if let Some(raw) = record.value.as_deref() {
                finish(&mut decoded.value, raw, opts);
            }
            decoded.headers = headers;
            return Ok(decoded);
        }

        let (key, value) = tokio::join!(
            self.deserialize_payload(ctx, record, PayloadType::Key, opts),
            self.deserialize_payload(ctx, record, PayloadType::Value, opts),
        );
        Ok(Record { key, value, headers })
    }

    /// Decode one side of `record`. Never fails.
    pub async fn deserialize_payload(
        &self,
        ctx: &SerdeContext,
        record: &KafkaRecord,
        payload_type: PayloadType,
        opts: &DeserializationOptions,
    ) -> RecordPayload {
        let Some(raw) = payload_from_record(record, payload_type) else {
            return RecordPayload::null();
        };
        if raw.is_empty() {
            let mut payload = empty_payload();
            finish(&mut payload, raw, opts);
            return payload;
        }

        let mut reports = Vec::new();
        let decoded = match opts.forced(payload_type) {
            PayloadEncoding::Unspecified => {
                self.probe(ctx, record, payload_type, &mut reports).await
            }
            forced => self.run_forced(ctx, record, payload_type, forced, &mut reports).await,
        };

        let mut payload = decoded.unwrap_or_else(|| binary_payload(raw));
        payload.troubleshooting = reports;
        finish(&mut payload, raw, opts);
        payload
    }

    async fn probe(
        &self,
        ctx: &SerdeContext,
        record: &KafkaRecord,
        payload_type: PayloadType,
        reports: &mut Vec<TroubleshootingReport>,
    ) -> Option<RecordPayload> {
        for codec in &self.chain {
            match codec.deserialize_payload(ctx, record, payload_type).await {
                Ok(payload) => return Some(payload),
                Err(e) => reports.push(report(codec.name(), &record.topic, payload_type, e)),
            }
        }
        None
    }

    async fn run_forced(
        &self,
        ctx: &SerdeContext,
        record: &KafkaRecord,
        payload_type: PayloadType,
        encoding: PayloadEncoding,
        reports: &mut Vec<TroubleshootingReport>,
    ) -> Option<RecordPayload> {
        let Some(codec) = self.codecs.get(&encoding) else {
            let err = SerdeError::config(format!("{encoding} encoding is not configured"));
            reports.push(report(encoding, &record.topic, payload_type, err));
            return None;
        };
        match codec.deserialize_payload(ctx, record, payload_type).await {
            Ok(payload) => Some(payload),
            Err(e) => {
                reports.push(report(encoding, &record.topic, payload_type, e));
                None
            }
        }
    }

    // ---- serialize ----

    /// Produce key and value bytes. Each side is encoded by the codec its
    /// encoding names; `Null` yields a Kafka null.
    pub async fn serialize_record(
        &self,
        ctx: &SerdeContext,
        input: SerializeInput,
    ) -> Result<SerializeOutput, EngineError> {
        let SerializeInput { topic, key, value } = input;
        let (key, value) = tokio::join!(
            self.serialize_side(ctx, &topic, key, PayloadType::Key),
            self.serialize_side(ctx, &topic, value, PayloadType::Value),
        );
        let context = format!("topic '{topic}'");
        Ok(SerializeOutput {
            key: key.map_err(|e| e.with_context(&context))?,
            value: value.map_err(|e| e.with_context(&context))?,
        })
    }

    async fn serialize_side(
        &self,
        ctx: &SerdeContext,
        topic: &str,
        side: SerializeSide,
        payload_type: PayloadType,
    ) -> Result<Option<Vec<u8>>, EngineError> {
        let fail = |source: SerdeError| EngineError::Serialize {
            side: payload_type,
            source,
        };
        let SerializeSide {
            encoding,
            object,
            mut options,
        } = side;

        match encoding {
            PayloadEncoding::Null => return Ok(None),
            PayloadEncoding::None => return Ok(Some(Vec::new())),
            PayloadEncoding::Unspecified => {
                return Err(fail(SerdeError::config("an encoding is required to serialize")));
            }
            _ => {}
        }
        let codec = self
            .codecs
            .get(&encoding)
            .ok_or_else(|| fail(SerdeError::config(format!("{encoding} encoding is not configured"))))?;
        let object = object.ok_or_else(|| fail(SerdeError::new("nothing to serialize")))?;
        if options.topic.is_none() {
            options.topic = Some(topic.to_string());
        }

        let bytes = codec
            .serialize_object(ctx, object, payload_type, &options)
            .await
            .map_err(fail)?;
        tracing::debug!(topic, side = %payload_type, %encoding, bytes = bytes.len(), "serialized payload");
        Ok(Some(bytes))
    }
}

// ════════════════════════════════════════════════════════════════
//  Helpers
// ════════════════════════════════════════════════════════════════

fn report(
    encoding: PayloadEncoding,
    topic: &str,
    payload_type: PayloadType,
    err: SerdeError,
) -> TroubleshootingReport {
    if err.is_dependency_failure() {
        tracing::warn!(%encoding, topic, side = %payload_type, error = %err, "codec dependency failed");
    } else {
        tracing::debug!(%encoding, topic, side = %payload_type, error = %err, "codec rejected payload");
    }
    TroubleshootingReport {
        serde_name: encoding,
        message: err.message().to_string(),
    }
}

fn empty_payload() -> RecordPayload {
    RecordPayload::decoded(PayloadEncoding::None, Vec::new(), DeserializedPayload::Bytes(Vec::new()))
}

fn binary_payload(raw: &[u8]) -> RecordPayload {
    RecordPayload::decoded(
        PayloadEncoding::Binary,
        raw.to_vec(),
        DeserializedPayload::Bytes(raw.to_vec()),
    )
}

/// Apply size accounting and the per-call output flags.
fn finish(payload: &mut RecordPayload, raw: &[u8], opts: &DeserializationOptions) {
    payload.payload_size_bytes = raw.len();
    if opts.include_raw_data {
        payload.original_payload = Some(raw.to_vec());
    }
    if raw.len() > opts.max_payload_size {
        payload.is_payload_too_large = true;
        payload.normalized_payload = None;
    }
    if !opts.troubleshoot {
        payload.troubleshooting.clear();
    }
}

/// Headers sorted by key; each value is `None` when empty, `Utf8` when
/// valid UTF-8 and `Binary` otherwise.
fn decode_headers(headers: &[KafkaHeader], max_size: usize) -> Vec<RecordHeader> {
    let mut out: Vec<RecordHeader> = headers
        .iter()
        .map(|h| {
            let encoding = if h.value.is_empty() {
                PayloadEncoding::None
            } else if std::str::from_utf8(&h.value).is_ok() {
                PayloadEncoding::Utf8
            } else {
                PayloadEncoding::Binary
            };
            let too_large = h.value.len() > max_size;
            RecordHeader {
                key: h.key.clone(),
                value: (!too_large).then(|| h.value.clone()),
                encoding,
                is_value_too_large: too_large,
            }
        })
        .collect();
    out.sort_by(|a, b| a.key.cmp(&b.key));
    out
}
