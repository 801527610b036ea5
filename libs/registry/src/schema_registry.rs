use std::collections::{BTreeMap, HashSet, VecDeque};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use reqwest::{Client, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use recscope_api::{ready, BoxFuture, SerdeContext, SerdeError, SerializeOptions};

use crate::error::RegistryError;

const ACCEPT: &str = "application/vnd.schemaregistry.v1+json, application/json";

// ════════════════════════════════════════════════════════════════
//  Configuration
// ════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TlsConfig {
    pub enabled: bool,
    /// PEM bundle added to the trusted roots.
    pub ca_file: Option<String>,
    pub insecure_skip_verify: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SchemaRegistryConfig {
    pub enabled: bool,
    /// Tried in order; the next URL is used when one is unreachable.
    pub urls: Vec<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub bearer_token: Option<String>,
    pub tls: TlsConfig,
    pub timeout_secs: u64,
}

impl Default for SchemaRegistryConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            urls: Vec::new(),
            username: None,
            password: None,
            bearer_token: None,
            tls: TlsConfig::default(),
            timeout_secs: 10,
        }
    }
}

// ════════════════════════════════════════════════════════════════
//  Wire types
// ════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SchemaType {
    #[default]
    Avro,
    Protobuf,
    Json,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaReference {
    /// Import name (Avro full name, or `.proto` path).
    pub name: String,
    pub subject: String,
    pub version: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Schema {
    #[serde(default)]
    pub schema_type: SchemaType,
    pub schema: String,
    #[serde(default)]
    pub references: Vec<SchemaReference>,
}

impl Schema {
    pub fn new(schema_type: SchemaType, schema: impl Into<String>) -> Self {
        Self {
            schema_type,
            schema: schema.into(),
            references: Vec::new(),
        }
    }

    pub fn with_reference(
        mut self,
        name: impl Into<String>,
        subject: impl Into<String>,
        version: i32,
    ) -> Self {
        self.references.push(SchemaReference {
            name: name.into(),
            subject: subject.into(),
            version,
        });
        self
    }
}

/// A schema as registered under a subject.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SubjectSchema {
    pub subject: String,
    pub version: i32,
    pub id: u32,
    #[serde(flatten)]
    pub schema: Schema,
}

/// A referenced schema, fetched transitively.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedReference {
    pub name: String,
    pub subject: String,
    pub version: i32,
    pub schema: Schema,
}

// ════════════════════════════════════════════════════════════════
//  SchemaRegistry — read side of a Confluent-compatible registry
// ════════════════════════════════════════════════════════════════

pub trait SchemaRegistry: Send + Sync {
    /// `GET /schemas/ids/{id}`.
    fn schema_by_id(&self, id: u32) -> BoxFuture<'_, Result<Schema, RegistryError>>;

    /// `GET /subjects/{subject}/versions/{version}`; `None` means `latest`.
    fn subject_version<'a>(
        &'a self,
        subject: &'a str,
        version: Option<i32>,
    ) -> BoxFuture<'a, Result<SubjectSchema, RegistryError>>;

    /// `GET /subjects`.
    fn subjects(&self) -> BoxFuture<'_, Result<Vec<String>, RegistryError>>;
}

/// Fetch every schema transitively referenced by `schema`, each once.
///
/// The result does not include `schema` itself. A reference cycle is not an
/// error: already visited `(subject, version)` pairs are skipped.
pub async fn resolve_references(
    registry: &dyn SchemaRegistry,
    schema: &Schema,
) -> Result<Vec<ResolvedReference>, RegistryError> {
    let mut seen: HashSet<(String, i32)> = HashSet::new();
    let mut queue: VecDeque<SchemaReference> = schema.references.iter().cloned().collect();
    let mut resolved = Vec::new();

    while let Some(reference) = queue.pop_front() {
        if !seen.insert((reference.subject.clone(), reference.version)) {
            continue;
        }
        let version = (reference.version > 0).then_some(reference.version);
        let fetched = registry.subject_version(&reference.subject, version).await?;
        queue.extend(fetched.schema.references.iter().cloned());
        resolved.push(ResolvedReference {
            name: reference.name,
            subject: reference.subject,
            version: fetched.version,
            schema: fetched.schema,
        });
    }
    Ok(resolved)
}

/// Schema ID a serializer should frame with: the explicit ID when given,
/// otherwise the latest version registered under the requested subject.
pub async fn schema_id_for(
    ctx: &SerdeContext,
    registry: Option<&dyn SchemaRegistry>,
    opts: &SerializeOptions,
) -> Result<u32, SerdeError> {
    if let Some(id) = opts.schema_id {
        return Ok(id);
    }
    let Some(subject) = opts.subject.as_deref() else {
        return Err(SerdeError::new("a schema ID or a registry subject is required"));
    };
    let Some(registry) = registry else {
        return Err(SerdeError::config(format!(
            "cannot resolve subject '{subject}': schema registry is not configured"
        )));
    };
    let latest = ctx
        .run(async { registry.subject_version(subject, None).await.map_err(SerdeError::from) })
        .await?;
    Ok(latest.id)
}

// ════════════════════════════════════════════════════════════════
//  SchemaRegistryClient — HTTP implementation
// ════════════════════════════════════════════════════════════════

#[derive(Debug, Clone)]
enum Auth {
    None,
    Basic { username: String, password: Option<String> },
    Bearer(String),
}

pub struct SchemaRegistryClient {
    urls: Vec<Url>,
    auth: Auth,
    http: Client,
}

impl SchemaRegistryClient {
    pub fn new(config: &SchemaRegistryConfig) -> Result<Self, RegistryError> {
        if config.urls.is_empty() {
            return Err(RegistryError::Config(
                "schema registry is enabled but no urls are configured".into(),
            ));
        }
        let urls = config
            .urls
            .iter()
            .map(|raw| {
                Url::parse(raw).map_err(|e| {
                    RegistryError::Config(format!("invalid schema registry url '{raw}': {e}"))
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let auth = match (&config.bearer_token, &config.username) {
            (Some(token), _) => Auth::Bearer(token.clone()),
            (None, Some(username)) => Auth::Basic {
                username: username.clone(),
                password: config.password.clone(),
            },
            (None, None) => Auth::None,
        };

        let mut builder = Client::builder().timeout(Duration::from_secs(config.timeout_secs.max(1)));
        if config.tls.enabled {
            if let Some(path) = &config.tls.ca_file {
                let pem = std::fs::read(path)?;
                let cert = reqwest::Certificate::from_pem(&pem).map_err(|e| {
                    RegistryError::Config(format!("invalid CA bundle '{path}': {e}"))
                })?;
                builder = builder.add_root_certificate(cert);
            }
            if config.tls.insecure_skip_verify {
                tracing::warn!("schema registry TLS certificate verification is disabled");
                builder = builder.danger_accept_invalid_certs(true);
            }
        }
        let http = builder
            .build()
            .map_err(|e| RegistryError::Config(format!("failed to build http client: {e}")))?;

        tracing::info!(urls = ?config.urls, "schema registry client configured");
        Ok(Self { urls, auth, http })
    }

    fn endpoint(base: &Url, segments: &[&str]) -> Result<Url, RegistryError> {
        let mut url = base.clone();
        url.path_segments_mut()
            .map_err(|_| RegistryError::Config(format!("schema registry url '{base}' cannot be a base")))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// GET `segments` from the first registry that answers.
    ///
    /// Transport errors and 5xx move on to the next URL; 404 and other 4xx
    /// are authoritative.
    async fn get_json<T: DeserializeOwned>(&self, segments: &[&str]) -> Result<T, RegistryError> {
        let mut last_error = None;

        for base in &self.urls {
            let url = Self::endpoint(base, segments)?;
            let mut request = self.http.get(url.clone()).header("Accept", ACCEPT);
            request = match &self.auth {
                Auth::None => request,
                Auth::Basic { username, password } => request.basic_auth(username, password.as_ref()),
                Auth::Bearer(token) => request.bearer_auth(token),
            };

            let response = match request.send().await {
                Ok(r) => r,
                Err(source) => {
                    tracing::warn!(url = %url, error = %source, "schema registry request failed");
                    last_error = Some(RegistryError::Http { url: url.to_string(), source });
                    continue;
                }
            };

            let status = response.status();
            if status.is_success() {
                return response
                    .json::<T>()
                    .await
                    .map_err(|e| RegistryError::Decode(format!("{url}: {e}")));
            }

            let body = response.text().await.unwrap_or_default();
            if status == StatusCode::NOT_FOUND {
                return Err(RegistryError::NotFound(format!("{url}: {body}")));
            }
            let err = RegistryError::Status {
                url: url.to_string(),
                status: status.as_u16(),
                body,
            };
            if status.is_client_error() {
                return Err(err);
            }
            tracing::warn!(url = %url, status = status.as_u16(), "schema registry returned server error");
            last_error = Some(err);
        }

        Err(last_error.unwrap_or_else(|| RegistryError::Config("no schema registry urls".into())))
    }
}

impl SchemaRegistry for SchemaRegistryClient {
    fn schema_by_id(&self, id: u32) -> BoxFuture<'_, Result<Schema, RegistryError>> {
        Box::pin(async move {
            let id = id.to_string();
            self.get_json(&["schemas", "ids", &id]).await
        })
    }

    fn subject_version<'a>(
        &'a self,
        subject: &'a str,
        version: Option<i32>,
    ) -> BoxFuture<'a, Result<SubjectSchema, RegistryError>> {
        Box::pin(async move {
            let version = version.map_or_else(|| "latest".to_string(), |v| v.to_string());
            self.get_json(&["subjects", subject, "versions", &version]).await
        })
    }

    fn subjects(&self) -> BoxFuture<'_, Result<Vec<String>, RegistryError>> {
        Box::pin(async move { self.get_json(&["subjects"]).await })
    }
}

// ════════════════════════════════════════════════════════════════
//  InMemoryRegistry — offline registry
// ════════════════════════════════════════════════════════════════

#[derive(Default)]
struct InMemoryState {
    next_id: u32,
    by_id: BTreeMap<u32, Schema>,
    /// subject → ids, index + 1 is the version.
    subjects: BTreeMap<String, Vec<u32>>,
}

/// Registry held in memory. Registration follows the Confluent rules: an
/// identical schema gets its existing ID back, IDs are global and start at 1.
#[derive(Default)]
pub struct InMemoryRegistry {
    state: RwLock<InMemoryState>,
}

impl InMemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, InMemoryState> {
        match self.state.read() {
            Ok(g) => g,
            Err(poisoned) => {
                tracing::warn!("in-memory registry lock was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }

    fn write(&self) -> RwLockWriteGuard<'_, InMemoryState> {
        match self.state.write() {
            Ok(g) => g,
            Err(poisoned) => {
                tracing::warn!("in-memory registry lock was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }

    /// Register `schema` under `subject`, returning its global ID.
    pub fn register(&self, subject: &str, schema: Schema) -> u32 {
        let mut state = self.write();
        let existing = state
            .by_id
            .iter()
            .find(|(_, s)| **s == schema)
            .map(|(id, _)| *id);
        let id = match existing {
            Some(id) => id,
            None => {
                state.next_id += 1;
                let id = state.next_id;
                state.by_id.insert(id, schema);
                id
            }
        };
        let versions = state.subjects.entry(subject.to_string()).or_default();
        if !versions.contains(&id) {
            versions.push(id);
        }
        id
    }

    fn lookup(&self, subject: &str, version: Option<i32>) -> Result<SubjectSchema, RegistryError> {
        let state = self.read();
        let versions = state
            .subjects
            .get(subject)
            .ok_or_else(|| RegistryError::NotFound(format!("subject '{subject}'")))?;
        let index = match version {
            None => versions.len().checked_sub(1),
            Some(v) if v >= 1 => Some(v as usize - 1),
            Some(_) => None,
        };
        let id = index
            .and_then(|i| versions.get(i))
            .copied()
            .ok_or_else(|| RegistryError::NotFound(format!("subject '{subject}' version {version:?}")))?;
        let schema = state
            .by_id
            .get(&id)
            .cloned()
            .ok_or_else(|| RegistryError::NotFound(format!("schema id {id}")))?;
        let version = versions.iter().position(|v| *v == id).map_or(0, |i| i as i32 + 1);
        Ok(SubjectSchema {
            subject: subject.to_string(),
            version,
            id,
            schema,
        })
    }
}

impl SchemaRegistry for InMemoryRegistry {
    fn schema_by_id(&self, id: u32) -> BoxFuture<'_, Result<Schema, RegistryError>> {
        let result = self
            .read()
            .by_id
            .get(&id)
            .cloned()
            .ok_or_else(|| RegistryError::NotFound(format!("schema id {id}")));
        ready(result)
    }

    fn subject_version<'a>(
        &'a self,
        subject: &'a str,
        version: Option<i32>,
    ) -> BoxFuture<'a, Result<SubjectSchema, RegistryError>> {
        ready(self.lookup(subject, version))
    }

    fn subjects(&self) -> BoxFuture<'_, Result<Vec<String>, RegistryError>> {
        ready(Ok(self.read().subjects.keys().cloned().collect()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stub;

    fn client_for(urls: Vec<String>) -> SchemaRegistryClient {
        SchemaRegistryClient::new(&SchemaRegistryConfig {
            enabled: true,
            urls,
            ..Default::default()
        })
        .unwrap()
    }

    #[tokio::test]
    async fn fetches_schema_by_id() {
        let server = stub::serve(vec![(
            "/schemas/ids/7",
            200,
            "application/vnd.schemaregistry.v1+json",
            br#"{"schema":"\"string\""}"#.to_vec(),
        )])
        .await;
        let client = client_for(vec![server.url()]);

        let schema = client.schema_by_id(7).await.unwrap();
        assert_eq!(schema.schema_type, SchemaType::Avro);
        assert_eq!(schema.schema, "\"string\"");
        assert!(schema.references.is_empty());
    }

    #[tokio::test]
    async fn unknown_id_is_not_found() {
        let server = stub::serve(vec![]).await;
        let client = client_for(vec![server.url()]);
        let err = client.schema_by_id(1).await.unwrap_err();
        assert!(err.is_not_found(), "{err}");
    }

    #[tokio::test]
    async fn falls_through_to_next_url_on_server_error() {
        let broken = stub::serve(vec![("/subjects", 503, "text/plain", b"down".to_vec())]).await;
        let healthy =
            stub::serve(vec![("/subjects", 200, "application/json", br#"["a-value","b-key"]"#.to_vec())]).await;
        let client = client_for(vec![broken.url(), healthy.url()]);

        let subjects = client.subjects().await.unwrap();
        assert_eq!(subjects, vec!["a-value", "b-key"]);
        assert_eq!(broken.hits("/subjects"), 1);
        assert_eq!(healthy.hits("/subjects"), 1);
    }

    #[tokio::test]
    async fn latest_subject_version_with_protobuf_type() {
        let server = stub::serve(vec![(
            "/subjects/orders-value/versions/latest",
            200,
            "application/json",
            br#"{"subject":"orders-value","version":3,"id":42,"schemaType":"PROTOBUF","schema":"syntax = \"proto3\";","references":[{"name":"common.proto","subject":"common","version":1}]}"#.to_vec(),
        )])
        .await;
        let client = client_for(vec![server.url()]);

        let s = client.subject_version("orders-value", None).await.unwrap();
        assert_eq!(s.id, 42);
        assert_eq!(s.version, 3);
        assert_eq!(s.schema.schema_type, SchemaType::Protobuf);
        assert_eq!(s.schema.references[0].name, "common.proto");
    }

    #[tokio::test]
    async fn sends_basic_auth() {
        let server = stub::serve(vec![("/subjects", 200, "application/json", b"[]".to_vec())]).await;
        let client = SchemaRegistryClient::new(&SchemaRegistryConfig {
            enabled: true,
            urls: vec![server.url()],
            username: Some("user".into()),
            password: Some("pass".into()),
            ..Default::default()
        })
        .unwrap();

        client.subjects().await.unwrap();
        let req = server.last_request().unwrap();
        assert_eq!(req.method, "GET");
        // base64("user:pass")
        assert_eq!(req.headers.get("authorization").unwrap(), "Basic dXNlcjpwYXNz");
    }

    #[test]
    fn empty_url_list_is_config_error() {
        let err = SchemaRegistryClient::new(&SchemaRegistryConfig {
            enabled: true,
            ..Default::default()
        })
        .err()
        .unwrap();
        assert!(matches!(err, RegistryError::Config(_)));
    }

    #[test]
    fn in_memory_registration_is_idempotent() {
        let registry = InMemoryRegistry::new();
        let a = registry.register("a-value", Schema::new(SchemaType::Avro, "\"int\""));
        let again = registry.register("a-value", Schema::new(SchemaType::Avro, "\"int\""));
        let b = registry.register("a-value", Schema::new(SchemaType::Avro, "\"long\""));
        assert_eq!(a, 1);
        assert_eq!(again, 1);
        assert_eq!(b, 2);

        let latest = registry.lookup("a-value", None).unwrap();
        assert_eq!((latest.id, latest.version), (2, 2));
        let first = registry.lookup("a-value", Some(1)).unwrap();
        assert_eq!(first.id, 1);
        assert!(registry.lookup("a-value", Some(3)).is_err());
    }

    #[tokio::test]
    async fn schema_id_prefers_explicit_id_then_subject() {
        let registry = InMemoryRegistry::new();
        registry.register("orders-value", Schema::new(SchemaType::Json, "{}"));
        let registry: &dyn SchemaRegistry = &registry;
        let ctx = SerdeContext::new();

        let explicit = SerializeOptions::default().schema_id(9).subject("orders-value");
        assert_eq!(schema_id_for(&ctx, Some(registry), &explicit).await.unwrap(), 9);

        let by_subject = SerializeOptions::default().subject("orders-value");
        assert_eq!(schema_id_for(&ctx, Some(registry), &by_subject).await.unwrap(), 1);

        assert!(schema_id_for(&ctx, None, &by_subject).await.is_err());
        assert!(schema_id_for(&ctx, Some(registry), &SerializeOptions::default()).await.is_err());
    }

    #[tokio::test]
    async fn references_resolve_transitively_once() {
        let registry = InMemoryRegistry::new();
        registry.register("base", Schema::new(SchemaType::Protobuf, "// base"));
        registry.register(
            "mid",
            Schema::new(SchemaType::Protobuf, "// mid").with_reference("base.proto", "base", 1),
        );
        let root = Schema::new(SchemaType::Protobuf, "// root")
            .with_reference("mid.proto", "mid", 1)
            .with_reference("base.proto", "base", 1);

        let refs = resolve_references(&registry, &root).await.unwrap();
        let names: Vec<_> = refs.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["mid.proto", "base.proto"]);
    }
}
