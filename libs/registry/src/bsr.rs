//! Buf Schema Registry client.
//!
//! Descriptors are fetched per `(message, commit)` through the Connect unary
//! `FileDescriptorSetService/GetFileDescriptorSet` call and cached with a
//! short TTL so newly pushed commits become visible without a restart.

use std::sync::Arc;
use std::time::Duration;

use prost::Message;
use prost_reflect::{DescriptorPool, MessageDescriptor};
use reqwest::{Client, Url};
use serde::Deserialize;

use recscope_api::{BoxFuture, SerdeContext, SerdeError};

use crate::cache::{CachePolicy, SingleFlightCache};
use crate::error::RegistryError;

/// Record header naming the fully-qualified message type.
pub const BSR_MESSAGE_HEADER: &str = "buf.registry.value.schema.message";
/// Record header carrying the BSR commit the message was produced with.
pub const BSR_COMMIT_HEADER: &str = "buf.registry.value.schema.commit";

const SERVICE_PATH: &str = "buf.registry.module.v1.FileDescriptorSetService/GetFileDescriptorSet";
const CACHE_TTL: Duration = Duration::from_secs(5 * 60);
const ERROR_TTL: Duration = Duration::from_secs(15);

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct BsrConfig {
    pub enabled: bool,
    /// e.g. `https://buf.build`
    pub url: String,
    pub token: Option<String>,
}

// ---- Connect request/response messages ----

#[derive(Clone, PartialEq, prost::Message)]
struct ResourceRef {
    /// Commit ID.
    #[prost(string, tag = "1")]
    id: String,
}

#[derive(Clone, PartialEq, prost::Message)]
struct GetFileDescriptorSetRequest {
    #[prost(message, optional, tag = "1")]
    resource_ref: Option<ResourceRef>,
    #[prost(string, repeated, tag = "2")]
    include_types: Vec<String>,
    #[prost(bool, tag = "3")]
    exclude_source_code_info: bool,
}

#[derive(Clone, PartialEq, prost::Message)]
struct GetFileDescriptorSetResponse {
    #[prost(message, optional, tag = "1")]
    file_descriptor_set: Option<prost_types::FileDescriptorSet>,
}

// ════════════════════════════════════════════════════════════════
//  FileDescriptorSetFetcher
// ════════════════════════════════════════════════════════════════

/// Source of the linked file set for one message at one commit.
pub trait FileDescriptorSetFetcher: Send + Sync {
    fn fetch<'a>(
        &'a self,
        message_name: &'a str,
        commit: &'a str,
    ) -> BoxFuture<'a, Result<prost_types::FileDescriptorSet, RegistryError>>;
}

pub struct HttpFileDescriptorSetFetcher {
    endpoint: Url,
    token: Option<String>,
    http: Client,
}

impl HttpFileDescriptorSetFetcher {
    pub fn new(config: &BsrConfig) -> Result<Self, RegistryError> {
        let base = config.url.trim_end_matches('/');
        if base.is_empty() {
            return Err(RegistryError::Config("bsr is enabled but no url is configured".into()));
        }
        let endpoint = Url::parse(&format!("{base}/{SERVICE_PATH}"))
            .map_err(|e| RegistryError::Config(format!("invalid bsr url '{}': {e}", config.url)))?;
        let http = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| RegistryError::Config(format!("failed to build http client: {e}")))?;
        Ok(Self {
            endpoint,
            token: config.token.clone(),
            http,
        })
    }
}

impl FileDescriptorSetFetcher for HttpFileDescriptorSetFetcher {
    fn fetch<'a>(
        &'a self,
        message_name: &'a str,
        commit: &'a str,
    ) -> BoxFuture<'a, Result<prost_types::FileDescriptorSet, RegistryError>> {
        Box::pin(async move {
            let body = GetFileDescriptorSetRequest {
                resource_ref: Some(ResourceRef { id: commit.to_string() }),
                include_types: vec![message_name.to_string()],
                exclude_source_code_info: true,
            }
            .encode_to_vec();

            let mut request = self
                .http
                .post(self.endpoint.clone())
                .header("Content-Type", "application/proto")
                .header("Connect-Protocol-Version", "1")
                .body(body);
            if let Some(token) = &self.token {
                request = request.bearer_auth(token);
            }

            let url = self.endpoint.to_string();
            let response = request
                .send()
                .await
                .map_err(|source| RegistryError::Http { url: url.clone(), source })?;
            let status = response.status();
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(RegistryError::Status { url, status: status.as_u16(), body });
            }
            let bytes = response
                .bytes()
                .await
                .map_err(|source| RegistryError::Http { url: url.clone(), source })?;
            let decoded = GetFileDescriptorSetResponse::decode(bytes)
                .map_err(|e| RegistryError::Decode(format!("GetFileDescriptorSet response: {e}")))?;
            decoded.file_descriptor_set.ok_or_else(|| {
                RegistryError::Decode("GetFileDescriptorSet response has no file descriptor set".into())
            })
        })
    }
}

// ════════════════════════════════════════════════════════════════
//  BsrClient
// ════════════════════════════════════════════════════════════════

pub struct BsrClient {
    fetcher: Arc<dyn FileDescriptorSetFetcher>,
    cache: SingleFlightCache<(String, String), MessageDescriptor>,
}

impl BsrClient {
    pub fn new(config: &BsrConfig) -> Result<Self, RegistryError> {
        let fetcher = HttpFileDescriptorSetFetcher::new(config)?;
        tracing::info!(url = %config.url, "bsr client configured");
        Ok(Self::with_fetcher(Arc::new(fetcher)))
    }

    pub fn with_fetcher(fetcher: Arc<dyn FileDescriptorSetFetcher>) -> Self {
        Self {
            fetcher,
            cache: SingleFlightCache::new(CachePolicy::expiring(CACHE_TTL, ERROR_TTL)),
        }
    }

    /// Descriptor for `message_name` at `commit`. The descriptor's parent
    /// pool holds the whole linked file set, so `Any` and imported types
    /// resolve during JSON rendering.
    pub async fn message_descriptor(
        &self,
        ctx: &SerdeContext,
        message_name: &str,
        commit: &str,
    ) -> Result<MessageDescriptor, SerdeError> {
        let key = (message_name.to_string(), commit.to_string());
        self.cache
            .get_or_fetch(ctx, key, move || async move {
                let set = self.fetcher.fetch(message_name, commit).await.map_err(|e| {
                    tracing::warn!(type_name = %message_name, commit = %commit, error = %e, "bsr fetch failed");
                    SerdeError::from(e)
                })?;
                let pool = DescriptorPool::from_file_descriptor_set(set).map_err(|e| {
                    SerdeError::dependency(format!("invalid file descriptor set from bsr: {e}"))
                })?;
                pool.get_message_by_name(message_name).ok_or_else(|| {
                    SerdeError::dependency(format!(
                        "bsr returned no descriptor for message '{message_name}' at commit '{commit}'"
                    ))
                })
            })
            .await
    }

    pub fn purge_expired(&self) {
        self.cache.purge_expired();
    }
}
