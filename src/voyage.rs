//! Wire types and HTTP transport for the Voyage AI endpoints.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{
    header::{HeaderMap, HeaderValue, InvalidHeaderValue, AUTHORIZATION, CONTENT_TYPE},
    Client, StatusCode, Url,
};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::{
    batch::Usage,
    config::{InputType, OutputDtype, Secret, TransportConfig, TransportSettings},
    document::Embedding,
    error::EmbedderError,
};

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("error while doing voyage request: {0}")]
    Request(#[from] reqwest::Error),
    #[error("response had bad status code {0}: {1}")]
    BadStatus(StatusCode, String),
    #[error("error while parsing json: {0}")]
    BadJson(#[from] serde_json::Error),
    #[error("malformed response: {0}")]
    MalformedResponse(String),
    #[error("invalid base url: {0}")]
    BadUrl(#[from] url::ParseError),
    #[error("API key is not a valid header value")]
    BadApiKey(#[from] InvalidHeaderValue),
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct EmbeddingRequest {
    pub input: Vec<String>,
    pub model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_type: Option<InputType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub truncation: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_dimension: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_dtype: Option<OutputDtype>,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct ContextualizedEmbeddingRequest {
    /// One entry per source document, each holding that document's chunks in order.
    pub inputs: Vec<Vec<String>>,
    pub model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_type: Option<InputType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_dimension: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_dtype: Option<OutputDtype>,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentItem {
    Text { text: String },
    ImageBase64 { image_base64: String },
    ImageUrl { image_url: String },
    VideoBase64 { video_base64: String },
    VideoUrl { video_url: String },
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct MultimodalInput {
    pub content: Vec<ContentItem>,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct MultimodalEmbeddingRequest {
    pub inputs: Vec<MultimodalInput>,
    pub model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_type: Option<InputType>,
    pub truncation: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_dimension: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_dtype: Option<OutputDtype>,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct RerankRequest {
    pub query: String,
    pub documents: Vec<String>,
    pub model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_k: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub truncation: Option<bool>,
}

#[derive(Deserialize, Debug)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
    #[serde(default)]
    usage: ResponseUsage,
}

#[derive(Deserialize, Debug)]
struct EmbeddingData {
    index: usize,
    embedding: Embedding,
}

#[derive(Deserialize, Debug)]
struct ContextualizedEmbeddingResponse {
    data: Vec<ContextualizedEmbeddingGroup>,
    #[serde(default)]
    usage: ResponseUsage,
}

#[derive(Deserialize, Debug)]
struct ContextualizedEmbeddingGroup {
    index: usize,
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize, Debug)]
struct RerankResponse {
    data: Vec<RerankResult>,
    #[serde(default)]
    usage: ResponseUsage,
}

#[derive(Deserialize, Debug, Default)]
struct ResponseUsage {
    #[serde(default)]
    total_tokens: u64,
    text_tokens: Option<u64>,
    image_pixels: Option<u64>,
    video_pixels: Option<u64>,
}

impl From<ResponseUsage> for Usage {
    fn from(usage: ResponseUsage) -> Self {
        Usage {
            total_tokens: usage.total_tokens,
            text_tokens: usage.text_tokens,
            image_pixels: usage.image_pixels,
            video_pixels: usage.video_pixels,
        }
    }
}

/// Embeddings for one request, in input order.
#[derive(Debug, Clone, PartialEq)]
pub struct Embedded {
    pub embeddings: Vec<Embedding>,
    pub usage: Usage,
}

/// Embeddings for one contextualized request: one list per submitted group.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupedEmbedded {
    pub groups: Vec<Vec<Embedding>>,
    pub usage: Usage,
}

impl GroupedEmbedded {
    /// Flattens the per-group results, checking each group came back with one
    /// embedding per submitted chunk.
    pub fn flatten_for(self, submitted: &[Vec<String>]) -> Result<Embedded, ApiError> {
        if self.groups.len() != submitted.len() {
            return Err(ApiError::MalformedResponse(format!(
                "got {} result groups for {} submitted groups",
                self.groups.len(),
                submitted.len()
            )));
        }
        let mut embeddings = Vec::with_capacity(submitted.iter().map(Vec::len).sum());
        for (ix, (group, texts)) in self.groups.into_iter().zip(submitted).enumerate() {
            if group.len() != texts.len() {
                return Err(ApiError::MalformedResponse(format!(
                    "group {ix} has {} embeddings for {} chunks",
                    group.len(),
                    texts.len()
                )));
            }
            embeddings.extend(group);
        }

        Ok(Embedded {
            embeddings,
            usage: self.usage,
        })
    }
}

#[derive(Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct RerankResult {
    pub index: usize,
    pub relevance_score: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Reranked {
    /// Most relevant first, as ordered by the endpoint.
    pub results: Vec<RerankResult>,
    pub usage: Usage,
}

/// The remote operations the components need.
#[async_trait]
pub trait VoyageApi: Send + Sync {
    async fn embed(&self, request: EmbeddingRequest) -> Result<Embedded, ApiError>;

    async fn contextualized_embed(
        &self,
        request: ContextualizedEmbeddingRequest,
    ) -> Result<GroupedEmbedded, ApiError>;

    async fn multimodal_embed(
        &self,
        request: MultimodalEmbeddingRequest,
    ) -> Result<Embedded, ApiError>;

    async fn rerank(&self, request: RerankRequest) -> Result<Reranked, ApiError>;
}

#[derive(Clone, Debug)]
pub struct VoyageClient {
    client: Client,
    base_url: Url,
    max_retries: usize,
}

impl VoyageClient {
    pub fn new(api_key: &str, settings: &TransportSettings) -> Result<Self, ApiError> {
        let mut headers = HeaderMap::new();
        let mut auth = HeaderValue::from_str(&format!("Bearer {}", api_key.trim()))?;
        auth.set_sensitive(true);
        headers.insert(AUTHORIZATION, auth);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let client = Client::builder()
            .timeout(settings.timeout)
            .default_headers(headers)
            .build()?;
        // join() replaces the last path segment unless the base ends in a slash
        let base_url = Url::parse(&format!("{}/", settings.base_url.trim_end_matches('/')))?;

        Ok(Self {
            client,
            base_url,
            max_retries: settings.max_retries,
        })
    }

    /// Resolves the key and transport settings, then builds the client.
    pub fn from_config(
        api_key: &Secret,
        transport: &TransportConfig,
    ) -> Result<Self, EmbedderError> {
        let key = api_key.resolve()?;
        let settings = transport.resolve()?;
        Ok(Self::new(&key, &settings)?)
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    async fn post<Req, Resp>(&self, path: &str, body: &Req) -> Result<Resp, ApiError>
    where
        Req: Serialize + ?Sized + Sync,
        Resp: DeserializeOwned,
    {
        let endpoint = self.base_url.join(path)?;
        let mut attempt = 0usize;
        loop {
            debug!(endpoint = %endpoint, attempt, "sending voyage request");
            match self.client.post(endpoint.clone()).json(body).send().await {
                Ok(response) => {
                    let status = response.status();
                    let response_bytes = response.bytes().await?;
                    if status.is_success() {
                        return Ok(serde_json::from_slice(&response_bytes)?);
                    }
                    let body = String::from_utf8_lossy(&response_bytes).to_string();
                    if should_retry(status) && attempt < self.max_retries {
                        attempt += 1;
                        warn!(%status, attempt, "voyage request failed, retrying");
                        tokio::time::sleep(retry_backoff(attempt)).await;
                        continue;
                    }
                    return Err(ApiError::BadStatus(status, body));
                }
                Err(err) => {
                    if is_retryable_error(&err) && attempt < self.max_retries {
                        attempt += 1;
                        warn!(error = %err, attempt, "voyage request failed, retrying");
                        tokio::time::sleep(retry_backoff(attempt)).await;
                        continue;
                    }
                    return Err(err.into());
                }
            }
        }
    }
}

fn should_retry(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

fn is_retryable_error(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect()
}

fn retry_backoff(attempt: usize) -> Duration {
    let capped = attempt.min(5) as u32;
    Duration::from_millis(500 * (1 << capped))
}

fn sorted_embeddings(mut data: Vec<EmbeddingData>) -> Vec<Embedding> {
    data.sort_by_key(|entry| entry.index);
    data.into_iter().map(|entry| entry.embedding).collect()
}

#[async_trait]
impl VoyageApi for VoyageClient {
    async fn embed(&self, request: EmbeddingRequest) -> Result<Embedded, ApiError> {
        let response: EmbeddingResponse = self.post("embeddings", &request).await?;
        Ok(Embedded {
            embeddings: sorted_embeddings(response.data),
            usage: response.usage.into(),
        })
    }

    async fn contextualized_embed(
        &self,
        request: ContextualizedEmbeddingRequest,
    ) -> Result<GroupedEmbedded, ApiError> {
        let mut response: ContextualizedEmbeddingResponse =
            self.post("contextualizedembeddings", &request).await?;
        response.data.sort_by_key(|group| group.index);
        Ok(GroupedEmbedded {
            groups: response
                .data
                .into_iter()
                .map(|group| sorted_embeddings(group.data))
                .collect(),
            usage: response.usage.into(),
        })
    }

    async fn multimodal_embed(
        &self,
        request: MultimodalEmbeddingRequest,
    ) -> Result<Embedded, ApiError> {
        let response: EmbeddingResponse = self.post("multimodalembeddings", &request).await?;
        Ok(Embedded {
            embeddings: sorted_embeddings(response.data),
            usage: response.usage.into(),
        })
    }

    async fn rerank(&self, request: RerankRequest) -> Result<Reranked, ApiError> {
        let response: RerankResponse = self.post("rerank", &request).await?;
        Ok(Reranked {
            results: response.data,
            usage: response.usage.into(),
        })
    }
}
