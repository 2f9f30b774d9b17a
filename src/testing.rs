//! Recording stand-in for the Voyage endpoints.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use reqwest::StatusCode;

use crate::{
    batch::Usage,
    document::Embedding,
    voyage::{
        ApiError, ContentItem, ContextualizedEmbeddingRequest, Embedded, EmbeddingRequest,
        GroupedEmbedded, MultimodalEmbeddingRequest, RerankRequest, RerankResult, Reranked,
        VoyageApi,
    },
};

/// Deterministic fake embedding for a text, so tests can check which text ended
/// up on which document.
pub fn embedding_for(text: &str) -> Embedding {
    let checksum: u32 = text.bytes().map(u32::from).sum();
    vec![text.len() as f32, checksum as f32]
}

#[derive(Default)]
pub struct Recorded {
    pub embed: Vec<EmbeddingRequest>,
    pub contextualized: Vec<ContextualizedEmbeddingRequest>,
    pub multimodal: Vec<MultimodalEmbeddingRequest>,
    pub rerank: Vec<RerankRequest>,
    /// Calls that succeed before every further one fails with 429.
    pub fail_after: Option<usize>,
    /// Fixed rerank answer; otherwise documents come back in reverse order.
    pub rerank_results: Option<Vec<RerankResult>>,
}

impl Recorded {
    pub fn calls(&self) -> usize {
        self.embed.len() + self.contextualized.len() + self.multimodal.len() + self.rerank.len()
    }
}

#[derive(Clone, Default)]
pub struct MockApi {
    recorded: Arc<Mutex<Recorded>>,
}

impl MockApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_after(calls: usize) -> Self {
        let api = Self::default();
        api.recorded.lock().unwrap().fail_after = Some(calls);
        api
    }

    pub fn with_rerank_results(results: Vec<RerankResult>) -> Self {
        let api = Self::default();
        api.recorded.lock().unwrap().rerank_results = Some(results);
        api
    }

    pub fn recorded(&self) -> std::sync::MutexGuard<'_, Recorded> {
        self.recorded.lock().unwrap()
    }

    fn check_failure(recorded: &Recorded) -> Result<(), ApiError> {
        match recorded.fail_after {
            Some(limit) if recorded.calls() > limit => Err(ApiError::BadStatus(
                StatusCode::TOO_MANY_REQUESTS,
                "rate limited".to_string(),
            )),
            _ => Ok(()),
        }
    }
}

fn text_usage(texts: usize) -> Usage {
    Usage {
        total_tokens: texts as u64,
        ..Default::default()
    }
}

#[async_trait]
impl VoyageApi for MockApi {
    async fn embed(&self, request: EmbeddingRequest) -> Result<Embedded, ApiError> {
        let mut recorded = self.recorded();
        recorded.embed.push(request.clone());
        Self::check_failure(&recorded)?;
        Ok(Embedded {
            embeddings: request.input.iter().map(|t| embedding_for(t)).collect(),
            usage: text_usage(request.input.len()),
        })
    }

    async fn contextualized_embed(
        &self,
        request: ContextualizedEmbeddingRequest,
    ) -> Result<GroupedEmbedded, ApiError> {
        let mut recorded = self.recorded();
        recorded.contextualized.push(request.clone());
        Self::check_failure(&recorded)?;
        Ok(GroupedEmbedded {
            groups: request
                .inputs
                .iter()
                .map(|group| group.iter().map(|t| embedding_for(t)).collect())
                .collect(),
            usage: text_usage(request.inputs.iter().map(Vec::len).sum()),
        })
    }

    async fn multimodal_embed(
        &self,
        request: MultimodalEmbeddingRequest,
    ) -> Result<Embedded, ApiError> {
        let mut recorded = self.recorded();
        recorded.multimodal.push(request.clone());
        Self::check_failure(&recorded)?;

        let mut usage = Usage::zeroed_multimodal();
        let mut embeddings = Vec::with_capacity(request.inputs.len());
        for input in &request.inputs {
            let mut text_tokens = 0;
            let mut image_pixels = 0;
            let mut video_pixels = 0;
            for item in &input.content {
                match item {
                    ContentItem::Text { .. } => text_tokens += 1,
                    ContentItem::ImageBase64 { .. } | ContentItem::ImageUrl { .. } => {
                        image_pixels += 100
                    }
                    ContentItem::VideoBase64 { .. } | ContentItem::VideoUrl { .. } => {
                        video_pixels += 1000
                    }
                }
            }
            embeddings.push(vec![input.content.len() as f32]);
            usage += Usage {
                total_tokens: text_tokens + image_pixels / 100 + video_pixels / 100,
                text_tokens: Some(text_tokens),
                image_pixels: Some(image_pixels),
                video_pixels: Some(video_pixels),
            };
        }

        Ok(Embedded { embeddings, usage })
    }

    async fn rerank(&self, request: RerankRequest) -> Result<Reranked, ApiError> {
        let mut recorded = self.recorded();
        recorded.rerank.push(request.clone());
        Self::check_failure(&recorded)?;

        let count = request.documents.len();
        let mut results = recorded.rerank_results.clone().unwrap_or_else(|| {
            (0..count)
                .rev()
                .map(|index| RerankResult {
                    index,
                    relevance_score: (index + 1) as f32 / count as f32,
                })
                .collect()
        });
        if let Some(top_k) = request.top_k {
            results.truncate(top_k);
        }

        Ok(Reranked {
            results,
            usage: text_usage(count + 1),
        })
    }
}
