use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::{
    batch::Usage,
    config::{validate_model, validate_top_k, Secret, TransportConfig},
    document::Document,
    error::EmbedderError,
    prepare::TextPreparer,
    reassemble::rank_documents,
    voyage::{RerankRequest, VoyageApi, VoyageClient},
};

/// Documents beyond this many are dropped before the rerank call.
pub const MAX_NUM_DOCS: usize = 1000;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RankerConfig {
    pub api_key: Secret,
    pub model: String,
    pub truncate: Option<bool>,
    pub top_k: Option<usize>,
    pub prefix: String,
    pub suffix: String,
    pub meta_fields_to_embed: Vec<String>,
    pub meta_data_separator: String,
    #[serde(flatten)]
    pub transport: TransportConfig,
}

impl Default for RankerConfig {
    fn default() -> Self {
        RankerConfig {
            api_key: Secret::default(),
            model: "rerank-2".to_string(),
            truncate: None,
            top_k: None,
            prefix: String::new(),
            suffix: String::new(),
            meta_fields_to_embed: Vec::new(),
            meta_data_separator: "\n".to_string(),
            transport: TransportConfig::default(),
        }
    }
}

impl RankerConfig {
    pub fn validate(&self) -> Result<(), EmbedderError> {
        validate_model(&self.model)?;
        validate_top_k(self.top_k)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RankedDocuments {
    /// Most relevant first, each with its score set.
    pub documents: Vec<Document>,
    pub meta: Usage,
}

/// Orders documents by relevance to a query.
pub struct VoyageRanker<A = VoyageClient> {
    config: RankerConfig,
    preparer: TextPreparer,
    api: A,
}

impl VoyageRanker<VoyageClient> {
    pub fn new(config: RankerConfig) -> Result<Self, EmbedderError> {
        // Before the key is resolved, so a bad config is not reported as a missing key.
        config.validate()?;
        let api = VoyageClient::from_config(&config.api_key, &config.transport)?;
        Ok(Self::build(config, api))
    }
}

impl<A: VoyageApi> VoyageRanker<A> {
    pub fn with_api(config: RankerConfig, api: A) -> Result<Self, EmbedderError> {
        config.validate()?;
        Ok(Self::build(config, api))
    }

    fn build(config: RankerConfig, api: A) -> Self {
        let preparer = TextPreparer {
            prefix: config.prefix.clone(),
            suffix: config.suffix.clone(),
            separator: config.meta_data_separator.clone(),
            metadata_fields: config.meta_fields_to_embed.clone(),
        };
        Self {
            config,
            preparer,
            api,
        }
    }

    pub fn config(&self) -> &RankerConfig {
        &self.config
    }

    /// Reranks `documents` against `query`. `top_k` overrides the configured value.
    pub async fn run(
        &self,
        query: &str,
        mut documents: Vec<Document>,
        top_k: Option<usize>,
    ) -> Result<RankedDocuments, EmbedderError> {
        let top_k = top_k.or(self.config.top_k);
        validate_top_k(top_k)?;

        if documents.is_empty() {
            return Ok(RankedDocuments {
                documents,
                meta: Usage::default(),
            });
        }
        if documents.len() > MAX_NUM_DOCS {
            warn!(
                submitted = documents.len(),
                limit = MAX_NUM_DOCS,
                "too many documents to rerank, dropping the rest"
            );
            documents.truncate(MAX_NUM_DOCS);
        }

        let request = RerankRequest {
            query: query.to_string(),
            documents: self.preparer.render_all(&documents),
            model: self.config.model.clone(),
            top_k,
            truncation: self.config.truncate,
        };
        debug!(documents = documents.len(), ?top_k, "reranking documents");
        let response = self.api.rerank(request).await?;
        let documents = rank_documents(documents, &response.results, top_k)?;

        Ok(RankedDocuments {
            documents,
            meta: response.usage,
        })
    }
}
