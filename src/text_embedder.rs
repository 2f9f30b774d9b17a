use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
    batch::Usage,
    config::{validate_model, InputType, Secret, TransportConfig},
    document::Embedding,
    error::EmbedderError,
    prepare::TextPreparer,
    voyage::{ApiError, EmbeddingRequest, VoyageApi, VoyageClient},
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TextEmbedderConfig {
    pub api_key: Secret,
    pub model: String,
    pub input_type: Option<InputType>,
    /// `None` leaves truncation to the endpoint's default.
    pub truncate: Option<bool>,
    pub prefix: String,
    pub suffix: String,
    #[serde(flatten)]
    pub transport: TransportConfig,
}

impl Default for TextEmbedderConfig {
    fn default() -> Self {
        TextEmbedderConfig {
            api_key: Secret::default(),
            model: "voyage-2".to_string(),
            input_type: Some(InputType::Query),
            truncate: None,
            prefix: String::new(),
            suffix: String::new(),
            transport: TransportConfig::default(),
        }
    }
}

impl TextEmbedderConfig {
    pub fn validate(&self) -> Result<(), EmbedderError> {
        validate_model(&self.model)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TextEmbedding {
    pub embedding: Embedding,
    pub meta: Usage,
}

/// Embeds a single string, typically a query.
pub struct VoyageTextEmbedder<A = VoyageClient> {
    config: TextEmbedderConfig,
    preparer: TextPreparer,
    api: A,
}

impl VoyageTextEmbedder<VoyageClient> {
    pub fn new(config: TextEmbedderConfig) -> Result<Self, EmbedderError> {
        // Before the key is resolved, so a bad config is not reported as a missing key.
        config.validate()?;
        let api = VoyageClient::from_config(&config.api_key, &config.transport)?;
        Ok(Self::build(config, api))
    }
}

impl<A: VoyageApi> VoyageTextEmbedder<A> {
    pub fn with_api(config: TextEmbedderConfig, api: A) -> Result<Self, EmbedderError> {
        config.validate()?;
        Ok(Self::build(config, api))
    }

    fn build(config: TextEmbedderConfig, api: A) -> Self {
        let preparer = TextPreparer {
            prefix: config.prefix.clone(),
            suffix: config.suffix.clone(),
            ..Default::default()
        };
        Self {
            config,
            preparer,
            api,
        }
    }

    pub fn config(&self) -> &TextEmbedderConfig {
        &self.config
    }

    pub async fn run(&self, text: &str) -> Result<TextEmbedding, EmbedderError> {
        let request = EmbeddingRequest {
            input: vec![self.preparer.render_text(text)],
            model: self.config.model.clone(),
            input_type: self.config.input_type,
            truncation: self.config.truncate,
            output_dimension: None,
            output_dtype: None,
        };
        debug!(model = %self.config.model, "embedding text");
        let response = self.api.embed(request).await?;
        let count = response.embeddings.len();
        let embedding = match <[Embedding; 1]>::try_from(response.embeddings) {
            Ok([embedding]) => embedding,
            Err(_) => {
                return Err(ApiError::MalformedResponse(format!(
                    "expected one embedding, got {count}"
                ))
                .into())
            }
        };

        Ok(TextEmbedding {
            embedding,
            meta: response.usage,
        })
    }
}
