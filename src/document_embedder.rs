use serde::{Deserialize, Serialize};

use crate::{
    batch::{embed_in_batches, Progress, Usage},
    config::{
        validate_batch_size, validate_model, validate_output_dimension, InputType, OutputDtype,
        Secret, TransportConfig,
    },
    document::Document,
    error::EmbedderError,
    prepare::TextPreparer,
    reassemble::attach_in_order,
    voyage::{EmbeddingRequest, VoyageApi, VoyageClient},
};

pub const MAX_BATCH_SIZE: usize = 1000;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DocumentEmbedderConfig {
    pub api_key: Secret,
    pub model: String,
    pub input_type: Option<InputType>,
    pub truncate: Option<bool>,
    pub prefix: String,
    pub suffix: String,
    pub output_dimension: Option<u32>,
    pub output_dtype: Option<OutputDtype>,
    /// Documents per request.
    pub batch_size: usize,
    pub metadata_fields_to_embed: Vec<String>,
    pub embedding_separator: String,
    pub progress_bar: bool,
    #[serde(flatten)]
    pub transport: TransportConfig,
}

impl Default for DocumentEmbedderConfig {
    fn default() -> Self {
        DocumentEmbedderConfig {
            api_key: Secret::default(),
            model: "voyage-2".to_string(),
            input_type: Some(InputType::Document),
            truncate: None,
            prefix: String::new(),
            suffix: String::new(),
            output_dimension: None,
            output_dtype: None,
            batch_size: 32,
            metadata_fields_to_embed: Vec::new(),
            embedding_separator: "\n".to_string(),
            progress_bar: true,
            transport: TransportConfig::default(),
        }
    }
}

impl DocumentEmbedderConfig {
    pub fn validate(&self) -> Result<(), EmbedderError> {
        validate_model(&self.model)?;
        validate_batch_size(self.batch_size, MAX_BATCH_SIZE)?;
        validate_output_dimension(&self.model, self.output_dimension)
    }

    fn preparer(&self) -> TextPreparer {
        TextPreparer {
            prefix: self.prefix.clone(),
            suffix: self.suffix.clone(),
            separator: self.embedding_separator.clone(),
            metadata_fields: self.metadata_fields_to_embed.clone(),
        }
    }
}

/// Documents handed back with their embeddings set, plus summed usage.
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddedDocuments {
    pub documents: Vec<Document>,
    pub meta: Usage,
}

/// Embeds documents in batches, storing each embedding on its document.
pub struct VoyageDocumentEmbedder<A = VoyageClient> {
    config: DocumentEmbedderConfig,
    preparer: TextPreparer,
    api: A,
}

impl VoyageDocumentEmbedder<VoyageClient> {
    pub fn new(config: DocumentEmbedderConfig) -> Result<Self, EmbedderError> {
        // Before the key is resolved, so a bad config is not reported as a missing key.
        config.validate()?;
        let api = VoyageClient::from_config(&config.api_key, &config.transport)?;
        Ok(Self::build(config, api))
    }
}

impl<A: VoyageApi> VoyageDocumentEmbedder<A> {
    pub fn with_api(config: DocumentEmbedderConfig, api: A) -> Result<Self, EmbedderError> {
        config.validate()?;
        Ok(Self::build(config, api))
    }

    fn build(config: DocumentEmbedderConfig, api: A) -> Self {
        Self {
            preparer: config.preparer(),
            config,
            api,
        }
    }

    pub fn config(&self) -> &DocumentEmbedderConfig {
        &self.config
    }

    fn request_for(&self, texts: &[String]) -> EmbeddingRequest {
        EmbeddingRequest {
            input: texts.to_vec(),
            model: self.config.model.clone(),
            input_type: self.config.input_type,
            truncation: self.config.truncate,
            output_dimension: self.config.output_dimension,
            output_dtype: self.config.output_dtype,
        }
    }

    pub async fn run(
        &self,
        mut documents: Vec<Document>,
    ) -> Result<EmbeddedDocuments, EmbedderError> {
        let texts = self.preparer.render_all(&documents);
        let api = &self.api;
        let (embeddings, meta) = embed_in_batches(
            &texts,
            self.config.batch_size,
            Progress::new(self.config.progress_bar, "Calculating embeddings"),
            Usage::default(),
            move |chunk| api.embed(self.request_for(chunk)),
        )
        .await?;
        attach_in_order(&mut documents, embeddings)?;

        Ok(EmbeddedDocuments { documents, meta })
    }
}
