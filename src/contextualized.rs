//! Contextualized chunk embeddings: chunks of the same source document are sent
//! together so each embedding reflects its neighbours.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
    batch::{embed_in_batches, Progress, Usage},
    config::{
        validate_batch_size, validate_model, validate_output_dimension, InputType, OutputDtype,
        Secret, TransportConfig,
    },
    document::Document,
    document_embedder::EmbeddedDocuments,
    error::EmbedderError,
    grouping::group_by_field,
    prepare::TextPreparer,
    reassemble::attach_embeddings,
    voyage::{ContextualizedEmbeddingRequest, VoyageApi, VoyageClient},
};

/// Upper bound on groups per request.
pub const MAX_GROUPS_PER_BATCH: usize = 1000;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextualizedEmbedderConfig {
    pub api_key: Secret,
    pub model: String,
    pub input_type: Option<InputType>,
    pub prefix: String,
    pub suffix: String,
    pub output_dimension: Option<u32>,
    pub output_dtype: OutputDtype,
    /// Source documents (groups) per request, not chunks.
    pub batch_size: usize,
    pub metadata_fields_to_embed: Vec<String>,
    pub embedding_separator: String,
    /// Metadata field whose value ties chunks to their source document.
    pub source_id_field: String,
    pub progress_bar: bool,
    #[serde(flatten)]
    pub transport: TransportConfig,
}

impl Default for ContextualizedEmbedderConfig {
    fn default() -> Self {
        ContextualizedEmbedderConfig {
            api_key: Secret::default(),
            model: "voyage-context-3".to_string(),
            input_type: None,
            prefix: String::new(),
            suffix: String::new(),
            output_dimension: None,
            output_dtype: OutputDtype::Float,
            batch_size: 32,
            metadata_fields_to_embed: Vec::new(),
            embedding_separator: "\n".to_string(),
            source_id_field: "source_id".to_string(),
            progress_bar: true,
            transport: TransportConfig::default(),
        }
    }
}

impl ContextualizedEmbedderConfig {
    pub fn validate(&self) -> Result<(), EmbedderError> {
        validate_model(&self.model)?;
        validate_batch_size(self.batch_size, MAX_GROUPS_PER_BATCH)?;
        validate_output_dimension(&self.model, self.output_dimension)?;
        if self.source_id_field.is_empty() {
            return Err(EmbedderError::InvalidParameter(
                "source_id_field must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

pub struct VoyageContextualizedDocumentEmbedder<A = VoyageClient> {
    config: ContextualizedEmbedderConfig,
    preparer: TextPreparer,
    api: A,
}

impl VoyageContextualizedDocumentEmbedder<VoyageClient> {
    pub fn new(config: ContextualizedEmbedderConfig) -> Result<Self, EmbedderError> {
        // Before the key is resolved, so a bad config is not reported as a missing key.
        config.validate()?;
        let api = VoyageClient::from_config(&config.api_key, &config.transport)?;
        Ok(Self::build(config, api))
    }
}

impl<A: VoyageApi> VoyageContextualizedDocumentEmbedder<A> {
    pub fn with_api(config: ContextualizedEmbedderConfig, api: A) -> Result<Self, EmbedderError> {
        config.validate()?;
        Ok(Self::build(config, api))
    }

    fn build(config: ContextualizedEmbedderConfig, api: A) -> Self {
        let preparer = TextPreparer {
            prefix: config.prefix.clone(),
            suffix: config.suffix.clone(),
            separator: config.embedding_separator.clone(),
            metadata_fields: config.metadata_fields_to_embed.clone(),
        };
        Self {
            config,
            preparer,
            api,
        }
    }

    pub fn config(&self) -> &ContextualizedEmbedderConfig {
        &self.config
    }

    fn request_for(&self, groups: &[Vec<String>]) -> ContextualizedEmbeddingRequest {
        ContextualizedEmbeddingRequest {
            inputs: groups.to_vec(),
            model: self.config.model.clone(),
            input_type: self.config.input_type,
            output_dimension: self.config.output_dimension,
            output_dtype: Some(self.config.output_dtype),
        }
    }

    /// Embeds `documents` grouped by their source id. The documents come back in
    /// the order they were passed in, each with its embedding set.
    pub async fn run(
        &self,
        mut documents: Vec<Document>,
    ) -> Result<EmbeddedDocuments, EmbedderError> {
        if documents.is_empty() {
            return Ok(EmbeddedDocuments {
                documents,
                meta: Usage::default(),
            });
        }

        let grouping = group_by_field(&documents, &self.config.source_id_field)?;
        let grouped_texts: Vec<Vec<String>> = grouping
            .iter()
            .map(|(_, members)| self.preparer.render_indexed(&documents, members))
            .collect();
        debug!(
            documents = documents.len(),
            groups = grouping.len(),
            "embedding contextualized chunks"
        );

        let api = &self.api;
        let (embeddings, meta) = embed_in_batches(
            &grouped_texts,
            self.config.batch_size,
            Progress::new(
                self.config.progress_bar,
                "Calculating contextualized embeddings",
            ),
            Usage::default(),
            move |chunk| async move {
                api.contextualized_embed(self.request_for(chunk))
                    .await
                    .and_then(|grouped| grouped.flatten_for(chunk))
            },
        )
        .await?;
        attach_embeddings(&mut documents, &grouping.flattened(), embeddings)?;

        Ok(EmbeddedDocuments { documents, meta })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        testing::{embedding_for, MockApi},
        voyage::ApiError,
    };

    fn chunk(content: &str, source: &str) -> Document {
        Document::new(content).with_meta("source_id", source)
    }

    fn config(batch_size: usize) -> ContextualizedEmbedderConfig {
        ContextualizedEmbedderConfig {
            batch_size,
            progress_bar: false,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn chunks_grouped_by_source_and_returned_in_input_order() {
        let api = MockApi::new();
        let embedder =
            VoyageContextualizedDocumentEmbedder::with_api(config(32), api.clone()).unwrap();
        let documents = vec![
            chunk("Introduction to quantum computing.", "doc1"),
            chunk("Classical computers use binary bits.", "doc2"),
            chunk("Quantum bits or qubits are the basic unit.", "doc1"),
        ];

        let result = embedder.run(documents.clone()).await.unwrap();
        for (original, embedded) in documents.iter().zip(&result.documents) {
            assert_eq!(embedded.content, original.content);
            assert_eq!(
                embedded.embedding.as_ref(),
                Some(&embedding_for(original.content.as_deref().unwrap()))
            );
        }
        assert_eq!(result.meta.total_tokens, 3);

        let recorded = api.recorded();
        assert_eq!(recorded.contextualized.len(), 1);
        let request = &recorded.contextualized[0];
        assert_eq!(
            request.inputs,
            vec![
                vec![
                    "Introduction to quantum computing.".to_string(),
                    "Quantum bits or qubits are the basic unit.".to_string(),
                ],
                vec!["Classical computers use binary bits.".to_string()],
            ]
        );
        assert_eq!(request.model, "voyage-context-3");
        assert_eq!(request.output_dtype, Some(OutputDtype::Float));
        assert_eq!(request.input_type, None);
    }

    #[tokio::test]
    async fn batch_size_counts_groups() {
        let api = MockApi::new();
        let embedder =
            VoyageContextualizedDocumentEmbedder::with_api(config(2), api.clone()).unwrap();
        let documents = vec![
            chunk("a1", "A"),
            chunk("b1", "B"),
            chunk("a2", "A"),
            chunk("c1", "C"),
            chunk("c2", "C"),
            chunk("c3", "C"),
        ];

        let result = embedder.run(documents).await.unwrap();
        assert!(result.documents.iter().all(|d| d.embedding.is_some()));
        assert_eq!(result.meta.total_tokens, 6);

        let recorded = api.recorded();
        let groups_per_call: Vec<_> = recorded
            .contextualized
            .iter()
            .map(|r| r.inputs.len())
            .collect();
        assert_eq!(groups_per_call, vec![2, 1]);
        let flattened: Vec<String> = recorded
            .contextualized
            .iter()
            .flat_map(|r| r.inputs.concat())
            .collect();
        assert_eq!(flattened, vec!["a1", "a2", "b1", "c1", "c2", "c3"]);
    }

    #[tokio::test]
    async fn metadata_and_affixes_rendered_per_chunk() {
        let api = MockApi::new();
        let embedder = VoyageContextualizedDocumentEmbedder::with_api(
            ContextualizedEmbedderConfig {
                prefix: "[".to_string(),
                suffix: "]".to_string(),
                metadata_fields_to_embed: vec!["title".to_string()],
                embedding_separator: ": ".to_string(),
                source_id_field: "parent".to_string(),
                ..config(8)
            },
            api.clone(),
        )
        .unwrap();
        let documents = vec![Document::new("body")
            .with_meta("parent", 1)
            .with_meta("title", "T")];

        embedder.run(documents).await.unwrap();
        assert_eq!(
            api.recorded().contextualized[0].inputs,
            vec![vec!["[T: body]".to_string()]]
        );
    }

    #[tokio::test]
    async fn missing_source_id_fails_before_any_call() {
        let api = MockApi::new();
        let embedder =
            VoyageContextualizedDocumentEmbedder::with_api(config(1), api.clone()).unwrap();
        let documents = vec![chunk("first", "d1"), Document::new("second")];

        match embedder.run(documents).await {
            Err(EmbedderError::MissingGroupingKey { field }) => assert_eq!(field, "source_id"),
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(api.recorded().calls(), 0);
    }

    #[tokio::test]
    async fn empty_input_short_circuits() {
        let api = MockApi::new();
        let embedder =
            VoyageContextualizedDocumentEmbedder::with_api(config(4), api.clone()).unwrap();
        let result = embedder.run(Vec::new()).await.unwrap();
        assert!(result.documents.is_empty());
        assert_eq!(result.meta.total_tokens, 0);
        assert_eq!(api.recorded().calls(), 0);
    }

    #[tokio::test]
    async fn remote_failure_propagates() {
        let embedder =
            VoyageContextualizedDocumentEmbedder::with_api(config(1), MockApi::failing_after(0))
                .unwrap();
        assert!(matches!(
            embedder.run(vec![chunk("a", "A")]).await,
            Err(EmbedderError::Api(ApiError::BadStatus(_, _)))
        ));
    }

    #[test]
    fn unsupported_dimension_rejected() {
        let result = VoyageContextualizedDocumentEmbedder::with_api(
            ContextualizedEmbedderConfig {
                output_dimension: Some(768),
                ..config(4)
            },
            MockApi::new(),
        );
        assert!(matches!(result, Err(EmbedderError::InvalidParameter(_))));
    }
}
