pub mod batch;
pub mod config;
pub mod contextualized;
pub mod document;
pub mod document_embedder;
pub mod error;
pub mod grouping;
pub mod multimodal;
pub mod prepare;
pub mod ranker;
pub mod reassemble;
pub mod text_embedder;
pub mod voyage;

#[cfg(test)]
mod testing;

pub use batch::Usage;
pub use config::{InputType, OutputDtype, Secret, TransportConfig};
pub use contextualized::{ContextualizedEmbedderConfig, VoyageContextualizedDocumentEmbedder};
pub use document::{Document, Embedding};
pub use document_embedder::{DocumentEmbedderConfig, EmbeddedDocuments, VoyageDocumentEmbedder};
pub use error::EmbedderError;
pub use multimodal::{
    ByteStream, MultimodalContent, MultimodalEmbedderConfig, MultimodalEmbeddings,
    VoyageMultimodalEmbedder,
};
pub use ranker::{RankedDocuments, RankerConfig, VoyageRanker};
pub use text_embedder::{TextEmbedderConfig, TextEmbedding, VoyageTextEmbedder};
pub use voyage::{ApiError, VoyageApi, VoyageClient};
