//! Putting remote results back onto the documents they belong to.

use crate::{
    document::{Document, Embedding},
    voyage::{ApiError, RerankResult},
};

/// Attaches `embeddings[i]` to `documents[order[i]]`.
///
/// `order` is the submission order as indices into `documents`; the documents
/// themselves stay where they are.
pub fn attach_embeddings(
    documents: &mut [Document],
    order: &[usize],
    embeddings: Vec<Embedding>,
) -> Result<(), ApiError> {
    if embeddings.len() != order.len() {
        return Err(ApiError::MalformedResponse(format!(
            "got {} embeddings for {} documents",
            embeddings.len(),
            order.len()
        )));
    }
    for (&ix, embedding) in order.iter().zip(embeddings) {
        documents[ix].embedding = Some(embedding);
    }

    Ok(())
}

/// [`attach_embeddings`] for documents submitted in their own order.
pub fn attach_in_order(
    documents: &mut [Document],
    embeddings: Vec<Embedding>,
) -> Result<(), ApiError> {
    if embeddings.len() != documents.len() {
        return Err(ApiError::MalformedResponse(format!(
            "got {} embeddings for {} documents",
            embeddings.len(),
            documents.len()
        )));
    }
    for (document, embedding) in documents.iter_mut().zip(embeddings) {
        document.embedding = Some(embedding);
    }

    Ok(())
}

/// Reorders `documents` as the ranking in `results` says, setting each one's score.
///
/// No sorting happens here; the order of `results` is taken as given. At most
/// `top_k` documents are returned.
pub fn rank_documents(
    documents: Vec<Document>,
    results: &[RerankResult],
    top_k: Option<usize>,
) -> Result<Vec<Document>, ApiError> {
    let submitted = documents.len();
    let mut slots: Vec<Option<Document>> = documents.into_iter().map(Some).collect();
    let limit = top_k.unwrap_or(submitted).min(submitted);

    let mut ranked = Vec::with_capacity(limit.min(results.len()));
    for result in results.iter().take(limit) {
        let slot = slots.get_mut(result.index).ok_or_else(|| {
            ApiError::MalformedResponse(format!(
                "rerank index {} out of range for {} documents",
                result.index, submitted
            ))
        })?;
        let mut document = slot.take().ok_or_else(|| {
            ApiError::MalformedResponse(format!("rerank index {} returned twice", result.index))
        })?;
        document.score = Some(result.relevance_score);
        ranked.push(document);
    }

    Ok(ranked)
}
