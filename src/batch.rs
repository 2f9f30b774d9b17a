use std::{future::Future, ops::AddAssign};

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::{
    document::Embedding,
    voyage::{ApiError, Embedded, MultimodalInput},
};

/// Usage counters reported by the endpoints, summed over every request of one run.
///
/// `total_tokens` is always present. The remaining counters only exist for
/// multimodal requests and stay `None` otherwise.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub total_tokens: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text_tokens: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_pixels: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video_pixels: Option<u64>,
}

impl Usage {
    /// All multimodal counters present and zero.
    pub fn zeroed_multimodal() -> Self {
        Usage {
            total_tokens: 0,
            text_tokens: Some(0),
            image_pixels: Some(0),
            video_pixels: Some(0),
        }
    }
}

fn add_counter(left: Option<u64>, right: Option<u64>) -> Option<u64> {
    match (left, right) {
        (None, None) => None,
        (left, right) => Some(left.unwrap_or(0) + right.unwrap_or(0)),
    }
}

impl AddAssign for Usage {
    fn add_assign(&mut self, rhs: Self) {
        self.total_tokens += rhs.total_tokens;
        self.text_tokens = add_counter(self.text_tokens, rhs.text_tokens);
        self.image_pixels = add_counter(self.image_pixels, rhs.image_pixels);
        self.video_pixels = add_counter(self.video_pixels, rhs.video_pixels);
    }
}

/// Something submitted as one top-level entry of a batch.
pub trait BatchItem {
    /// How many embeddings the endpoint returns for this item.
    fn result_count(&self) -> usize {
        1
    }
}

impl BatchItem for String {}

impl BatchItem for MultimodalInput {}

/// A contextualized group: one embedding per chunk.
impl BatchItem for Vec<String> {
    fn result_count(&self) -> usize {
        self.len()
    }
}

/// Per-batch progress logging. Purely observational.
#[derive(Debug, Clone, Copy)]
pub struct Progress {
    enabled: bool,
    label: &'static str,
}

impl Progress {
    pub fn new(enabled: bool, label: &'static str) -> Self {
        Self { enabled, label }
    }

    fn batch_done(&self, done: usize, total: usize) {
        if self.enabled {
            info!(target: "voyage_embedders::progress", "{}: {done}/{total} batches", self.label);
        }
    }
}

/// Number of requests needed for `len` items.
pub fn batch_count(len: usize, batch_size: usize) -> usize {
    let batch_size = batch_size.max(1);
    (len + batch_size - 1) / batch_size
}

/// Splits `items` into consecutive batches of at most `batch_size` entries and runs
/// `call` on each, strictly one after the other, concatenating the embeddings in
/// submission order and adding up usage starting from `usage`.
///
/// Empty input makes no call. A failing call aborts the loop and its error is
/// returned as is. A call returning the wrong number of embeddings is reported as
/// a malformed response.
pub async fn embed_in_batches<'a, T, F, Fut>(
    items: &'a [T],
    batch_size: usize,
    progress: Progress,
    mut usage: Usage,
    mut call: F,
) -> Result<(Vec<Embedding>, Usage), ApiError>
where
    T: BatchItem,
    F: FnMut(&'a [T]) -> Fut,
    Fut: Future<Output = Result<Embedded, ApiError>>,
{
    let mut embeddings = Vec::with_capacity(items.iter().map(BatchItem::result_count).sum());
    let batch_size = batch_size.max(1);
    let total = batch_count(items.len(), batch_size);

    for (ix, chunk) in items.chunks(batch_size).enumerate() {
        let expected: usize = chunk.iter().map(BatchItem::result_count).sum();
        let batch = call(chunk).await?;
        if batch.embeddings.len() != expected {
            return Err(ApiError::MalformedResponse(format!(
                "batch {} returned {} embeddings for {} inputs",
                ix + 1,
                batch.embeddings.len(),
                expected
            )));
        }
        embeddings.extend(batch.embeddings);
        usage += batch.usage;
        progress.batch_done(ix + 1, total);
    }

    Ok((embeddings, usage))
}
