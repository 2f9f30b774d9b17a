//! Embeddings over mixed text, image and video inputs.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::{
    batch::{embed_in_batches, Progress, Usage},
    config::{
        validate_batch_size, validate_model, validate_output_dimension, InputType, OutputDtype,
        Secret, TransportConfig,
    },
    document::Embedding,
    error::EmbedderError,
    voyage::{ContentItem, MultimodalEmbeddingRequest, MultimodalInput, VoyageApi, VoyageClient},
};

pub const MAX_BATCH_SIZE: usize = 1000;

/// Raw bytes with an optional mime type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ByteStream {
    pub data: Bytes,
    pub mime_type: Option<String>,
}

impl ByteStream {
    pub fn new<D: Into<Bytes>>(data: D, mime_type: Option<&str>) -> Self {
        ByteStream {
            data: data.into(),
            mime_type: mime_type.map(str::to_string),
        }
    }

    /// Encodes the bytes as a `data:` URL, requiring the mime type to belong to
    /// `family` (`image`, `video`). Without an explicit mime type it is detected
    /// from the leading bytes.
    fn data_url(&self, family: &str) -> Result<String, EmbedderError> {
        if self.data.is_empty() {
            return Err(EmbedderError::InvalidInput(format!("{family} bytes are empty")));
        }
        let mime_type = match self.mime_type.as_deref() {
            Some(mime_type) => mime_type,
            None => sniff_mime_type(&self.data).ok_or_else(|| {
                EmbedderError::InvalidInput(format!(
                    "could not detect the format of {family} bytes, pass a mime type such as \
                     {family}/..."
                ))
            })?,
        };
        let matches_family = mime_type
            .split_once('/')
            .map(|(kind, subtype)| kind == family && !subtype.is_empty())
            .unwrap_or(false);
        if !matches_family {
            return Err(EmbedderError::InvalidInput(format!(
                "expected a {family}/* mime type, got {mime_type:?}"
            )));
        }

        Ok(format!("data:{mime_type};base64,{}", STANDARD.encode(&self.data)))
    }
}

/// Mime type from the magic bytes of the common image and video containers.
fn sniff_mime_type(data: &[u8]) -> Option<&'static str> {
    match data {
        [0x89, b'P', b'N', b'G', ..] => Some("image/png"),
        [0xFF, 0xD8, 0xFF, ..] => Some("image/jpeg"),
        [b'G', b'I', b'F', b'8', ..] => Some("image/gif"),
        [b'R', b'I', b'F', b'F', _, _, _, _, b'W', b'E', b'B', b'P', ..] => Some("image/webp"),
        [b'B', b'M', ..] => Some("image/bmp"),
        [_, _, _, _, b'f', b't', b'y', b'p', ..] => Some("video/mp4"),
        [0x1A, 0x45, 0xDF, 0xA3, ..] => Some("video/webm"),
        _ => None,
    }
}

/// One piece of a multimodal input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MultimodalContent {
    Text(String),
    Image(ByteStream),
    ImageUrl(String),
    Video(ByteStream),
    VideoUrl(String),
}

impl From<&str> for MultimodalContent {
    fn from(text: &str) -> Self {
        MultimodalContent::Text(text.to_string())
    }
}

impl From<String> for MultimodalContent {
    fn from(text: String) -> Self {
        MultimodalContent::Text(text)
    }
}

pub fn convert_content_item(item: &MultimodalContent) -> Result<ContentItem, EmbedderError> {
    Ok(match item {
        MultimodalContent::Text(text) => ContentItem::Text { text: text.clone() },
        MultimodalContent::Image(stream) => ContentItem::ImageBase64 {
            image_base64: stream.data_url("image")?,
        },
        MultimodalContent::ImageUrl(url) => ContentItem::ImageUrl {
            image_url: url.clone(),
        },
        MultimodalContent::Video(stream) => ContentItem::VideoBase64 {
            video_base64: stream.data_url("video")?,
        },
        MultimodalContent::VideoUrl(url) => ContentItem::VideoUrl {
            video_url: url.clone(),
        },
    })
}

/// Converts every input up front so a bad item fails the run before any request.
pub fn prepare_inputs(
    inputs: &[Vec<MultimodalContent>],
) -> Result<Vec<MultimodalInput>, EmbedderError> {
    inputs
        .iter()
        .enumerate()
        .map(|(ix, items)| {
            if items.is_empty() {
                return Err(EmbedderError::InvalidInput(format!(
                    "input at index {ix} has no content items"
                )));
            }
            let content = items
                .iter()
                .map(convert_content_item)
                .collect::<Result<Vec<_>, _>>()?;
            Ok(MultimodalInput { content })
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MultimodalEmbedderConfig {
    pub api_key: Secret,
    pub model: String,
    pub input_type: Option<InputType>,
    pub truncate: bool,
    pub output_dimension: Option<u32>,
    pub output_dtype: Option<OutputDtype>,
    pub batch_size: usize,
    pub progress_bar: bool,
    #[serde(flatten)]
    pub transport: TransportConfig,
}

impl Default for MultimodalEmbedderConfig {
    fn default() -> Self {
        MultimodalEmbedderConfig {
            api_key: Secret::default(),
            model: "voyage-multimodal-3.5".to_string(),
            input_type: None,
            truncate: true,
            output_dimension: None,
            output_dtype: None,
            batch_size: 8,
            progress_bar: true,
            transport: TransportConfig::default(),
        }
    }
}

impl MultimodalEmbedderConfig {
    pub fn validate(&self) -> Result<(), EmbedderError> {
        validate_model(&self.model)?;
        validate_batch_size(self.batch_size, MAX_BATCH_SIZE)?;
        validate_output_dimension(&self.model, self.output_dimension)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MultimodalEmbeddings {
    /// One per input, in input order.
    pub embeddings: Vec<Embedding>,
    pub meta: Usage,
}

pub struct VoyageMultimodalEmbedder<A = VoyageClient> {
    config: MultimodalEmbedderConfig,
    api: A,
}

impl VoyageMultimodalEmbedder<VoyageClient> {
    pub fn new(config: MultimodalEmbedderConfig) -> Result<Self, EmbedderError> {
        // Before the key is resolved, so a bad config is not reported as a missing key.
        config.validate()?;
        let api = VoyageClient::from_config(&config.api_key, &config.transport)?;
        Ok(Self::build(config, api))
    }
}

impl<A: VoyageApi> VoyageMultimodalEmbedder<A> {
    pub fn with_api(config: MultimodalEmbedderConfig, api: A) -> Result<Self, EmbedderError> {
        config.validate()?;
        Ok(Self::build(config, api))
    }

    fn build(config: MultimodalEmbedderConfig, api: A) -> Self {
        Self { config, api }
    }

    pub fn config(&self) -> &MultimodalEmbedderConfig {
        &self.config
    }

    fn request_for(&self, inputs: &[MultimodalInput]) -> MultimodalEmbeddingRequest {
        MultimodalEmbeddingRequest {
            inputs: inputs.to_vec(),
            model: self.config.model.clone(),
            input_type: self.config.input_type,
            truncation: self.config.truncate,
            output_dimension: self.config.output_dimension,
            output_dtype: self.config.output_dtype,
        }
    }

    pub async fn run(
        &self,
        inputs: &[Vec<MultimodalContent>],
    ) -> Result<MultimodalEmbeddings, EmbedderError> {
        let prepared = prepare_inputs(inputs)?;
        let api = &self.api;
        let (embeddings, meta) = embed_in_batches(
            &prepared,
            self.config.batch_size,
            Progress::new(self.config.progress_bar, "Calculating multimodal embeddings"),
            Usage::zeroed_multimodal(),
            move |chunk| api.multimodal_embed(self.request_for(chunk)),
        )
        .await?;

        Ok(MultimodalEmbeddings { embeddings, meta })
    }
}
