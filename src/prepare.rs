use serde::{Deserialize, Serialize};

use crate::document::Document;

/// Turns a document into the single string sent to the endpoint:
/// `prefix + join(separator, [metadata values..., content]) + suffix`.
///
/// Metadata fields are taken in the configured order; absent and null ones are
/// skipped. Missing content renders as the empty string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextPreparer {
    pub prefix: String,
    pub suffix: String,
    pub separator: String,
    pub metadata_fields: Vec<String>,
}

impl Default for TextPreparer {
    fn default() -> Self {
        TextPreparer {
            prefix: String::new(),
            suffix: String::new(),
            separator: "\n".to_string(),
            metadata_fields: Vec::new(),
        }
    }
}

impl TextPreparer {
    pub fn render(&self, document: &Document) -> String {
        let mut parts: Vec<String> = self
            .metadata_fields
            .iter()
            .filter_map(|field| document.meta_string(field))
            .collect();
        parts.push(document.content.clone().unwrap_or_default());

        format!("{}{}{}", self.prefix, parts.join(&self.separator), self.suffix)
    }

    pub fn render_all(&self, documents: &[Document]) -> Vec<String> {
        documents.iter().map(|d| self.render(d)).collect()
    }

    /// Renders the documents at `indices`, in that order. Every index must be in
    /// bounds for `documents`.
    pub(crate) fn render_indexed(&self, documents: &[Document], indices: &[usize]) -> Vec<String> {
        indices.iter().map(|&ix| self.render(&documents[ix])).collect()
    }

    /// Wraps a bare string in prefix and suffix.
    pub fn render_text(&self, text: &str) -> String {
        format!("{}{}{}", self.prefix, text, self.suffix)
    }
}
