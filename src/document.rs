//! The record type flowing through every component.

use std::io::{self, BufRead, Write};

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub type Embedding = Vec<f32>;
pub type Metadata = serde_json::Map<String, Value>;

/// A piece of content plus free-form metadata. Embedders fill in `embedding`,
/// the ranker fills in `score`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Document {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub meta: Metadata,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Embedding>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f32>,
}

impl Document {
    pub fn new<S: Into<String>>(content: S) -> Self {
        Document {
            content: Some(content.into()),
            ..Default::default()
        }
    }

    pub fn with_id<S: Into<String>>(mut self, id: S) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_meta<K: Into<String>, V: Into<Value>>(mut self, key: K, value: V) -> Self {
        self.meta.insert(key.into(), value.into());
        self
    }

    /// Renders a metadata value as text. Absent and null values yield `None`;
    /// strings come back without quotes, anything else in its JSON form.
    pub fn meta_string(&self, key: &str) -> Option<String> {
        match self.meta.get(key)? {
            Value::Null => None,
            Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }
}

/// Reads one document per non-blank line.
pub fn read_documents<R: BufRead>(reader: R) -> io::Result<Vec<Document>> {
    let mut documents = Vec::new();
    for (line_no, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let document = serde_json::from_str(&line).map_err(|e| {
            io::Error::new(
                io::ErrorKind::InvalidData,
                format!("invalid document at line {}: {e}", line_no + 1),
            )
        })?;
        documents.push(document);
    }

    Ok(documents)
}

pub fn write_documents<W: Write>(mut writer: W, documents: &[Document]) -> io::Result<()> {
    for document in documents {
        serde_json::to_writer(&mut writer, document)?;
        writer.write_all(b"\n")?;
    }
    writer.flush()
}

#[cfg(test)]
mod tests {
    use std::{
        fs::File,
        io::{BufReader, BufWriter, Seek, SeekFrom},
    };

    use serde_json::json;

    use super::*;

    #[test]
    fn meta_string_renders_values() {
        let doc = Document::new("x")
            .with_meta("title", "Pizza")
            .with_meta("page", 3)
            .with_meta("draft", false)
            .with_meta("missing", Value::Null);
        assert_eq!(doc.meta_string("title").as_deref(), Some("Pizza"));
        assert_eq!(doc.meta_string("page").as_deref(), Some("3"));
        assert_eq!(doc.meta_string("draft").as_deref(), Some("false"));
        assert_eq!(doc.meta_string("missing"), None);
        assert_eq!(doc.meta_string("nope"), None);
    }

    #[test]
    fn jsonl_survives_a_file() {
        let mut file = tempfile::tempfile().unwrap();
        let documents = vec![
            Document::new("first").with_id("1").with_meta("source_id", "a"),
            Document {
                content: None,
                embedding: Some(vec![0.5, -1.0]),
                score: Some(0.25),
                ..Default::default()
            },
        ];
        write_documents(BufWriter::new(&mut file), &documents).unwrap();
        file.seek(SeekFrom::Start(0)).unwrap();

        let loaded = read_documents(BufReader::new(&mut file)).unwrap();
        assert_eq!(loaded, documents);
    }

    #[test]
    fn blank_lines_skipped_and_bad_lines_reported() {
        let input = format!("\n{}\n\n", json!({"content": "a", "meta": {"k": 1}}));
        let loaded = read_documents(input.as_bytes()).unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].meta_string("k").as_deref(), Some("1"));

        let error = read_documents("{\"content\": \"a\"}\nnot json\n".as_bytes()).unwrap_err();
        assert_eq!(error.kind(), io::ErrorKind::InvalidData);
        assert!(error.to_string().contains("line 2"));
    }

    #[test]
    fn empty_file_reads_as_no_documents() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let loaded = read_documents(BufReader::new(File::open(file.path()).unwrap())).unwrap();
        assert!(loaded.is_empty());
    }
}
