use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Durable record describing one ingested document. The `index_id` is the
/// sole external handle for load/delete/select operations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexConfig {
    pub index_id: String,
    pub document_path: String,
    pub created_at: DateTime<Utc>,
    /// Cached language detection result, computed lazily at most once.
    pub language: Option<String>,
}

impl IndexConfig {
    /// Display name derived from the source path: the file name, as the
    /// presentation layer renders it. Also the key for duplicate detection.
    pub fn document_name(&self) -> &str {
        Path::new(&self.document_path)
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or(&self.document_path)
    }
}

/// A bounded span of document text with its embedding vector.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    pub text: String,
    pub embedding: Vec<f32>,
    pub source_page: u32,
    pub chunk_offset: u64,
}

/// The vector index for one document, 1:1 with an `IndexConfig`.
///
/// Chunks preserve document order. `embedder_id` and `dimensions` record the
/// single embedding function used for the lifetime of the index; cross-index
/// retrieval requires them to match.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorIndex {
    pub index_id: String,
    pub embedder_id: String,
    pub dimensions: usize,
    pub chunks: Vec<Chunk>,
}

impl VectorIndex {
    pub fn first_page(&self) -> Option<u32> {
        self.chunks.first().map(|chunk| chunk.source_page)
    }

    /// All chunk text in document order, joined with blank lines.
    pub fn full_text(&self) -> String {
        self.chunks
            .iter()
            .map(|chunk| chunk.text.as_str())
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
        }
    }
}

/// Identifies a chunk that was actually placed in a grounded prompt, so
/// citations can be audited against the text the model saw.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SourceRef {
    pub index_id: String,
    pub chunk_offset: u64,
    pub source_page: u32,
    pub score: f32,
}

#[derive(Debug, Clone, Copy)]
pub struct ChunkingOptions {
    pub max_chars: usize,
    pub overlap_chars: usize,
}

impl Default for ChunkingOptions {
    fn default() -> Self {
        Self {
            max_chars: 1_000,
            overlap_chars: 150,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RetrievalOptions {
    /// Top-K chunks retrieved per selected index.
    pub per_index_top_k: usize,
    /// Global cap on merged chunks placed in the prompt.
    pub merged_top_n: usize,
}

impl Default for RetrievalOptions {
    fn default() -> Self {
        Self {
            per_index_top_k: 4,
            merged_top_n: 8,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_name_is_file_name() {
        let config = IndexConfig {
            index_id: "id-1".to_string(),
            document_path: "/data/uploads/report.pdf".to_string(),
            created_at: Utc::now(),
            language: None,
        };
        assert_eq!(config.document_name(), "report.pdf");
    }

    #[test]
    fn full_text_preserves_chunk_order() {
        let index = VectorIndex {
            index_id: "id-1".to_string(),
            embedder_id: "test".to_string(),
            dimensions: 2,
            chunks: vec![
                Chunk {
                    text: "first".to_string(),
                    embedding: vec![0.0, 1.0],
                    source_page: 1,
                    chunk_offset: 0,
                },
                Chunk {
                    text: "second".to_string(),
                    embedding: vec![1.0, 0.0],
                    source_page: 2,
                    chunk_offset: 1,
                },
            ],
        };
        assert_eq!(index.full_text(), "first\n\nsecond");
        assert_eq!(index.first_page(), Some(1));
    }
}
