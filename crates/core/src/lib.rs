pub mod chat;
pub mod chunking;
pub mod coordinator;
pub mod embeddings;
pub mod error;
pub mod language;
pub mod llm;
pub mod loader;
pub mod models;
pub mod store;
pub mod summarize;
pub mod translate;

pub use chat::ChatEngine;
pub use chunking::{build_chunks, normalize_whitespace, split_with_overlap};
pub use coordinator::RagCoordinator;
pub use embeddings::{
    cosine_similarity, CharacterNgramEmbedder, Embedder, DEFAULT_EMBEDDING_DIMENSIONS,
};
pub use error::{EngineError, IngestError, MAX_UPLOAD_BYTES};
pub use language::{detect_language, language_name};
pub use llm::{ChatModel, ChatModelConfig, OpenAiCompatModel, TokenStream};
pub use loader::{load_document, DocumentFormat, PageText};
pub use models::{
    ChatMessage, ChatRole, Chunk, ChunkingOptions, IndexConfig, RetrievalOptions, SourceRef,
    VectorIndex,
};
pub use store::IndexStore;
pub use summarize::{Summarizer, EMPTY_DOCUMENT_SUMMARY};
pub use translate::Translator;
