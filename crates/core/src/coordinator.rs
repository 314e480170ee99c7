use crate::chat::ChatEngine;
use crate::chunking::build_chunks;
use crate::embeddings::{CharacterNgramEmbedder, Embedder};
use crate::error::{EngineError, IngestError, MAX_UPLOAD_BYTES};
use crate::llm::{ChatModel, TokenStream};
use crate::loader::load_document;
use crate::models::{
    ChatMessage, ChunkingOptions, IndexConfig, RetrievalOptions, SourceRef, VectorIndex,
};
use crate::store::IndexStore;
use crate::summarize::Summarizer;
use chrono::Utc;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

/// Fronts the ingestion, summarization, and chat paths for the
/// presentation layer. One instance per process; all state lives in the
/// shared `IndexStore`.
pub struct RagCoordinator<M: ChatModel> {
    store: Arc<IndexStore>,
    embedder: CharacterNgramEmbedder,
    chunking: ChunkingOptions,
    engine: ChatEngine<M>,
    summarizer: Summarizer<M>,
}

impl<M: ChatModel> RagCoordinator<M> {
    pub fn new(store: Arc<IndexStore>, model: Arc<M>) -> Self {
        Self::with_options(
            store,
            model,
            CharacterNgramEmbedder::default(),
            ChunkingOptions::default(),
            RetrievalOptions::default(),
        )
    }

    pub fn with_options(
        store: Arc<IndexStore>,
        model: Arc<M>,
        embedder: CharacterNgramEmbedder,
        chunking: ChunkingOptions,
        retrieval: RetrievalOptions,
    ) -> Self {
        Self {
            engine: ChatEngine::new(store.clone(), embedder, model.clone(), retrieval),
            summarizer: Summarizer::new(store.clone(), model),
            store,
            embedder,
            chunking,
        }
    }

    /// Ingest one document: parse, chunk, embed, and durably register a new
    /// index. The index is built completely off to the side and only then
    /// registered, so interrupting ingestion leaves no partial state.
    pub async fn create_vector_store_index(
        &self,
        file_path: &Path,
    ) -> Result<IndexConfig, IngestError> {
        let size = fs::metadata(file_path)?.len();
        if size > MAX_UPLOAD_BYTES {
            return Err(IngestError::FileTooLarge {
                path: file_path.to_string_lossy().to_string(),
                limit: MAX_UPLOAD_BYTES,
            });
        }

        let document_name = file_path
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| {
                IngestError::MissingFileName(file_path.to_string_lossy().to_string())
            })?
            .to_string();

        // Early duplicate check for a fast, friendly failure; `register`
        // re-checks under the catalog write lock.
        if self.store.has_document_name(&document_name).await {
            return Err(IngestError::DuplicateDocument(document_name));
        }

        let pages = load_document(file_path)?;
        let chunks = build_chunks(&pages, &self.embedder, self.chunking)?;
        if chunks.is_empty() {
            return Err(IngestError::EmptyDocument(
                file_path.to_string_lossy().to_string(),
            ));
        }

        let config = IndexConfig {
            index_id: Uuid::new_v4().to_string(),
            document_path: file_path.to_string_lossy().to_string(),
            created_at: Utc::now(),
            language: None,
        };
        let index = VectorIndex {
            index_id: config.index_id.clone(),
            embedder_id: self.embedder.id(),
            dimensions: self.embedder.dimensions(),
            chunks,
        };

        let chunk_count = index.chunks.len();
        self.store.register(config.clone(), index).await?;
        info!(
            index_id = %config.index_id,
            document = %document_name,
            chunks = chunk_count,
            "document ingested"
        );

        Ok(config)
    }

    /// All indexed documents, in ingestion order.
    pub async fn list_vector_store_index(&self) -> Vec<IndexConfig> {
        self.store.list().await
    }

    pub async fn load_index_config(&self, index_id: &str) -> Result<IndexConfig, EngineError> {
        self.store.load(index_id).await
    }

    /// Remove an index and its config together; unknown ids are a no-op.
    pub async fn delete_vector_store_index(&self, index_id: &str) -> Result<(), EngineError> {
        self.store.delete(index_id).await?;
        info!(index_id, "index deleted");
        Ok(())
    }

    /// Dominant document language, memoized on the config record.
    pub async fn detect_document_language(&self, index_id: &str) -> Result<String, EngineError> {
        self.summarizer.document_language(index_id).await
    }

    /// Language-aware summary: French documents whole, everything else via
    /// the translated first page.
    pub async fn summarize_document_index(&self, index_id: &str) -> Result<String, EngineError> {
        self.summarizer.summarize(index_id).await
    }

    /// Explicit translate-then-summarize operation over the first page.
    pub async fn translate_and_summarize_first_page_fr(
        &self,
        index_id: &str,
    ) -> Result<String, EngineError> {
        self.summarizer.summarize_first_page_fr(index_id).await
    }

    /// Grounded chat over the selected indices. The caller owns the
    /// conversation history and passes it in whole each turn.
    pub async fn complete_chat(
        &self,
        query: &str,
        history: &[ChatMessage],
        index_ids: &[String],
    ) -> Result<(TokenStream, Vec<SourceRef>), EngineError> {
        self.engine.complete_chat(query, history, index_ids).await
    }
}
