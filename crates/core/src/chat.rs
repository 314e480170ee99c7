use crate::embeddings::{cosine_similarity, CharacterNgramEmbedder, Embedder};
use crate::error::EngineError;
use crate::llm::{ChatModel, TokenStream};
use crate::models::{ChatMessage, ChatRole, IndexConfig, RetrievalOptions, SourceRef, VectorIndex};
use crate::store::IndexStore;
use std::sync::Arc;
use tracing::{debug, warn};

/// Retrieval-augmented chat over a selected set of indices.
///
/// Retrieval scores every chunk of every index in scope against the query
/// embedding, merges per-index top-K hits into one ranked list, and grounds
/// the model prompt in the merged top-N plus the conversation history.
pub struct ChatEngine<M: ChatModel> {
    store: Arc<IndexStore>,
    embedder: CharacterNgramEmbedder,
    model: Arc<M>,
    options: RetrievalOptions,
}

struct ScopedIndex {
    catalog_position: usize,
    config: IndexConfig,
    index: VectorIndex,
}

struct RankedChunk {
    catalog_position: usize,
    index_id: String,
    document_name: String,
    chunk_offset: u64,
    source_page: u32,
    text: String,
    score: f32,
}

impl<M: ChatModel> ChatEngine<M> {
    pub fn new(
        store: Arc<IndexStore>,
        embedder: CharacterNgramEmbedder,
        model: Arc<M>,
        options: RetrievalOptions,
    ) -> Self {
        Self {
            store,
            embedder,
            model,
            options,
        }
    }

    /// Answer `query` grounded in the selected indices and the history.
    ///
    /// Returns the lazy token stream plus references to the chunks that
    /// were actually placed in the prompt. When retrieval finds nothing at
    /// all the engine degrades to an ungrounded answer over the history
    /// alone and returns an empty source list.
    pub async fn complete_chat(
        &self,
        query: &str,
        history: &[ChatMessage],
        index_ids: &[String],
    ) -> Result<(TokenStream, Vec<SourceRef>), EngineError> {
        if index_ids.is_empty() {
            return Err(EngineError::EmptyScope);
        }

        let scope = self.resolve_scope(index_ids).await?;
        self.check_shared_embedding_space(&scope)?;

        let query_vector = self.embedder.embed(query);
        let ranked = self.merge_ranked(&scope, &query_vector);

        let sources: Vec<SourceRef> = ranked
            .iter()
            .map(|hit| SourceRef {
                index_id: hit.index_id.clone(),
                chunk_offset: hit.chunk_offset,
                source_page: hit.source_page,
                score: hit.score,
            })
            .collect();

        let prompt = if ranked.is_empty() {
            // Graceful degradation: no retrievable context anywhere in
            // scope, answer from the conversation alone.
            warn!(scope = index_ids.len(), "no chunks retrieved, generating ungrounded answer");
            build_ungrounded_prompt(history, query)
        } else {
            debug!(chunks = ranked.len(), "grounding prompt in retrieved chunks");
            build_grounded_prompt(&ranked, history, query)
        };

        let tokens = self.model.stream(&prompt).await?;
        Ok((tokens, sources))
    }

    /// Load every index in scope, ordered by catalog insertion order so
    /// score ties always break the same way.
    async fn resolve_scope(&self, index_ids: &[String]) -> Result<Vec<ScopedIndex>, EngineError> {
        let catalog = self.store.list().await;

        let mut scope = Vec::new();
        for (catalog_position, config) in catalog.into_iter().enumerate() {
            if index_ids.contains(&config.index_id) {
                let index = self.store.load_vector_index(&config.index_id).await?;
                scope.push(ScopedIndex {
                    catalog_position,
                    config,
                    index,
                });
            }
        }

        // Every requested id must have resolved through the catalog.
        for index_id in index_ids {
            if !scope.iter().any(|scoped| &scoped.config.index_id == index_id) {
                return Err(EngineError::NotFound(index_id.clone()));
            }
        }

        Ok(scope)
    }

    /// Cross-index retrieval requires one shared vector space: identical
    /// embedder id and dimensions across the scope, matching the engine's
    /// own query embedder.
    fn check_shared_embedding_space(&self, scope: &[ScopedIndex]) -> Result<(), EngineError> {
        let expected_id = self.embedder.id();
        let expected_dimensions = self.embedder.dimensions();

        for scoped in scope {
            if scoped.index.embedder_id != expected_id
                || scoped.index.dimensions != expected_dimensions
            {
                return Err(EngineError::IncompatibleIndices(format!(
                    "index {} was built with {} ({} dims), query embedder is {} ({} dims)",
                    scoped.config.index_id,
                    scoped.index.embedder_id,
                    scoped.index.dimensions,
                    expected_id,
                    expected_dimensions,
                )));
            }
        }

        Ok(())
    }

    /// Top-K per index, merged across indices and sorted by similarity
    /// descending. Ties break by catalog insertion order, then chunk order,
    /// so results are deterministic. Capped at the global top-N.
    fn merge_ranked(&self, scope: &[ScopedIndex], query_vector: &[f32]) -> Vec<RankedChunk> {
        let mut merged = Vec::new();

        for scoped in scope {
            let mut hits: Vec<RankedChunk> = scoped
                .index
                .chunks
                .iter()
                .map(|chunk| RankedChunk {
                    catalog_position: scoped.catalog_position,
                    index_id: scoped.config.index_id.clone(),
                    document_name: scoped.config.document_name().to_string(),
                    chunk_offset: chunk.chunk_offset,
                    source_page: chunk.source_page,
                    text: chunk.text.clone(),
                    score: cosine_similarity(query_vector, &chunk.embedding),
                })
                .collect();

            hits.sort_by(|left, right| {
                right
                    .score
                    .total_cmp(&left.score)
                    .then_with(|| left.chunk_offset.cmp(&right.chunk_offset))
            });
            hits.truncate(self.options.per_index_top_k);
            merged.extend(hits);
        }

        merged.sort_by(|left, right| {
            right
                .score
                .total_cmp(&left.score)
                .then_with(|| left.catalog_position.cmp(&right.catalog_position))
                .then_with(|| left.chunk_offset.cmp(&right.chunk_offset))
        });
        merged.truncate(self.options.merged_top_n);
        merged
    }
}

fn push_history(prompt: &mut String, history: &[ChatMessage]) {
    if history.is_empty() {
        return;
    }

    prompt.push_str("Conversation so far:\n");
    for message in history {
        let speaker = match message.role {
            ChatRole::User => "User",
            ChatRole::Assistant => "Assistant",
        };
        prompt.push_str(&format!("{speaker}: {}\n", message.content));
    }
    prompt.push('\n');
}

fn build_grounded_prompt(context: &[RankedChunk], history: &[ChatMessage], query: &str) -> String {
    let mut prompt = String::from(
        "You are an assistant answering questions about the user's documents. \
         Answer using only the context excerpts and the conversation below; \
         say so when they do not cover the question.\n\nContext excerpts:\n",
    );

    for (position, chunk) in context.iter().enumerate() {
        prompt.push_str(&format!(
            "[{}] {} (page {}):\n{}\n\n",
            position + 1,
            chunk.document_name,
            chunk.source_page,
            chunk.text
        ));
    }

    push_history(&mut prompt, history);
    prompt.push_str(&format!("User: {query}\nAssistant:"));
    prompt
}

fn build_ungrounded_prompt(history: &[ChatMessage], query: &str) -> String {
    let mut prompt = String::from(
        "You are an assistant. No document context is available for this \
         question; answer from the conversation alone, and say when you do \
         not know.\n\n",
    );
    push_history(&mut prompt, history);
    prompt.push_str(&format!("User: {query}\nAssistant:"));
    prompt
}
