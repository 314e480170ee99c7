use crate::error::EngineError;
use crate::language::detect_language;
use crate::llm::ChatModel;
use crate::models::VectorIndex;
use crate::store::IndexStore;
use crate::translate::Translator;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Fixed summary for an index with zero chunks; an empty document is a
/// valid terminal case, not an error, once an index for it exists.
pub const EMPTY_DOCUMENT_SUMMARY: &str = "no content";

const MAX_MODEL_ATTEMPTS: usize = 3;
const RETRY_DELAY: Duration = Duration::from_millis(200);

/// Language-aware abstractive summarization over one index.
///
/// French documents are summarized whole. Any other language takes the
/// cheaper branch: only the first page is translated to French and then
/// summarized. The asymmetry is deliberate (non-French documents are
/// assumed less central) and is preserved as the reference behavior.
pub struct Summarizer<M: ChatModel> {
    store: Arc<IndexStore>,
    model: Arc<M>,
    translator: Translator<M>,
}

impl<M: ChatModel> Summarizer<M> {
    pub fn new(store: Arc<IndexStore>, model: Arc<M>) -> Self {
        Self {
            store,
            model: model.clone(),
            translator: Translator::new(model),
        }
    }

    /// Dominant document language, detected once and memoized on the
    /// config record.
    pub async fn document_language(&self, index_id: &str) -> Result<String, EngineError> {
        let config = self.store.load(index_id).await?;
        if let Some(language) = config.language {
            return Ok(language);
        }

        let lock = self.store.mutation_lock(index_id).await;
        let _guard = lock.lock().await;

        // Another caller may have detected and cached while we waited.
        let fresh = self.store.load(index_id).await?;
        if let Some(language) = fresh.language {
            return Ok(language);
        }

        let index = self.store.load_vector_index(index_id).await?;
        let language = detect_language(&index.full_text());
        self.store.set_language(index_id, language).await?;
        debug!(index_id, language, "document language detected");
        Ok(language.to_string())
    }

    /// Summarize the document behind `index_id` according to its language.
    pub async fn summarize(&self, index_id: &str) -> Result<String, EngineError> {
        let config = self.store.load(index_id).await?;
        let index = self.store.load_vector_index(index_id).await?;
        if index.chunks.is_empty() {
            return Ok(EMPTY_DOCUMENT_SUMMARY.to_string());
        }

        let language = self.document_language(index_id).await?;
        info!(index_id, %language, document = config.document_name(), "summarizing document");

        if language == "fr" {
            self.summarize_text(&index.full_text()).await
        } else {
            self.first_page_in_french(&index).await
        }
    }

    /// Translate the first page to French and summarize the translation,
    /// regardless of the detected language.
    pub async fn summarize_first_page_fr(&self, index_id: &str) -> Result<String, EngineError> {
        let index = self.store.load_vector_index(index_id).await?;
        if index.chunks.is_empty() {
            return Ok(EMPTY_DOCUMENT_SUMMARY.to_string());
        }
        self.first_page_in_french(&index).await
    }

    async fn first_page_in_french(&self, index: &VectorIndex) -> Result<String, EngineError> {
        // First page with any text: chunks are in document order.
        let first_page = match index.first_page() {
            Some(page) => page,
            None => return Ok(EMPTY_DOCUMENT_SUMMARY.to_string()),
        };

        let page_text = index
            .chunks
            .iter()
            .filter(|chunk| chunk.source_page == first_page)
            .map(|chunk| chunk.text.as_str())
            .collect::<Vec<_>>()
            .join("\n\n");

        let translated = self
            .with_retries(|| self.translator.translate(&page_text, "fr"))
            .await
            .map_err(|error| match error {
                failed @ EngineError::TranslationFailed(_) => failed,
                other => EngineError::TranslationFailed(other.to_string()),
            })?;

        self.summarize_text(&translated).await
    }

    async fn summarize_text(&self, text: &str) -> Result<String, EngineError> {
        let prompt = format!(
            "Write a concise, faithful summary of the following text, in the same \
             language as the text. Return only the summary.\n\n{text}"
        );

        let summary = self
            .with_retries(|| self.model.complete(&prompt))
            .await
            .map_err(|error| match error {
                failed @ EngineError::TranslationFailed(_) => failed,
                other => EngineError::SummarizationFailed(other.to_string()),
            })?;

        if summary.trim().is_empty() {
            return Err(EngineError::SummarizationFailed(
                "model returned an empty summary".to_string(),
            ));
        }

        Ok(summary)
    }

    /// Retry transient provider failures a bounded number of times;
    /// terminal failures surface immediately.
    async fn with_retries<T, F, Fut>(&self, mut operation: F) -> Result<T, EngineError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, EngineError>>,
    {
        let mut attempt = 1;
        loop {
            match operation().await {
                Ok(value) => return Ok(value),
                Err(error) if error.is_transient() && attempt < MAX_MODEL_ATTEMPTS => {
                    debug!(attempt, %error, "transient model failure, retrying");
                    attempt += 1;
                    tokio::time::sleep(RETRY_DELAY).await;
                }
                Err(error) => return Err(error),
            }
        }
    }
}
