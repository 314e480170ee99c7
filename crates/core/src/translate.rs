use crate::error::EngineError;
use crate::language::language_name;
use crate::llm::ChatModel;
use std::sync::Arc;

/// Stateless text translation over the chat model.
pub struct Translator<M: ChatModel> {
    model: Arc<M>,
}

impl<M: ChatModel> Translator<M> {
    pub fn new(model: Arc<M>) -> Self {
        Self { model }
    }

    /// Translate `text` into `target_language` (ISO 639-1 code).
    ///
    /// Empty input is terminal; provider errors propagate untouched so the
    /// caller can decide which ones deserve a retry.
    pub async fn translate(
        &self,
        text: &str,
        target_language: &str,
    ) -> Result<String, EngineError> {
        if text.trim().is_empty() {
            return Err(EngineError::TranslationFailed(
                "input text is empty".to_string(),
            ));
        }

        let prompt = format!(
            "Translate the following text into {}. Return only the translation, \
             with no commentary.\n\n{}",
            language_name(target_language),
            text
        );

        let translated = self.model.complete(&prompt).await?;
        if translated.trim().is_empty() {
            return Err(EngineError::TranslationFailed(
                "model returned an empty translation".to_string(),
            ));
        }

        Ok(translated)
    }
}

#[cfg(test)]
mod tests {
    use super::Translator;
    use crate::error::EngineError;
    use crate::llm::{ChatModel, TokenStream};
    use async_trait::async_trait;
    use std::sync::Arc;

    struct EchoModel;

    #[async_trait]
    impl ChatModel for EchoModel {
        async fn complete(&self, prompt: &str) -> Result<String, EngineError> {
            Ok(format!("echo: {prompt}"))
        }

        async fn stream(&self, prompt: &str) -> Result<TokenStream, EngineError> {
            let (sender, stream) = TokenStream::channel();
            let text = self.complete(prompt).await?;
            tokio::spawn(async move {
                let _ = sender.send(Ok(text)).await;
            });
            Ok(stream)
        }
    }

    #[tokio::test]
    async fn prompt_names_the_target_language() {
        let translator = Translator::new(Arc::new(EchoModel));
        let result = translator.translate("Good morning", "fr").await.unwrap();
        assert!(result.contains("into French"));
        assert!(result.contains("Good morning"));
    }

    #[tokio::test]
    async fn empty_input_is_a_terminal_failure() {
        let translator = Translator::new(Arc::new(EchoModel));
        let result = translator.translate("   ", "fr").await;
        assert!(matches!(result, Err(EngineError::TranslationFailed(_))));
    }
}
