use crate::error::EngineError;
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use serde_json::{json, Value};
use tokio::sync::mpsc;

const TOKEN_CHANNEL_CAPACITY: usize = 32;

/// A lazy, finite sequence of response tokens.
///
/// Pull-based: the producer task blocks once the channel is full, so a
/// caller that stops consuming (or drops the stream) stops the producer on
/// its next send. Once consumed there is no rewind; a new answer needs a
/// new call.
pub struct TokenStream {
    receiver: mpsc::Receiver<Result<String, EngineError>>,
}

impl TokenStream {
    pub fn channel() -> (mpsc::Sender<Result<String, EngineError>>, Self) {
        let (sender, receiver) = mpsc::channel(TOKEN_CHANNEL_CAPACITY);
        (sender, Self { receiver })
    }

    /// Next token, or `None` once the stream is exhausted.
    pub async fn next_token(&mut self) -> Option<Result<String, EngineError>> {
        self.receiver.recv().await
    }

    /// Drain the stream and concatenate its tokens.
    pub async fn collect_text(mut self) -> Result<String, EngineError> {
        let mut text = String::new();
        while let Some(token) = self.next_token().await {
            text.push_str(&token?);
        }
        Ok(text)
    }
}

#[async_trait]
pub trait ChatModel: Send + Sync {
    /// One-shot completion for a prompt.
    async fn complete(&self, prompt: &str) -> Result<String, EngineError>;

    /// Streaming completion. Implementations must fail before returning the
    /// stream when the provider is unreachable, so callers never observe a
    /// partial stream for a request that could not start.
    async fn stream(&self, prompt: &str) -> Result<TokenStream, EngineError>;
}

#[derive(Debug, Clone)]
pub struct ChatModelConfig {
    pub endpoint: String,
    pub api_key: Option<String>,
    pub model: String,
}

impl ChatModelConfig {
    /// Read the model endpoint from the environment, `None` when unset.
    pub fn from_env() -> Option<Self> {
        let endpoint = std::env::var("CHAT_MODEL_ENDPOINT").ok()?;
        let endpoint = endpoint.trim().trim_end_matches('/').to_string();
        if endpoint.is_empty() {
            return None;
        }

        let api_key = std::env::var("CHAT_MODEL_API_KEY").ok().and_then(|value| {
            let key = value.trim().to_string();
            if key.is_empty() {
                None
            } else {
                Some(key)
            }
        });

        let model = std::env::var("CHAT_MODEL_NAME")
            .ok()
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| "mistral-small".to_string());

        Some(Self {
            endpoint,
            api_key,
            model,
        })
    }
}

/// Chat model behind any OpenAI-compatible `/v1/chat/completions` endpoint.
pub struct OpenAiCompatModel {
    client: Client,
    config: ChatModelConfig,
}

impl OpenAiCompatModel {
    pub fn new(config: ChatModelConfig) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }

    fn request_body(&self, prompt: &str, stream: bool) -> Value {
        json!({
            "model": self.config.model,
            "messages": [{ "role": "user", "content": prompt }],
            "stream": stream,
        })
    }

    fn completions_url(&self) -> String {
        format!("{}/v1/chat/completions", self.config.endpoint)
    }

    async fn send(&self, prompt: &str, stream: bool) -> Result<reqwest::Response, EngineError> {
        let mut request = self
            .client
            .post(self.completions_url())
            .json(&self.request_body(prompt, stream));

        if let Some(api_key) = &self.config.api_key {
            request = request.bearer_auth(api_key);
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(EngineError::GenerationFailed(format!(
                "chat endpoint returned {}",
                response.status()
            )));
        }

        Ok(response)
    }
}

#[async_trait]
impl ChatModel for OpenAiCompatModel {
    async fn complete(&self, prompt: &str) -> Result<String, EngineError> {
        let response = self.send(prompt, false).await?;
        let payload: Value = response.json().await?;

        payload
            .pointer("/choices/0/message/content")
            .and_then(Value::as_str)
            .map(|content| content.to_string())
            .ok_or_else(|| {
                EngineError::GenerationFailed("response carried no message content".to_string())
            })
    }

    async fn stream(&self, prompt: &str) -> Result<TokenStream, EngineError> {
        let response = self.send(prompt, true).await?;
        let (sender, tokens) = TokenStream::channel();

        tokio::spawn(async move {
            let mut bytes = response.bytes_stream();
            let mut pending = String::new();

            while let Some(piece) = bytes.next().await {
                let piece = match piece {
                    Ok(piece) => piece,
                    Err(error) => {
                        let _ = sender.send(Err(EngineError::Http(error))).await;
                        return;
                    }
                };

                pending.push_str(&String::from_utf8_lossy(&piece));
                while let Some(position) = pending.find('\n') {
                    let line = pending[..position].to_string();
                    pending.drain(..=position);

                    match parse_stream_line(&line) {
                        Some(StreamEvent::Token(token)) => {
                            if sender.send(Ok(token)).await.is_err() {
                                // Consumer dropped the stream; stop pulling
                                // from the provider.
                                return;
                            }
                        }
                        Some(StreamEvent::Done) => return,
                        None => {}
                    }
                }
            }
        });

        Ok(tokens)
    }
}

enum StreamEvent {
    Token(String),
    Done,
}

/// Parse one server-sent-events line from a streaming completions response.
fn parse_stream_line(line: &str) -> Option<StreamEvent> {
    let payload = line.trim().strip_prefix("data:")?.trim();
    if payload == "[DONE]" {
        return Some(StreamEvent::Done);
    }

    let value: Value = serde_json::from_str(payload).ok()?;
    value
        .pointer("/choices/0/delta/content")
        .and_then(Value::as_str)
        .filter(|content| !content.is_empty())
        .map(|content| StreamEvent::Token(content.to_string()))
}

#[cfg(test)]
mod tests {
    use super::{parse_stream_line, ChatModelConfig, StreamEvent, TokenStream};

    #[test]
    fn chat_model_config_comes_from_the_environment() {
        std::env::set_var("CHAT_MODEL_ENDPOINT", "http://model-host:8000/");
        std::env::set_var("CHAT_MODEL_API_KEY", "   ");
        std::env::remove_var("CHAT_MODEL_NAME");

        let config = ChatModelConfig::from_env().expect("endpoint is set");
        assert_eq!(config.endpoint, "http://model-host:8000");
        // Blank keys count as unset.
        assert!(config.api_key.is_none());
        assert_eq!(config.model, "mistral-small");

        std::env::remove_var("CHAT_MODEL_ENDPOINT");
        assert!(ChatModelConfig::from_env().is_none());
    }

    #[test]
    fn stream_lines_yield_delta_content() {
        let line = r#"data: {"choices":[{"delta":{"content":"Bon"}}]}"#;
        match parse_stream_line(line) {
            Some(StreamEvent::Token(token)) => assert_eq!(token, "Bon"),
            _ => panic!("expected a token"),
        }
    }

    #[test]
    fn done_marker_terminates_the_stream() {
        assert!(matches!(
            parse_stream_line("data: [DONE]"),
            Some(StreamEvent::Done)
        ));
    }

    #[test]
    fn non_data_lines_are_ignored() {
        assert!(parse_stream_line("").is_none());
        assert!(parse_stream_line(": keep-alive").is_none());
        assert!(parse_stream_line(r#"data: {"choices":[{"delta":{}}]}"#).is_none());
    }

    #[tokio::test]
    async fn collected_tokens_reproduce_the_full_text() {
        let (sender, stream) = TokenStream::channel();
        tokio::spawn(async move {
            for token in ["La ", "réponse ", "complète."] {
                if sender.send(Ok(token.to_string())).await.is_err() {
                    return;
                }
            }
        });

        let text = stream.collect_text().await.unwrap();
        assert_eq!(text, "La réponse complète.");
    }

    #[tokio::test]
    async fn stream_is_consumed_incrementally_and_ends() {
        let (sender, mut stream) = TokenStream::channel();
        tokio::spawn(async move {
            let _ = sender.send(Ok("only".to_string())).await;
        });

        let first = stream.next_token().await;
        assert_eq!(first.unwrap().unwrap(), "only");
        assert!(stream.next_token().await.is_none());
    }
}
