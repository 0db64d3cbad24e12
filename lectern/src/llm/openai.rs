//! OpenAI Chat Completions client implementing [`LlmClient`].
//!
//! Uses the Chat Completions API via `async_openai`. Requires
//! `OPENAI_API_KEY` (or explicit config); honors `OPENAI_BASE_URL` /
//! `OPENAI_API_BASE` for proxy deployments.
//!
//! # Streaming
//!
//! `invoke_stream()` uses `create_stream` and forwards each
//! `choices[0].delta.content` through the chunk channel as it arrives.

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_stream::StreamExt;
use tracing::{debug, trace};

use async_openai::{
    config::OpenAIConfig,
    types::chat::{
        ChatCompletionRequestMessage, ChatCompletionRequestSystemMessage,
        ChatCompletionRequestUserMessage, CreateChatCompletionRequestArgs,
    },
    Client,
};

use crate::llm::{LlmClient, LlmError, LlmResponse, LlmUsage, MessageChunk};
use crate::message::Message;

/// OpenAI Chat Completions client.
///
/// Build with [`ChatOpenAI::new`] (API key from `OPENAI_API_KEY`) or
/// [`ChatOpenAI::with_config`] for a custom key / base URL.
pub struct ChatOpenAI {
    client: Client<OpenAIConfig>,
    model: String,
    temperature: Option<f32>,
}

impl ChatOpenAI {
    /// Build client with default config (API key from `OPENAI_API_KEY` env).
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            model: model.into(),
            temperature: None,
        }
    }

    /// Build client with custom config (e.g. custom API key or base URL).
    pub fn with_config(config: OpenAIConfig, model: impl Into<String>) -> Self {
        Self {
            client: Client::with_config(config),
            model: model.into(),
            temperature: None,
        }
    }

    /// Set temperature (0-2). Lower values are more deterministic; the JSON
    /// agents (router, planner) run at 0.1.
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    fn messages_to_request(messages: &[Message]) -> Vec<ChatCompletionRequestMessage> {
        messages
            .iter()
            .map(|m| match m {
                Message::System(s) => ChatCompletionRequestMessage::System(
                    ChatCompletionRequestSystemMessage::from(s.as_str()),
                ),
                Message::User(s) => ChatCompletionRequestMessage::User(
                    ChatCompletionRequestUserMessage::from(s.as_str()),
                ),
                Message::Assistant(s) => {
                    ChatCompletionRequestMessage::Assistant((s.as_str()).into())
                }
            })
            .collect()
    }
}

#[async_trait]
impl LlmClient for ChatOpenAI {
    async fn invoke(&self, messages: &[Message]) -> Result<LlmResponse, LlmError> {
        let mut args = CreateChatCompletionRequestArgs::default();
        args.model(self.model.clone());
        args.messages(Self::messages_to_request(messages));
        if let Some(t) = self.temperature {
            args.temperature(t);
        }
        let request = args
            .build()
            .map_err(|e| LlmError::RequestBuild(e.to_string()))?;

        debug!(
            model = %self.model,
            message_count = messages.len(),
            temperature = ?self.temperature,
            "chat create"
        );

        let response = self
            .client
            .chat()
            .create(request)
            .await
            .map_err(|e| LlmError::Provider(e.to_string()))?;

        let usage = response.usage.map(|u| LlmUsage {
            prompt_tokens: u.prompt_tokens,
            completion_tokens: u.completion_tokens,
            total_tokens: u.total_tokens,
        });
        if let Some(ref u) = usage {
            trace!(prompt = u.prompt_tokens, completion = u.completion_tokens, "chat usage");
        }

        let choice = response.choices.into_iter().next().ok_or(LlmError::Empty)?;
        Ok(LlmResponse {
            content: choice.message.content.unwrap_or_default(),
            usage,
        })
    }

    async fn invoke_stream(
        &self,
        messages: &[Message],
        chunk_tx: Option<mpsc::Sender<MessageChunk>>,
    ) -> Result<LlmResponse, LlmError> {
        let Some(chunk_tx) = chunk_tx else {
            return self.invoke(messages).await;
        };

        let mut args = CreateChatCompletionRequestArgs::default();
        args.model(self.model.clone());
        args.messages(Self::messages_to_request(messages));
        args.stream(true);
        if let Some(t) = self.temperature {
            args.temperature(t);
        }
        let request = args
            .build()
            .map_err(|e| LlmError::RequestBuild(e.to_string()))?;

        debug!(
            model = %self.model,
            message_count = messages.len(),
            stream = true,
            "chat create_stream"
        );

        let mut stream = self
            .client
            .chat()
            .create_stream(request)
            .await
            .map_err(|e| LlmError::Provider(e.to_string()))?;

        let mut full_content = String::new();
        let mut usage: Option<LlmUsage> = None;

        while let Some(result) = stream.next().await {
            let response = result.map_err(|e| LlmError::Provider(e.to_string()))?;
            if let Some(ref u) = response.usage {
                usage = Some(LlmUsage {
                    prompt_tokens: u.prompt_tokens,
                    completion_tokens: u.completion_tokens,
                    total_tokens: u.total_tokens,
                });
            }
            for choice in response.choices {
                if let Some(ref content) = choice.delta.content {
                    if !content.is_empty() {
                        full_content.push_str(content);
                        // Ignore send errors: a dropped receiver only means the
                        // consumer went away; the full response is still returned.
                        let _ = chunk_tx
                            .send(MessageChunk {
                                content: content.clone(),
                            })
                            .await;
                    }
                }
            }
        }

        Ok(LlmResponse {
            content: full_content,
            usage,
        })
    }
}
