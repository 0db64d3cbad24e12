//! LLM client abstraction shared by the router, planner, and chat agents.
//!
//! Every LLM-backed component depends on a callable that turns messages into
//! assistant text; this module defines the trait and its implementations.
//!
//! # Streaming
//!
//! The trait supports streaming via `invoke_stream()`, which accepts an
//! optional `Sender<MessageChunk>` for emitting tokens as they arrive.
//! `ChatOpenAI` streams for real; `MockLlm` uses the default implementation
//! that calls `invoke()` and sends the full content as one chunk.

mod mock;
mod openai;

pub use mock::MockLlm;
pub use openai::ChatOpenAI;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::message::Message;

/// Errors from an LLM call.
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("LLM request build failed: {0}")]
    RequestBuild(String),
    #[error("LLM provider error: {0}")]
    Provider(String),
    #[error("LLM returned no choices")]
    Empty,
}

/// Token usage for one LLM call (prompt + completion).
#[derive(Clone, Debug, Default, serde::Serialize, serde::Deserialize)]
pub struct LlmUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// One chunk of streamed assistant content.
#[derive(Clone, Debug)]
pub struct MessageChunk {
    pub content: String,
}

/// Response from an LLM completion: assistant text plus optional usage.
pub struct LlmResponse {
    pub content: String,
    /// Token usage when the provider returns it; logged per call.
    pub usage: Option<LlmUsage>,
}

/// LLM client: given messages, returns assistant text.
///
/// **Interaction**: used by [`Router`](crate::router::Router),
/// [`Planner`](crate::planner::Planner), [`ChatAgent`](crate::chat::ChatAgent)
/// and the executor's compose phase.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Invoke one turn: read messages, return the assistant content.
    async fn invoke(&self, messages: &[Message]) -> Result<LlmResponse, LlmError>;

    /// Streaming variant: when `chunk_tx` is `Some`, implementations send
    /// `MessageChunk` tokens through the channel as they arrive, and still
    /// return the complete response at the end.
    async fn invoke_stream(
        &self,
        messages: &[Message],
        chunk_tx: Option<mpsc::Sender<MessageChunk>>,
    ) -> Result<LlmResponse, LlmError> {
        let response = self.invoke(messages).await?;
        if let Some(tx) = chunk_tx {
            if !response.content.is_empty() {
                let _ = tx
                    .send(MessageChunk {
                        content: response.content.clone(),
                    })
                    .await;
            }
        }
        Ok(response)
    }
}
