//! Scripted LLM for tests and for running without an API key.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::llm::{LlmClient, LlmError, LlmResponse};
use crate::message::Message;

/// Mock LLM that replays a scripted queue of responses, then repeats a
/// default. Thread-safe; clones of the queue are not shared.
///
/// **Interaction**: stands in for [`ChatOpenAI`](crate::llm::ChatOpenAI) in
/// unit and integration tests, and at runtime when no API key is configured.
pub struct MockLlm {
    scripted: Mutex<VecDeque<String>>,
    default: String,
}

impl MockLlm {
    /// Mock that always answers `default`.
    pub fn new(default: impl Into<String>) -> Self {
        Self {
            scripted: Mutex::new(VecDeque::new()),
            default: default.into(),
        }
    }

    /// Mock that answers the scripted responses in order, then `default`.
    pub fn scripted<I, S>(responses: I, default: impl Into<String>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            scripted: Mutex::new(responses.into_iter().map(Into::into).collect()),
            default: default.into(),
        }
    }

    /// Appends one more scripted response.
    pub fn push(&self, response: impl Into<String>) {
        if let Ok(mut q) = self.scripted.lock() {
            q.push_back(response.into());
        }
    }
}

#[async_trait]
impl LlmClient for MockLlm {
    async fn invoke(&self, _messages: &[Message]) -> Result<LlmResponse, LlmError> {
        let content = self
            .scripted
            .lock()
            .ok()
            .and_then(|mut q| q.pop_front())
            .unwrap_or_else(|| self.default.clone());
        Ok(LlmResponse {
            content,
            usage: None,
        })
    }
}
