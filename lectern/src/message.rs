//! Chat messages exchanged with an LLM (system / user / assistant text).

use serde::{Deserialize, Serialize};

/// One message in an LLM conversation.
///
/// **Interaction**: built by the router, planner, and chat agents; consumed by
/// [`LlmClient`](crate::llm::LlmClient) implementations.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "role", content = "content", rename_all = "snake_case")]
pub enum Message {
    System(String),
    User(String),
    Assistant(String),
}

impl Message {
    pub fn system(s: impl Into<String>) -> Self {
        Message::System(s.into())
    }

    pub fn user(s: impl Into<String>) -> Self {
        Message::User(s.into())
    }

    pub fn assistant(s: impl Into<String>) -> Self {
        Message::Assistant(s.into())
    }

    /// The text content, whatever the role.
    pub fn content(&self) -> &str {
        match self {
            Message::System(s) | Message::User(s) | Message::Assistant(s) => s,
        }
    }
}
