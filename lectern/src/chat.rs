//! Small chat agent for smalltalk, general QA, and page-context QA.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::llm::{LlmClient, LlmError};
use crate::message::Message;
use crate::prompts::ChatPrompts;
use crate::session::{history_text, Turn};

/// Which conversational register to answer in.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatKind {
    Smalltalk,
    Qa,
    Page,
}

/// Plain-text chat over the LLM; no tools, no page mutation.
pub struct ChatAgent {
    llm: Arc<dyn LlmClient>,
    prompts: ChatPrompts,
}

impl ChatAgent {
    pub fn new(llm: Arc<dyn LlmClient>, prompts: ChatPrompts) -> Self {
        Self { llm, prompts }
    }

    /// Answers one message. For [`ChatKind::Page`], the current page JSON is
    /// embedded in the prompt as grounding context.
    pub async fn respond(
        &self,
        kind: ChatKind,
        message: &str,
        history: &[Turn],
        page_context: Option<&Value>,
    ) -> Result<String, LlmError> {
        let system = match kind {
            ChatKind::Smalltalk => self.prompts.smalltalk_system.clone(),
            ChatKind::Qa => self.prompts.qa_system.clone(),
            ChatKind::Page => {
                let page = page_context
                    .map(|p| serde_json::to_string(p).unwrap_or_default())
                    .unwrap_or_default();
                format!("{}\n\nCurrent page:\n{}", self.prompts.page_system, page)
            }
        };

        let mut messages = vec![Message::system(system)];
        if !history.is_empty() {
            messages.push(Message::user(format!(
                "Conversation so far:\n{}",
                history_text(history)
            )));
        }
        messages.push(Message::user(message.to_string()));

        let response = self.llm.invoke(&messages).await?;
        Ok(response.content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::MockLlm;
    use crate::prompts::PromptSet;

    #[tokio::test]
    async fn responds_with_llm_text() {
        let agent = ChatAgent::new(
            Arc::new(MockLlm::new("Hello! Ready to analyze a class?")),
            PromptSet::load(None).unwrap().chat,
        );
        let out = agent
            .respond(ChatKind::Smalltalk, "hi", &[], None)
            .await
            .unwrap();
        assert!(out.contains("Hello"));
    }
}
