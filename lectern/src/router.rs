//! Intent classification: an LLM classifier plus a deterministic confidence
//! ladder applied to its output (never by the LLM itself).

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::warn;

use crate::jsontext::parse_json_lenient;
use crate::llm::LlmClient;
use crate::message::Message;
use crate::prompts::RouterPrompts;
use crate::session::{history_text, Turn};

/// Classified intent. The first four are initial-mode; `chat`, `refine`, and
/// `rebuild` are follow-up-mode. `generate_questions` only appears when
/// content intents are enabled.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    ChatSmalltalk,
    ChatQa,
    BuildWorkflow,
    Clarify,
    GenerateQuestions,
    Chat,
    Refine,
    Rebuild,
}

impl Intent {
    /// Actionable intents trigger planning or page mutation; the ladder may
    /// rewrite them downward.
    pub fn is_actionable(&self) -> bool {
        matches!(
            self,
            Intent::BuildWorkflow | Intent::GenerateQuestions | Intent::Refine | Intent::Rebuild
        )
    }

    pub fn is_chat(&self) -> bool {
        matches!(self, Intent::ChatSmalltalk | Intent::ChatQa | Intent::Chat)
    }
}

/// What a clarify needs from the user. Unknown hints from the LLM collapse
/// to [`RouteHint::Unknown`] instead of failing the whole classification.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum RouteHint {
    NeedClassId,
    NeedTimeRange,
    NeedAssignment,
    NeedSubject,
    Unknown,
}

impl<'de> serde::Deserialize<'de> for RouteHint {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let tag = String::deserialize(deserializer)?;
        Ok(match tag.as_str() {
            "needClassId" => RouteHint::NeedClassId,
            "needTimeRange" => RouteHint::NeedTimeRange,
            "needAssignment" => RouteHint::NeedAssignment,
            "needSubject" => RouteHint::NeedSubject,
            _ => RouteHint::Unknown,
        })
    }
}

/// How far a follow-up edit reaches.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefineScope {
    PatchLayout,
    PatchCompose,
    FullRebuild,
}

/// Downstream executor family derived from the intent: plain chat, the
/// planner/executor pipeline, the QA agent, or a content-generation skill.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RoutePath {
    Chat,
    Blueprint,
    Agent,
    Skill,
}

/// The classifier's output, post-ladder.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouterResult {
    pub intent: Intent,
    pub confidence: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clarifying_question: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub route_hint: Option<RouteHint>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refine_scope: Option<RefineScope>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extracted_params: Option<Map<String, Value>>,
}

impl RouterResult {
    /// Deterministic fallback when the router LLM fails or returns garbage.
    pub fn fallback_clarify() -> Self {
        Self {
            intent: Intent::Clarify,
            confidence: 1.0,
            clarifying_question: Some(
                "I didn't quite catch that — could you rephrase?".to_string(),
            ),
            route_hint: None,
            refine_scope: None,
            extracted_params: None,
        }
    }

    /// The downstream path the gateway dispatches on. QA questions run on
    /// the grounded QA agent; smalltalk and clarify stay on plain chat.
    pub fn path(&self) -> RoutePath {
        match self.intent {
            Intent::ChatSmalltalk | Intent::Chat | Intent::Clarify => RoutePath::Chat,
            Intent::ChatQa => RoutePath::Agent,
            Intent::BuildWorkflow | Intent::Refine | Intent::Rebuild => RoutePath::Blueprint,
            Intent::GenerateQuestions => RoutePath::Skill,
        }
    }
}

/// Applies the confidence ladder to a raw classification:
/// `>= high` keeps the intent; `[low, high)` rewrites actionable intents to
/// clarify (preserving the LLM's clarifying question); `< low` rewrites
/// actionable intents down to smalltalk. Chat intents always pass through.
pub fn apply_confidence_ladder(mut result: RouterResult, high: f64, low: f64) -> RouterResult {
    if result.confidence >= high || !result.intent.is_actionable() {
        return result;
    }
    if result.confidence >= low {
        result.intent = Intent::Clarify;
        if result.clarifying_question.is_none() {
            result.clarifying_question =
                Some("Could you tell me which class or assignment to analyze?".to_string());
        }
    } else {
        result.intent = Intent::ChatSmalltalk;
    }
    result
}

/// LLM-backed classifier with initial-mode and follow-up-mode prompts.
pub struct Router {
    llm: Arc<dyn LlmClient>,
    prompts: RouterPrompts,
    enable_content_intents: bool,
    /// History turns included in the classification context.
    history_limit: usize,
}

impl Router {
    pub fn new(llm: Arc<dyn LlmClient>, prompts: RouterPrompts, enable_content_intents: bool) -> Self {
        Self {
            llm,
            prompts,
            enable_content_intents,
            history_limit: 8,
        }
    }

    /// Classifies one message. `followup` selects the follow-up prompt (a
    /// blueprint is attached to the request). Never errors: router failures
    /// degrade to the deterministic fallback clarify.
    pub async fn classify(&self, message: &str, history: &[Turn], followup: bool) -> RouterResult {
        let system = if followup {
            self.prompts.followup_system.clone()
        } else {
            let extra = if self.enable_content_intents {
                self.prompts.content_intents_extra.as_str()
            } else {
                ""
            };
            self.prompts.initial_system.replace("{content_intents}", extra)
        };

        let tail_start = history.len().saturating_sub(self.history_limit);
        let history = history_text(&history[tail_start..]);
        let user = if history.is_empty() {
            format!("Message: {message}")
        } else {
            format!("Conversation so far:\n{history}\n\nMessage: {message}")
        };

        let messages = [Message::system(system), Message::user(user)];
        let response = match self.llm.invoke(&messages).await {
            Ok(r) => r,
            Err(e) => {
                warn!(error = %e, "router LLM failed, falling back to clarify");
                return RouterResult::fallback_clarify();
            }
        };

        match parse_json_lenient(&response.content)
            .and_then(|v| serde_json::from_value::<RouterResult>(v).ok())
        {
            Some(result) => result.clamped(),
            None => {
                warn!("router returned unparsable output, falling back to clarify");
                RouterResult::fallback_clarify()
            }
        }
    }
}

impl RouterResult {
    fn clamped(mut self) -> Self {
        self.confidence = self.confidence.clamp(0.0, 1.0);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::MockLlm;

    fn result(intent: Intent, confidence: f64) -> RouterResult {
        RouterResult {
            intent,
            confidence,
            clarifying_question: None,
            route_hint: None,
            refine_scope: None,
            extracted_params: None,
        }
    }

    #[test]
    fn high_confidence_keeps_the_intent() {
        let out = apply_confidence_ladder(result(Intent::BuildWorkflow, 0.9), 0.7, 0.4);
        assert_eq!(out.intent, Intent::BuildWorkflow);
    }

    #[test]
    fn mid_confidence_rewrites_actionable_to_clarify() {
        let out = apply_confidence_ladder(result(Intent::BuildWorkflow, 0.55), 0.7, 0.4);
        assert_eq!(out.intent, Intent::Clarify);
        assert!(out.clarifying_question.is_some());
    }

    #[test]
    fn mid_confidence_preserves_the_llm_question() {
        let mut r = result(Intent::Refine, 0.5);
        r.clarifying_question = Some("Which block?".into());
        let out = apply_confidence_ladder(r, 0.7, 0.4);
        assert_eq!(out.intent, Intent::Clarify);
        assert_eq!(out.clarifying_question.as_deref(), Some("Which block?"));
    }

    #[test]
    fn mid_confidence_chat_qa_passes_through() {
        let out = apply_confidence_ladder(result(Intent::ChatQa, 0.5), 0.7, 0.4);
        assert_eq!(out.intent, Intent::ChatQa);
    }

    #[test]
    fn low_confidence_drops_actionable_to_smalltalk() {
        let out = apply_confidence_ladder(result(Intent::Rebuild, 0.2), 0.7, 0.4);
        assert_eq!(out.intent, Intent::ChatSmalltalk);
        let chat = apply_confidence_ladder(result(Intent::ChatSmalltalk, 0.1), 0.7, 0.4);
        assert_eq!(chat.intent, Intent::ChatSmalltalk);
    }

    #[test]
    fn boundary_values_follow_the_spec() {
        assert_eq!(
            apply_confidence_ladder(result(Intent::BuildWorkflow, 0.7), 0.7, 0.4).intent,
            Intent::BuildWorkflow
        );
        assert_eq!(
            apply_confidence_ladder(result(Intent::BuildWorkflow, 0.4), 0.7, 0.4).intent,
            Intent::Clarify
        );
        assert_eq!(
            apply_confidence_ladder(result(Intent::BuildWorkflow, 0.39), 0.7, 0.4).intent,
            Intent::ChatSmalltalk
        );
    }

    #[test]
    fn path_derivation() {
        assert_eq!(result(Intent::ChatSmalltalk, 1.0).path(), RoutePath::Chat);
        assert_eq!(result(Intent::Clarify, 1.0).path(), RoutePath::Chat);
        assert_eq!(result(Intent::ChatQa, 1.0).path(), RoutePath::Agent);
        assert_eq!(result(Intent::BuildWorkflow, 1.0).path(), RoutePath::Blueprint);
        assert_eq!(result(Intent::Refine, 1.0).path(), RoutePath::Blueprint);
        assert_eq!(
            result(Intent::GenerateQuestions, 1.0).path(),
            RoutePath::Skill
        );
    }

    #[tokio::test]
    async fn classify_parses_fenced_llm_output() {
        let llm = Arc::new(MockLlm::new(
            "```json\n{\"intent\": \"build_workflow\", \"confidence\": 0.92}\n```",
        ));
        let prompts = crate::prompts::PromptSet::load(None).unwrap().router;
        let router = Router::new(llm, prompts, false);
        let out = router.classify("analyze Form 1A", &[], false).await;
        assert_eq!(out.intent, Intent::BuildWorkflow);
        assert!((out.confidence - 0.92).abs() < 1e-9);
    }

    #[tokio::test]
    async fn classify_degrades_to_clarify_on_garbage() {
        let llm = Arc::new(MockLlm::new("sorry, I cannot do that"));
        let prompts = crate::prompts::PromptSet::load(None).unwrap().router;
        let router = Router::new(llm, prompts, false);
        let out = router.classify("???", &[], false).await;
        assert_eq!(out.intent, Intent::Clarify);
        assert!(out.clarifying_question.is_some());
    }

    #[test]
    fn unknown_route_hint_collapses_instead_of_failing() {
        let v: RouterResult = serde_json::from_value(serde_json::json!({
            "intent": "clarify",
            "confidence": 0.8,
            "routeHint": "needSomethingNew"
        }))
        .unwrap();
        assert_eq!(v.route_hint, Some(RouteHint::Unknown));
    }

    #[test]
    fn router_result_deserializes_camel_case() {
        let v: RouterResult = serde_json::from_value(serde_json::json!({
            "intent": "refine",
            "confidence": 0.8,
            "refineScope": "patch_compose"
        }))
        .unwrap();
        assert_eq!(v.intent, Intent::Refine);
        assert_eq!(v.refine_scope, Some(RefineScope::PatchCompose));
    }
}
