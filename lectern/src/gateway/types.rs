//! Wire types of the conversation endpoint (camelCase JSON).

use serde::ser::SerializeStruct;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Value};

use crate::blueprint::Blueprint;
use crate::chat::ChatKind;
use crate::patch::PatchPlan;
use crate::resolver::ResolvedEntity;

/// One user turn arriving at the gateway. `blueprint` present means
/// follow-up mode; `teacher_id` is assumed verified upstream.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationRequest {
    pub message: String,
    #[serde(default)]
    pub conversation_id: Option<String>,
    pub teacher_id: String,
    #[serde(default)]
    pub context: Option<Map<String, Value>>,
    #[serde(default)]
    pub blueprint: Option<Blueprint>,
    #[serde(default)]
    pub page_context: Option<Value>,
    #[serde(default)]
    pub language: Option<String>,
}

/// Whether the turn entered a fresh pipeline or followed up on a page.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    Entry,
    Followup,
}

/// What the gateway did with the turn.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Chat,
    Build,
    Clarify,
    Refine,
    Rebuild,
}

/// One clickable clarify choice; `value` is echoed back into `context`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClarifyChoice {
    pub label: String,
    pub value: String,
}

/// Structured clarify payload. Empty `choices` with `allow_custom_input`
/// is legal (unknown-hint fallback).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClarifyOptions {
    /// What is being clarified, e.g. `class` or `assignment`.
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub question: Option<String>,
    #[serde(default)]
    pub choices: Vec<ClarifyChoice>,
    pub allow_custom_input: bool,
}

/// The gateway's reply. `legacyAction` appears on the wire but is computed
/// from `(mode, action, chat_kind)` at serialization time, never stored.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationResponse {
    pub mode: Mode,
    pub action: Action,
    #[serde(default)]
    pub chat_kind: Option<ChatKind>,
    #[serde(default)]
    pub chat_response: Option<String>,
    #[serde(default)]
    pub blueprint: Option<Blueprint>,
    #[serde(default)]
    pub patch_plan: Option<PatchPlan>,
    #[serde(default)]
    pub clarify_options: Option<ClarifyOptions>,
    pub conversation_id: String,
    #[serde(default)]
    pub resolved_entities: Option<Vec<ResolvedEntity>>,
}

impl ConversationResponse {
    /// Flat back-compat tag: a pure function of `(mode, action, chatKind)`.
    pub fn legacy_action(&self) -> &'static str {
        match (self.mode, self.action) {
            (_, Action::Clarify) => "clarify",
            (Mode::Entry, Action::Chat) => match self.chat_kind {
                Some(ChatKind::Qa) => "chat_qa",
                _ => "chat_smalltalk",
            },
            (Mode::Followup, Action::Chat) => "chat",
            (_, Action::Build) => "build_workflow",
            (_, Action::Refine) => "refine",
            (_, Action::Rebuild) => "rebuild",
        }
    }
}

impl Serialize for ConversationResponse {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut s = serializer.serialize_struct("ConversationResponse", 10)?;
        s.serialize_field("mode", &self.mode)?;
        s.serialize_field("action", &self.action)?;
        if let Some(ref v) = self.chat_kind {
            s.serialize_field("chatKind", v)?;
        }
        if let Some(ref v) = self.chat_response {
            s.serialize_field("chatResponse", v)?;
        }
        if let Some(ref v) = self.blueprint {
            s.serialize_field("blueprint", v)?;
        }
        if let Some(ref v) = self.patch_plan {
            s.serialize_field("patchPlan", v)?;
        }
        if let Some(ref v) = self.clarify_options {
            s.serialize_field("clarifyOptions", v)?;
        }
        s.serialize_field("conversationId", &self.conversation_id)?;
        if let Some(ref v) = self.resolved_entities {
            s.serialize_field("resolvedEntities", v)?;
        }
        s.serialize_field("legacyAction", self.legacy_action())?;
        s.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(mode: Mode, action: Action, chat_kind: Option<ChatKind>) -> ConversationResponse {
        ConversationResponse {
            mode,
            action,
            chat_kind,
            chat_response: None,
            blueprint: None,
            patch_plan: None,
            clarify_options: None,
            conversation_id: "conv-1".into(),
            resolved_entities: None,
        }
    }

    #[test]
    fn legacy_action_is_pure_in_the_tuple() {
        let cases = [
            (Mode::Entry, Action::Chat, Some(ChatKind::Smalltalk), "chat_smalltalk"),
            (Mode::Entry, Action::Chat, Some(ChatKind::Qa), "chat_qa"),
            (Mode::Entry, Action::Build, None, "build_workflow"),
            (Mode::Entry, Action::Clarify, None, "clarify"),
            (Mode::Followup, Action::Clarify, None, "clarify"),
            (Mode::Followup, Action::Chat, Some(ChatKind::Page), "chat"),
            (Mode::Followup, Action::Refine, None, "refine"),
            (Mode::Followup, Action::Rebuild, None, "rebuild"),
        ];
        for (mode, action, kind, expected) in cases {
            assert_eq!(response(mode, action, kind).legacy_action(), expected);
        }
    }

    #[test]
    fn legacy_action_is_on_the_wire_but_never_stored() {
        let r = response(Mode::Entry, Action::Chat, Some(ChatKind::Qa));
        let v = serde_json::to_value(&r).unwrap();
        assert_eq!(v["legacyAction"], "chat_qa");
        assert_eq!(v["mode"], "entry");
        // Round-trip ignores the computed field and preserves the rest.
        let back: ConversationResponse = serde_json::from_value(v).unwrap();
        assert_eq!(back, r);
    }

    #[test]
    fn request_accepts_minimal_payload() {
        let req: ConversationRequest = serde_json::from_value(serde_json::json!({
            "message": "hi",
            "teacherId": "t-1"
        }))
        .unwrap();
        assert!(req.conversation_id.is_none());
        assert!(req.blueprint.is_none());
    }
}
