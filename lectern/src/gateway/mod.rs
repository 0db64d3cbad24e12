//! Conversation gateway: the entry dispatcher for every user turn.
//!
//! Loads or creates the session, classifies the message (router + confidence
//! ladder), resolves referenced entities, and dispatches to chat, clarify,
//! or planning. The per-session lock is held for the whole read-modify-write
//! turn; streaming execution happens on a separate endpoint and never takes
//! it.

mod types;

pub use types::{
    Action, ClarifyChoice, ClarifyOptions, ConversationRequest, ConversationResponse, Mode,
};

use std::sync::Arc;

use serde_json::{json, Map, Value};
use thiserror::Error;
use tracing::warn;

use crate::blueprint::Blueprint;
use crate::chat::{ChatAgent, ChatKind};
use crate::llm::LlmError;
use crate::planner::{PatchAgent, PlanError, Planner};
use crate::resolver::{EntityResolver, EntityType, ResolveResult, ScopeMode};
use crate::router::{apply_confidence_ladder, Intent, RefineScope, Router, RouterResult};
use crate::session::{SessionStore, Turn};
use crate::settings::Settings;
use crate::tools::{is_error_sentinel, ToolRegistry, TOOL_GET_TEACHER_CLASSES};

/// Grade expansion beyond this many classes downgrades to a clarify instead
/// of planning a fan-out blueprint.
const FANOUT_CAP: usize = 8;

/// History turns handed to the router and chat agents.
const HISTORY_LIMIT: usize = 8;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error(transparent)]
    Llm(#[from] LlmError),
    #[error(transparent)]
    Plan(#[from] PlanError),
}

/// Deixis that marks a message as referring to the previous artifact.
const REFERENTIAL_MARKERS: [&str; 8] = [
    "this page", "the page", "that page", "it ", " it", "这个", "它", "那个",
];

fn is_referential(message: &str) -> bool {
    let lower = message.to_lowercase();
    REFERENTIAL_MARKERS.iter().any(|m| lower.contains(m))
}

fn intent_tag(intent: Intent) -> &'static str {
    match intent {
        Intent::ChatSmalltalk => "chat_smalltalk",
        Intent::ChatQa => "chat_qa",
        Intent::BuildWorkflow => "build_workflow",
        Intent::Clarify => "clarify",
        Intent::GenerateQuestions => "generate_questions",
        Intent::Chat => "chat",
        Intent::Refine => "refine",
        Intent::Rebuild => "rebuild",
    }
}

fn action_tag(action: Action) -> &'static str {
    match action {
        Action::Chat => "chat",
        Action::Build => "build",
        Action::Clarify => "clarify",
        Action::Refine => "refine",
        Action::Rebuild => "rebuild",
    }
}

/// Entry dispatcher combining session, router, resolver, planner, patch
/// agent, and the chat agent.
pub struct Gateway {
    router: Router,
    resolver: EntityResolver,
    planner: Arc<Planner>,
    patch_agent: PatchAgent,
    chat: ChatAgent,
    sessions: Arc<SessionStore>,
    registry: Arc<ToolRegistry>,
    settings: Arc<Settings>,
}

/// What one dispatch branch produced, before persistence.
struct Outcome {
    response: ConversationResponse,
    /// Assistant-turn text recorded into the session history.
    summary: String,
    /// Context keys persisted into the accumulated context.
    persist_ctx: Map<String, Value>,
    /// Pending prompt recorded when the turn ended in a clarify.
    pending_prompt: Option<String>,
}

impl Gateway {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        router: Router,
        resolver: EntityResolver,
        planner: Arc<Planner>,
        patch_agent: PatchAgent,
        chat: ChatAgent,
        sessions: Arc<SessionStore>,
        registry: Arc<ToolRegistry>,
        settings: Arc<Settings>,
    ) -> Self {
        Self {
            router,
            resolver,
            planner,
            patch_agent,
            chat,
            sessions,
            registry,
            settings,
        }
    }

    pub fn sessions(&self) -> &Arc<SessionStore> {
        &self.sessions
    }

    /// Handles one conversation turn end to end.
    pub async fn handle(
        &self,
        req: ConversationRequest,
    ) -> Result<ConversationResponse, GatewayError> {
        let (conversation_id, session) = self.sessions.get_or_create(req.conversation_id.as_deref());
        let mut session = session.lock().await;

        let request_ctx = req.context.clone().unwrap_or_default();
        let mut ctx = session.accumulated_context.clone();
        for (k, v) in &request_ctx {
            ctx.insert(k.clone(), v.clone());
        }

        let history = session.history_tail(HISTORY_LIMIT).to_vec();
        let followup = req.blueprint.is_some();
        let language = req.language.clone().unwrap_or_else(|| "the user's language".into());

        let routed = apply_confidence_ladder(
            self.router.classify(&req.message, &history, followup).await,
            self.settings.router_confidence_high,
            self.settings.router_confidence_low,
        );

        // Clarify multi-turn loop: a short reply (or an echoed choice value)
        // after a clarify lifts the turn back into the original build.
        let was_clarify = session.last_action.as_deref() == Some("clarify");
        let pending = session.pending_prompt.clone();
        let lift = !followup
            && was_clarify
            && pending.is_some()
            && routed.intent != Intent::ChatQa
            && (req.message.chars().count() <= 24
                || request_ctx.contains_key("classId")
                || routed.intent == Intent::BuildWorkflow);

        let outcome = if followup {
            self.dispatch_followup(&req, &routed, &history, &conversation_id)
                .await?
        } else if lift {
            let base = pending.unwrap_or_else(|| req.message.clone());
            let resolution_text = format!("{base} {}", req.message);
            self.handle_build(&base, &resolution_text, &ctx, &language, &req, &conversation_id)
                .await?
        } else {
            self.dispatch_entry(&req, &routed, &history, &ctx, &language, &conversation_id)
                .await?
        };

        let Outcome {
            response,
            summary,
            persist_ctx,
            pending_prompt,
        } = outcome;

        session.turns.push(Turn::user(req.message.clone()));
        session
            .turns
            .push(Turn::assistant(summary, Some(action_tag(response.action).to_string())));
        session.merge_context(&request_ctx);
        session.merge_context(&persist_ctx);
        session.last_intent = Some(intent_tag(routed.intent).to_string());
        session.last_action = Some(action_tag(response.action).to_string());
        match response.action {
            Action::Build | Action::Refine | Action::Rebuild => {
                session.artifact_type = Some("page".to_string());
            }
            _ => {}
        }
        session.pending_prompt = pending_prompt;
        session.touch();

        Ok(response)
    }

    async fn dispatch_entry(
        &self,
        req: &ConversationRequest,
        routed: &RouterResult,
        history: &[Turn],
        ctx: &Map<String, Value>,
        language: &str,
        conversation_id: &str,
    ) -> Result<Outcome, GatewayError> {
        match routed.intent {
            Intent::ChatSmalltalk | Intent::ChatQa => {
                self.handle_chat(req, routed, history, conversation_id, Mode::Entry)
                    .await
            }
            Intent::Clarify => {
                self.handle_clarify(req, routed, conversation_id).await
            }
            Intent::GenerateQuestions if self.settings.enable_content_intents => {
                let mut ctx = ctx.clone();
                if let Some(params) = &routed.extracted_params {
                    for (k, v) in params {
                        ctx.insert(k.clone(), v.clone());
                    }
                }
                let blueprint = self
                    .planner
                    .plan(&req.message, language, &Value::Object(ctx.clone()))
                    .await?;
                let summary = format!("Planned question generation: {}", blueprint.name);
                Ok(Outcome {
                    response: ConversationResponse {
                        mode: Mode::Entry,
                        action: Action::Build,
                        chat_kind: None,
                        chat_response: None,
                        blueprint: Some(blueprint),
                        patch_plan: None,
                        clarify_options: None,
                        conversation_id: conversation_id.to_string(),
                        resolved_entities: None,
                    },
                    summary,
                    persist_ctx: ctx,
                    pending_prompt: None,
                })
            }
            // Content intents disabled: treat as a plain build request.
            Intent::GenerateQuestions | Intent::BuildWorkflow => {
                self.handle_build(
                    &req.message,
                    &req.message,
                    ctx,
                    language,
                    req,
                    conversation_id,
                )
                .await
            }
            // Follow-up intents without a blueprint degrade to QA chat.
            Intent::Chat | Intent::Refine | Intent::Rebuild => {
                self.handle_chat(req, routed, history, conversation_id, Mode::Entry)
                    .await
            }
        }
    }

    async fn handle_chat(
        &self,
        req: &ConversationRequest,
        routed: &RouterResult,
        history: &[Turn],
        conversation_id: &str,
        mode: Mode,
    ) -> Result<Outcome, GatewayError> {
        // Artifact restore: referential follow-up-shaped chat grounds in the
        // last page; an unrelated new topic is not forced into page chat.
        let (kind, page) = if mode == Mode::Followup {
            (ChatKind::Page, req.page_context.as_ref())
        } else if is_referential(&req.message) && req.page_context.is_some() {
            (ChatKind::Page, req.page_context.as_ref())
        } else if routed.intent == Intent::ChatQa {
            (ChatKind::Qa, None)
        } else {
            (ChatKind::Smalltalk, None)
        };

        let text = match self.chat.respond(kind, &req.message, history, page).await {
            Ok(text) => text,
            Err(e) => {
                warn!(error = %e, "chat LLM failed, degrading to a fixed reply");
                "Sorry, I had trouble answering that. Could you try again?".to_string()
            }
        };
        Ok(Outcome {
            response: ConversationResponse {
                mode,
                action: Action::Chat,
                chat_kind: Some(kind),
                chat_response: Some(text.clone()),
                blueprint: None,
                patch_plan: None,
                clarify_options: None,
                conversation_id: conversation_id.to_string(),
                resolved_entities: None,
            },
            summary: text,
            persist_ctx: Map::new(),
            pending_prompt: None,
        })
    }

    async fn handle_clarify(
        &self,
        req: &ConversationRequest,
        routed: &RouterResult,
        conversation_id: &str,
    ) -> Result<Outcome, GatewayError> {
        use crate::router::RouteHint;

        let question = routed
            .clarifying_question
            .clone()
            .unwrap_or_else(|| "Could you tell me a bit more?".to_string());
        let (kind, choices) = match routed.route_hint {
            Some(RouteHint::NeedClassId) => {
                ("class".to_string(), self.class_choices(&req.teacher_id).await)
            }
            Some(RouteHint::NeedAssignment) => ("assignment".to_string(), Vec::new()),
            Some(RouteHint::NeedTimeRange) => ("dateRange".to_string(), Vec::new()),
            Some(RouteHint::NeedSubject) => ("subject".to_string(), Vec::new()),
            _ => ("freeform".to_string(), Vec::new()),
        };

        Ok(Outcome {
            response: ConversationResponse {
                mode: Mode::Entry,
                action: Action::Clarify,
                chat_kind: None,
                chat_response: None,
                blueprint: None,
                patch_plan: None,
                clarify_options: Some(ClarifyOptions {
                    kind,
                    question: Some(question.clone()),
                    choices,
                    allow_custom_input: true,
                }),
                conversation_id: conversation_id.to_string(),
                resolved_entities: None,
            },
            summary: question,
            persist_ctx: Map::new(),
            pending_prompt: Some(req.message.clone()),
        })
    }

    /// The build path: resolve entities, degrade to clarify when the
    /// resolution is incomplete, otherwise merge ids and call the planner.
    async fn handle_build(
        &self,
        base_prompt: &str,
        resolution_text: &str,
        ctx: &Map<String, Value>,
        language: &str,
        req: &ConversationRequest,
        conversation_id: &str,
    ) -> Result<Outcome, GatewayError> {
        let ctx_value = Value::Object(ctx.clone());
        let resolution = self
            .resolver
            .resolve(&req.teacher_id, resolution_text, &ctx_value)
            .await;

        // Missing parent: ask for the class, offering the teacher's classes.
        if !resolution.missing_context.is_empty() {
            let missing = resolution.missing_context.join(", ");
            return Ok(self
                .clarify_with_classes(
                    req,
                    conversation_id,
                    base_prompt,
                    format!("Which {missing} should I look at?"),
                )
                .await);
        }

        // Ambiguity: offer the candidates themselves.
        if resolution.is_ambiguous {
            let choices = resolution
                .entities
                .iter()
                .map(|e| ClarifyChoice {
                    label: e.display_name.clone(),
                    value: e.entity_id.clone(),
                })
                .collect();
            return Ok(clarify_outcome(
                conversation_id,
                base_prompt,
                "entity".to_string(),
                "I found more than one match. Which one did you mean?".to_string(),
                choices,
            ));
        }

        let classes: Vec<_> = resolution.classes().cloned().collect();

        // No class at all (and none carried in context): clarify.
        if classes.is_empty() && !ctx.contains_key("classId") {
            return Ok(self
                .clarify_with_classes(
                    req,
                    conversation_id,
                    base_prompt,
                    "Which class would you like me to analyze?".to_string(),
                )
                .await);
        }

        // Oversized grade fan-out: clarify rather than planning a monster.
        if classes.len() > FANOUT_CAP {
            let choices = classes
                .iter()
                .map(|e| ClarifyChoice {
                    label: e.display_name.clone(),
                    value: e.entity_id.clone(),
                })
                .collect();
            return Ok(clarify_outcome(
                conversation_id,
                base_prompt,
                "class".to_string(),
                "That covers a lot of classes. Pick one to start with?".to_string(),
                choices,
            ));
        }

        // Merge resolved ids into the request context.
        let mut persist_ctx = Map::new();
        match resolution.scope_mode {
            ScopeMode::Single => {
                if let Some(c) = classes.first() {
                    persist_ctx.insert("classId".into(), json!(c.entity_id));
                }
            }
            ScopeMode::Multi => {
                let ids: Vec<&str> = classes.iter().map(|e| e.entity_id.as_str()).collect();
                persist_ctx.insert("classIds".into(), json!(ids));
                if let Some(c) = classes.first() {
                    persist_ctx.insert("classId".into(), json!(c.entity_id));
                }
            }
            ScopeMode::None => {}
        }
        if let Some(s) = resolution.student() {
            persist_ctx.insert("studentId".into(), json!(s.entity_id));
        }
        if let Some(a) = resolution.assignment() {
            persist_ctx.insert("assignmentId".into(), json!(a.entity_id));
        }

        let mut planner_ctx = ctx.clone();
        for (k, v) in &persist_ctx {
            planner_ctx.insert(k.clone(), v.clone());
        }

        let annotated = annotate_prompt(base_prompt, &resolution);
        let blueprint = self
            .planner
            .plan(&annotated, language, &Value::Object(planner_ctx))
            .await?;

        let blueprint = enforce_source_prefix(blueprint, base_prompt, &annotated);

        let summary = format!("Planned page: {}", blueprint.name);
        Ok(Outcome {
            response: ConversationResponse {
                mode: Mode::Entry,
                action: Action::Build,
                chat_kind: None,
                chat_response: None,
                blueprint: Some(blueprint),
                patch_plan: None,
                clarify_options: None,
                conversation_id: conversation_id.to_string(),
                resolved_entities: Some(resolution.entities.clone()),
            },
            summary,
            persist_ctx,
            pending_prompt: None,
        })
    }

    async fn dispatch_followup(
        &self,
        req: &ConversationRequest,
        routed: &RouterResult,
        history: &[Turn],
        conversation_id: &str,
    ) -> Result<Outcome, GatewayError> {
        let Some(current) = req.blueprint.as_ref() else {
            return self
                .handle_chat(req, routed, history, conversation_id, Mode::Followup)
                .await;
        };
        let language = req.language.clone().unwrap_or_else(|| "the user's language".into());

        match routed.intent {
            Intent::Refine => {
                let scope = routed.refine_scope.unwrap_or(RefineScope::PatchCompose);
                match scope {
                    RefineScope::PatchLayout | RefineScope::PatchCompose => {
                        let page = req.page_context.clone().unwrap_or_else(|| json!({}));
                        let plan = self.patch_agent.plan_patch(&req.message, &page).await?;
                        Ok(Outcome {
                            response: ConversationResponse {
                                mode: Mode::Followup,
                                action: Action::Refine,
                                chat_kind: None,
                                chat_response: None,
                                blueprint: None,
                                patch_plan: Some(plan),
                                clarify_options: None,
                                conversation_id: conversation_id.to_string(),
                                resolved_entities: None,
                            },
                            summary: format!("Planned a patch: {}", req.message),
                            persist_ctx: Map::new(),
                            pending_prompt: None,
                        })
                    }
                    RefineScope::FullRebuild => {
                        let blueprint = self
                            .planner
                            .refine(&req.message, &language, &json!({}), current)
                            .await?;
                        let blueprint =
                            enforce_source_prefix(blueprint, &req.message, &req.message);
                        Ok(Outcome {
                            summary: format!("Refined page: {}", blueprint.name),
                            response: ConversationResponse {
                                mode: Mode::Followup,
                                action: Action::Refine,
                                chat_kind: None,
                                chat_response: None,
                                blueprint: Some(blueprint),
                                patch_plan: None,
                                clarify_options: None,
                                conversation_id: conversation_id.to_string(),
                                resolved_entities: None,
                            },
                            persist_ctx: Map::new(),
                            pending_prompt: None,
                        })
                    }
                }
            }
            Intent::Rebuild => {
                let blueprint = self
                    .planner
                    .rebuild(&req.message, &language, &json!({}), current)
                    .await?;
                let blueprint = enforce_source_prefix(blueprint, &req.message, &req.message);
                Ok(Outcome {
                    summary: format!("Rebuilt page: {}", blueprint.name),
                    response: ConversationResponse {
                        mode: Mode::Followup,
                        action: Action::Rebuild,
                        chat_kind: None,
                        chat_response: None,
                        blueprint: Some(blueprint),
                        patch_plan: None,
                        clarify_options: None,
                        conversation_id: conversation_id.to_string(),
                        resolved_entities: None,
                    },
                    persist_ctx: Map::new(),
                    pending_prompt: None,
                })
            }
            Intent::Clarify => self.handle_clarify(req, routed, conversation_id).await.map(
                |mut outcome| {
                    outcome.response.mode = Mode::Followup;
                    outcome
                },
            ),
            _ => {
                self.handle_chat(req, routed, history, conversation_id, Mode::Followup)
                    .await
            }
        }
    }

    async fn clarify_with_classes(
        &self,
        req: &ConversationRequest,
        conversation_id: &str,
        base_prompt: &str,
        question: String,
    ) -> Outcome {
        let choices = self.class_choices(&req.teacher_id).await;
        clarify_outcome(
            conversation_id,
            base_prompt,
            "class".to_string(),
            question,
            choices,
        )
    }

    async fn class_choices(&self, teacher_id: &str) -> Vec<ClarifyChoice> {
        let value = match self
            .registry
            .call(TOOL_GET_TEACHER_CLASSES, json!({"teacherId": teacher_id}))
            .await
        {
            Ok(v) if !is_error_sentinel(&v) => v,
            Ok(_) | Err(_) => return Vec::new(),
        };
        value
            .as_array()
            .map(|classes| {
                classes
                    .iter()
                    .filter_map(|c| {
                        let label = c.get("name")?.as_str()?.to_string();
                        let value = c.get("id")?.as_str()?.to_string();
                        Some(ClarifyChoice { label, value })
                    })
                    .collect()
            })
            .unwrap_or_default()
    }
}

fn clarify_outcome(
    conversation_id: &str,
    base_prompt: &str,
    kind: String,
    question: String,
    choices: Vec<ClarifyChoice>,
) -> Outcome {
    Outcome {
        response: ConversationResponse {
            mode: Mode::Entry,
            action: Action::Clarify,
            chat_kind: None,
            chat_response: None,
            blueprint: None,
            patch_plan: None,
            clarify_options: Some(ClarifyOptions {
                kind,
                question: Some(question.clone()),
                choices,
                allow_custom_input: true,
            }),
            conversation_id: conversation_id.to_string(),
            resolved_entities: None,
        },
        summary: question,
        persist_ctx: Map::new(),
        pending_prompt: Some(base_prompt.to_string()),
    }
}

/// Defensive `sourcePrompt` check applied at every build/refine/rebuild call
/// site: the planner already enforces the invariant, so a divergence here is
/// a bug worth logging loudly before restoring.
fn enforce_source_prefix(mut blueprint: Blueprint, prefix: &str, restore_to: &str) -> Blueprint {
    if !blueprint.source_prompt.starts_with(prefix) {
        warn!("blueprint sourcePrompt lost the user prefix; restoring");
        blueprint.source_prompt = restore_to.to_string();
    }
    blueprint
}

/// Appends the `[Resolved context: ...]` suffix the planner receives.
fn annotate_prompt(base: &str, resolution: &ResolveResult) -> String {
    if resolution.entities.is_empty() {
        return base.to_string();
    }
    let parts: Vec<String> = resolution
        .entities
        .iter()
        .map(|e| {
            let kind = match e.entity_type {
                EntityType::Class => "Class",
                EntityType::Student => "Student",
                EntityType::Assignment => "Assignment",
            };
            format!("{kind} {} ({})", e.display_name, e.entity_id)
        })
        .collect();
    format!("{base} [Resolved context: {}]", parts.join("; "))
}
