//! Constrained LLM planning: blueprint generation with schema validation and
//! bounded retries, plus the patch agent that emits structured patch plans.
//!
//! The planner is never trusted with `sourcePrompt`: whatever the LLM
//! returns, the caller-supplied text is written back unconditionally (a
//! divergence is logged, not honored).

use std::sync::Arc;

use chrono::Utc;
use serde_json::Value;
use thiserror::Error;
use tracing::warn;

use crate::blueprint::{Blueprint, ComponentType};
use crate::jsontext::parse_json_lenient;
use crate::llm::{LlmClient, LlmError};
use crate::message::Message;
use crate::patch::PatchPlan;
use crate::prompts::{PatchPrompts, PlannerPrompts};
use crate::tools::ToolRegistry;

/// Schema-validation failures are retried this many times after the first
/// attempt, feeding the error back to the LLM.
const PLAN_RETRIES: u32 = 2;

#[derive(Debug, Error)]
pub enum PlanError {
    #[error(transparent)]
    Llm(#[from] LlmError),
    #[error("planner output failed validation after {attempts} attempts: {message}")]
    Validation { attempts: u32, message: String },
}

enum PlanDirective<'a> {
    Fresh,
    Refine(&'a Blueprint),
    Rebuild(&'a Blueprint),
}

/// LLM blueprint generator constrained by the component registry and the
/// tool catalog.
pub struct Planner {
    llm: Arc<dyn LlmClient>,
    registry: Arc<ToolRegistry>,
    prompts: PlannerPrompts,
}

impl Planner {
    pub fn new(llm: Arc<dyn LlmClient>, registry: Arc<ToolRegistry>, prompts: PlannerPrompts) -> Self {
        Self {
            llm,
            registry,
            prompts,
        }
    }

    /// Plans a fresh blueprint for the user's (already resolved) prompt.
    pub async fn plan(
        &self,
        user_prompt: &str,
        language: &str,
        resolved_context: &Value,
    ) -> Result<Blueprint, PlanError> {
        self.generate(user_prompt, language, resolved_context, PlanDirective::Fresh)
            .await
    }

    /// Re-plans with a minimize-structural-change directive.
    pub async fn refine(
        &self,
        user_prompt: &str,
        language: &str,
        resolved_context: &Value,
        current: &Blueprint,
    ) -> Result<Blueprint, PlanError> {
        self.generate(
            user_prompt,
            language,
            resolved_context,
            PlanDirective::Refine(current),
        )
        .await
    }

    /// Re-plans from scratch with the old blueprint as context only.
    pub async fn rebuild(
        &self,
        user_prompt: &str,
        language: &str,
        resolved_context: &Value,
        current: &Blueprint,
    ) -> Result<Blueprint, PlanError> {
        self.generate(
            user_prompt,
            language,
            resolved_context,
            PlanDirective::Rebuild(current),
        )
        .await
    }

    fn system_prompt(&self, language: &str) -> String {
        let components = ComponentType::ALL
            .iter()
            .map(|c| c.as_str())
            .collect::<Vec<_>>()
            .join(", ");
        self.prompts
            .system
            .replace("{components}", &components)
            .replace("{tools}", &self.registry.descriptions_for_prompt())
            .replace("{language}", language)
    }

    async fn generate(
        &self,
        user_prompt: &str,
        language: &str,
        resolved_context: &Value,
        directive: PlanDirective<'_>,
    ) -> Result<Blueprint, PlanError> {
        let mut messages = vec![Message::system(self.system_prompt(language))];
        match &directive {
            PlanDirective::Fresh => {}
            PlanDirective::Refine(current) => {
                messages.push(Message::user(format!(
                    "{}\n\nCurrent blueprint:\n{}",
                    self.prompts.refine_directive,
                    serde_json::to_string(current).unwrap_or_default()
                )));
            }
            PlanDirective::Rebuild(current) => {
                messages.push(Message::user(format!(
                    "{}\n\nCurrent blueprint:\n{}",
                    self.prompts.rebuild_directive,
                    serde_json::to_string(current).unwrap_or_default()
                )));
            }
        }
        messages.push(Message::user(format!(
            "Request: {user_prompt}\n\nResolved context:\n{}",
            serde_json::to_string(resolved_context).unwrap_or_default()
        )));

        let tool_names = self.registry.names();
        let mut last_error = String::new();
        for attempt in 0..=PLAN_RETRIES {
            let response = self.llm.invoke(&messages).await?;
            let parsed = parse_json_lenient(&response.content)
                .ok_or(())
                .and_then(|v| serde_json::from_value::<Blueprint>(v).map_err(|_| ()));

            let outcome: Result<(), String> = match parsed {
                Ok(blueprint) => match blueprint.validate(&tool_names) {
                    Ok(()) => return Ok(self.finalize(blueprint, user_prompt)),
                    Err(e) => Err(e.to_string()),
                },
                Err(()) => Err("output was not a valid blueprint JSON object".to_string()),
            };

            if let Err(message) = outcome {
                warn!(attempt, error = %message, "planner output rejected");
                last_error = message.clone();
                messages.push(Message::assistant(response.content));
                messages.push(Message::user(format!(
                    "That blueprint was rejected: {message}. Emit a corrected blueprint JSON \
                     only; keep every toolName within the registered list."
                )));
            }
        }
        Err(PlanError::Validation {
            attempts: PLAN_RETRIES + 1,
            message: last_error,
        })
    }

    /// Fills server-side fields and enforces the `sourcePrompt` invariant.
    fn finalize(&self, mut blueprint: Blueprint, user_prompt: &str) -> Blueprint {
        if blueprint.id.is_empty() {
            blueprint.id = format!("bp-{}", uuid::Uuid::new_v4());
        }
        if blueprint.created_at.is_none() {
            blueprint.created_at = Some(Utc::now());
        }
        if blueprint.source_prompt != user_prompt {
            if !blueprint.source_prompt.is_empty() {
                warn!(
                    produced = %blueprint.source_prompt,
                    "planner mutated sourcePrompt; overwriting with the caller text"
                );
            }
            blueprint.source_prompt = user_prompt.to_string();
        }
        blueprint
    }
}

/// LLM agent producing [`PatchPlan`]s for layout/compose refinements.
pub struct PatchAgent {
    llm: Arc<dyn LlmClient>,
    prompts: PatchPrompts,
}

impl PatchAgent {
    pub fn new(llm: Arc<dyn LlmClient>, prompts: PatchPrompts) -> Self {
        Self { llm, prompts }
    }

    /// Translates a change request against the current page into a plan.
    pub async fn plan_patch(
        &self,
        user_prompt: &str,
        current_page: &Value,
    ) -> Result<PatchPlan, PlanError> {
        let mut messages = vec![
            Message::system(self.prompts.system.clone()),
            Message::user(format!(
                "Change request: {user_prompt}\n\nCurrent page:\n{}",
                serde_json::to_string(current_page).unwrap_or_default()
            )),
        ];

        let mut last_error = String::new();
        for attempt in 0..=PLAN_RETRIES {
            let response = self.llm.invoke(&messages).await?;
            match parse_json_lenient(&response.content)
                .and_then(|v| serde_json::from_value::<PatchPlan>(v).ok())
            {
                Some(plan) if !plan.instructions.is_empty() => return Ok(plan),
                Some(_) => last_error = "patch plan had no instructions".to_string(),
                None => last_error = "output was not a valid patch plan".to_string(),
            }
            warn!(attempt, error = %last_error, "patch agent output rejected");
            messages.push(Message::assistant(response.content));
            messages.push(Message::user(format!(
                "That plan was rejected: {last_error}. Emit a corrected patch plan JSON only."
            )));
        }
        Err(PlanError::Validation {
            attempts: PLAN_RETRIES + 1,
            message: last_error,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::MockLlm;
    use crate::prompts::PromptSet;
    use crate::tools::{SummaryStatsTool, ToolRegistry};
    use serde_json::json;

    fn registry() -> Arc<ToolRegistry> {
        let mut reg = ToolRegistry::new();
        reg.register(Arc::new(SummaryStatsTool));
        Arc::new(reg)
    }

    fn blueprint_json(tool: &str) -> String {
        json!({
            "name": "Scores",
            "sourcePrompt": "planner-invented text",
            "dataContract": {"inputs": [], "bindings": []},
            "computeGraph": {"nodes": [{
                "id": "stats", "type": "tool", "toolName": tool,
                "toolArgs": {}, "dependsOn": [], "outputKey": "stats"
            }]},
            "uiComposition": {"layout": "single_page", "tabs": []}
        })
        .to_string()
    }

    fn planner_with(llm: MockLlm) -> Planner {
        Planner::new(
            Arc::new(llm),
            registry(),
            PromptSet::load(None).unwrap().planner,
        )
    }

    #[tokio::test]
    async fn source_prompt_is_always_the_caller_text() {
        let planner = planner_with(MockLlm::new(blueprint_json("summary_stats")));
        let bp = planner
            .plan("Analyze Form 1A English Unit 5 test", "en", &json!({}))
            .await
            .unwrap();
        assert_eq!(bp.source_prompt, "Analyze Form 1A English Unit 5 test");
        assert!(bp.id.starts_with("bp-"));
        assert!(bp.created_at.is_some());
    }

    #[tokio::test]
    async fn invalid_tool_is_retried_then_accepted() {
        let planner = planner_with(MockLlm::scripted(
            [blueprint_json("made_up_tool"), blueprint_json("summary_stats")],
            "{}",
        ));
        let bp = planner.plan("analyze scores", "en", &json!({})).await.unwrap();
        assert_eq!(
            bp.compute_graph.nodes[0].tool_name.as_deref(),
            Some("summary_stats")
        );
    }

    #[tokio::test]
    async fn persistent_garbage_exhausts_retries() {
        let planner = planner_with(MockLlm::new("not json at all"));
        let err = planner.plan("analyze", "en", &json!({})).await.unwrap_err();
        match err {
            PlanError::Validation { attempts, .. } => assert_eq!(attempts, 3),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn patch_agent_parses_a_plan() {
        let plan_json = json!({
            "scope": "patch_layout",
            "instructions": [{"type": "update_props", "targetBlockId": "kpis",
                              "changes": {"props": {"title": "New"}}}],
            "affectedBlockIds": ["kpis"]
        })
        .to_string();
        let agent = PatchAgent::new(
            Arc::new(MockLlm::new(plan_json)),
            PromptSet::load(None).unwrap().patch,
        );
        let plan = agent
            .plan_patch("rename the KPI block", &json!({"tabs": []}))
            .await
            .unwrap();
        assert_eq!(plan.affected_block_ids, vec!["kpis"]);
    }
}
