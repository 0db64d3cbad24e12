//! Patch engine: applies structured patch instructions to an existing page,
//! streaming the same event vocabulary as the executor but narrower.
//!
//! `patch_layout` touches props, order, and block membership with no tools
//! and no LLM; `patch_compose` re-runs per-block AI generation from the
//! cached data/compute scopes. Instructions apply in list order; the first
//! failure aborts the rest with `COMPLETE(error)` and no rollback.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use stream_event::{CompleteResult, PageEvent};
use tokio::sync::mpsc;
use tracing::warn;

use crate::executor::compose::{generate_ai_block, EventSink};
use crate::llm::LlmClient;
use crate::router::RefineScope;

/// One patch instruction kind.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatchKind {
    UpdateProps,
    Reorder,
    AddBlock,
    RemoveBlock,
    Recompose,
}

/// One instruction of a patch plan.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatchInstruction {
    #[serde(rename = "type")]
    pub kind: PatchKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_block_id: Option<String>,
    #[serde(default)]
    pub changes: Value,
}

/// A structured plan for changing an existing page.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatchPlan {
    pub scope: RefineScope,
    #[serde(default)]
    pub instructions: Vec<PatchInstruction>,
    #[serde(default)]
    pub affected_block_ids: Vec<String>,
}

#[derive(Debug, thiserror::Error)]
enum PatchError {
    #[error("block '{0}' not found in the page")]
    BlockNotFound(String),
    #[error("instruction missing targetBlockId")]
    MissingTarget,
    #[error("instruction changes malformed: {0}")]
    BadChanges(String),
    #[error("recompose failed: {0}")]
    Recompose(String),
}

/// Applies patch plans; shares the per-block AI path with the executor's
/// compose phase.
pub struct PatchEngine {
    llm: Arc<dyn LlmClient>,
}

impl PatchEngine {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self { llm }
    }

    /// Applies `plan` to `page`, streaming events into `tx` until the single
    /// terminal `COMPLETE`. `full_rebuild` plans never reach this engine;
    /// the gateway routes them back through planner + executor.
    pub async fn apply(
        &self,
        page: Value,
        plan: PatchPlan,
        data_context: Value,
        compute_results: Value,
        tx: mpsc::Sender<PageEvent>,
    ) {
        let mut sink = EventSink::new(tx);
        let mut page = page;

        if plan.scope == RefineScope::FullRebuild {
            let _ = sink
                .emit(PageEvent::failed(
                    "full_rebuild is not a patch; plan and execute again",
                    "validation_error",
                ))
                .await;
            return;
        }

        for instruction in &plan.instructions {
            let outcome = match instruction.kind {
                PatchKind::UpdateProps => apply_update_props(&mut page, instruction),
                PatchKind::Reorder => apply_reorder(&mut page, instruction),
                PatchKind::AddBlock => apply_add_block(&mut page, instruction),
                PatchKind::RemoveBlock => apply_remove_block(&mut page, instruction),
                PatchKind::Recompose => {
                    self.apply_recompose(
                        &mut page,
                        instruction,
                        &data_context,
                        &compute_results,
                        &mut sink,
                    )
                    .await
                }
            };
            match outcome {
                Ok(touched) => {
                    for block_id in touched {
                        if sink
                            .emit(PageEvent::BlockComplete { block_id })
                            .await
                            .is_err()
                        {
                            return;
                        }
                    }
                }
                Err(e) => {
                    warn!(error = %e, "patch instruction failed, aborting plan");
                    let _ = sink
                        .emit(PageEvent::failed(e.to_string(), "patch_error"))
                        .await;
                    return;
                }
            }
        }

        let _ = sink
            .emit(PageEvent::completed(
                "Page updated",
                CompleteResult {
                    page,
                    data_context: Some(data_context),
                    compute_results: Some(compute_results),
                },
            ))
            .await;
    }

    async fn apply_recompose(
        &self,
        page: &mut Value,
        instruction: &PatchInstruction,
        data_context: &Value,
        compute_results: &Value,
        sink: &mut EventSink,
    ) -> Result<Vec<String>, PatchError> {
        let target = instruction
            .target_block_id
            .clone()
            .ok_or(PatchError::MissingTarget)?;
        let extra = instruction
            .changes
            .get("instruction")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        let block = find_block(page, &target).ok_or_else(|| PatchError::BlockNotFound(target.clone()))?;
        let component_type = block
            .get("componentType")
            .and_then(Value::as_str)
            .unwrap_or("markdown")
            .to_string();
        let props = block.get("props").cloned().unwrap_or_else(|| json!({}));

        let output = generate_ai_block(
            self.llm.as_ref(),
            &target,
            &component_type,
            &props,
            data_context,
            compute_results,
            &extra,
            sink,
        )
        .await
        .map_err(|e| PatchError::Recompose(e.to_string()))?;

        if let Some(block) = find_block(page, &target) {
            block["content"] = output.content;
        }
        // BLOCK_COMPLETE was already emitted by the shared AI path.
        Ok(Vec::new())
    }
}

/// Finds a block by id across all tabs; returns a mutable handle.
fn find_block<'a>(page: &'a mut Value, block_id: &str) -> Option<&'a mut Value> {
    let tabs = page.get_mut("tabs")?.as_array_mut()?;
    for tab in tabs {
        let Some(blocks) = tab.get_mut("blocks").and_then(Value::as_array_mut) else {
            continue;
        };
        for block in blocks {
            if block.get("id").and_then(Value::as_str) == Some(block_id) {
                return Some(block);
            }
        }
    }
    None
}

fn apply_update_props(
    page: &mut Value,
    instruction: &PatchInstruction,
) -> Result<Vec<String>, PatchError> {
    let target = instruction
        .target_block_id
        .clone()
        .ok_or(PatchError::MissingTarget)?;
    let new_props = instruction
        .changes
        .get("props")
        .and_then(Value::as_object)
        .ok_or_else(|| PatchError::BadChanges("expected changes.props object".into()))?
        .clone();
    let block =
        find_block(page, &target).ok_or_else(|| PatchError::BlockNotFound(target.clone()))?;
    if !block.get("props").is_some_and(Value::is_object) {
        block["props"] = json!({});
    }
    if let Some(props) = block["props"].as_object_mut() {
        for (k, v) in new_props {
            props.insert(k, v);
        }
    }
    Ok(vec![target])
}

fn apply_reorder(
    page: &mut Value,
    instruction: &PatchInstruction,
) -> Result<Vec<String>, PatchError> {
    let order: Vec<String> = instruction
        .changes
        .get("order")
        .and_then(Value::as_array)
        .ok_or_else(|| PatchError::BadChanges("expected changes.order array".into()))?
        .iter()
        .filter_map(Value::as_str)
        .map(str::to_string)
        .collect();

    let tabs = page
        .get_mut("tabs")
        .and_then(Value::as_array_mut)
        .ok_or_else(|| PatchError::BadChanges("page has no tabs".into()))?;
    let mut touched = Vec::new();
    for tab in tabs {
        let Some(blocks) = tab.get_mut("blocks").and_then(Value::as_array_mut) else {
            continue;
        };
        let mentioned = blocks.iter().any(|b| {
            b.get("id")
                .and_then(Value::as_str)
                .is_some_and(|id| order.iter().any(|o| o == id))
        });
        if !mentioned {
            continue;
        }
        blocks.sort_by_key(|b| {
            let id = b.get("id").and_then(Value::as_str).unwrap_or_default();
            order
                .iter()
                .position(|o| o == id)
                .unwrap_or(usize::MAX)
        });
        touched.extend(order.iter().cloned());
    }
    Ok(touched)
}

fn apply_add_block(
    page: &mut Value,
    instruction: &PatchInstruction,
) -> Result<Vec<String>, PatchError> {
    let block = instruction
        .changes
        .get("block")
        .cloned()
        .ok_or_else(|| PatchError::BadChanges("expected changes.block".into()))?;
    let block_id = block
        .get("id")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let tab_id = instruction.changes.get("tabId").and_then(Value::as_str);

    let tabs = page
        .get_mut("tabs")
        .and_then(Value::as_array_mut)
        .ok_or_else(|| PatchError::BadChanges("page has no tabs".into()))?;
    let tab = match tab_id {
        Some(id) => tabs
            .iter_mut()
            .find(|t| t.get("id").and_then(Value::as_str) == Some(id)),
        None => tabs.first_mut(),
    }
    .ok_or_else(|| PatchError::BadChanges("target tab not found".into()))?;

    if !tab.get("blocks").is_some_and(Value::is_array) {
        tab["blocks"] = json!([]);
    }
    if let Some(blocks) = tab["blocks"].as_array_mut() {
        blocks.push(block);
    }
    Ok(vec![block_id])
}

fn apply_remove_block(
    page: &mut Value,
    instruction: &PatchInstruction,
) -> Result<Vec<String>, PatchError> {
    let target = instruction
        .target_block_id
        .clone()
        .ok_or(PatchError::MissingTarget)?;
    let tabs = page
        .get_mut("tabs")
        .and_then(Value::as_array_mut)
        .ok_or_else(|| PatchError::BadChanges("page has no tabs".into()))?;
    let mut removed = false;
    for tab in tabs {
        let Some(blocks) = tab.get_mut("blocks").and_then(Value::as_array_mut) else {
            continue;
        };
        let before = blocks.len();
        blocks.retain(|b| b.get("id").and_then(Value::as_str) != Some(target.as_str()));
        removed |= blocks.len() != before;
    }
    if !removed {
        return Err(PatchError::BlockNotFound(target));
    }
    Ok(vec![target])
}
