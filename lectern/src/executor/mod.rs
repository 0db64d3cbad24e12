//! The three-phase engine: Data → Compute → Compose.
//!
//! One request is one long-lived task producing [`PageEvent`]s over a bounded
//! channel; every emit awaits, so SSE backpressure suspends the engine
//! naturally and a dropped receiver (client disconnect) aborts it at the
//! next emit. Tool calls within a phase run sequentially to keep error
//! semantics simple.

pub(crate) mod compose;

use std::sync::Arc;

use serde_json::{json, Map, Value};
use stream_event::{CompleteResult, PageEvent, Phase, Suggestion, ToolStatus};
use tokio::sync::mpsc;
use tracing::warn;

use crate::blueprint::{BindingSource, Blueprint, ComputeNodeType};
use crate::llm::LlmClient;
use crate::refpath::{resolve_all, resolve_value, Scopes};
use crate::tools::{is_error_sentinel, ToolRegistry};

use compose::{generate_ai_block, project_block, EventSink, SinkClosed};

/// Executes blueprints against the tool registry, streaming block/slot
/// granular events.
pub struct Executor {
    registry: Arc<ToolRegistry>,
    llm: Arc<dyn LlmClient>,
}

impl Executor {
    pub fn new(registry: Arc<ToolRegistry>, llm: Arc<dyn LlmClient>) -> Self {
        Self { registry, llm }
    }

    /// Runs one blueprint to its terminal event. Never panics or errors out
    /// of the stream: every failure becomes a terminal `COMPLETE`.
    pub async fn execute(
        &self,
        blueprint: Blueprint,
        context: Value,
        teacher_id: &str,
        tx: mpsc::Sender<PageEvent>,
    ) {
        let mut sink = EventSink::new(tx);
        if let Err(SinkClosed) = self.run(blueprint, context, teacher_id, &mut sink).await {
            // Client went away mid-stream; nothing left to deliver.
            warn!("page stream consumer disconnected, aborting execution");
        }
    }

    async fn run(
        &self,
        blueprint: Blueprint,
        mut context: Value,
        teacher_id: &str,
        sink: &mut EventSink,
    ) -> Result<(), SinkClosed> {
        if !context.is_object() {
            context = json!({});
        }
        if context.get("teacherId").is_none() {
            context["teacherId"] = json!(teacher_id);
        }

        // Validation errors on the streaming endpoint surface as events.
        if let Err(e) = blueprint.validate(&self.registry.names()) {
            return sink
                .emit(PageEvent::failed(
                    format!("blueprint rejected: {e}"),
                    "validation_error",
                ))
                .await;
        }

        let input = derive_input_scope(&context);
        let mut data = Value::Object(Map::new());
        let mut compute = Value::Object(Map::new());

        // Phase A: data bindings.
        sink.emit(PageEvent::Phase {
            phase: Phase::Data,
            message: "Fetching data".into(),
        })
        .await?;

        let order = match blueprint.binding_order() {
            Ok(order) => order,
            Err(e) => {
                return sink
                    .emit(PageEvent::failed(
                        format!("blueprint rejected: {e}"),
                        "validation_error",
                    ))
                    .await;
            }
        };
        for id in order {
            let Some(binding) = blueprint
                .data_contract
                .bindings
                .iter()
                .find(|b| b.id == id)
            else {
                continue;
            };
            let scopes = Scopes {
                context: &context,
                input: &input,
                data: &data,
                compute: &Value::Null,
            };
            let args = resolve_all(&Value::Object(binding.param_mapping.clone()), &scopes);

            if binding.source_type == BindingSource::Static {
                data[&binding.id] = args;
                continue;
            }

            let tool = binding.tool_name.clone().unwrap_or_default();
            sink.emit(PageEvent::ToolCall {
                tool: tool.clone(),
                args: args.clone(),
            })
            .await?;

            let outcome = self.registry.call(&tool, args).await;
            match outcome {
                Ok(value) if !is_error_sentinel(&value) => {
                    sink.emit(PageEvent::ToolResult {
                        tool,
                        status: ToolStatus::Ok,
                    })
                    .await?;
                    data[&binding.id] = value;
                }
                Ok(sentinel) => {
                    sink.emit(PageEvent::ToolResult {
                        tool,
                        status: ToolStatus::Error,
                    })
                    .await?;
                    if binding.required {
                        return self.data_error(sentinel, sink).await;
                    }
                    warn!(binding = %binding.id, "optional binding failed, continuing without it");
                }
                Err(e) => {
                    sink.emit(PageEvent::ToolResult {
                        tool,
                        status: ToolStatus::Error,
                    })
                    .await?;
                    if binding.required {
                        let sentinel = json!({
                            "error": e.to_string(),
                            "entity": binding.id,
                            "entityType": "binding",
                        });
                        return self.data_error(sentinel, sink).await;
                    }
                    warn!(binding = %binding.id, error = %e, "optional binding failed, continuing");
                }
            }
        }

        // Phase B: tool-type compute nodes (AI nodes fill per-block in C).
        sink.emit(PageEvent::Phase {
            phase: Phase::Compute,
            message: "Computing statistics".into(),
        })
        .await?;

        let order = match blueprint.compute_order() {
            Ok(order) => order,
            Err(e) => {
                return sink
                    .emit(PageEvent::failed(
                        format!("blueprint rejected: {e}"),
                        "validation_error",
                    ))
                    .await;
            }
        };
        for id in order {
            let Some(node) = blueprint
                .compute_graph
                .nodes
                .iter()
                .find(|n| n.id == id && n.node_type == ComputeNodeType::Tool)
            else {
                continue;
            };
            let Some(tool) = node.tool_name.clone() else {
                continue;
            };
            let scopes = Scopes {
                context: &context,
                input: &input,
                data: &data,
                compute: &compute,
            };
            let args = resolve_all(&Value::Object(node.tool_args.clone()), &scopes);

            sink.emit(PageEvent::ToolCall {
                tool: tool.clone(),
                args: args.clone(),
            })
            .await?;
            match self.registry.call(&tool, args).await {
                Ok(value) if !is_error_sentinel(&value) => {
                    sink.emit(PageEvent::ToolResult {
                        tool,
                        status: ToolStatus::Ok,
                    })
                    .await?;
                    compute[&node.output_key] = value;
                }
                Ok(_) | Err(_) => {
                    sink.emit(PageEvent::ToolResult {
                        tool: tool.clone(),
                        status: ToolStatus::Error,
                    })
                    .await?;
                    return sink
                        .emit(PageEvent::failed(
                            format!("compute node '{}' failed", node.id),
                            "internal_error",
                        ))
                        .await;
                }
            }
        }

        // Phase C: compose the page, streaming AI slots block by block.
        sink.emit(PageEvent::Phase {
            phase: Phase::Compose,
            message: "Composing page".into(),
        })
        .await?;

        let mut ai_concat = String::new();
        let mut tabs = Vec::new();
        for tab in &blueprint.ui_composition.tabs {
            let mut blocks = Vec::new();
            for slot in &tab.slots {
                let scopes = Scopes {
                    context: &context,
                    input: &input,
                    data: &data,
                    compute: &compute,
                };
                let props = resolve_all(&slot.props, &scopes);
                let component = slot.component_type.as_str();

                let content = if slot.ai_content_slot {
                    match generate_ai_block(
                        self.llm.as_ref(),
                        &slot.id,
                        component,
                        &props,
                        &data,
                        &compute,
                        "",
                        sink,
                    )
                    .await
                    {
                        Ok(output) => {
                            if !output.text.is_empty() {
                                if !ai_concat.is_empty() {
                                    ai_concat.push_str("\n\n");
                                }
                                ai_concat.push_str(&output.text);
                            }
                            output.content
                        }
                        Err(e) => {
                            return sink
                                .emit(PageEvent::failed(
                                    format!("AI generation failed: {e}"),
                                    "ai_error",
                                ))
                                .await;
                        }
                    }
                } else {
                    let bound = slot
                        .data_binding
                        .as_deref()
                        .map(|r| resolve_value(&json!(r), &scopes))
                        .unwrap_or(Value::Null);
                    project_block(component, &bound, &props)
                };

                blocks.push(json!({
                    "id": slot.id,
                    "componentType": component,
                    "props": props,
                    "content": content,
                }));
            }
            tabs.push(json!({
                "id": tab.id,
                "label": tab.label,
                "blocks": blocks,
            }));
        }

        if !ai_concat.is_empty() {
            sink.emit(PageEvent::Message { content: ai_concat }).await?;
        }

        let page = json!({
            "blueprintId": blueprint.id,
            "name": blueprint.name,
            "layout": blueprint.ui_composition.layout,
            "tabs": tabs,
        });
        sink.emit(PageEvent::completed(
            "Page generated",
            CompleteResult {
                page,
                data_context: Some(data),
                compute_results: Some(compute),
            },
        ))
        .await
    }

    async fn data_error(&self, sentinel: Value, sink: &mut EventSink) -> Result<(), SinkClosed> {
        let entity = sentinel
            .get("entity")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let entity_type = sentinel
            .get("entityType")
            .and_then(Value::as_str)
            .unwrap_or("entity")
            .to_string();
        let message = sentinel
            .get("error")
            .and_then(Value::as_str)
            .unwrap_or("required data could not be fetched")
            .to_string();
        let suggestions: Vec<Suggestion> = sentinel
            .get("suggestions")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(|s| serde_json::from_value(s.clone()).ok())
                    .collect()
            })
            .unwrap_or_default();

        sink.emit(PageEvent::DataError {
            entity,
            entity_type,
            message: message.clone(),
            suggestions,
        })
        .await?;
        sink.emit(PageEvent::failed(message, "data_error")).await
    }
}

/// Builds the `input` scope: an explicit `context.input` wins; otherwise the
/// flat context keys are nested (`classId` → `input.class`, and so on), so
/// blueprints can reference `$input.class` either way.
pub(crate) fn derive_input_scope(context: &Value) -> Value {
    if let Some(input) = context.get("input") {
        if input.is_object() {
            return input.clone();
        }
    }
    let mut input = Map::new();
    let pairs = [
        ("classId", "class"),
        ("assignmentId", "assignment"),
        ("studentId", "student"),
        ("dateRange", "dateRange"),
    ];
    for (flat, nested) in pairs {
        if let Some(v) = context.get(flat) {
            input.insert(nested.to_string(), v.clone());
        }
    }
    if let Some(v) = context.get("classIds") {
        input.insert("classes".to_string(), v.clone());
    }
    Value::Object(input)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_input_scope_wins() {
        let ctx = json!({"input": {"class": "c-9"}, "classId": "c-1"});
        assert_eq!(derive_input_scope(&ctx), json!({"class": "c-9"}));
    }

    #[test]
    fn flat_context_keys_are_nested() {
        let ctx = json!({"classId": "c-1", "assignmentId": "a-2", "studentId": "s-3"});
        assert_eq!(
            derive_input_scope(&ctx),
            json!({"class": "c-1", "assignment": "a-2", "student": "s-3"})
        );
    }

    #[test]
    fn plural_classes_carry_over() {
        let ctx = json!({"classIds": ["c-1", "c-2"]});
        assert_eq!(derive_input_scope(&ctx), json!({"classes": ["c-1", "c-2"]}));
    }
}
