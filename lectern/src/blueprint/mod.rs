//! The Blueprint: a three-layer structured plan (data contract + compute
//! graph + UI composition) produced by the planner and executed by the
//! executor. Serialized to the wire in camelCase; the closed enums here are
//! the static guarantee the LLM boundary lacks.

mod validate;

pub use validate::{toposort, BlueprintError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Registered UI component kinds. The planner may only emit these.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComponentType {
    KpiGrid,
    Chart,
    Table,
    Markdown,
    SuggestionList,
    QuestionGenerator,
}

impl ComponentType {
    /// All registered components, for the planner's system prompt.
    pub const ALL: [ComponentType; 6] = [
        ComponentType::KpiGrid,
        ComponentType::Chart,
        ComponentType::Table,
        ComponentType::Markdown,
        ComponentType::SuggestionList,
        ComponentType::QuestionGenerator,
    ];

    /// Wire name (snake_case tag).
    pub fn as_str(&self) -> &'static str {
        match self {
            ComponentType::KpiGrid => "kpi_grid",
            ComponentType::Chart => "chart",
            ComponentType::Table => "table",
            ComponentType::Markdown => "markdown",
            ComponentType::SuggestionList => "suggestion_list",
            ComponentType::QuestionGenerator => "question_generator",
        }
    }
}

/// Kind of a declared input.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum InputType {
    Class,
    Assignment,
    Student,
    DateRange,
}

/// Where a data binding gets its value from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BindingSource {
    Tool,
    Api,
    Static,
}

/// Kind of a compute node: a registered tool or a per-block AI fill.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComputeNodeType {
    Tool,
    Ai,
}

/// Page layout.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Layout {
    Tabs,
    SinglePage,
}

/// One declared input of the data contract.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InputDecl {
    pub id: String,
    #[serde(rename = "type")]
    pub input_type: InputType,
    #[serde(default)]
    pub label: String,
    #[serde(default = "default_true")]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub depends_on: Option<String>,
}

/// One data binding: a named fetch whose result lands under `data[id]`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Binding {
    pub id: String,
    pub source_type: BindingSource,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
    /// Parameter name → reference string (or literal).
    #[serde(default)]
    pub param_mapping: serde_json::Map<String, Value>,
    #[serde(default = "default_true")]
    pub required: bool,
    #[serde(default)]
    pub depends_on: Vec<String>,
}

/// The data contract: declared inputs plus the bindings to satisfy.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataContract {
    #[serde(default)]
    pub inputs: Vec<InputDecl>,
    #[serde(default)]
    pub bindings: Vec<Binding>,
}

/// One compute node; results land under `compute[output_key]`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComputeNode {
    pub id: String,
    #[serde(rename = "type")]
    pub node_type: ComputeNodeType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
    #[serde(default)]
    pub tool_args: serde_json::Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt_template: Option<String>,
    #[serde(default)]
    pub depends_on: Vec<String>,
    pub output_key: String,
}

/// The compute graph.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComputeGraph {
    #[serde(default)]
    pub nodes: Vec<ComputeNode>,
}

/// A declared position in the UI composition.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Slot {
    pub id: String,
    pub component_type: ComponentType,
    #[serde(default)]
    pub data_binding: Option<String>,
    #[serde(default)]
    pub props: Value,
    #[serde(default)]
    pub ai_content_slot: bool,
}

/// One tab of the composed page.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tab {
    pub id: String,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub slots: Vec<Slot>,
}

/// The UI composition layer.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UiComposition {
    pub layout: Layout,
    #[serde(default)]
    pub tabs: Vec<Tab>,
}

impl Default for UiComposition {
    fn default() -> Self {
        Self {
            layout: Layout::SinglePage,
            tabs: Vec::new(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_version() -> String {
    "1.0".to_string()
}

fn default_capability() -> u8 {
    1
}

/// The full plan for one page.
///
/// Invariants enforced by [`Blueprint::validate`]: every `tool_name` is a
/// registered tool, every `component_type` is a registered component (the
/// closed enum guarantees this), and `depends_on` edges form a DAG.
/// `source_prompt` equals the originating user message verbatim; the planner
/// overwrites any LLM-produced deviation before returning.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Blueprint {
    #[serde(default)]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default = "default_capability")]
    pub capability_level: u8,
    #[serde(default)]
    pub source_prompt: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub data_contract: DataContract,
    #[serde(default)]
    pub compute_graph: ComputeGraph,
    #[serde(default)]
    pub ui_composition: UiComposition,
}

impl Blueprint {
    /// Every slot across every tab, in declaration order.
    pub fn slots(&self) -> impl Iterator<Item = (&Tab, &Slot)> {
        self.ui_composition
            .tabs
            .iter()
            .flat_map(|tab| tab.slots.iter().map(move |slot| (tab, slot)))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use serde_json::json;

    pub(crate) fn minimal_blueprint() -> Blueprint {
        serde_json::from_value(json!({
            "name": "Class performance",
            "dataContract": {
                "inputs": [
                    {"id": "class", "type": "class", "label": "Class", "required": true}
                ],
                "bindings": [
                    {
                        "id": "submissions",
                        "sourceType": "tool",
                        "toolName": "get_assignment_submissions",
                        "paramMapping": {
                            "teacherId": "$context.teacherId",
                            "assignmentId": "$input.assignment"
                        },
                        "required": true,
                        "dependsOn": []
                    }
                ]
            },
            "computeGraph": {
                "nodes": [
                    {
                        "id": "stats",
                        "type": "tool",
                        "toolName": "summary_stats",
                        "toolArgs": {"records": "$data.submissions", "field": "score"},
                        "dependsOn": [],
                        "outputKey": "stats"
                    }
                ]
            },
            "uiComposition": {
                "layout": "tabs",
                "tabs": [
                    {
                        "id": "overview",
                        "label": "Overview",
                        "slots": [
                            {
                                "id": "kpis",
                                "componentType": "kpi_grid",
                                "dataBinding": "$compute.stats",
                                "props": {},
                                "aiContentSlot": false
                            },
                            {
                                "id": "summary",
                                "componentType": "markdown",
                                "dataBinding": null,
                                "props": {"title": "Summary"},
                                "aiContentSlot": true
                            }
                        ]
                    }
                ]
            }
        }))
        .unwrap()
    }

    #[test]
    fn deserializes_camel_case_wire_form() {
        let bp = minimal_blueprint();
        assert_eq!(bp.data_contract.bindings.len(), 1);
        assert_eq!(
            bp.data_contract.bindings[0].tool_name.as_deref(),
            Some("get_assignment_submissions")
        );
        assert_eq!(bp.compute_graph.nodes[0].output_key, "stats");
        assert_eq!(
            bp.ui_composition.tabs[0].slots[0].component_type,
            ComponentType::KpiGrid
        );
        assert!(bp.ui_composition.tabs[0].slots[1].ai_content_slot);
    }

    #[test]
    fn round_trip_preserves_equality() {
        let bp = minimal_blueprint();
        let text = serde_json::to_string(&bp).unwrap();
        let back: Blueprint = serde_json::from_str(&text).unwrap();
        assert_eq!(bp, back);
    }

    #[test]
    fn defaults_fill_optional_fields() {
        let bp: Blueprint = serde_json::from_value(json!({
            "name": "bare",
            "uiComposition": {"layout": "single_page", "tabs": []}
        }))
        .unwrap();
        assert_eq!(bp.version, "1.0");
        assert_eq!(bp.capability_level, 1);
        assert!(bp.data_contract.bindings.is_empty());
        assert!(bp.compute_graph.nodes.is_empty());
    }

    #[test]
    fn component_type_wire_names() {
        assert_eq!(
            serde_json::to_value(ComponentType::QuestionGenerator).unwrap(),
            json!("question_generator")
        );
        assert_eq!(ComponentType::KpiGrid.as_str(), "kpi_grid");
    }
}
