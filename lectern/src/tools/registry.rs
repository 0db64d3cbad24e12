//! Process-wide tool catalog, read-only after startup.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use serde_json::Value;

use super::{Tool, ToolError, ToolSpec};

/// Mapping from tool name to implementation.
///
/// **Interaction**: the executor calls tools through [`ToolRegistry::call`];
/// the planner validates blueprints against [`ToolRegistry::names`] and
/// embeds [`ToolRegistry::descriptions_for_prompt`] in its system prompt.
#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a tool under its own name. Last registration wins.
    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        self.tools.insert(tool.name().to_string(), tool);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    /// The registered names, for blueprint validation.
    pub fn names(&self) -> HashSet<String> {
        self.tools.keys().cloned().collect()
    }

    /// All specs, sorted by name for stable prompt text.
    pub fn specs(&self) -> Vec<ToolSpec> {
        let mut specs: Vec<ToolSpec> = self.tools.values().map(|t| t.spec()).collect();
        specs.sort_by(|a, b| a.name.cmp(&b.name));
        specs
    }

    /// One line per tool (`- name: description`), for LLM system prompts.
    pub fn descriptions_for_prompt(&self) -> String {
        self.specs()
            .iter()
            .map(|s| format!("- {}: {}", s.name, s.description))
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Looks up and invokes a tool.
    pub async fn call(&self, name: &str, args: Value) -> Result<Value, ToolError> {
        let tool = self.get(name).ok_or_else(|| ToolError::UnknownTool {
            name: name.to_string(),
        })?;
        tool.call(args).await
    }
}
