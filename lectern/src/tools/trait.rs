use async_trait::async_trait;
use serde_json::Value;

use super::ToolError;

/// Specification of one tool: name, human-readable description, and the JSON
/// schema of its arguments. Descriptions are injected into the planner's
/// system prompt so the planner knows which names to emit.
#[derive(Clone, Debug)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

/// A single named operation the executor can invoke.
///
/// Data tools wrap a backend adapter and never propagate transport failures
/// (they fall back to the mock dataset); compute tools are pure functions of
/// their arguments.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Unique name, used by blueprints (`toolName`) and the registry.
    fn name(&self) -> &str;

    /// The tool's spec (description and argument schema).
    fn spec(&self) -> ToolSpec;

    /// Executes the tool with already-resolved arguments.
    async fn call(&self, args: Value) -> Result<Value, ToolError>;
}
