//! Named, typed operations the executor invokes by name.
//!
//! Two families: data tools (backend adapters with a deterministic mock
//! fallback) and compute tools (pure numeric functions). Tools are registered
//! once at startup in a [`ToolRegistry`]; the registry is read-only after.

mod compute;
mod data;
pub mod mock_data;
mod registry;
mod r#trait;

pub use compute::{ComparePopulationsTool, SummaryStatsTool, TOOL_COMPARE_POPULATIONS, TOOL_SUMMARY_STATS};
pub use data::{
    GetAssignmentSubmissionsTool, GetClassAssignmentsTool, GetClassDetailTool,
    GetStudentSubmissionsTool, GetTeacherClassesTool, TOOL_GET_ASSIGNMENT_SUBMISSIONS,
    TOOL_GET_CLASS_ASSIGNMENTS, TOOL_GET_CLASS_DETAIL, TOOL_GET_STUDENT_SUBMISSIONS,
    TOOL_GET_TEACHER_CLASSES,
};
pub use registry::ToolRegistry;
pub use r#trait::{Tool, ToolSpec};

use thiserror::Error;

use crate::backend::BackendError;

/// Errors from tool lookup and execution. Timeouts never surface here: a
/// data tool degrades them into the mock dataset, like any other transport
/// failure.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("unknown tool: {name}")]
    UnknownTool { name: String },
    #[error("invalid arguments for {tool}: {message}")]
    InvalidArgs { tool: String, message: String },
    #[error(transparent)]
    Backend(#[from] BackendError),
    #[error("tool execution failed: {0}")]
    Execution(String),
}

/// Builds the error-sentinel value data tools return when an entity does not
/// exist. The executor treats any result carrying an `error` key as a failed
/// binding.
pub(crate) fn error_sentinel(
    entity: &str,
    entity_type: &str,
    message: impl Into<String>,
) -> serde_json::Value {
    serde_json::json!({
        "error": message.into(),
        "entity": entity,
        "entityType": entity_type,
    })
}

/// True when a tool result signals an error through the sentinel shape.
pub fn is_error_sentinel(value: &serde_json::Value) -> bool {
    value.get("error").is_some()
}
