//! Data tools: backend adapters behind the mock-fallback policy.
//!
//! A data tool never propagates transport failure: on backend error, open
//! circuit, or timeout it returns the deterministic mock dataset (flagged in
//! logs with `source = "mock"`). A genuinely missing entity returns the
//! `{"error": ...}` sentinel instead, so a required binding can surface a
//! `DATA_ERROR` to the client. `USE_MOCK_DATA` forces mock mode outright.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{json, Value};
use tracing::warn;

use crate::backend::{BackendAdapters, BackendError};
use crate::settings::Settings;

use super::{error_sentinel, mock_data, Tool, ToolError, ToolSpec};

pub const TOOL_GET_TEACHER_CLASSES: &str = "get_teacher_classes";
pub const TOOL_GET_CLASS_DETAIL: &str = "get_class_detail";
pub const TOOL_GET_CLASS_ASSIGNMENTS: &str = "get_class_assignments";
pub const TOOL_GET_ASSIGNMENT_SUBMISSIONS: &str = "get_assignment_submissions";
pub const TOOL_GET_STUDENT_SUBMISSIONS: &str = "get_student_submissions";

fn required_str(args: &Value, key: &str, tool: &str) -> Result<String, ToolError> {
    match args.get(key) {
        Some(Value::String(s)) if !s.trim().is_empty() => Ok(s.clone()),
        Some(Value::Number(n)) => Ok(n.to_string()),
        _ => Err(ToolError::InvalidArgs {
            tool: tool.to_string(),
            message: format!("missing required parameter '{key}'"),
        }),
    }
}

fn mock_or_sentinel<T: Serialize>(
    mock: Option<T>,
    entity: &str,
    entity_type: &str,
) -> Result<Value, ToolError> {
    match mock {
        Some(v) => serde_json::to_value(v).map_err(|e| ToolError::Execution(e.to_string())),
        None => Ok(error_sentinel(
            entity,
            entity_type,
            format!("{entity_type} '{entity}' not found"),
        )),
    }
}

/// Runs the live adapter call under the tool timeout, applying the fallback
/// policy. `mock` is consulted on transport-class failures and timeouts.
async fn fetch_with_fallback<T, F>(
    tool: &str,
    settings: &Settings,
    entity: &str,
    entity_type: &str,
    live: F,
    mock: impl FnOnce() -> Option<T>,
) -> Result<Value, ToolError>
where
    T: Serialize,
    F: Future<Output = Result<T, BackendError>>,
{
    match tokio::time::timeout(settings.tool_timeout, live).await {
        Ok(Ok(v)) => serde_json::to_value(v).map_err(|e| ToolError::Execution(e.to_string())),
        Ok(Err(BackendError::NotFound { .. })) => Ok(error_sentinel(
            entity,
            entity_type,
            format!("{entity_type} '{entity}' not found"),
        )),
        Ok(Err(e @ BackendError::Auth { .. })) => Err(ToolError::Backend(e)),
        Ok(Err(e)) => {
            warn!(tool, source = "mock", error = %e, "backend failed, serving mock data");
            mock_or_sentinel(mock(), entity, entity_type)
        }
        Err(_) => {
            warn!(tool, source = "mock", "backend timed out, serving mock data");
            mock_or_sentinel(mock(), entity, entity_type)
        }
    }
}

/// Lists the teacher's classes.
pub struct GetTeacherClassesTool {
    adapters: Arc<BackendAdapters>,
    settings: Arc<Settings>,
}

impl GetTeacherClassesTool {
    pub fn new(adapters: Arc<BackendAdapters>, settings: Arc<Settings>) -> Self {
        Self { adapters, settings }
    }
}

#[async_trait]
impl Tool for GetTeacherClassesTool {
    fn name(&self) -> &str {
        TOOL_GET_TEACHER_CLASSES
    }

    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: TOOL_GET_TEACHER_CLASSES.into(),
            description: "List all classes the teacher owns (id, name, grade, subject)".into(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "teacherId": {"type": "string", "description": "Verified teacher id"}
                },
                "required": ["teacherId"]
            }),
        }
    }

    async fn call(&self, args: Value) -> Result<Value, ToolError> {
        let teacher_id = required_str(&args, "teacherId", self.name())?;
        if self.settings.use_mock_data() {
            return mock_or_sentinel(Some(mock_data::teacher_classes()), &teacher_id, "teacher");
        }
        fetch_with_fallback(
            self.name(),
            &self.settings,
            &teacher_id,
            "teacher",
            self.adapters.teacher_classes(&teacher_id),
            || Some(mock_data::teacher_classes()),
        )
        .await
    }
}

/// Fetches one class with its roster.
pub struct GetClassDetailTool {
    adapters: Arc<BackendAdapters>,
    settings: Arc<Settings>,
}

impl GetClassDetailTool {
    pub fn new(adapters: Arc<BackendAdapters>, settings: Arc<Settings>) -> Self {
        Self { adapters, settings }
    }
}

#[async_trait]
impl Tool for GetClassDetailTool {
    fn name(&self) -> &str {
        TOOL_GET_CLASS_DETAIL
    }

    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: TOOL_GET_CLASS_DETAIL.into(),
            description: "Fetch one class with its student roster".into(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "teacherId": {"type": "string"},
                    "classId": {"type": "string"}
                },
                "required": ["teacherId", "classId"]
            }),
        }
    }

    async fn call(&self, args: Value) -> Result<Value, ToolError> {
        let teacher_id = required_str(&args, "teacherId", self.name())?;
        let class_id = required_str(&args, "classId", self.name())?;
        if self.settings.use_mock_data() {
            return mock_or_sentinel(mock_data::class_detail(&class_id), &class_id, "class");
        }
        fetch_with_fallback(
            self.name(),
            &self.settings,
            &class_id,
            "class",
            self.adapters.class_detail(&teacher_id, &class_id),
            || mock_data::class_detail(&class_id),
        )
        .await
    }
}

/// Lists a class's assignments.
pub struct GetClassAssignmentsTool {
    adapters: Arc<BackendAdapters>,
    settings: Arc<Settings>,
}

impl GetClassAssignmentsTool {
    pub fn new(adapters: Arc<BackendAdapters>, settings: Arc<Settings>) -> Self {
        Self { adapters, settings }
    }
}

#[async_trait]
impl Tool for GetClassAssignmentsTool {
    fn name(&self) -> &str {
        TOOL_GET_CLASS_ASSIGNMENTS
    }

    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: TOOL_GET_CLASS_ASSIGNMENTS.into(),
            description: "List the assignments of one class (id, title, due date, total score)"
                .into(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "teacherId": {"type": "string"},
                    "classId": {"type": "string"}
                },
                "required": ["teacherId", "classId"]
            }),
        }
    }

    async fn call(&self, args: Value) -> Result<Value, ToolError> {
        let teacher_id = required_str(&args, "teacherId", self.name())?;
        let class_id = required_str(&args, "classId", self.name())?;
        if self.settings.use_mock_data() {
            return mock_or_sentinel(mock_data::class_assignments(&class_id), &class_id, "class");
        }
        fetch_with_fallback(
            self.name(),
            &self.settings,
            &class_id,
            "class",
            self.adapters.class_assignments(&teacher_id, &class_id),
            || mock_data::class_assignments(&class_id),
        )
        .await
    }
}

/// Fetches all submissions for one assignment.
pub struct GetAssignmentSubmissionsTool {
    adapters: Arc<BackendAdapters>,
    settings: Arc<Settings>,
}

impl GetAssignmentSubmissionsTool {
    pub fn new(adapters: Arc<BackendAdapters>, settings: Arc<Settings>) -> Self {
        Self { adapters, settings }
    }
}

#[async_trait]
impl Tool for GetAssignmentSubmissionsTool {
    fn name(&self) -> &str {
        TOOL_GET_ASSIGNMENT_SUBMISSIONS
    }

    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: TOOL_GET_ASSIGNMENT_SUBMISSIONS.into(),
            description: "Fetch every student's submission and score for one assignment".into(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "teacherId": {"type": "string"},
                    "assignmentId": {"type": "string"}
                },
                "required": ["teacherId", "assignmentId"]
            }),
        }
    }

    async fn call(&self, args: Value) -> Result<Value, ToolError> {
        let teacher_id = required_str(&args, "teacherId", self.name())?;
        let assignment_id = required_str(&args, "assignmentId", self.name())?;
        if self.settings.use_mock_data() {
            return mock_or_sentinel(
                mock_data::assignment_submissions(&assignment_id),
                &assignment_id,
                "assignment",
            );
        }
        fetch_with_fallback(
            self.name(),
            &self.settings,
            &assignment_id,
            "assignment",
            self.adapters
                .assignment_submissions(&teacher_id, &assignment_id),
            || mock_data::assignment_submissions(&assignment_id),
        )
        .await
    }
}

/// Fetches one student's graded history.
pub struct GetStudentSubmissionsTool {
    adapters: Arc<BackendAdapters>,
    settings: Arc<Settings>,
}

impl GetStudentSubmissionsTool {
    pub fn new(adapters: Arc<BackendAdapters>, settings: Arc<Settings>) -> Self {
        Self { adapters, settings }
    }
}

#[async_trait]
impl Tool for GetStudentSubmissionsTool {
    fn name(&self) -> &str {
        TOOL_GET_STUDENT_SUBMISSIONS
    }

    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: TOOL_GET_STUDENT_SUBMISSIONS.into(),
            description: "Fetch one student's submission history across assignments".into(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "teacherId": {"type": "string"},
                    "studentId": {"type": "string"}
                },
                "required": ["teacherId", "studentId"]
            }),
        }
    }

    async fn call(&self, args: Value) -> Result<Value, ToolError> {
        let teacher_id = required_str(&args, "teacherId", self.name())?;
        let student_id = required_str(&args, "studentId", self.name())?;
        if self.settings.use_mock_data() {
            return mock_or_sentinel(
                mock_data::student_submissions(&student_id),
                &student_id,
                "student",
            );
        }
        fetch_with_fallback(
            self.name(),
            &self.settings,
            &student_id,
            "student",
            self.adapters.student_submissions(&teacher_id, &student_id),
            || mock_data::student_submissions(&student_id),
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::BackendClient;

    fn tool_fixture() -> (Arc<BackendAdapters>, Arc<Settings>) {
        let settings = Arc::new(Settings::for_tests());
        let client = Arc::new(BackendClient::new(&settings).unwrap());
        (Arc::new(BackendAdapters::new(client)), settings)
    }

    #[tokio::test]
    async fn mock_mode_serves_the_dataset() {
        let (adapters, settings) = tool_fixture();
        let tool = GetTeacherClassesTool::new(adapters, settings);
        let out = tool.call(json!({"teacherId": "t-1"})).await.unwrap();
        let classes = out.as_array().unwrap();
        assert_eq!(classes.len(), 3);
        assert_eq!(classes[0]["name"], "Form 1A");
    }

    #[tokio::test]
    async fn unknown_assignment_returns_the_error_sentinel() {
        let (adapters, settings) = tool_fixture();
        let tool = GetAssignmentSubmissionsTool::new(adapters, settings);
        let out = tool
            .call(json!({"teacherId": "t-1", "assignmentId": "a-missing"}))
            .await
            .unwrap();
        assert!(super::super::is_error_sentinel(&out));
        assert_eq!(out["entity"], "a-missing");
        assert_eq!(out["entityType"], "assignment");
    }

    #[tokio::test]
    async fn missing_parameter_is_invalid_args() {
        let (adapters, settings) = tool_fixture();
        let tool = GetClassDetailTool::new(adapters, settings);
        let err = tool.call(json!({"teacherId": "t-1"})).await.unwrap_err();
        assert!(matches!(err, ToolError::InvalidArgs { .. }));
    }

    #[tokio::test]
    async fn dead_backend_falls_back_to_mock() {
        let (adapters, settings) = tool_fixture();
        settings.set_use_mock_data(false);
        // Base URL points at port 0; the request fails fast and the tool
        // must serve mock data instead of erroring.
        let tool = GetTeacherClassesTool::new(adapters, settings);
        let out = tool.call(json!({"teacherId": "t-1"})).await.unwrap();
        assert_eq!(out.as_array().unwrap().len(), 3);
    }
}
