//! Adapters from upstream DTOs to internal records.
//!
//! Every upstream payload is wrapped as `{code, message, data, timestamp}`;
//! adapters unwrap it, fail on `code != 200`, and tolerate the upstream
//! `uid`/`id` duality (preferring `uid`). The adapter forwards caller ids
//! verbatim; it performs no numeric/UUID coercion.

use std::sync::Arc;

use serde::Deserialize;
use serde_json::Value;

use super::records::{
    AssignmentInfo, ClassDetail, ClassInfo, GradeRecord, StudentInfo, SubmissionRecord,
};
use super::{BackendClient, BackendError};

/// The upstream response envelope.
#[derive(Debug, Deserialize)]
struct Envelope {
    code: i64,
    #[serde(default)]
    message: String,
    #[serde(default)]
    data: Value,
}

fn unwrap_envelope(body: Value, what: &str) -> Result<Value, BackendError> {
    let envelope: Envelope =
        serde_json::from_value(body).map_err(|e| BackendError::Decode(e.to_string()))?;
    match envelope.code {
        200 => Ok(envelope.data),
        404 => Err(BackendError::NotFound {
            what: what.to_string(),
        }),
        code => Err(BackendError::Envelope {
            code,
            message: envelope.message,
        }),
    }
}

/// Upstream identity fields: some endpoints send `uid`, some `id`, some both.
#[derive(Debug, Default, Deserialize)]
struct Ident {
    #[serde(default)]
    uid: Option<Value>,
    #[serde(default)]
    id: Option<Value>,
}

impl Ident {
    fn into_string(self, what: &str) -> Result<String, BackendError> {
        let raw = self.uid.or(self.id).ok_or_else(|| BackendError::Decode(
            format!("{what}: neither uid nor id present"),
        ))?;
        Ok(match raw {
            Value::String(s) => s,
            Value::Number(n) => n.to_string(),
            other => other.to_string(),
        })
    }
}

#[derive(Debug, Deserialize)]
struct ClassDto {
    #[serde(flatten)]
    ident: Ident,
    #[serde(default, alias = "className")]
    name: Option<String>,
    #[serde(default, alias = "gradeName")]
    grade: Option<String>,
    #[serde(default)]
    subject: Option<String>,
    #[serde(default, alias = "studentCount")]
    student_count: Option<u32>,
}

impl ClassDto {
    fn into_record(self) -> Result<ClassInfo, BackendError> {
        Ok(ClassInfo {
            id: self.ident.into_string("class")?,
            name: self.name.unwrap_or_default(),
            grade: self.grade,
            subject: self.subject,
            student_count: self.student_count,
        })
    }
}

#[derive(Debug, Deserialize)]
struct StudentDto {
    #[serde(flatten)]
    ident: Ident,
    #[serde(default, alias = "studentName")]
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ClassDetailDto {
    #[serde(flatten)]
    class: ClassDto,
    #[serde(default)]
    students: Vec<StudentDto>,
}

#[derive(Debug, Deserialize)]
struct AssignmentDto {
    #[serde(flatten)]
    ident: Ident,
    #[serde(default, alias = "assignmentTitle", alias = "name")]
    title: Option<String>,
    #[serde(default)]
    subject: Option<String>,
    #[serde(default, alias = "dueDate")]
    due_date: Option<String>,
    #[serde(default, alias = "totalScore")]
    total_score: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct SubmissionDto {
    #[serde(default, rename = "studentUid")]
    student_uid: Option<Value>,
    #[serde(default, rename = "studentId")]
    student_id: Option<Value>,
    #[serde(default, alias = "studentName")]
    student_name: Option<String>,
    #[serde(default)]
    score: Option<f64>,
    #[serde(default, alias = "submittedAt", alias = "submitTime")]
    submitted_at: Option<String>,
    #[serde(default)]
    status: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GradeDto {
    #[serde(default, rename = "assignmentUid")]
    assignment_uid: Option<Value>,
    #[serde(default, rename = "assignmentId")]
    assignment_id: Option<Value>,
    #[serde(default, alias = "assignmentTitle")]
    assignment_title: Option<String>,
    #[serde(default)]
    score: Option<f64>,
    #[serde(default, alias = "totalScore")]
    total_score: Option<f64>,
    #[serde(default, alias = "submittedAt")]
    submitted_at: Option<String>,
}

fn value_to_id(raw: Option<Value>, what: &str) -> Result<String, BackendError> {
    match raw {
        Some(Value::String(s)) => Ok(s),
        Some(Value::Number(n)) => Ok(n.to_string()),
        Some(other) => Ok(other.to_string()),
        None => Err(BackendError::Decode(format!("{what}: missing id"))),
    }
}

/// Typed views over the upstream endpoints.
pub struct BackendAdapters {
    client: Arc<BackendClient>,
}

impl BackendAdapters {
    pub fn new(client: Arc<BackendClient>) -> Self {
        Self { client }
    }

    /// `GET /teacher/{id}/classes/me`
    pub async fn teacher_classes(&self, teacher_id: &str) -> Result<Vec<ClassInfo>, BackendError> {
        let body = self
            .client
            .get_json(&format!("/teacher/{teacher_id}/classes/me"))
            .await?;
        let data = unwrap_envelope(body, "classes")?;
        let dtos: Vec<ClassDto> =
            serde_json::from_value(data).map_err(|e| BackendError::Decode(e.to_string()))?;
        dtos.into_iter().map(ClassDto::into_record).collect()
    }

    /// `GET /teacher/{id}/classes/{classId}`
    pub async fn class_detail(
        &self,
        teacher_id: &str,
        class_id: &str,
    ) -> Result<ClassDetail, BackendError> {
        let body = self
            .client
            .get_json(&format!("/teacher/{teacher_id}/classes/{class_id}"))
            .await?;
        let data = unwrap_envelope(body, "class")?;
        let dto: ClassDetailDto =
            serde_json::from_value(data).map_err(|e| BackendError::Decode(e.to_string()))?;
        let info = dto.class.into_record()?;
        let students = dto
            .students
            .into_iter()
            .map(|s| {
                Ok(StudentInfo {
                    id: s.ident.into_string("student")?,
                    name: s.name.unwrap_or_default(),
                })
            })
            .collect::<Result<Vec<_>, BackendError>>()?;
        Ok(ClassDetail { info, students })
    }

    /// `GET /teacher/{id}/classes/{classId}/assignments`
    pub async fn class_assignments(
        &self,
        teacher_id: &str,
        class_id: &str,
    ) -> Result<Vec<AssignmentInfo>, BackendError> {
        let body = self
            .client
            .get_json(&format!(
                "/teacher/{teacher_id}/classes/{class_id}/assignments"
            ))
            .await?;
        let data = unwrap_envelope(body, "assignments")?;
        let dtos: Vec<AssignmentDto> =
            serde_json::from_value(data).map_err(|e| BackendError::Decode(e.to_string()))?;
        dtos.into_iter()
            .map(|d| {
                Ok(AssignmentInfo {
                    id: d.ident.into_string("assignment")?,
                    title: d.title.unwrap_or_default(),
                    subject: d.subject,
                    due_date: d.due_date,
                    total_score: d.total_score,
                })
            })
            .collect()
    }

    /// `GET /teacher/{id}/submissions/assignments/{assignmentId}`
    pub async fn assignment_submissions(
        &self,
        teacher_id: &str,
        assignment_id: &str,
    ) -> Result<Vec<SubmissionRecord>, BackendError> {
        let body = self
            .client
            .get_json(&format!(
                "/teacher/{teacher_id}/submissions/assignments/{assignment_id}"
            ))
            .await?;
        let data = unwrap_envelope(body, "submissions")?;
        let dtos: Vec<SubmissionDto> =
            serde_json::from_value(data).map_err(|e| BackendError::Decode(e.to_string()))?;
        dtos.into_iter()
            .map(|d| {
                Ok(SubmissionRecord {
                    student_id: value_to_id(d.student_uid.or(d.student_id), "submission")?,
                    student_name: d.student_name,
                    score: d.score,
                    submitted_at: d.submitted_at,
                    status: d.status,
                })
            })
            .collect()
    }

    /// `GET /teacher/{id}/submissions/students/{studentId}`
    pub async fn student_submissions(
        &self,
        teacher_id: &str,
        student_id: &str,
    ) -> Result<Vec<GradeRecord>, BackendError> {
        let body = self
            .client
            .get_json(&format!(
                "/teacher/{teacher_id}/submissions/students/{student_id}"
            ))
            .await?;
        let data = unwrap_envelope(body, "student submissions")?;
        let dtos: Vec<GradeDto> =
            serde_json::from_value(data).map_err(|e| BackendError::Decode(e.to_string()))?;
        dtos.into_iter()
            .map(|d| {
                Ok(GradeRecord {
                    assignment_id: value_to_id(d.assignment_uid.or(d.assignment_id), "grade")?,
                    assignment_title: d.assignment_title,
                    score: d.score,
                    total_score: d.total_score,
                    submitted_at: d.submitted_at,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn envelope_code_200_unwraps_data() {
        let body = json!({"code": 200, "message": "ok", "data": [1, 2], "timestamp": 0});
        assert_eq!(unwrap_envelope(body, "x").unwrap(), json!([1, 2]));
    }

    #[test]
    fn envelope_non_200_fails() {
        let body = json!({"code": 500, "message": "boom", "data": null, "timestamp": 0});
        let err = unwrap_envelope(body, "x").unwrap_err();
        assert!(matches!(err, BackendError::Envelope { code: 500, .. }));

        let body = json!({"code": 404, "message": "none", "data": null, "timestamp": 0});
        assert!(matches!(
            unwrap_envelope(body, "x").unwrap_err(),
            BackendError::NotFound { .. }
        ));
    }

    #[test]
    fn uid_is_preferred_over_id() {
        let dto: ClassDto = serde_json::from_value(json!({
            "uid": "class-uid-1",
            "id": 42,
            "className": "Form 1A"
        }))
        .unwrap();
        let rec = dto.into_record().unwrap();
        assert_eq!(rec.id, "class-uid-1");
        assert_eq!(rec.name, "Form 1A");
    }

    #[test]
    fn numeric_id_is_stringified() {
        let dto: ClassDto = serde_json::from_value(json!({"id": 7, "name": "Form 1B"})).unwrap();
        assert_eq!(dto.into_record().unwrap().id, "7");
    }

    #[test]
    fn missing_both_ids_is_a_decode_error() {
        let dto: ClassDto = serde_json::from_value(json!({"name": "ghost"})).unwrap();
        assert!(matches!(
            dto.into_record().unwrap_err(),
            BackendError::Decode(_)
        ));
    }
}
