//! Deterministic entity resolution: free text → stable ids.
//!
//! A fixed four-layer ladder (exact, alias, grade expansion, fuzzy); higher
//! layers short-circuit lower ones. No LLM involved. Student and assignment
//! references only resolve under a class context; without one they degrade to
//! `missing_context` instead of guessing.

mod alias;
mod fuzzy;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::warn;

use crate::backend::records::{AssignmentInfo, ClassDetail, ClassInfo};
use crate::tools::{
    is_error_sentinel, ToolRegistry, TOOL_GET_CLASS_ASSIGNMENTS, TOOL_GET_CLASS_DETAIL,
    TOOL_GET_TEACHER_CLASSES,
};

/// Fuzzy-layer minimum similarity.
const FUZZY_THRESHOLD: f64 = 0.6;

/// Texts at or under this length are treated as parameter-shaped (a clarify
/// reply like "Li Mei"), so name matching runs without an explicit marker.
const SHORT_TEXT_LEN: usize = 24;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    Class,
    Student,
    Assignment,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchType {
    Exact,
    Alias,
    Fuzzy,
    GradeExpansion,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScopeMode {
    #[default]
    None,
    Single,
    Multi,
}

/// One resolved entity. Exact and alias matches always carry confidence 1.0.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedEntity {
    pub entity_type: EntityType,
    pub entity_id: String,
    pub display_name: String,
    pub confidence: f64,
    pub match_type: MatchType,
}

/// Output of one resolution pass.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolveResult {
    pub entities: Vec<ResolvedEntity>,
    pub scope_mode: ScopeMode,
    pub is_ambiguous: bool,
    pub missing_context: Vec<String>,
}

impl ResolveResult {
    fn none() -> Self {
        Self::default()
    }

    /// Resolved classes, in match order.
    pub fn classes(&self) -> impl Iterator<Item = &ResolvedEntity> {
        self.entities
            .iter()
            .filter(|e| e.entity_type == EntityType::Class)
    }

    pub fn student(&self) -> Option<&ResolvedEntity> {
        self.entities
            .iter()
            .find(|e| e.entity_type == EntityType::Student)
    }

    pub fn assignment(&self) -> Option<&ResolvedEntity> {
        self.entities
            .iter()
            .find(|e| e.entity_type == EntityType::Assignment)
    }
}

const STUDENT_MARKERS: [&str; 5] = ["student", "pupil", "学生", "學生", "同学"];
const ASSIGNMENT_MARKERS: [&str; 10] = [
    "assignment",
    "homework",
    "quiz",
    "exam",
    "作业",
    "作業",
    "功课",
    "测验",
    "測驗",
    "考试",
];

fn normalize(s: &str) -> String {
    s.to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Best fuzzy similarity of `name` against same-length word windows of
/// `text` (both normalized).
fn best_window_similarity(name: &str, text: &str) -> f64 {
    let name = normalize(name);
    let text = normalize(text);
    if name.is_empty() || text.is_empty() {
        return 0.0;
    }
    let words: Vec<&str> = text.split(' ').collect();
    let name_words = name.split(' ').count();
    let mut best = fuzzy::similarity(&name, &text);
    // A misspelling can merge or split words, so neighboring window sizes
    // are tried too.
    for window in name_words.saturating_sub(1).max(1)..=(name_words + 1) {
        let window = window.min(words.len());
        for start in 0..=(words.len() - window) {
            let candidate = words[start..start + window].join(" ");
            best = best.max(fuzzy::similarity(&name, &candidate));
        }
    }
    best
}

fn contains_any(text_lower: &str, markers: &[&str]) -> bool {
    markers.iter().any(|m| text_lower.contains(m))
}

/// Deterministic, non-LLM resolver over the teacher's own data, fetched
/// through the data tools (so mock fallback applies transparently).
pub struct EntityResolver {
    registry: Arc<ToolRegistry>,
}

impl EntityResolver {
    pub fn new(registry: Arc<ToolRegistry>) -> Self {
        Self { registry }
    }

    /// Resolves free text against the teacher's classes, students, and
    /// assignments. Any tool failure degrades to an empty result; it never
    /// errors.
    pub async fn resolve(
        &self,
        teacher_id: &str,
        free_text: &str,
        current_context: &Value,
    ) -> ResolveResult {
        let text = free_text.trim();
        if text.is_empty() {
            return ResolveResult::none();
        }

        let Some(classes) = self.fetch_classes(teacher_id).await else {
            return ResolveResult::none();
        };

        let mut result = ResolveResult::none();
        self.resolve_classes(text, &classes, &mut result);

        // Class context for dependent references: resolved here, or carried
        // in the caller's context.
        let class_context: Option<String> = result
            .classes()
            .next()
            .map(|e| e.entity_id.clone())
            .or_else(|| {
                current_context
                    .get("classId")
                    .and_then(Value::as_str)
                    .map(str::to_string)
            });

        let text_lower = text.to_lowercase();
        let short_text = text.chars().count() <= SHORT_TEXT_LEN;
        let wants_student = contains_any(&text_lower, &STUDENT_MARKERS) || short_text;
        let wants_assignment = contains_any(&text_lower, &ASSIGNMENT_MARKERS) || short_text;

        if wants_student || wants_assignment {
            match class_context {
                None => {
                    // A dependent reference without its parent: ask for the
                    // class instead of guessing.
                    if contains_any(&text_lower, &STUDENT_MARKERS)
                        || contains_any(&text_lower, &ASSIGNMENT_MARKERS)
                    {
                        result.missing_context.push("class".to_string());
                    }
                }
                Some(class_id) => {
                    if wants_student {
                        self.resolve_student(teacher_id, &class_id, text, &mut result)
                            .await;
                    }
                    if wants_assignment {
                        self.resolve_assignment(teacher_id, &class_id, text, &mut result)
                            .await;
                    }
                }
            }
        }

        let class_count = result.classes().count();
        result.scope_mode = match class_count {
            0 => ScopeMode::None,
            1 => ScopeMode::Single,
            _ => ScopeMode::Multi,
        };
        result
    }

    async fn fetch_classes(&self, teacher_id: &str) -> Option<Vec<ClassInfo>> {
        let value = match self
            .registry
            .call(TOOL_GET_TEACHER_CLASSES, json!({"teacherId": teacher_id}))
            .await
        {
            Ok(v) => v,
            Err(e) => {
                warn!(error = %e, "class fetch failed during resolution");
                return None;
            }
        };
        if is_error_sentinel(&value) {
            return None;
        }
        serde_json::from_value(value).ok()
    }

    fn resolve_classes(&self, text: &str, classes: &[ClassInfo], result: &mut ResolveResult) {
        let text_norm = normalize(text);

        // Layer 1: exact (normalized name containment).
        let exact: Vec<&ClassInfo> = classes
            .iter()
            .filter(|c| !c.name.is_empty() && text_norm.contains(&normalize(&c.name)))
            .collect();
        if !exact.is_empty() {
            for c in exact {
                result.entities.push(ResolvedEntity {
                    entity_type: EntityType::Class,
                    entity_id: c.id.clone(),
                    display_name: c.name.clone(),
                    confidence: 1.0,
                    match_type: MatchType::Exact,
                });
            }
            return;
        }

        // Layer 2: alias lexicon (locale variants, digit-letter patterns).
        let refs = alias::class_refs_in(text);
        if !refs.is_empty() {
            let mut matched = false;
            for r in &refs {
                for c in classes {
                    if alias::canonical_class_name(&c.name) == Some(*r) {
                        matched = true;
                        result.entities.push(ResolvedEntity {
                            entity_type: EntityType::Class,
                            entity_id: c.id.clone(),
                            display_name: c.name.clone(),
                            confidence: 1.0,
                            match_type: MatchType::Alias,
                        });
                    }
                }
            }
            if matched {
                return;
            }
        }

        // Layer 3: grade expansion on a collective trigger.
        if alias::has_grade_trigger(text) {
            if let Some(grade) = alias::grade_ref_in(text) {
                let mut matched = false;
                for c in classes {
                    let class_grade = alias::canonical_class_name(&c.name).map(|r| r.grade);
                    if class_grade == Some(grade.grade) {
                        matched = true;
                        result.entities.push(ResolvedEntity {
                            entity_type: EntityType::Class,
                            entity_id: c.id.clone(),
                            display_name: c.name.clone(),
                            confidence: 1.0,
                            match_type: MatchType::GradeExpansion,
                        });
                    }
                }
                if matched {
                    return;
                }
            }
        }

        // Layer 4: fuzzy.
        let mut candidates: Vec<(&ClassInfo, f64)> = classes
            .iter()
            .map(|c| (c, best_window_similarity(&c.name, text)))
            .filter(|(_, s)| *s >= FUZZY_THRESHOLD)
            .collect();
        candidates.sort_by(|a, b| b.1.total_cmp(&a.1));
        if candidates.len() > 1 {
            result.is_ambiguous = true;
        }
        for (c, s) in candidates {
            result.entities.push(ResolvedEntity {
                entity_type: EntityType::Class,
                entity_id: c.id.clone(),
                display_name: c.name.clone(),
                confidence: s,
                match_type: MatchType::Fuzzy,
            });
        }
    }

    async fn resolve_student(
        &self,
        teacher_id: &str,
        class_id: &str,
        text: &str,
        result: &mut ResolveResult,
    ) {
        let value = match self
            .registry
            .call(
                TOOL_GET_CLASS_DETAIL,
                json!({"teacherId": teacher_id, "classId": class_id}),
            )
            .await
        {
            Ok(v) if !is_error_sentinel(&v) => v,
            Ok(_) | Err(_) => return,
        };
        let Ok(detail) = serde_json::from_value::<ClassDetail>(value) else {
            return;
        };

        let text_norm = normalize(text);
        // Exact containment first.
        for s in &detail.students {
            if !s.name.is_empty() && text_norm.contains(&normalize(&s.name)) {
                result.entities.push(ResolvedEntity {
                    entity_type: EntityType::Student,
                    entity_id: s.id.clone(),
                    display_name: s.name.clone(),
                    confidence: 1.0,
                    match_type: MatchType::Exact,
                });
                return;
            }
        }
        // Fuzzy over roster names.
        let mut candidates: Vec<(&crate::backend::records::StudentInfo, f64)> = detail
            .students
            .iter()
            .map(|s| (s, best_window_similarity(&s.name, text)))
            .filter(|(_, s)| *s >= FUZZY_THRESHOLD)
            .collect();
        candidates.sort_by(|a, b| b.1.total_cmp(&a.1));
        if candidates.len() > 1 {
            result.is_ambiguous = true;
        }
        for (s, score) in candidates {
            result.entities.push(ResolvedEntity {
                entity_type: EntityType::Student,
                entity_id: s.id.clone(),
                display_name: s.name.clone(),
                confidence: score,
                match_type: MatchType::Fuzzy,
            });
        }
    }

    async fn resolve_assignment(
        &self,
        teacher_id: &str,
        class_id: &str,
        text: &str,
        result: &mut ResolveResult,
    ) {
        let value = match self
            .registry
            .call(
                TOOL_GET_CLASS_ASSIGNMENTS,
                json!({"teacherId": teacher_id, "classId": class_id}),
            )
            .await
        {
            Ok(v) if !is_error_sentinel(&v) => v,
            Ok(_) | Err(_) => return,
        };
        let Ok(assignments) = serde_json::from_value::<Vec<AssignmentInfo>>(value) else {
            return;
        };

        let text_norm = normalize(text);
        for a in &assignments {
            if !a.title.is_empty() && text_norm.contains(&normalize(&a.title)) {
                result.entities.push(ResolvedEntity {
                    entity_type: EntityType::Assignment,
                    entity_id: a.id.clone(),
                    display_name: a.title.clone(),
                    confidence: 1.0,
                    match_type: MatchType::Exact,
                });
                return;
            }
        }
        let mut candidates: Vec<(&AssignmentInfo, f64)> = assignments
            .iter()
            .map(|a| (a, best_window_similarity(&a.title, text)))
            .filter(|(_, s)| *s >= FUZZY_THRESHOLD)
            .collect();
        candidates.sort_by(|a, b| b.1.total_cmp(&a.1));
        if candidates.len() > 1 {
            result.is_ambiguous = true;
        }
        for (a, score) in candidates {
            result.entities.push(ResolvedEntity {
                entity_type: EntityType::Assignment,
                entity_id: a.id.clone(),
                display_name: a.title.clone(),
                confidence: score,
                match_type: MatchType::Fuzzy,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{BackendAdapters, BackendClient};
    use crate::settings::Settings;
    use crate::tools::{
        GetClassAssignmentsTool, GetClassDetailTool, GetTeacherClassesTool,
    };

    fn resolver_fixture() -> EntityResolver {
        let settings = Arc::new(Settings::for_tests());
        let client = Arc::new(BackendClient::new(&settings).unwrap());
        let adapters = Arc::new(BackendAdapters::new(client));
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(GetTeacherClassesTool::new(
            adapters.clone(),
            settings.clone(),
        )));
        registry.register(Arc::new(GetClassDetailTool::new(
            adapters.clone(),
            settings.clone(),
        )));
        registry.register(Arc::new(GetClassAssignmentsTool::new(
            adapters,
            settings,
        )));
        EntityResolver::new(Arc::new(registry))
    }

    #[tokio::test]
    async fn exact_class_match_binds_with_full_confidence() {
        let r = resolver_fixture();
        let out = r
            .resolve("t-1", "Analyze Form 1A English Unit 5 test", &json!({}))
            .await;
        let class = out.classes().next().expect("class resolved");
        assert_eq!(class.entity_id, "class-hk-f1a");
        assert_eq!(class.match_type, MatchType::Exact);
        assert_eq!(class.confidence, 1.0);
        assert_eq!(out.scope_mode, ScopeMode::Single);
        assert!(out.missing_context.is_empty());
    }

    #[tokio::test]
    async fn alias_variants_resolve_to_the_same_class() {
        let r = resolver_fixture();
        for text in ["analyze 1A results", "看看中一A班的表现"] {
            let out = r.resolve("t-1", text, &json!({})).await;
            let class = out.classes().next().expect("alias resolved");
            assert_eq!(class.entity_id, "class-hk-f1a", "text: {text}");
            assert_eq!(class.match_type, MatchType::Alias);
            assert_eq!(class.confidence, 1.0);
        }
    }

    #[tokio::test]
    async fn grade_trigger_expands_to_every_class_in_grade() {
        let r = resolver_fixture();
        let out = r
            .resolve("t-1", "analyze the whole grade of Form 1", &json!({}))
            .await;
        let ids: Vec<&str> = out.classes().map(|e| e.entity_id.as_str()).collect();
        assert_eq!(ids, vec!["class-hk-f1a", "class-hk-f1b"]);
        assert!(out
            .classes()
            .all(|e| e.match_type == MatchType::GradeExpansion));
        assert_eq!(out.scope_mode, ScopeMode::Multi);
    }

    #[tokio::test]
    async fn student_without_class_context_is_missing_context() {
        let r = resolver_fixture();
        let out = r
            .resolve("t-1", "analyze student Wong Ka Ho", &json!({}))
            .await;
        assert!(out.student().is_none());
        assert_eq!(out.missing_context, vec!["class".to_string()]);
        assert_eq!(out.scope_mode, ScopeMode::None);
    }

    #[tokio::test]
    async fn student_resolves_under_carried_class_context() {
        let r = resolver_fixture();
        let out = r
            .resolve(
                "t-1",
                "analyze student Wong Ka Ho",
                &json!({"classId": "class-hk-f1a"}),
            )
            .await;
        let student = out.student().expect("student resolved");
        assert_eq!(student.entity_id, "stu-hk-001");
        assert_eq!(student.match_type, MatchType::Exact);
        assert!(out.missing_context.is_empty());
    }

    #[tokio::test]
    async fn short_reply_resolves_a_student_name_without_marker() {
        let r = resolver_fixture();
        let out = r
            .resolve("t-1", "Li Mei", &json!({"classId": "class-hk-f1a"}))
            .await;
        let student = out.student().expect("student resolved from short reply");
        assert_eq!(student.entity_id, "stu-hk-003");
    }

    #[tokio::test]
    async fn misspelled_student_falls_through_to_fuzzy() {
        let r = resolver_fixture();
        let out = r
            .resolve(
                "t-1",
                "analyze student Wong Kaho",
                &json!({"classId": "class-hk-f1a"}),
            )
            .await;
        let student = out.student().expect("fuzzy student resolved");
        assert_eq!(student.entity_id, "stu-hk-001");
        assert_eq!(student.match_type, MatchType::Fuzzy);
        assert!(student.confidence >= 0.6 && student.confidence < 1.0);
    }

    #[tokio::test]
    async fn empty_text_resolves_to_nothing_without_tool_calls() {
        let r = resolver_fixture();
        let out = r.resolve("t-1", "   ", &json!({})).await;
        assert_eq!(out, ResolveResult::none());
    }

    #[tokio::test]
    async fn assignment_resolves_with_marker_and_class() {
        let r = resolver_fixture();
        let out = r
            .resolve(
                "t-1",
                "how did the Unit 5 Test exam go in Form 1A",
                &json!({}),
            )
            .await;
        let assignment = out.assignment().expect("assignment resolved");
        assert_eq!(assignment.entity_id, "assign-u5");
        assert_eq!(assignment.match_type, MatchType::Exact);
    }
}
