//! Deterministic mock datasets, shaped exactly like adapter outputs.
//!
//! Data tools fall back to these on backend failure, and `USE_MOCK_DATA`
//! forces them unconditionally. Unknown ids return `None` so the not-found
//! path behaves the same with or without a live backend.

use crate::backend::records::{
    AssignmentInfo, ClassDetail, ClassInfo, GradeRecord, StudentInfo, SubmissionRecord,
};

pub fn teacher_classes() -> Vec<ClassInfo> {
    vec![
        ClassInfo {
            id: "class-hk-f1a".into(),
            name: "Form 1A".into(),
            grade: Some("Form 1".into()),
            subject: Some("English".into()),
            student_count: Some(6),
        },
        ClassInfo {
            id: "class-hk-f1b".into(),
            name: "Form 1B".into(),
            grade: Some("Form 1".into()),
            subject: Some("English".into()),
            student_count: Some(5),
        },
        ClassInfo {
            id: "class-hk-f2a".into(),
            name: "Form 2A".into(),
            grade: Some("Form 2".into()),
            subject: Some("English".into()),
            student_count: Some(5),
        },
    ]
}

pub fn class_detail(class_id: &str) -> Option<ClassDetail> {
    let info = teacher_classes().into_iter().find(|c| c.id == class_id)?;
    let students = match class_id {
        "class-hk-f1a" => vec![
            ("stu-hk-001", "Wong Ka Ho"),
            ("stu-hk-002", "Chan Tai Man"),
            ("stu-hk-003", "Li Mei"),
            ("stu-hk-004", "Cheung Hiu Tung"),
            ("stu-hk-005", "Ng Wing Sze"),
            ("stu-hk-006", "Lam Chi Kin"),
        ],
        "class-hk-f1b" => vec![
            ("stu-hk-011", "Ho Ming Hei"),
            ("stu-hk-012", "Yip Ka Yan"),
            ("stu-hk-013", "Tsang Wai Lam"),
            ("stu-hk-014", "Leung Tsz Ching"),
            ("stu-hk-015", "Mak Cheuk Hin"),
        ],
        "class-hk-f2a" => vec![
            ("stu-hk-021", "Chow Yuen Ting"),
            ("stu-hk-022", "Fung Ka Lok"),
            ("stu-hk-023", "Siu Mei Kwan"),
            ("stu-hk-024", "Tam Ho Yin"),
            ("stu-hk-025", "Au Sze Nga"),
        ],
        _ => return None,
    };
    Some(ClassDetail {
        info,
        students: students
            .into_iter()
            .map(|(id, name)| StudentInfo {
                id: id.into(),
                name: name.into(),
            })
            .collect(),
    })
}

pub fn class_assignments(class_id: &str) -> Option<Vec<AssignmentInfo>> {
    match class_id {
        "class-hk-f1a" => Some(vec![
            AssignmentInfo {
                id: "assign-u4".into(),
                title: "Unit 4 Vocabulary Quiz".into(),
                subject: Some("English".into()),
                due_date: Some("2025-10-03".into()),
                total_score: Some(50.0),
            },
            AssignmentInfo {
                id: "assign-u5".into(),
                title: "Unit 5 Test".into(),
                subject: Some("English".into()),
                due_date: Some("2025-10-24".into()),
                total_score: Some(100.0),
            },
            AssignmentInfo {
                id: "assign-mid".into(),
                title: "Mid-term Exam".into(),
                subject: Some("English".into()),
                due_date: Some("2025-11-14".into()),
                total_score: Some(100.0),
            },
        ]),
        "class-hk-f1b" => Some(vec![
            AssignmentInfo {
                id: "assign-u5b".into(),
                title: "Unit 5 Test".into(),
                subject: Some("English".into()),
                due_date: Some("2025-10-24".into()),
                total_score: Some(100.0),
            },
        ]),
        "class-hk-f2a" => Some(vec![
            AssignmentInfo {
                id: "assign-f2-read".into(),
                title: "Reading Comprehension 3".into(),
                subject: Some("English".into()),
                due_date: Some("2025-10-17".into()),
                total_score: Some(40.0),
            },
        ]),
        _ => None,
    }
}

pub fn assignment_submissions(assignment_id: &str) -> Option<Vec<SubmissionRecord>> {
    let rows: Vec<(&str, &str, f64)> = match assignment_id {
        "assign-u5" => vec![
            ("stu-hk-001", "Wong Ka Ho", 82.0),
            ("stu-hk-002", "Chan Tai Man", 58.0),
            ("stu-hk-003", "Li Mei", 91.0),
            ("stu-hk-004", "Cheung Hiu Tung", 74.0),
            ("stu-hk-005", "Ng Wing Sze", 66.0),
            ("stu-hk-006", "Lam Chi Kin", 45.0),
        ],
        "assign-u4" => vec![
            ("stu-hk-001", "Wong Ka Ho", 38.0),
            ("stu-hk-002", "Chan Tai Man", 31.0),
            ("stu-hk-003", "Li Mei", 47.0),
            ("stu-hk-004", "Cheung Hiu Tung", 35.0),
            ("stu-hk-005", "Ng Wing Sze", 29.0),
            ("stu-hk-006", "Lam Chi Kin", 22.0),
        ],
        "assign-mid" => vec![
            ("stu-hk-001", "Wong Ka Ho", 76.0),
            ("stu-hk-002", "Chan Tai Man", 61.0),
            ("stu-hk-003", "Li Mei", 88.0),
            ("stu-hk-004", "Cheung Hiu Tung", 70.0),
            ("stu-hk-005", "Ng Wing Sze", 72.0),
            ("stu-hk-006", "Lam Chi Kin", 52.0),
        ],
        "assign-u5b" => vec![
            ("stu-hk-011", "Ho Ming Hei", 68.0),
            ("stu-hk-012", "Yip Ka Yan", 79.0),
            ("stu-hk-013", "Tsang Wai Lam", 55.0),
            ("stu-hk-014", "Leung Tsz Ching", 85.0),
            ("stu-hk-015", "Mak Cheuk Hin", 62.0),
        ],
        "assign-f2-read" => vec![
            ("stu-hk-021", "Chow Yuen Ting", 33.0),
            ("stu-hk-022", "Fung Ka Lok", 28.0),
            ("stu-hk-023", "Siu Mei Kwan", 36.0),
            ("stu-hk-024", "Tam Ho Yin", 25.0),
            ("stu-hk-025", "Au Sze Nga", 31.0),
        ],
        _ => return None,
    };
    Some(
        rows.into_iter()
            .map(|(id, name, score)| SubmissionRecord {
                student_id: id.into(),
                student_name: Some(name.into()),
                score: Some(score),
                submitted_at: Some("2025-10-25T09:00:00Z".into()),
                status: Some("graded".into()),
            })
            .collect(),
    )
}

pub fn student_submissions(student_id: &str) -> Option<Vec<GradeRecord>> {
    // Histories exist for the Form 1A roster; other ids are unknown.
    let known = class_detail("class-hk-f1a")?
        .students
        .iter()
        .any(|s| s.id == student_id);
    if !known {
        return None;
    }
    let history: Vec<GradeRecord> = ["assign-u4", "assign-u5", "assign-mid"]
        .iter()
        .filter_map(|aid| {
            let subs = assignment_submissions(aid)?;
            let sub = subs.into_iter().find(|s| s.student_id == student_id)?;
            let title = class_assignments("class-hk-f1a")?
                .into_iter()
                .find(|a| a.id == *aid)
                .map(|a| (a.title, a.total_score));
            let (title, total) = title?;
            Some(GradeRecord {
                assignment_id: (*aid).into(),
                assignment_title: Some(title),
                score: sub.score,
                total_score: total,
                submitted_at: sub.submitted_at,
            })
        })
        .collect();
    Some(history)
}
