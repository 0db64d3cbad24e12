//! Class alias lexicon: locale variants of class references.
//!
//! "1A", "F1A", "Form 1A", "1A班", and "中一A班" all canonicalize to
//! (grade 1, section A); class names are canonicalized the same way, so an
//! alias match is canonical-form equality.

use once_cell::sync::Lazy;
use regex::Regex;

/// A canonical class reference: grade number plus section letter.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub(crate) struct ClassRef {
    pub grade: u8,
    pub section: char,
}

/// A canonical grade-only reference (for grade expansion).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct GradeRef {
    pub grade: u8,
}

fn chinese_numeral(c: char) -> Option<u8> {
    match c {
        '一' => Some(1),
        '二' => Some(2),
        '三' => Some(3),
        '四' => Some(4),
        '五' => Some(5),
        '六' => Some(6),
        _ => None,
    }
}

// "form 1a", "form 1 a", "f1a", "1a", "1a班" (optionally suffixed 班).
static LATIN_CLASS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(?:form\s*|f)?([1-6])\s*([a-z])班?\b").expect("latin class pattern")
});

// "中一A班", "中一A".
static CHINESE_CLASS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"中([一二三四五六])\s*([A-Za-z])班?").expect("chinese class pattern"));

// Grade-only: "form 1", "f1", "中一". The word boundary after the digit
// already rules out "form 1a"; a trailing section letter after spaces (or
// after the Chinese numeral) is ruled out by peeking at the remainder.
static LATIN_GRADE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(?:form|f)\s*([1-6])\b").expect("latin grade"));
static CHINESE_GRADE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"中([一二三四五六])").expect("chinese grade"));

fn followed_by_section_letter(text: &str, end: usize) -> bool {
    text[end..]
        .trim_start()
        .chars()
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic())
}

/// Collective triggers that turn a grade reference into grade expansion.
const GRADE_TRIGGERS: [&str; 6] = [
    "whole grade",
    "entire grade",
    "all classes",
    "全年级",
    "全年級",
    "全級",
];

/// Every class reference found in the text, in order, deduplicated.
pub(crate) fn class_refs_in(text: &str) -> Vec<ClassRef> {
    let mut refs = Vec::new();
    for cap in LATIN_CLASS.captures_iter(text) {
        let grade = cap[1].parse::<u8>().ok();
        let section = cap[2].chars().next().map(|c| c.to_ascii_uppercase());
        if let (Some(grade), Some(section)) = (grade, section) {
            let r = ClassRef { grade, section };
            if !refs.contains(&r) {
                refs.push(r);
            }
        }
    }
    for cap in CHINESE_CLASS.captures_iter(text) {
        let grade = cap[1].chars().next().and_then(chinese_numeral);
        let section = cap[2].chars().next().map(|c| c.to_ascii_uppercase());
        if let (Some(grade), Some(section)) = (grade, section) {
            let r = ClassRef { grade, section };
            if !refs.contains(&r) {
                refs.push(r);
            }
        }
    }
    refs
}

/// A grade reference, when the text names a grade without a section.
pub(crate) fn grade_ref_in(text: &str) -> Option<GradeRef> {
    for cap in LATIN_GRADE.captures_iter(text) {
        let whole = cap.get(0)?;
        if followed_by_section_letter(text, whole.end()) {
            continue;
        }
        if let Ok(grade) = cap[1].parse::<u8>() {
            return Some(GradeRef { grade });
        }
    }
    for cap in CHINESE_GRADE.captures_iter(text) {
        let whole = cap.get(0)?;
        if followed_by_section_letter(text, whole.end()) {
            continue;
        }
        if let Some(grade) = cap[1].chars().next().and_then(chinese_numeral) {
            return Some(GradeRef { grade });
        }
    }
    None
}

/// True when the text asks for a whole grade collectively.
pub(crate) fn has_grade_trigger(text: &str) -> bool {
    let lower = text.to_lowercase();
    GRADE_TRIGGERS.iter().any(|t| lower.contains(t))
}

/// Canonicalizes a stored class name ("Form 1A", "中一A班") for alias
/// comparison. Names that do not follow a grade-section scheme yield `None`.
pub(crate) fn canonical_class_name(name: &str) -> Option<ClassRef> {
    class_refs_in(name).into_iter().next()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn locale_variants_canonicalize_identically() {
        let expected = ClassRef {
            grade: 1,
            section: 'A',
        };
        for text in ["1A", "F1A", "Form 1A", "form 1 a", "1A班", "中一A班"] {
            assert_eq!(
                class_refs_in(text),
                vec![expected],
                "variant {text:?} should canonicalize to 1A"
            );
        }
    }

    #[test]
    fn multiple_references_are_collected_in_order() {
        let refs = class_refs_in("compare 1A with Form 1B");
        assert_eq!(
            refs,
            vec![
                ClassRef {
                    grade: 1,
                    section: 'A'
                },
                ClassRef {
                    grade: 1,
                    section: 'B'
                }
            ]
        );
    }

    #[test]
    fn grade_only_references() {
        assert_eq!(grade_ref_in("whole grade of Form 1"), Some(GradeRef { grade: 1 }));
        assert_eq!(grade_ref_in("中一全年级"), Some(GradeRef { grade: 1 }));
        assert_eq!(grade_ref_in("Form 1A results"), None, "1A is a class, not a grade");
    }

    #[test]
    fn grade_triggers() {
        assert!(has_grade_trigger("analyze the whole grade"));
        assert!(has_grade_trigger("中一全年级表现"));
        assert!(!has_grade_trigger("analyze Form 1A"));
    }

    #[test]
    fn class_names_canonicalize() {
        assert_eq!(
            canonical_class_name("Form 1A"),
            Some(ClassRef {
                grade: 1,
                section: 'A'
            })
        );
        assert_eq!(canonical_class_name("Robotics Club"), None);
    }
}
