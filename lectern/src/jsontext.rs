//! Tolerant JSON extraction from LLM output.
//!
//! JSON-mode agents (router, planner, patch agent, structured compose slots)
//! parse the assistant text with these helpers: enclosing markdown code
//! fences are stripped, and as a last resort the first balanced `{..}` region
//! is tried.

use serde_json::Value;

/// Strips a single enclosing ``` fence (with optional language tag) if present.
pub(crate) fn strip_code_fences(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop the language tag line ("json", "yaml", or empty).
    let rest = match rest.split_once('\n') {
        Some((_tag, body)) => body,
        None => rest,
    };
    rest.trim_end().strip_suffix("```").unwrap_or(rest).trim()
}

/// Parses LLM output into a JSON value, tolerating code fences and leading
/// prose. Returns `None` when no JSON object can be recovered.
pub(crate) fn parse_json_lenient(text: &str) -> Option<Value> {
    let stripped = strip_code_fences(text);
    if let Ok(v) = serde_json::from_str(stripped) {
        return Some(v);
    }
    // Last resort: first balanced object in the text.
    let bytes = stripped.as_bytes();
    let start = stripped.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (i, &b) in bytes.iter().enumerate().skip(start) {
        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return serde_json::from_str(&stripped[start..=i]).ok();
                }
            }
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn plain_json_passes_through() {
        assert_eq!(parse_json_lenient(r#"{"a": 1}"#), Some(json!({"a": 1})));
    }

    #[test]
    fn fenced_json_is_unwrapped() {
        let text = "```json\n{\"intent\": \"chat_qa\"}\n```";
        assert_eq!(
            parse_json_lenient(text),
            Some(json!({"intent": "chat_qa"}))
        );
    }

    #[test]
    fn leading_prose_is_skipped() {
        let text = "Sure, here you go: {\"ok\": true} hope that helps";
        assert_eq!(parse_json_lenient(text), Some(json!({"ok": true})));
    }

    #[test]
    fn braces_inside_strings_do_not_confuse_the_scanner() {
        let text = r#"note {"text": "a { b } c"} trailing"#;
        assert_eq!(parse_json_lenient(text), Some(json!({"text": "a { b } c"})));
    }

    #[test]
    fn garbage_yields_none() {
        assert_eq!(parse_json_lenient("no json here"), None);
    }
}
