//! Minimal `.env` reader: KEY=VALUE lines into a map. Application (and the
//! env-wins precedence) happens in the crate root.

use std::collections::HashMap;
use std::path::Path;

/// Reads `.env` from `override_dir` (or the current directory) into a map.
/// A missing file is not an error; it yields an empty map.
pub fn load_env_map(override_dir: Option<&Path>) -> std::io::Result<HashMap<String, String>> {
    let dir = match override_dir {
        Some(d) => d.to_path_buf(),
        None => match std::env::current_dir() {
            Ok(d) => d,
            Err(_) => return Ok(HashMap::new()),
        },
    };
    let path = dir.join(".env");
    if !path.is_file() {
        return Ok(HashMap::new());
    }
    Ok(parse(&std::fs::read_to_string(path)?))
}

/// Parses KEY=VALUE lines. Blank lines and `#` comment lines are skipped;
/// surrounding single or double quotes are stripped (double quotes honor
/// `\"`); no multiline values.
fn parse(content: &str) -> HashMap<String, String> {
    let mut out = HashMap::new();
    for line in content.lines().map(str::trim) {
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        let key = key.trim();
        if key.is_empty() {
            continue;
        }
        out.insert(key.to_string(), unquote(value.trim()));
    }
    out
}

fn unquote(value: &str) -> String {
    if value.len() >= 2 && value.starts_with('"') && value.ends_with('"') {
        return value[1..value.len() - 1].replace("\\\"", "\"");
    }
    if value.len() >= 2 && value.starts_with('\'') && value.ends_with('\'') {
        return value[1..value.len() - 1].to_string();
    }
    value.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_plain_and_quoted_values() {
        let m = parse("A=1\nB=\"two words\"\nC='single'\n");
        assert_eq!(m.get("A").map(String::as_str), Some("1"));
        assert_eq!(m.get("B").map(String::as_str), Some("two words"));
        assert_eq!(m.get("C").map(String::as_str), Some("single"));
    }

    #[test]
    fn skips_comments_blanks_and_malformed_lines() {
        let m = parse("# comment\n\nJUST_A_WORD\n=no_key\nOK=yes\n");
        assert_eq!(m.len(), 1);
        assert_eq!(m.get("OK").map(String::as_str), Some("yes"));
    }

    #[test]
    fn empty_value_is_kept() {
        let m = parse("EMPTY=\n");
        assert_eq!(m.get("EMPTY").map(String::as_str), Some(""));
    }

    #[test]
    fn missing_file_yields_empty_map() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_env_map(Some(dir.path())).unwrap().is_empty());
    }
}
