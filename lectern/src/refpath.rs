//! The `$PREFIX(.KEY)+` reference grammar used throughout blueprints.
//!
//! A reference string like `$data.submissions` or `$compute.stats.mean` walks
//! one of four scopes. Resolution is a pure function: unknown prefixes and
//! missing paths yield `null`, never an error, and non-`$` values pass
//! through unchanged.

use serde_json::Value;

/// The four scopes a reference may address.
#[derive(Clone, Copy, Debug)]
pub struct Scopes<'a> {
    pub context: &'a Value,
    pub input: &'a Value,
    pub data: &'a Value,
    pub compute: &'a Value,
}

impl<'a> Scopes<'a> {
    fn scope(&self, prefix: &str) -> Option<&'a Value> {
        match prefix {
            "context" => Some(self.context),
            "input" => Some(self.input),
            "data" => Some(self.data),
            "compute" => Some(self.compute),
            _ => None,
        }
    }
}

/// Resolves a `$prefix.path` reference string. Missing paths yield `null`.
pub fn resolve_ref(reference: &str, scopes: &Scopes) -> Value {
    let Some(path) = reference.strip_prefix('$') else {
        return Value::String(reference.to_string());
    };
    let mut parts = path.split('.');
    let Some(prefix) = parts.next() else {
        return Value::Null;
    };
    let Some(mut current) = scopes.scope(prefix) else {
        return Value::Null;
    };
    for key in parts {
        match current.get(key) {
            Some(next) => current = next,
            None => return Value::Null,
        }
    }
    current.clone()
}

/// Resolves one value: `$`-prefixed strings are dereferenced, everything else
/// passes through unchanged (`resolve(literal(x)) == x`).
pub fn resolve_value(value: &Value, scopes: &Scopes) -> Value {
    match value {
        Value::String(s) if s.starts_with('$') => resolve_ref(s, scopes),
        other => other.clone(),
    }
}

/// Recursively rewrites a parameter bag, resolving every `$` reference inside
/// maps and sequences. Identity on bags with no references.
pub fn resolve_all(bag: &Value, scopes: &Scopes) -> Value {
    match bag {
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), resolve_all(v, scopes)))
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.iter().map(|v| resolve_all(v, scopes)).collect()),
        other => resolve_value(other, scopes),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn scopes<'a>(
        context: &'a Value,
        input: &'a Value,
        data: &'a Value,
        compute: &'a Value,
    ) -> Scopes<'a> {
        Scopes {
            context,
            input,
            data,
            compute,
        }
    }

    #[test]
    fn walks_nested_paths() {
        let compute = json!({"stats": {"mean": 73.5}});
        let null = Value::Null;
        let s = scopes(&null, &null, &null, &compute);
        assert_eq!(resolve_ref("$compute.stats.mean", &s), json!(73.5));
    }

    #[test]
    fn missing_paths_yield_null_not_error() {
        let data = json!({"submissions": []});
        let null = Value::Null;
        let s = scopes(&null, &null, &data, &null);
        assert_eq!(resolve_ref("$data.absent", &s), Value::Null);
        assert_eq!(resolve_ref("$data.submissions.nothere", &s), Value::Null);
        assert_eq!(resolve_ref("$bogus.x", &s), Value::Null);
    }

    #[test]
    fn literals_pass_through() {
        let null = Value::Null;
        let s = scopes(&null, &null, &null, &null);
        assert_eq!(resolve_value(&json!("plain"), &s), json!("plain"));
        assert_eq!(resolve_value(&json!(42), &s), json!(42));
        assert_eq!(resolve_value(&json!(true), &s), json!(true));
    }

    #[test]
    fn resolve_all_rewrites_nested_bags() {
        let context = json!({"classId": "class-hk-f1a"});
        let data = json!({"submissions": [{"score": 88.0}]});
        let null = Value::Null;
        let s = scopes(&context, &null, &data, &null);
        let bag = json!({
            "classId": "$context.classId",
            "rows": "$data.submissions",
            "limit": 10,
            "nested": {"also": "$context.classId"}
        });
        assert_eq!(
            resolve_all(&bag, &s),
            json!({
                "classId": "class-hk-f1a",
                "rows": [{"score": 88.0}],
                "limit": 10,
                "nested": {"also": "class-hk-f1a"}
            })
        );
    }

    #[test]
    fn resolve_all_is_identity_without_references() {
        let null = Value::Null;
        let s = scopes(&null, &null, &null, &null);
        let bag = json!({"a": 1, "b": ["x", {"c": true}]});
        assert_eq!(resolve_all(&bag, &s), bag);
    }
}
