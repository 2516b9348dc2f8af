//! Variable Resolver (spec §4.6, C6): resolves `{{path}}` references in
//! strings, lists, and maps against an `ExecutionContext`. Grounded on
//! `examples/original_source/_archive/.../variable_resolver.py`: a single
//! regex finds `{{...}}` spans; if the whole string is one reference the
//! resolved `Value` keeps its native type, otherwise references are
//! stringified and substituted in place. Resolution never raises —
//! missing paths resolve to `Value::Null`.

use std::sync::OnceLock;

use chrono::Utc;
use regex::Regex;

use crate::model::job::ExecutionContext;
use crate::model::value::Value;

fn variable_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\{\{([^}]+)\}\}").unwrap())
}

/// Resolve all `{{path}}` references in a `Value`, recursing into lists
/// and maps (spec §4.6: "strings, lists, and maps").
pub fn resolve(value: &Value, ctx: &ExecutionContext) -> Value {
    match value {
        Value::String(s) => resolve_string(s, ctx),
        Value::List(items) => Value::List(items.iter().map(|v| resolve(v, ctx)).collect()),
        Value::Map(map) => Value::Map(
            map.iter()
                .map(|(k, v)| (k.clone(), resolve(v, ctx)))
                .collect(),
        ),
        other => other.clone(),
    }
}

fn resolve_string(text: &str, ctx: &ExecutionContext) -> Value {
    if !text.contains("{{") {
        return Value::String(text.to_string());
    }

    let re = variable_pattern();

    // Whole-string single reference: return the resolved value with its
    // native type (spec §4.6, §8 invariant 6).
    if let Some(caps) = re.captures(text) {
        let whole = caps.get(0).unwrap();
        if whole.start() == 0 && whole.end() == text.len() {
            let path = caps.get(1).unwrap().as_str().trim();
            return resolve_path(path, ctx);
        }
    }

    let mut out = String::new();
    let mut last = 0;
    for caps in re.captures_iter(text) {
        let whole = caps.get(0).unwrap();
        out.push_str(&text[last..whole.start()]);
        let path = caps.get(1).unwrap().as_str().trim();
        out.push_str(&resolve_path(path, ctx).stringify());
        last = whole.end();
    }
    out.push_str(&text[last..]);
    Value::String(out)
}

/// Resolve one `path` (the inside of a single `{{...}}`) against builtins
/// or `ctx.variables` (spec §4.6 path grammar).
fn resolve_path(path: &str, ctx: &ExecutionContext) -> Value {
    if let Some(rest) = path.strip_prefix('$') {
        return resolve_builtin(rest, ctx);
    }
    navigate(path, &Value::Map(ctx.variables.clone()))
}

fn resolve_builtin(rest: &str, ctx: &ExecutionContext) -> Value {
    if rest == "now" {
        return Value::String(Utc::now().to_rfc3339());
    }
    if rest == "today" {
        return Value::String(Utc::now().format("%Y-%m-%d").to_string());
    }
    if let Some(name) = rest.strip_prefix("env.") {
        return std::env::var(name)
            .map(Value::String)
            .unwrap_or(Value::Null);
    }
    if let Some(path) = rest.strip_prefix("workflow.") {
        return navigate(path, ctx.variables.get("$workflow").unwrap_or(&Value::Null));
    }
    if let Some(path) = rest.strip_prefix("execution.") {
        return navigate(path, ctx.variables.get("$execution").unwrap_or(&Value::Null));
    }
    if rest == "input" {
        return ctx.variables.get("$input").cloned().unwrap_or(Value::Null);
    }
    if let Some(path) = rest.strip_prefix("input.") {
        return navigate(path, ctx.variables.get("$input").unwrap_or(&Value::Null));
    }
    if let Some(rest) = rest.strip_prefix("node.") {
        // `$node.<id>.output_data` / `.output` / `.path`
        if let Some((id, path)) = rest.split_once('.') {
            if let Some(node) = ctx.node_results.get(id) {
                let path = path
                    .strip_prefix("output_data")
                    .or_else(|| path.strip_prefix("output"))
                    .unwrap_or(path);
                let path = path.trim_start_matches('.');
                return if path.is_empty() {
                    node.output_data.clone()
                } else {
                    navigate(path, &node.output_data)
                };
            }
        }
        return Value::Null;
    }
    Value::Null
}

/// Navigate a dotted/indexed path (`a.b.c`, `a[0].b`, `a["key"]`) over a
/// `Value`; every miss resolves to `Null` (spec §4.6, §8 invariant 6).
fn navigate(path: &str, root: &Value) -> Value {
    if path.is_empty() {
        return root.clone();
    }
    let mut current = root.clone();
    for segment in split_path(path) {
        current = match segment {
            PathSegment::Field(name) => current.get(&name).cloned().unwrap_or(Value::Null),
            PathSegment::Index(i) => current.index(i).cloned().unwrap_or(Value::Null),
        };
        if current.is_null() {
            return Value::Null;
        }
    }
    current
}

enum PathSegment {
    Field(String),
    Index(usize),
}

fn split_path(path: &str) -> Vec<PathSegment> {
    let mut segments = Vec::new();
    let mut field = String::new();
    let mut chars = path.chars().peekable();

    let flush = |field: &mut String, segments: &mut Vec<PathSegment>| {
        if !field.is_empty() {
            segments.push(PathSegment::Field(std::mem::take(field)));
        }
    };

    while let Some(c) = chars.next() {
        match c {
            '.' => flush(&mut field, &mut segments),
            '[' => {
                flush(&mut field, &mut segments);
                let mut inner = String::new();
                for c2 in chars.by_ref() {
                    if c2 == ']' {
                        break;
                    }
                    inner.push(c2);
                }
                let inner = inner.trim().trim_matches('"').trim_matches('\'');
                if let Ok(idx) = inner.parse::<usize>() {
                    segments.push(PathSegment::Index(idx));
                } else if !inner.is_empty() {
                    segments.push(PathSegment::Field(inner.to_string()));
                }
            }
            other => field.push(other),
        }
    }
    flush(&mut field, &mut segments);
    segments
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn ctx_with(vars: Vec<(&str, Value)>) -> ExecutionContext {
        let mut ctx = ExecutionContext::new(Value::Null);
        for (k, v) in vars {
            ctx.variables.insert(k.to_string(), v);
        }
        ctx
    }

    #[test]
    fn whole_string_reference_keeps_native_type() {
        let mut results = BTreeMap::new();
        results.insert("count".to_string(), Value::Int(5));
        let ctx = ctx_with(vec![("results", Value::Map(results))]);

        let resolved = resolve(&Value::String("{{results.count}}".into()), &ctx);
        assert_eq!(resolved, Value::Int(5));
    }

    #[test]
    fn embedded_reference_is_stringified() {
        let mut results = BTreeMap::new();
        results.insert("count".to_string(), Value::Int(5));
        let ctx = ctx_with(vec![("results", Value::Map(results))]);

        let resolved = resolve(&Value::String("count is {{results.count}}".into()), &ctx);
        assert_eq!(resolved, Value::String("count is 5".to_string()));
    }

    #[test]
    fn missing_path_is_null_never_errors() {
        let ctx = ctx_with(vec![]);
        let resolved = resolve(&Value::String("{{nope.nothing}}".into()), &ctx);
        assert_eq!(resolved, Value::Null);
    }

    #[test]
    fn indexed_path() {
        let list = Value::List(vec![Value::Map({
            let mut m = BTreeMap::new();
            m.insert("ip".to_string(), Value::String("10.0.0.1".into()));
            m
        })]);
        let ctx = ctx_with(vec![("targets", list)]);
        let resolved = resolve(&Value::String("{{targets[0].ip}}".into()), &ctx);
        assert_eq!(resolved, Value::String("10.0.0.1".to_string()));
    }

    #[test]
    fn resolve_recurses_into_maps_and_lists() {
        let ctx = ctx_with(vec![("x", Value::Int(1))]);
        let input = Value::List(vec![Value::String("{{x}}".into())]);
        let resolved = resolve(&input, &ctx);
        assert_eq!(resolved, Value::List(vec![Value::Int(1)]));
    }
}
