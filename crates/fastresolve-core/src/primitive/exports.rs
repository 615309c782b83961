//! Package.json `exports` / `imports` evaluation.
//!
//! Node-compatible subset:
//! - Root exports (`"exports": "./index.js"`, `{ ".": ... }`, root conditions)
//! - Subpath exports (`"./feature"`)
//! - Pattern exports with a single `*`
//! - Conditional targets, matched in object key order against the active
//!   condition names (`default` always matches)
//! - `#`-prefixed entries of the `imports` field

use serde_json::{Map, Value};

/// Resolve exports for the package root (`subpath == None`) or a `./sub` path.
///
/// Returns the target path (starting with "./") if found.
#[must_use]
pub fn resolve_exports(
    pkg_json: &Value,
    subpath: Option<&str>,
    conditions: &[String],
) -> Option<String> {
    match subpath {
        None => resolve_exports_root(pkg_json, conditions),
        Some(sub) => resolve_exports_subpath(pkg_json, sub, conditions)
            .or_else(|| resolve_exports_pattern(pkg_json, sub, conditions)),
    }
}

/// Whether the package declares an `exports` field at all.
#[must_use]
pub fn has_exports(pkg_json: &Value) -> bool {
    pkg_json.get("exports").is_some_and(|v| !v.is_null())
}

fn resolve_exports_root(pkg_json: &Value, conditions: &[String]) -> Option<String> {
    let exports = pkg_json.get("exports")?;

    if let Some(s) = exports.as_str() {
        return validate_export_path(s);
    }
    if exports.is_array() {
        return resolve_export_target(exports, conditions);
    }

    let obj = exports.as_object()?;
    if let Some(dot) = obj.get(".") {
        return resolve_export_target(dot, conditions);
    }

    // Root-level conditions object: no key starts with "."
    if !obj.keys().any(|k| k.starts_with('.')) {
        return resolve_export_target(exports, conditions);
    }

    None
}

fn resolve_exports_subpath(pkg_json: &Value, subpath: &str, conditions: &[String]) -> Option<String> {
    if !subpath.starts_with("./") {
        return None;
    }
    let obj = pkg_json.get("exports")?.as_object()?;
    if !has_subpath_keys(obj) {
        return None;
    }
    resolve_export_target(obj.get(subpath)?, conditions)
}

/// Most specific pattern wins (longest key, then lexicographic).
fn resolve_exports_pattern(pkg_json: &Value, subpath: &str, conditions: &[String]) -> Option<String> {
    if !subpath.starts_with("./") {
        return None;
    }
    let obj = pkg_json.get("exports")?.as_object()?;

    let mut matches: Vec<(&str, &Value, String)> = obj
        .iter()
        .filter(|(key, _)| key.starts_with("./") && key.matches('*').count() == 1)
        .filter_map(|(key, value)| {
            match_pattern(key, subpath).map(|star| (key.as_str(), value, star))
        })
        .collect();

    matches.sort_by(|a, b| b.0.len().cmp(&a.0.len()).then_with(|| a.0.cmp(b.0)));

    let (_, target_value, star_value) = matches.first()?;
    let target = resolve_export_target(target_value, conditions)?;
    substitute_star(&target, star_value)
}

/// Resolve a `#`-prefixed specifier through the `imports` field.
#[must_use]
pub fn resolve_imports_map(pkg_json: &Value, spec: &str, conditions: &[String]) -> Option<String> {
    if !spec.starts_with('#') {
        return None;
    }
    let imports = pkg_json.get("imports")?.as_object()?;
    resolve_export_target(imports.get(spec)?, conditions)
}

fn has_subpath_keys(obj: &Map<String, Value>) -> bool {
    obj.keys().any(|k| k.starts_with("./"))
}

/// `"./features/*"` against `"./features/foo"` gives `Some("foo")`.
fn match_pattern(pattern: &str, subpath: &str) -> Option<String> {
    let (prefix, suffix) = pattern.split_once('*')?;

    if !subpath.starts_with(prefix) || !subpath.ends_with(suffix) {
        return None;
    }
    let start = prefix.len();
    let end = subpath.len().checked_sub(suffix.len())?;
    if start >= end {
        return None;
    }
    Some(subpath[start..end].to_string())
}

fn substitute_star(target: &str, star_value: &str) -> Option<String> {
    if target.matches('*').count() != 1 {
        return None;
    }
    let result = target.replace('*', star_value);
    if !result.starts_with("./") || result.split('/').any(|segment| segment == "..") {
        return None;
    }
    Some(result)
}

/// String, array of fallbacks, or conditions object (nested to any depth).
fn resolve_export_target(target: &Value, conditions: &[String]) -> Option<String> {
    match target {
        Value::String(s) => validate_export_path(s),
        Value::Array(items) => items
            .iter()
            .find_map(|item| resolve_export_target(item, conditions)),
        Value::Object(obj) => obj.iter().find_map(|(key, value)| {
            let active = key == "default" || conditions.iter().any(|c| c == key);
            if active {
                resolve_export_target(value, conditions)
            } else {
                None
            }
        }),
        _ => None,
    }
}

fn validate_export_path(path: &str) -> Option<String> {
    path.starts_with("./").then(|| path.to_string())
}
