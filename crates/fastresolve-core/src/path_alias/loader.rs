//! Loading `paths` / `baseUrl` from `tsconfig.json` or `jsconfig.json`.
//!
//! Both files are JSON with comments and trailing commas. `extends` chains of
//! relative config files are followed; options in the extending file win.

use super::{PathAliasConfig, PathMapping};
use crate::error::ConfigError;
use fastresolve_util::fs::read_to_string_lossy;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Config files consulted, in order.
pub const CONFIG_FILES: &[&str] = &["tsconfig.json", "jsconfig.json"];

/// Longest `extends` chain followed.
const MAX_EXTENDS_DEPTH: usize = 8;

/// The first config file present in `project_root`.
#[must_use]
pub fn find_config_file(project_root: &Path) -> Option<PathBuf> {
    CONFIG_FILES
        .iter()
        .map(|name| project_root.join(name))
        .find(|p| p.is_file())
}

/// A loaded config together with every file it was read from.
#[derive(Debug, Default)]
pub struct LoadedPathAliases {
    pub config: Option<PathAliasConfig>,
    /// The config file followed by its `extends` chain, in read order.
    pub sources: Vec<PathBuf>,
}

/// Load the path-alias config of `project_root`.
///
/// Returns `Ok(None)` when there is no config file, or when it declares
/// neither `paths` nor `baseUrl`.
///
/// # Errors
/// Returns an error if the config file exists but cannot be read or parsed.
pub fn load_path_alias_config(project_root: &Path) -> Result<Option<PathAliasConfig>, ConfigError> {
    load_path_aliases(project_root).map(|loaded| loaded.config)
}

/// Like [`load_path_alias_config`], also reporting the files read.
///
/// # Errors
/// Returns an error if a config file in the chain cannot be read or parsed.
pub fn load_path_aliases(project_root: &Path) -> Result<LoadedPathAliases, ConfigError> {
    let Some(path) = find_config_file(project_root) else {
        return Ok(LoadedPathAliases::default());
    };

    let mut sources = Vec::new();
    let options = read_compiler_options(&path, 0, &mut sources)?;
    let config = build_config(project_root, &options);
    debug!(
        config = %path.display(),
        extends = sources.len() - 1,
        mappings = config.as_ref().map_or(0, |c| c.paths.len()),
        "Loaded path aliases"
    );
    Ok(LoadedPathAliases { config, sources })
}

/// Path-relevant compiler options with paths resolved against their file.
#[derive(Debug, Default)]
struct CompilerOptions {
    base_url: Option<PathBuf>,
    paths: Option<(Map<String, Value>, PathBuf)>,
}

fn read_compiler_options(
    path: &Path,
    depth: usize,
    sources: &mut Vec<PathBuf>,
) -> Result<CompilerOptions, ConfigError> {
    sources.push(path.to_path_buf());
    let source = read_to_string_lossy(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let value: Value =
        serde_json::from_str(&to_strict_json(&source)).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
    let dir = path.parent().unwrap_or(Path::new("."));

    let mut options = match value.get("extends").and_then(Value::as_str) {
        Some(parent) if depth < MAX_EXTENDS_DEPTH && parent.starts_with('.') => {
            let parent_path = if parent.ends_with(".json") {
                dir.join(parent)
            } else {
                dir.join(format!("{parent}.json"))
            };
            read_compiler_options(&path_clean::clean(parent_path), depth + 1, sources)?
        }
        _ => CompilerOptions::default(),
    };

    let compiler_options = value.get("compilerOptions");
    if let Some(base_url) = compiler_options
        .and_then(|o| o.get("baseUrl"))
        .and_then(Value::as_str)
    {
        options.base_url = Some(path_clean::clean(dir.join(base_url)));
    }
    if let Some(paths) = compiler_options
        .and_then(|o| o.get("paths"))
        .and_then(Value::as_object)
    {
        options.paths = Some((paths.clone(), dir.to_path_buf()));
    }

    Ok(options)
}

fn build_config(project_root: &Path, options: &CompilerOptions) -> Option<PathAliasConfig> {
    let paths: Vec<PathMapping> = options
        .paths
        .as_ref()
        .map(|(map, _)| {
            map.iter()
                .filter_map(|(pattern, targets)| {
                    let targets: Vec<String> = targets
                        .as_array()?
                        .iter()
                        .filter_map(Value::as_str)
                        .map(ToString::to_string)
                        .collect();
                    PathMapping::new(pattern, targets)
                })
                .collect()
        })
        .unwrap_or_default();

    if paths.is_empty() && options.base_url.is_none() {
        return None;
    }

    // Without baseUrl, `paths` entries are relative to the file declaring them
    let base_url = options
        .base_url
        .clone()
        .or_else(|| options.paths.as_ref().map(|(_, dir)| dir.clone()))
        .unwrap_or_else(|| project_root.to_path_buf());

    Some(PathAliasConfig::new(
        base_url,
        paths,
        options.base_url.is_some(),
    ))
}

/// Strip comments and trailing commas so the text parses as plain JSON.
fn to_strict_json(source: &str) -> String {
    let without_comments = strip_comments(source);
    let chars: Vec<char> = without_comments.chars().collect();
    let mut result = String::with_capacity(chars.len());
    let mut in_string = false;
    let mut i = 0;

    while i < chars.len() {
        let ch = chars[i];
        if in_string {
            result.push(ch);
            if ch == '\\' && i + 1 < chars.len() {
                result.push(chars[i + 1]);
                i += 1;
            } else if ch == '"' {
                in_string = false;
            }
        } else if ch == ',' {
            let next = chars[i + 1..].iter().find(|c| !c.is_whitespace());
            if !matches!(next, Some('}' | ']')) {
                result.push(ch);
            }
        } else {
            if ch == '"' {
                in_string = true;
            }
            result.push(ch);
        }
        i += 1;
    }

    result
}

/// Strip `//` and `/* */` comments outside of strings.
fn strip_comments(source: &str) -> String {
    let chars: Vec<char> = source.chars().collect();
    let len = chars.len();
    let mut result = String::with_capacity(len);
    let mut in_string = false;
    let mut i = 0;

    while i < len {
        if in_string {
            result.push(chars[i]);
            if chars[i] == '\\' && i + 1 < len {
                result.push(chars[i + 1]);
                i += 1;
            } else if chars[i] == '"' {
                in_string = false;
            }
            i += 1;
        } else if i + 1 < len && chars[i] == '/' && chars[i + 1] == '/' {
            while i < len && chars[i] != '\n' {
                i += 1;
            }
        } else if i + 1 < len && chars[i] == '/' && chars[i + 1] == '*' {
            i += 2;
            while i + 1 < len && !(chars[i] == '*' && chars[i + 1] == '/') {
                if chars[i] == '\n' {
                    result.push('\n');
                }
                i += 1;
            }
            i += 2;
        } else {
            if chars[i] == '"' {
                in_string = true;
            }
            result.push(chars[i]);
            i += 1;
        }
    }

    result
}
