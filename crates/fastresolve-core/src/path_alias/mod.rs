//! Hot-reloadable `paths` / `baseUrl` aliasing.
//!
//! The active [`PathAliasConfig`] sits behind a lock as an `Arc`. Readers take
//! a snapshot and drop the lock immediately; a reload builds a new config and
//! swaps the whole `Arc`, so a resolution in flight keeps the config it
//! started with.

pub mod loader;
pub mod watch;

use crate::error::ConfigError;
use parking_lot::RwLock;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

/// One `paths` entry: a pattern with at most one `*`, and its targets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathMapping {
    pub pattern: String,
    prefix: String,
    /// `None` for patterns without a wildcard.
    suffix: Option<String>,
    pub targets: Vec<String>,
}

impl PathMapping {
    /// `None` for patterns with more than one `*` or no targets.
    #[must_use]
    pub fn new(pattern: &str, targets: Vec<String>) -> Option<Self> {
        if targets.is_empty() {
            return None;
        }
        let (prefix, suffix) = match pattern.split_once('*') {
            Some((_, rest)) if rest.contains('*') => return None,
            Some((prefix, suffix)) => (prefix.to_string(), Some(suffix.to_string())),
            None => (pattern.to_string(), None),
        };
        Some(Self {
            pattern: pattern.to_string(),
            prefix,
            suffix,
            targets,
        })
    }

    /// The text matched by `*`, or `""` for an exact match.
    #[must_use]
    pub fn match_specifier<'a>(&self, specifier: &'a str) -> Option<&'a str> {
        match &self.suffix {
            None => (specifier == self.pattern).then_some(""),
            Some(suffix) => {
                let rest = specifier.strip_prefix(self.prefix.as_str())?;
                rest.strip_suffix(suffix.as_str())
            }
        }
    }

    /// Exact patterns first, then longer prefixes.
    fn specificity(&self) -> (bool, usize) {
        (self.suffix.is_none(), self.prefix.len())
    }
}

/// A loaded `paths` / `baseUrl` mapping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathAliasConfig {
    /// Directory path targets are joined onto.
    pub base_url: PathBuf,
    /// Mappings in declared order.
    pub paths: Vec<PathMapping>,
    /// Whether `baseUrl` was set, enabling bare-specifier lookup under it.
    pub has_base_url: bool,
}

impl PathAliasConfig {
    #[must_use]
    pub fn new(base_url: PathBuf, paths: Vec<PathMapping>, has_base_url: bool) -> Self {
        Self {
            base_url,
            paths,
            has_base_url,
        }
    }

    /// Absolute candidate paths for `specifier`, in the order to try them.
    ///
    /// Matching mappings are tried most specific first (ties keep declared
    /// order), each with its targets in declared order. The `baseUrl`
    /// candidate, if any, comes last.
    #[must_use]
    pub fn candidates(&self, specifier: &str) -> Vec<PathBuf> {
        let mut matching: Vec<(&PathMapping, &str)> = self
            .paths
            .iter()
            .filter_map(|m| m.match_specifier(specifier).map(|star| (m, star)))
            .collect();
        matching.sort_by_key(|(m, _)| std::cmp::Reverse(m.specificity()));

        let mut out: Vec<PathBuf> = matching
            .into_iter()
            .flat_map(|(mapping, star)| {
                mapping
                    .targets
                    .iter()
                    .map(move |target| target.replacen('*', star, 1))
            })
            .map(|target| path_clean::clean(self.base_url.join(target)))
            .collect();

        if self.has_base_url {
            out.push(path_clean::clean(self.base_url.join(specifier)));
        }
        out
    }
}

/// Holder of the active path-alias config.
#[derive(Debug)]
pub struct PathAliasResolver {
    project_root: PathBuf,
    current: RwLock<Option<Arc<PathAliasConfig>>>,
    /// Files the active config was read from.
    sources: RwLock<Vec<PathBuf>>,
}

impl PathAliasResolver {
    /// Resolver with `config` active.
    #[must_use]
    pub fn new(project_root: impl Into<PathBuf>, config: Option<PathAliasConfig>) -> Self {
        Self {
            project_root: project_root.into(),
            current: RwLock::new(config.map(Arc::new)),
            sources: RwLock::new(Vec::new()),
        }
    }

    /// Load the project's config and start with it.
    ///
    /// # Errors
    /// Returns an error if the config file exists but cannot be loaded.
    pub fn load(project_root: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let project_root = project_root.into();
        let loaded = loader::load_path_aliases(&project_root)?;
        let resolver = Self::new(project_root, loaded.config);
        *resolver.sources.write() = loaded.sources;
        Ok(resolver)
    }

    #[must_use]
    pub fn project_root(&self) -> &Path {
        &self.project_root
    }

    /// The active config, if any. Holds no lock after returning.
    #[must_use]
    pub fn snapshot(&self) -> Option<Arc<PathAliasConfig>> {
        self.current.read().clone()
    }

    /// Replace the active config wholesale.
    pub fn swap(&self, config: Option<PathAliasConfig>) {
        *self.current.write() = config.map(Arc::new);
    }

    /// Re-read the config file and swap it in.
    ///
    /// On error the previous config stays active.
    ///
    /// # Errors
    /// Returns an error if the config file exists but cannot be loaded.
    pub fn reload(&self) -> Result<(), ConfigError> {
        let loaded = loader::load_path_aliases(&self.project_root)?;
        info!(
            enabled = loaded.config.is_some(),
            mappings = loaded.config.as_ref().map_or(0, |c| c.paths.len()),
            sources = loaded.sources.len(),
            "Path aliases reloaded"
        );
        *self.sources.write() = loaded.sources;
        self.swap(loaded.config);
        Ok(())
    }

    /// Files whose changes affect the config: the candidate config files in
    /// the project root, plus every file of the active `extends` chain.
    #[must_use]
    pub fn watched_files(&self) -> Vec<PathBuf> {
        let mut files: Vec<PathBuf> = loader::CONFIG_FILES
            .iter()
            .map(|name| self.project_root.join(name))
            .collect();
        for source in self.sources.read().iter() {
            if !files.contains(source) {
                files.push(source.clone());
            }
        }
        files
    }

    /// Whether a change to `path` calls for a reload.
    #[must_use]
    pub fn is_watched(&self, path: &Path) -> bool {
        let watched = self.watched_files();
        if watched.iter().any(|w| w == path) {
            return true;
        }
        // Event paths may come back canonicalized
        let (Some(dir), Some(name)) = (path.parent(), path.file_name()) else {
            return false;
        };
        let Ok(dir) = dunce::canonicalize(dir) else {
            return false;
        };
        watched.iter().any(|w| {
            w.file_name() == Some(name)
                && w.parent()
                    .and_then(|p| dunce::canonicalize(p).ok())
                    .is_some_and(|p| p == dir)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mapping(pattern: &str, targets: &[&str]) -> PathMapping {
        PathMapping::new(pattern, targets.iter().map(ToString::to_string).collect()).unwrap()
    }

    #[test]
    fn test_mapping_match() {
        let m = mapping("@app/*", &["./src/*"]);
        assert_eq!(m.match_specifier("@app/widgets"), Some("widgets"));
        assert_eq!(m.match_specifier("@other/x"), None);

        let exact = mapping("config", &["./config/index"]);
        assert_eq!(exact.match_specifier("config"), Some(""));
        assert_eq!(exact.match_specifier("config/x"), None);

        assert!(PathMapping::new("a/*/*", vec!["x".into()]).is_none());
        assert!(PathMapping::new("a/*", vec![]).is_none());
    }

    #[test]
    fn test_candidates_most_specific_first() {
        let config = PathAliasConfig::new(
            PathBuf::from("/app"),
            vec![
                mapping("@/*", &["./*"]),
                mapping("@/components/*", &["./ui/*", "./legacy/*"]),
            ],
            true,
        );

        let candidates = config.candidates("@/components/Button");
        assert_eq!(
            candidates,
            vec![
                PathBuf::from("/app/ui/Button"),
                PathBuf::from("/app/legacy/Button"),
                PathBuf::from("/app/components/Button"),
                PathBuf::from("/app/@/components/Button"),
            ]
        );
    }

    #[test]
    fn test_no_base_url_candidate_without_base_url() {
        let config = PathAliasConfig::new(
            PathBuf::from("/app"),
            vec![mapping("@app/*", &["./src/*"])],
            false,
        );
        assert_eq!(
            config.candidates("@app/widgets"),
            vec![PathBuf::from("/app/src/widgets")]
        );
        assert!(config.candidates("lodash").is_empty());
    }

    #[test]
    fn test_swap_replaces_snapshot() {
        let resolver = PathAliasResolver::new("/app", None);
        assert!(resolver.snapshot().is_none());

        let config = PathAliasConfig::new(PathBuf::from("/app"), vec![], true);
        resolver.swap(Some(config.clone()));
        let held = resolver.snapshot().unwrap();
        assert_eq!(*held, config);

        resolver.swap(None);
        assert!(resolver.snapshot().is_none());
        // An earlier snapshot is unaffected
        assert!(held.has_base_url);
    }

    #[test]
    fn test_watched_files_follow_extends_chain() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        std::fs::create_dir_all(root.join("config")).unwrap();
        std::fs::write(
            root.join("config/base.json"),
            r#"{ "compilerOptions": { "paths": { "@app/*": ["../src/*"] } } }"#,
        )
        .unwrap();
        std::fs::write(root.join("tsconfig.json"), r#"{ "extends": "./config/base" }"#).unwrap();

        let resolver = PathAliasResolver::load(root).unwrap();
        assert!(resolver.is_watched(&root.join("tsconfig.json")));
        assert!(resolver.is_watched(&root.join("jsconfig.json")));
        assert!(resolver.is_watched(&root.join("config/base.json")));
        assert!(!resolver.is_watched(&root.join("package.json")));

        std::fs::write(root.join("tsconfig.json"), r#"{ "compilerOptions": { "baseUrl": "." } }"#)
            .unwrap();
        resolver.reload().unwrap();
        assert!(!resolver.is_watched(&root.join("config/base.json")));
    }
}
