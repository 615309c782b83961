//! Static specifier rewriting.
//!
//! Two kinds of rules, both built once per pipeline:
//! - exact aliases scoped to one platform (`react-native` -> `react-native-web`
//!   on web)
//! - ordered regex aliases applied on every platform, with `$1`-style
//!   capture substitution in the template

use crate::config::PipelineConfig;
use crate::error::ConfigError;
use crate::request::Platform;
use regex_lite::Regex;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;

/// Exact aliases applied to every web build.
const WEB_ALIASES: &[(&str, &str)] = &[
    ("react-native", "react-native-web"),
    ("react-native/index", "react-native-web"),
    (
        "react-native/Libraries/Image/resolveAssetSource",
        "expo-asset/build/resolveAssetSource",
    ),
];

/// One ordered regex alias.
#[derive(Debug, Clone)]
pub struct PatternAlias {
    regex: Regex,
    template: String,
}

impl PatternAlias {
    /// Compile `pattern`.
    ///
    /// # Errors
    /// Returns [`ConfigError::InvalidPattern`] if the pattern does not compile.
    pub fn new(pattern: &str, template: impl Into<String>) -> Result<Self, ConfigError> {
        let regex = Regex::new(pattern).map_err(|e| ConfigError::InvalidPattern {
            pattern: pattern.to_string(),
            message: e.to_string(),
        })?;
        Ok(Self {
            regex,
            template: template.into(),
        })
    }

    /// Rewrite `specifier`, or `None` if the pattern does not match.
    #[must_use]
    pub fn apply(&self, specifier: &str) -> Option<String> {
        if !self.regex.is_match(specifier) {
            return None;
        }
        Some(
            self.regex
                .replace(specifier, self.template.as_str())
                .into_owned(),
        )
    }
}

/// Platform-exact and universal aliases.
#[derive(Debug, Clone, Default)]
pub struct AliasTable {
    exact: BTreeMap<Platform, HashMap<String, String>>,
    patterns: Vec<PatternAlias>,
}

impl AliasTable {
    /// Empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Built-in aliases followed by the ones declared in `config`.
    ///
    /// Optional built-ins are only added when their target package is
    /// installed at the project root.
    ///
    /// # Errors
    /// Returns [`ConfigError::InvalidPattern`] for an invalid regex alias.
    pub fn from_config(config: &PipelineConfig) -> Result<Self, ConfigError> {
        let mut table = Self::new();

        for (from, to) in WEB_ALIASES {
            table.insert_exact(Platform::Web, *from, *to);
        }
        for (platform, aliases) in &config.aliases {
            for (from, to) in aliases {
                table.insert_exact(*platform, from.clone(), to.clone());
            }
        }

        let root = &config.project_root;
        if is_installed(root, "@expo/vector-icons") {
            table.push_pattern(PatternAlias::new(
                "^react-native-vector-icons(/.*)?$",
                "@expo/vector-icons$1",
            )?);
        }
        if config.react_server_components && is_installed(root, "expo-router") {
            table.push_pattern(PatternAlias::new("^expo-router$", "expo-router/rsc")?);
        }
        for (pattern, template) in &config.universal_aliases {
            table.push_pattern(PatternAlias::new(pattern, template.clone())?);
        }

        Ok(table)
    }

    pub fn insert_exact(
        &mut self,
        platform: Platform,
        from: impl Into<String>,
        to: impl Into<String>,
    ) {
        self.exact
            .entry(platform)
            .or_default()
            .insert(from.into(), to.into());
    }

    pub fn push_pattern(&mut self, alias: PatternAlias) {
        self.patterns.push(alias);
    }

    /// Rewrite `specifier` for `platform`.
    ///
    /// The platform-exact alias wins; otherwise the first matching pattern.
    /// Returns `None` when nothing matches or the rewrite is a no-op.
    #[must_use]
    pub fn rewrite(&self, platform: Platform, specifier: &str) -> Option<String> {
        if let Some(to) = self
            .exact
            .get(&platform)
            .and_then(|aliases| aliases.get(specifier))
        {
            return Some(to.clone()).filter(|to| to != specifier);
        }

        self.patterns
            .iter()
            .find_map(|alias| alias.apply(specifier))
            .filter(|to| to != specifier)
    }
}

/// Whether `package` is installed directly under `root/node_modules`.
fn is_installed(root: &Path, package: &str) -> bool {
    root.join("node_modules")
        .join(package)
        .join("package.json")
        .is_file()
}
