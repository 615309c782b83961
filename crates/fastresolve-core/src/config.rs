//! Pipeline configuration.
//!
//! Loaded from an optional `fastresolve.json` at the project root:
//!
//! ```json
//! {
//!   "dev": true,
//!   "tsconfigPaths": true,
//!   "aliases": { "web": { "react-native": "react-native-web" } },
//!   "universalAliases": [["^lodash$", "lodash-es"]],
//!   "externals": [{ "pattern": "^sharp$", "replace": "node", "environments": ["node"] }]
//! }
//! ```

use crate::error::ConfigError;
use crate::request::{Environment, Platform};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Config file name looked up in the project root.
pub const CONFIG_FILE: &str = "fastresolve.json";

/// Source extensions probed by default, in order.
pub const DEFAULT_SOURCE_EXTS: &[&str] = &["ts", "tsx", "js", "jsx", "mjs", "cjs", "json"];

/// Asset extensions resolved to [`crate::Resolution::Asset`] by default.
pub const DEFAULT_ASSET_EXTS: &[&str] = &[
    "bmp", "gif", "jpg", "jpeg", "png", "psd", "svg", "webp", "ttf", "otf", "woff", "woff2",
    "mp4", "mov", "mp3", "wav", "pdf", "db",
];

/// User-declared externalization rule, as written in the config file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ExternalRuleConfig {
    /// Regex matched against the specifier.
    pub pattern: String,
    /// `empty`, `node` or `weak`. Validated when the pipeline is built.
    pub replace: String,
    /// Environments the rule applies to. Empty means all.
    #[serde(default)]
    pub environments: Vec<Environment>,
    /// Only match imports that cross the client boundary.
    #[serde(default)]
    pub client_boundary: bool,
    /// Skip the rule for export builds.
    #[serde(default = "default_true")]
    pub dev_only: bool,
}

/// Configuration of the resolution pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase", deny_unknown_fields)]
pub struct PipelineConfig {
    /// Project root. Not read from the file; set by the loader.
    #[serde(skip)]
    pub project_root: PathBuf,

    /// Development build. Enables the production-module skip.
    pub dev: bool,

    /// Honor `paths`/`baseUrl` from tsconfig.json or jsconfig.json.
    pub tsconfig_paths: bool,

    /// Reload path aliases when the tsconfig changes.
    pub watch: bool,

    /// Substitute files from the canary runtime directory on native.
    pub react_canary: bool,

    /// Enable the server-components aliases.
    pub react_server_components: bool,

    /// Return `NodeExternal`/`WeakExternal` instead of materializing stubs.
    pub native_externals: bool,

    /// On native client platforms, let a missing Node built-in fall through
    /// to the primitive resolver instead of resolving to an empty module.
    pub strict_native_builtins: bool,

    /// Directory of static web shims, relative to the project root.
    pub shims_dir: PathBuf,

    /// Directory of canary overrides, relative to the project root.
    pub canary_dir: PathBuf,

    /// Directory for generated stubs, relative to the project root.
    pub virtual_dir: PathBuf,

    /// Platform-exact aliases: platform -> (from -> to).
    pub aliases: BTreeMap<Platform, BTreeMap<String, String>>,

    /// Ordered `[pattern, template]` aliases applied on every platform.
    pub universal_aliases: Vec<(String, String)>,

    /// Extra externalization rules, evaluated after the built-in ones.
    pub externals: Vec<ExternalRuleConfig>,

    /// Source extensions, without leading dots, in probe order.
    pub source_exts: Vec<String>,

    /// Asset extensions, without leading dots.
    pub asset_exts: Vec<String>,
}

fn default_true() -> bool {
    true
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            project_root: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            dev: true,
            tsconfig_paths: true,
            watch: false,
            react_canary: false,
            react_server_components: false,
            native_externals: false,
            strict_native_builtins: false,
            shims_dir: PathBuf::from(".fastresolve/shims"),
            canary_dir: PathBuf::from(".fastresolve/canary"),
            virtual_dir: PathBuf::from(".fastresolve/virtual"),
            aliases: BTreeMap::new(),
            universal_aliases: Vec::new(),
            externals: Vec::new(),
            source_exts: DEFAULT_SOURCE_EXTS.iter().map(ToString::to_string).collect(),
            asset_exts: DEFAULT_ASSET_EXTS.iter().map(ToString::to_string).collect(),
        }
    }
}

impl PipelineConfig {
    /// Create a default config rooted at `project_root`.
    #[must_use]
    pub fn new(project_root: impl Into<PathBuf>) -> Self {
        Self {
            project_root: project_root.into(),
            ..Default::default()
        }
    }

    /// Load `fastresolve.json` from `project_root`, or defaults if absent.
    pub fn load(project_root: &Path) -> Result<Self, ConfigError> {
        let path = project_root.join(CONFIG_FILE);
        if !path.is_file() {
            return Ok(Self::new(project_root));
        }
        let mut config = Self::from_file(&path)?;
        config.project_root = project_root.to_path_buf();
        Ok(config)
    }

    /// Parse a config file. The project root defaults to the file's directory.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let source = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config: Self = serde_json::from_str(&source).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        config.project_root = path
            .parent()
            .map_or_else(|| PathBuf::from("."), Path::to_path_buf);
        Ok(config)
    }

    #[must_use]
    pub fn with_dev(mut self, dev: bool) -> Self {
        self.dev = dev;
        self
    }

    #[must_use]
    pub fn with_tsconfig_paths(mut self, enabled: bool) -> Self {
        self.tsconfig_paths = enabled;
        self
    }

    #[must_use]
    pub fn with_watch(mut self, watch: bool) -> Self {
        self.watch = watch;
        self
    }

    #[must_use]
    pub fn with_react_canary(mut self, enabled: bool) -> Self {
        self.react_canary = enabled;
        self
    }

    #[must_use]
    pub fn with_react_server_components(mut self, enabled: bool) -> Self {
        self.react_server_components = enabled;
        self
    }

    #[must_use]
    pub fn with_native_externals(mut self, enabled: bool) -> Self {
        self.native_externals = enabled;
        self
    }

    #[must_use]
    pub fn with_strict_native_builtins(mut self, strict: bool) -> Self {
        self.strict_native_builtins = strict;
        self
    }

    #[must_use]
    pub fn with_alias(
        mut self,
        platform: Platform,
        from: impl Into<String>,
        to: impl Into<String>,
    ) -> Self {
        self.aliases
            .entry(platform)
            .or_default()
            .insert(from.into(), to.into());
        self
    }

    #[must_use]
    pub fn with_universal_alias(
        mut self,
        pattern: impl Into<String>,
        template: impl Into<String>,
    ) -> Self {
        self.universal_aliases.push((pattern.into(), template.into()));
        self
    }

    #[must_use]
    pub fn with_external(mut self, rule: ExternalRuleConfig) -> Self {
        self.externals.push(rule);
        self
    }

    /// Absolute directory for static web shims.
    #[must_use]
    pub fn shims_path(&self) -> PathBuf {
        self.project_root.join(&self.shims_dir)
    }

    /// Absolute directory for canary overrides.
    #[must_use]
    pub fn canary_path(&self) -> PathBuf {
        self.project_root.join(&self.canary_dir)
    }

    /// Absolute directory for generated stubs.
    #[must_use]
    pub fn virtual_path(&self) -> PathBuf {
        self.project_root.join(&self.virtual_dir)
    }
}
