//! Externalization: specifiers removed from the bundle graph and provided at
//! runtime instead.
//!
//! Node built-ins are recognized by name. Everything else goes through an
//! ordered list of [`ExternalRule`]s; the first match wins.

use crate::config::{ExternalRuleConfig, PipelineConfig};
use crate::error::{ConfigError, ResolveError};
use crate::request::{Environment, ResolutionRequest};
use regex_lite::Regex;
use std::fmt;
use std::str::FromStr;

/// Node.js standard library modules, including public subpaths.
pub const NODE_BUILTINS: &[&str] = &[
    "assert",
    "assert/strict",
    "async_hooks",
    "buffer",
    "child_process",
    "cluster",
    "console",
    "constants",
    "crypto",
    "dgram",
    "diagnostics_channel",
    "dns",
    "dns/promises",
    "domain",
    "events",
    "fs",
    "fs/promises",
    "http",
    "http2",
    "https",
    "inspector",
    "module",
    "net",
    "os",
    "path",
    "path/posix",
    "path/win32",
    "perf_hooks",
    "process",
    "punycode",
    "querystring",
    "readline",
    "readline/promises",
    "repl",
    "stream",
    "stream/consumers",
    "stream/promises",
    "stream/web",
    "string_decoder",
    "sys",
    "timers",
    "timers/promises",
    "tls",
    "trace_events",
    "tty",
    "url",
    "util",
    "util/types",
    "v8",
    "vm",
    "wasi",
    "worker_threads",
    "zlib",
];

/// Packages required from Node instead of bundled in `node` server bundles.
const NODE_SERVER_EXTERNALS: &str = r"^(source-map-support(/.*)?|react|@radix-ui/.+|@babel/runtime/.+|react-dom(/.+)?|debug|acorn-loose|acorn|css-in-js-utils/lib/.+|hyphenate-style-name|color|color-string|color-convert|color-name|fontfaceobserver|fast-deep-equal|query-string|escape-string-regexp|invariant|postcss-value-parser|memoize-one|nullthrows|strict-uri-encode|decode-uri-component|split-on-first|filter-obj|warn-once|simple-swizzle|is-arrayish|inline-style-prefixer/.+)$";

/// Narrower list for `react-server` bundles, which must bundle React itself.
const REACT_SERVER_EXTERNALS: &str = r"^(source-map-support(/.*)?|@babel/runtime/.+|debug|metro-runtime/src/modules/HMRClient|metro|acorn-loose|acorn|chalk|ws|ansi-styles|supports-color|color-convert|has-flag|utf-8-validate|color-name|react-refresh/runtime|@remix-run/node/.+)$";

/// Packages shared with the root client chunk across the client boundary.
const CLIENT_BOUNDARY_EXTERNALS: &str = r"^(deprecated-react-native-prop-types|react|react/jsx-dev-runtime|scheduler|react-native|react-dom(/.+)?|metro-runtime(/.+)?|@expo/metro-runtime/build/.+)$";

/// The error overlay must stay in the chunk that renders it.
const CLIENT_BOUNDARY_EXCLUDE: &str = r"^@expo/metro-runtime/build/(.+/)?error-overlay";

/// The Node built-in `specifier` names, without any `node:` prefix.
///
/// `"node:fs/promises"` and `"fs/promises"` both give `Some("fs/promises")`.
#[must_use]
pub fn node_builtin_id(specifier: &str) -> Option<&str> {
    let id = specifier.strip_prefix("node:").unwrap_or(specifier);
    NODE_BUILTINS.contains(&id).then_some(id)
}

/// Stub that requires a Node built-in at runtime.
#[must_use]
pub fn builtin_stub(id: &str) -> String {
    format!("module.exports=$$require_external('node:{id}');")
}

/// Stub that requires a package from Node at runtime.
#[must_use]
pub fn node_external_stub(name: &str) -> String {
    format!("module.exports=$$require_external('{name}')")
}

/// Stub that looks up an already-loaded module by its project-relative path.
#[must_use]
pub fn weak_stub(name: &str, relative_path: &str) -> String {
    format!("module.exports=/*{name}*/__r(\"{relative_path}\")")
}

/// What an externalized specifier becomes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplaceKind {
    /// An empty module.
    Empty,
    /// A `$$require_external` stub.
    Node,
    /// A stub pointing at the real module by path.
    Weak,
}

impl FromStr for ReplaceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "empty" => Ok(Self::Empty),
            "node" => Ok(Self::Node),
            "weak" => Ok(Self::Weak),
            other => Err(other.to_string()),
        }
    }
}

impl fmt::Display for ReplaceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Empty => "empty",
            Self::Node => "node",
            Self::Weak => "weak",
        })
    }
}

/// One externalization rule.
#[derive(Debug, Clone)]
pub struct ExternalRule {
    pub name: String,
    pattern: Regex,
    exclude: Option<Regex>,
    /// Environments the rule applies to. Empty means all.
    environments: Vec<Environment>,
    client_boundary: bool,
    dev_only: bool,
    pub replace: ReplaceKind,
}

impl ExternalRule {
    /// Build a rule from its config form.
    ///
    /// # Errors
    /// [`ResolveError::MisconfiguredExternal`] for an unknown replacement
    /// kind, [`ResolveError::Config`] for an invalid pattern.
    pub fn from_config(config: &ExternalRuleConfig) -> Result<Self, ResolveError> {
        let replace = config
            .replace
            .parse::<ReplaceKind>()
            .map_err(|kind| ResolveError::MisconfiguredExternal {
                pattern: config.pattern.clone(),
                kind,
            })?;
        Ok(Self {
            name: config.pattern.clone(),
            pattern: compile(&config.pattern)?,
            exclude: None,
            environments: config.environments.clone(),
            client_boundary: config.client_boundary,
            dev_only: config.dev_only,
            replace,
        })
    }

    /// Whether the rule claims `request`.
    ///
    /// `dev_server` is false for production or export builds, which disables
    /// dev-only rules.
    #[must_use]
    pub fn matches(&self, request: &ResolutionRequest, dev_server: bool) -> bool {
        if self.dev_only && !dev_server {
            return false;
        }
        if !self.environments.is_empty() && !self.environments.contains(&request.environment) {
            return false;
        }
        if self.client_boundary && !request.client_boundary {
            return false;
        }
        let spec = request.specifier.as_str();
        self.pattern.is_match(spec) && !self.exclude.as_ref().is_some_and(|re| re.is_match(spec))
    }
}

fn compile(pattern: &str) -> Result<Regex, ConfigError> {
    Regex::new(pattern).map_err(|e| ConfigError::InvalidPattern {
        pattern: pattern.to_string(),
        message: e.to_string(),
    })
}

/// The ordered externalization rule set of a pipeline.
#[derive(Debug, Clone, Default)]
pub struct ExternalRules {
    rules: Vec<ExternalRule>,
}

impl ExternalRules {
    /// Built-in rules followed by the ones declared in `config`.
    ///
    /// # Errors
    /// See [`ExternalRule::from_config`].
    pub fn from_config(config: &PipelineConfig) -> Result<Self, ResolveError> {
        let mut rules = builtin_rules()?;
        for rule in &config.externals {
            rules.push(ExternalRule::from_config(rule)?);
        }
        Ok(Self { rules })
    }

    /// First rule claiming `request`, if any.
    ///
    /// Requests for `package.json` files and requests made from stylesheets
    /// are never externalized.
    #[must_use]
    pub fn find(&self, request: &ResolutionRequest, dev_server: bool) -> Option<&ExternalRule> {
        if request.specifier.ends_with("/package.json") || is_stylesheet(request) {
            return None;
        }
        self.rules
            .iter()
            .find(|rule| rule.matches(request, dev_server))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

fn is_stylesheet(request: &ResolutionRequest) -> bool {
    request
        .requesting_file
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| matches!(ext, "css" | "scss" | "sass"))
}

fn builtin_rules() -> Result<Vec<ExternalRule>, ConfigError> {
    Ok(vec![
        ExternalRule {
            name: "node-server".to_string(),
            pattern: compile(NODE_SERVER_EXTERNALS)?,
            exclude: None,
            environments: vec![Environment::Node],
            client_boundary: false,
            dev_only: true,
            replace: ReplaceKind::Node,
        },
        ExternalRule {
            name: "react-server".to_string(),
            pattern: compile(REACT_SERVER_EXTERNALS)?,
            exclude: None,
            environments: vec![Environment::ReactServer],
            client_boundary: false,
            dev_only: true,
            replace: ReplaceKind::Node,
        },
        ExternalRule {
            name: "client-boundary".to_string(),
            pattern: compile(CLIENT_BOUNDARY_EXTERNALS)?,
            exclude: Some(compile(CLIENT_BOUNDARY_EXCLUDE)?),
            environments: vec![Environment::Client, Environment::None],
            client_boundary: true,
            dev_only: true,
            replace: ReplaceKind::Weak,
        },
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::Platform;

    fn req(spec: &str, env: Environment) -> ResolutionRequest {
        ResolutionRequest::new(spec, "/app/src/App.js", Platform::Web).with_environment(env)
    }

    fn rules() -> ExternalRules {
        ExternalRules::from_config(&PipelineConfig::new("/app")).unwrap()
    }

    #[test]
    fn test_node_builtin_id() {
        assert_eq!(node_builtin_id("os"), Some("os"));
        assert_eq!(node_builtin_id("node:os"), Some("os"));
        assert_eq!(node_builtin_id("fs/promises"), Some("fs/promises"));
        assert_eq!(node_builtin_id("node:fs/promises"), Some("fs/promises"));
        assert_eq!(node_builtin_id("react"), None);
        assert_eq!(node_builtin_id("fs-extra"), None);
    }

    #[test]
    fn test_stub_contents() {
        assert_eq!(builtin_stub("os"), "module.exports=$$require_external('node:os');");
        assert_eq!(
            node_external_stub("react"),
            "module.exports=$$require_external('react')"
        );
        assert_eq!(
            weak_stub("react", "node_modules/react/index.js"),
            "module.exports=/*react*/__r(\"node_modules/react/index.js\")"
        );
    }

    #[test]
    fn test_node_server_rule() {
        let rules = rules();
        let rule = rules.find(&req("react-dom/server", Environment::Node), true).unwrap();
        assert_eq!(rule.name, "node-server");
        assert_eq!(rule.replace, ReplaceKind::Node);

        // React is bundled for react-server
        assert!(rules.find(&req("react", Environment::ReactServer), true).is_none());
        assert!(rules.find(&req("debug", Environment::ReactServer), true).is_some());

        // Never in export builds
        assert!(rules.find(&req("react", Environment::Node), false).is_none());
    }

    #[test]
    fn test_client_boundary_rule() {
        let rules = rules();
        let plain = req("react-native", Environment::Client);
        assert!(rules.find(&plain, true).is_none());

        let boundary = plain.with_client_boundary(true);
        let rule = rules.find(&boundary, true).unwrap();
        assert_eq!(rule.replace, ReplaceKind::Weak);

        let overlay = req("@expo/metro-runtime/build/error-overlay/index", Environment::Client)
            .with_client_boundary(true);
        assert!(rules.find(&overlay, true).is_none());
        let runtime = req("@expo/metro-runtime/build/location", Environment::Client)
            .with_client_boundary(true);
        assert!(rules.find(&runtime, true).is_some());
    }

    #[test]
    fn test_skips_package_json_and_stylesheets() {
        let rules = rules();
        assert!(rules
            .find(&req("react/package.json", Environment::Node), true)
            .is_none());

        let from_css = ResolutionRequest::new("react", "/app/src/styles.scss", Platform::Web)
            .with_environment(Environment::Node);
        assert!(rules.find(&from_css, true).is_none());
    }

    #[test]
    fn test_user_rules_follow_builtins() {
        let config = PipelineConfig::new("/app").with_external(ExternalRuleConfig {
            pattern: "^(sharp|react)$".into(),
            replace: "empty".into(),
            environments: vec![],
            client_boundary: false,
            dev_only: false,
        });
        let rules = ExternalRules::from_config(&config).unwrap();
        assert_eq!(rules.len(), 4);

        // Built-in rule claims react first
        let rule = rules.find(&req("react", Environment::Node), true).unwrap();
        assert_eq!(rule.replace, ReplaceKind::Node);

        let rule = rules.find(&req("sharp", Environment::Client), false).unwrap();
        assert_eq!(rule.replace, ReplaceKind::Empty);
    }

    #[test]
    fn test_unknown_replace_kind_is_misconfigured() {
        let config = PipelineConfig::new("/app").with_external(ExternalRuleConfig {
            pattern: "^x$".into(),
            replace: "bundle".into(),
            environments: vec![],
            client_boundary: false,
            dev_only: true,
        });
        let err = ExternalRules::from_config(&config).unwrap_err();
        assert!(
            matches!(err, ResolveError::MisconfiguredExternal { ref kind, .. } if kind == "bundle")
        );
    }
}
