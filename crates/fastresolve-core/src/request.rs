//! Resolution requests and the options bag the host bundler plumbs through.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Target platform of a bundle.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Ios,
    Android,
    Web,
    #[default]
    None,
}

impl Platform {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ios => "ios",
            Self::Android => "android",
            Self::Web => "web",
            Self::None => "none",
        }
    }

    /// iOS and Android.
    #[must_use]
    pub fn is_native(&self) -> bool {
        matches!(self, Self::Ios | Self::Android)
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Platform {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ios" => Ok(Self::Ios),
            "android" => Ok(Self::Android),
            "web" => Ok(Self::Web),
            "none" | "" => Ok(Self::None),
            other => Err(format!("unknown platform '{other}'")),
        }
    }
}

/// Execution environment the bundle targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum Environment {
    Client,
    Node,
    ReactServer,
    #[default]
    None,
}

impl Environment {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Client => "client",
            Self::Node => "node",
            Self::ReactServer => "react-server",
            Self::None => "none",
        }
    }

    /// `node` and `react-server`.
    #[must_use]
    pub fn is_server(&self) -> bool {
        matches!(self, Self::Node | Self::ReactServer)
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "client" => Ok(Self::Client),
            "node" => Ok(Self::Node),
            "react-server" => Ok(Self::ReactServer),
            "none" | "" => Ok(Self::None),
            other => Err(format!("unknown environment '{other}'")),
        }
    }
}

/// Custom resolver options as received from the host bundler.
///
/// Only `environment`, `exporting` and `clientboundary` are interpreted; any
/// other keys are carried along untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResolverOptions {
    #[serde(default)]
    pub environment: Option<Environment>,
    #[serde(default)]
    pub exporting: bool,
    #[serde(default, rename = "clientboundary")]
    pub client_boundary: bool,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

/// One resolution attempt: a specifier seen from a requesting file.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResolutionRequest {
    pub specifier: String,
    /// Absolute path of the file containing the import.
    pub requesting_file: PathBuf,
    pub platform: Platform,
    pub environment: Environment,
    pub is_export_build: bool,
    /// Set when the import crosses the client/server split.
    pub client_boundary: bool,
}

impl ResolutionRequest {
    /// Create a request with no environment and a development build.
    pub fn new(
        specifier: impl Into<String>,
        requesting_file: impl Into<PathBuf>,
        platform: Platform,
    ) -> Self {
        Self {
            specifier: specifier.into(),
            requesting_file: requesting_file.into(),
            platform,
            environment: Environment::None,
            is_export_build: false,
            client_boundary: false,
        }
    }

    /// Build a request from the host bundler's options bag.
    pub fn from_options(
        specifier: impl Into<String>,
        requesting_file: impl Into<PathBuf>,
        platform: Platform,
        options: &ResolverOptions,
    ) -> Self {
        Self {
            specifier: specifier.into(),
            requesting_file: requesting_file.into(),
            platform,
            environment: options.environment.unwrap_or_default(),
            is_export_build: options.exporting,
            client_boundary: options.client_boundary,
        }
    }

    #[must_use]
    pub fn with_environment(mut self, environment: Environment) -> Self {
        self.environment = environment;
        self
    }

    #[must_use]
    pub fn with_export_build(mut self, exporting: bool) -> Self {
        self.is_export_build = exporting;
        self
    }

    #[must_use]
    pub fn with_client_boundary(mut self, client_boundary: bool) -> Self {
        self.client_boundary = client_boundary;
        self
    }

    /// Same context, different specifier.
    #[must_use]
    pub fn redirect(&self, specifier: impl Into<String>) -> Self {
        Self {
            specifier: specifier.into(),
            ..self.clone()
        }
    }

    /// Directory containing the requesting file.
    #[must_use]
    pub fn origin_dir(&self) -> &Path {
        self.requesting_file.parent().unwrap_or(Path::new("."))
    }

    /// Requesting file path with forward slashes.
    #[must_use]
    pub fn origin_normalized(&self) -> String {
        fastresolve_util::fs::normalize_slashes(&self.requesting_file.to_string_lossy())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_platform_parse_roundtrip() {
        for p in [Platform::Ios, Platform::Android, Platform::Web, Platform::None] {
            assert_eq!(p.as_str().parse::<Platform>().unwrap(), p);
        }
        assert!("windows".parse::<Platform>().is_err());
    }

    #[test]
    fn test_environment_is_server() {
        assert!(Environment::Node.is_server());
        assert!(Environment::ReactServer.is_server());
        assert!(!Environment::Client.is_server());
        assert!(!Environment::None.is_server());
    }

    #[test]
    fn test_options_bag_keeps_unknown_keys() {
        let options: ResolverOptions = serde_json::from_str(
            r#"{"environment":"react-server","exporting":true,"clientboundary":true,"baseUrl":"/x"}"#,
        )
        .unwrap();

        assert_eq!(options.environment, Some(Environment::ReactServer));
        assert!(options.exporting);
        assert!(options.client_boundary);
        assert_eq!(options.extra["baseUrl"], "/x");

        let req = ResolutionRequest::from_options("react", "/app/a.js", Platform::Web, &options);
        assert_eq!(req.environment, Environment::ReactServer);
        assert!(req.is_export_build);
        assert!(req.client_boundary);
    }

    #[test]
    fn test_options_bag_defaults() {
        let options: ResolverOptions = serde_json::from_str("{}").unwrap();
        let req = ResolutionRequest::from_options("x", "/app/a.js", Platform::Ios, &options);
        assert_eq!(req.environment, Environment::None);
        assert!(!req.is_export_build);
    }

    #[test]
    fn test_redirect_keeps_context() {
        let req = ResolutionRequest::new("react-native", "/app/App.js", Platform::Web)
            .with_environment(Environment::Client);
        let next = req.redirect("react-native-web");
        assert_eq!(next.specifier, "react-native-web");
        assert_eq!(next.requesting_file, req.requesting_file);
        assert_eq!(next.environment, Environment::Client);
        assert_eq!(next.origin_dir(), Path::new("/app"));
    }
}
