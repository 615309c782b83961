use crate::request::{Environment, Platform, ResolutionRequest};
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while resolving a specifier.
#[derive(Error, Debug)]
pub enum ResolveError {
    /// A bare specifier did not resolve to any package.
    #[error("could not resolve module '{specifier}' imported from '{from}' (platform: {platform}, environment: {environment}): {reason}")]
    NotFound {
        specifier: String,
        from: PathBuf,
        platform: Platform,
        environment: Environment,
        reason: String,
    },

    /// A relative or absolute specifier did not resolve to a file.
    #[error("could not resolve path '{specifier}' imported from '{from}' (platform: {platform}, environment: {environment}): {reason}")]
    PathNotFound {
        specifier: String,
        from: PathBuf,
        platform: Platform,
        environment: Environment,
        reason: String,
    },

    #[error("invalid external replacement '{kind}' for module pattern '{pattern}'")]
    MisconfiguredExternal { pattern: String, kind: String },

    #[error("importing native-only module '{specifier}' on web from '{from}'")]
    NativeOnly { specifier: String, from: PathBuf },

    #[error("too many redirects resolving '{specifier}' from '{from}' (depth {depth})")]
    RedirectLoop {
        specifier: String,
        from: PathBuf,
        depth: usize,
    },

    #[error("failed to materialize virtual module at {path}: {source}")]
    VirtualModule {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ResolveError {
    /// Module-level miss for `request`.
    #[must_use]
    pub fn not_found(request: &ResolutionRequest, reason: impl Into<String>) -> Self {
        Self::NotFound {
            specifier: request.specifier.clone(),
            from: request.requesting_file.clone(),
            platform: request.platform,
            environment: request.environment,
            reason: reason.into(),
        }
    }

    /// Path-level miss for `request`.
    #[must_use]
    pub fn path_not_found(request: &ResolutionRequest, reason: impl Into<String>) -> Self {
        Self::PathNotFound {
            specifier: request.specifier.clone(),
            from: request.requesting_file.clone(),
            platform: request.platform,
            environment: request.environment,
            reason: reason.into(),
        }
    }

    /// Whether this is an ordinary "nothing there" failure.
    ///
    /// Optional resolution attempts swallow exactly these; everything else
    /// points at a configuration or file-system fault and must propagate.
    #[must_use]
    pub fn is_resolution_miss(&self) -> bool {
        matches!(self, Self::NotFound { .. } | Self::PathNotFound { .. })
    }
}

/// Errors raised while loading pipeline or path-alias configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config at {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config at {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("Invalid pattern '{pattern}': {message}")]
    InvalidPattern { pattern: String, message: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_message_carries_context() {
        let req = ResolutionRequest::new("lodash", "/app/src/a.js", Platform::Ios)
            .with_environment(Environment::Client);
        let err = ResolveError::not_found(&req, "no node_modules");
        let msg = err.to_string();
        assert!(msg.contains("could not resolve module 'lodash'"));
        assert!(msg.contains("/app/src/a.js"));
        assert!(msg.contains("platform: ios"));
        assert!(msg.contains("environment: client"));
    }

    #[test]
    fn test_only_misses_are_swallowable() {
        let req = ResolutionRequest::new("x", "/a.js", Platform::Web);
        assert!(ResolveError::not_found(&req, "").is_resolution_miss());
        assert!(ResolveError::path_not_found(&req, "").is_resolution_miss());
        assert!(!ResolveError::Io(std::io::Error::other("disk")).is_resolution_miss());
        assert!(!ResolveError::MisconfiguredExternal {
            pattern: "x".into(),
            kind: "bogus".into()
        }
        .is_resolution_miss());
    }
}
