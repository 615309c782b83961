//! The ordered resolution strategies.
//!
//! Each strategy either decides (`Some`), or passes (`None`) to the next one.
//! Strategies that rewrite a specifier resolve the rewrite by recursing into
//! the pipeline through [`Pipeline::redirect`].

use super::Pipeline;
use crate::alias::AliasTable;
use crate::error::ResolveError;
use crate::externals::{
    builtin_stub, node_builtin_id, node_external_stub, weak_stub, ExternalRules, ReplaceKind,
};
use crate::path_alias::PathAliasResolver;
use crate::primitive::is_absolute_path;
use crate::request::{Platform, ResolutionRequest};
use crate::resolution::Resolution;
use fastresolve_util::fs::{normalize_slashes, relative_specifier, strip_node_modules_prefix};
use std::sync::Arc;
use tracing::debug;

/// One step of the pipeline.
pub trait Strategy: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &'static str;

    /// Decide `request`, or return `None` to let the next step handle it.
    ///
    /// `depth` is the current redirect depth, passed back to
    /// [`Pipeline::redirect`] when recursing.
    ///
    /// # Errors
    /// Any error aborts the resolution.
    fn resolve(
        &self,
        pipeline: &Pipeline,
        request: &ResolutionRequest,
        depth: usize,
    ) -> Result<Option<Resolution>, ResolveError>;
}

/// Package name of the `node_modules` package containing `path`.
fn containing_package(path: &str) -> Option<String> {
    let inner = strip_node_modules_prefix(path)?;
    let mut segments = inner.split('/');
    let first = segments.next()?;
    if first.starts_with('@') {
        let second = segments.next()?;
        Some(format!("{first}/{second}"))
    } else {
        Some(first.to_string())
    }
}

fn is_bare(specifier: &str) -> bool {
    !specifier.is_empty()
        && !specifier.starts_with('.')
        && !specifier.starts_with('#')
        && !specifier.starts_with("node:")
        && !is_absolute_path(specifier)
}

/// Production builds of React packages resolve to empty modules in
/// development.
pub struct DevProdSkip;

impl DevProdSkip {
    fn is_prod_bundle(request: &ResolutionRequest) -> bool {
        let spec = request.specifier.as_str();
        let Some(package) = containing_package(&request.origin_normalized()) else {
            return false;
        };

        if (spec.ends_with(".production.js") || spec.ends_with(".production.min.js"))
            && (package == "react" || package.starts_with("react-") || package == "scheduler")
        {
            return true;
        }

        request.platform != Platform::Web
            && package == "react-native"
            && ["ReactFabric-prod", "ReactNativeRenderer-prod"]
                .iter()
                .any(|name| {
                    spec.ends_with(name) || spec.strip_suffix(".js").is_some_and(|s| s.ends_with(name))
                })
    }
}

impl Strategy for DevProdSkip {
    fn name(&self) -> &'static str {
        "dev-prod-skip"
    }

    fn resolve(
        &self,
        pipeline: &Pipeline,
        request: &ResolutionRequest,
        _depth: usize,
    ) -> Result<Option<Resolution>, ResolveError> {
        if !pipeline.config().dev || request.is_export_build {
            return Ok(None);
        }
        Ok(Self::is_prod_bundle(request).then_some(Resolution::Empty))
    }
}

/// `paths` / `baseUrl` aliasing from the project's tsconfig.
pub struct PathAliasStrategy {
    resolver: Arc<PathAliasResolver>,
}

impl PathAliasStrategy {
    #[must_use]
    pub fn new(resolver: Arc<PathAliasResolver>) -> Self {
        Self { resolver }
    }
}

impl Strategy for PathAliasStrategy {
    fn name(&self) -> &'static str {
        "path-alias"
    }

    fn resolve(
        &self,
        pipeline: &Pipeline,
        request: &ResolutionRequest,
        depth: usize,
    ) -> Result<Option<Resolution>, ResolveError> {
        if !is_bare(&request.specifier) {
            return Ok(None);
        }
        let Some(config) = self.resolver.snapshot() else {
            return Ok(None);
        };

        for candidate in config.candidates(&request.specifier) {
            let candidate = candidate.to_string_lossy().into_owned();
            let redirected = request.redirect(candidate.as_str());
            if let Some(resolution) = pipeline.optional_resolve_at(&redirected, depth + 1)? {
                debug!(specifier = %request.specifier, candidate = %candidate, "Path alias matched");
                return Ok(Some(resolution));
            }
        }
        Ok(None)
    }
}

/// Node standard library modules.
pub struct NodeBuiltins;

impl Strategy for NodeBuiltins {
    fn name(&self) -> &'static str {
        "node-builtins"
    }

    fn resolve(
        &self,
        pipeline: &Pipeline,
        request: &ResolutionRequest,
        depth: usize,
    ) -> Result<Option<Resolution>, ResolveError> {
        let Some(id) = node_builtin_id(&request.specifier) else {
            return Ok(None);
        };
        let config = pipeline.config();

        if request.environment.is_server() {
            if config.native_externals {
                return Ok(Some(Resolution::NodeExternal {
                    original_name: request.specifier.clone(),
                }));
            }
            let stub = pipeline.registry().declare(&builtin_stub(id))?;
            let relative = relative_specifier(request.origin_dir(), &stub);
            return pipeline.redirect(request, relative, depth).map(Some);
        }

        // A package of the same name installed locally wins
        if let Some(resolution) = pipeline.optional_fallback(request)? {
            return Ok(Some(resolution));
        }

        if request.platform == Platform::Web || !config.strict_native_builtins {
            debug!(specifier = %request.specifier, platform = %request.platform, "Node built-in resolved to empty module");
            return Ok(Some(Resolution::Empty));
        }
        Ok(None)
    }
}

/// Built-in and user-declared externalization rules.
pub struct CustomExternals {
    rules: ExternalRules,
}

impl CustomExternals {
    #[must_use]
    pub fn new(rules: ExternalRules) -> Self {
        Self { rules }
    }
}

impl Strategy for CustomExternals {
    fn name(&self) -> &'static str {
        "externals"
    }

    fn resolve(
        &self,
        pipeline: &Pipeline,
        request: &ResolutionRequest,
        depth: usize,
    ) -> Result<Option<Resolution>, ResolveError> {
        let config = pipeline.config();
        let dev_server = config.dev && !request.is_export_build;
        let Some(rule) = self.rules.find(request, dev_server) else {
            return Ok(None);
        };
        debug!(specifier = %request.specifier, rule = %rule.name, replace = %rule.replace, "Externalizing module");

        let name = request.specifier.as_str();
        let contents = match rule.replace {
            ReplaceKind::Empty => return Ok(Some(Resolution::Empty)),
            ReplaceKind::Node if config.native_externals => {
                return Ok(Some(Resolution::NodeExternal {
                    original_name: name.to_string(),
                }));
            }
            ReplaceKind::Weak if config.native_externals => {
                return Ok(Some(Resolution::WeakExternal {
                    original_name: name.to_string(),
                }));
            }
            ReplaceKind::Node => node_external_stub(name),
            ReplaceKind::Weak => {
                let real = pipeline.fallback(request)?;
                let real_path = match real.path() {
                    Some(path) => {
                        let rel = relative_specifier(&config.project_root, path);
                        normalize_slashes(rel.strip_prefix("./").unwrap_or(&rel))
                    }
                    None => name.to_string(),
                };
                weak_stub(name, &real_path)
            }
        };

        let stub = pipeline.registry().declare(&contents)?;
        let relative = relative_specifier(request.origin_dir(), &stub);
        pipeline.redirect(request, relative, depth).map(Some)
    }
}

/// Platform-exact and universal aliases.
pub struct AliasStrategy {
    table: AliasTable,
}

impl AliasStrategy {
    #[must_use]
    pub fn new(table: AliasTable) -> Self {
        Self { table }
    }
}

impl Strategy for AliasStrategy {
    fn name(&self) -> &'static str {
        "alias"
    }

    fn resolve(
        &self,
        pipeline: &Pipeline,
        request: &ResolutionRequest,
        depth: usize,
    ) -> Result<Option<Resolution>, ResolveError> {
        match self.table.rewrite(request.platform, &request.specifier) {
            Some(target) => {
                debug!(from = %request.specifier, to = %target, "Alias");
                pipeline.redirect(request, target, depth).map(Some)
            }
            None => Ok(None),
        }
    }
}

/// Redirects for packages whose published entry points break on native.
pub struct CompatShim;

/// `(specifier, native replacement)`.
const NATIVE_COMPAT_REDIRECTS: &[(&str, &str)] =
    &[("@firebase/auth", "@firebase/auth/dist/rn/index.js")];

impl Strategy for CompatShim {
    fn name(&self) -> &'static str {
        "compat"
    }

    fn resolve(
        &self,
        pipeline: &Pipeline,
        request: &ResolutionRequest,
        depth: usize,
    ) -> Result<Option<Resolution>, ResolveError> {
        if request.platform == Platform::Web {
            return Ok(None);
        }
        match NATIVE_COMPAT_REDIRECTS
            .iter()
            .find(|(from, _)| *from == request.specifier)
        {
            Some((_, to)) => pipeline.redirect(request, *to, depth).map(Some),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_containing_package() {
        assert_eq!(
            containing_package("/app/node_modules/react-dom/cjs/a.js").as_deref(),
            Some("react-dom")
        );
        assert_eq!(
            containing_package("/app/node_modules/@scope/pkg/x.js").as_deref(),
            Some("@scope/pkg")
        );
        assert_eq!(containing_package("/app/src/a.js"), None);
    }

    #[test]
    fn test_is_bare() {
        assert!(is_bare("react"));
        assert!(is_bare("@app/widgets"));
        assert!(!is_bare("./a"));
        assert!(!is_bare("/abs"));
        assert!(!is_bare("#internal"));
        assert!(!is_bare("node:fs"));
        assert!(!is_bare(""));
    }

    #[test]
    fn test_prod_bundle_detection() {
        let from_react = "/app/node_modules/react/index.js";
        let req = ResolutionRequest::new("./cjs/react.production.min.js", from_react, Platform::Ios);
        assert!(DevProdSkip::is_prod_bundle(&req));

        let req = ResolutionRequest::new("./cjs/react.development.js", from_react, Platform::Ios);
        assert!(!DevProdSkip::is_prod_bundle(&req));

        let from_app = "/app/src/a.js";
        let req = ResolutionRequest::new("./x.production.js", from_app, Platform::Ios);
        assert!(!DevProdSkip::is_prod_bundle(&req));

        let from_rn = "/app/node_modules/react-native/Libraries/Renderer/shims/ReactNative.js";
        let req = ResolutionRequest::new(
            "../implementations/ReactNativeRenderer-prod",
            from_rn,
            Platform::Android,
        );
        assert!(DevProdSkip::is_prod_bundle(&req));
        let web = ResolutionRequest {
            platform: Platform::Web,
            ..req
        };
        assert!(!DevProdSkip::is_prod_bundle(&web));
    }
}
