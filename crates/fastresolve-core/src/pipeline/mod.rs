//! The resolution pipeline.
//!
//! A request runs through the strategies in a fixed order; the first one to
//! decide wins. Otherwise the primitive resolver runs with a context adjusted
//! for the request, and its result goes through the post-resolution
//! rewrites.
//!
//! Strategy order:
//! 1. production-module skip (development only)
//! 2. tsconfig `paths` / `baseUrl`
//! 3. Node built-ins
//! 4. externalization rules
//! 5. aliases
//! 6. compatibility redirects

pub mod strategy;

use crate::alias::AliasTable;
use crate::config::PipelineConfig;
use crate::context::ContextFactory;
use crate::error::ResolveError;
use crate::externals::ExternalRules;
use crate::path_alias::watch::{PathAliasWatcher, WatchError};
use crate::path_alias::PathAliasResolver;
use crate::primitive::{FsResolver, PrimitiveResolver};
use crate::request::ResolutionRequest;
use crate::resolution::{Resolution, SourceKind};
use crate::shims::PostRewrite;
use crate::virtual_modules::{FsMaterializer, Materialize, VirtualModuleRegistry};
use std::sync::Arc;
use strategy::{
    AliasStrategy, CompatShim, CustomExternals, DevProdSkip, NodeBuiltins, PathAliasStrategy,
    Strategy,
};
use tracing::{debug, trace};

/// Redirects followed before giving up on a request.
pub const MAX_REDIRECT_DEPTH: usize = 16;

/// Builder for [`Pipeline`] with replaceable collaborators.
pub struct PipelineBuilder {
    config: PipelineConfig,
    primitive: Option<Arc<dyn PrimitiveResolver>>,
    materializer: Option<Arc<dyn Materialize>>,
}

impl PipelineBuilder {
    #[must_use]
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            config,
            primitive: None,
            materializer: None,
        }
    }

    /// Use `primitive` instead of [`FsResolver`].
    #[must_use]
    pub fn with_primitive(mut self, primitive: Arc<dyn PrimitiveResolver>) -> Self {
        self.primitive = Some(primitive);
        self
    }

    /// Use `materializer` instead of [`FsMaterializer`].
    #[must_use]
    pub fn with_materializer(mut self, materializer: Arc<dyn Materialize>) -> Self {
        self.materializer = Some(materializer);
        self
    }

    /// Build the rule sets and load path aliases.
    ///
    /// # Errors
    /// [`ResolveError::MisconfiguredExternal`] for an external rule with an
    /// unknown replacement, [`ResolveError::Config`] for invalid patterns or
    /// an unreadable tsconfig.
    pub fn build(self) -> Result<Pipeline, ResolveError> {
        let config = self.config;

        let path_aliases = if config.tsconfig_paths {
            Some(Arc::new(PathAliasResolver::load(config.project_root.clone())?))
        } else {
            None
        };

        let mut strategies: Vec<Box<dyn Strategy>> = vec![Box::new(DevProdSkip)];
        if let Some(resolver) = &path_aliases {
            strategies.push(Box::new(PathAliasStrategy::new(Arc::clone(resolver))));
        }
        strategies.push(Box::new(NodeBuiltins));
        strategies.push(Box::new(CustomExternals::new(ExternalRules::from_config(
            &config,
        )?)));
        strategies.push(Box::new(AliasStrategy::new(AliasTable::from_config(&config)?)));
        strategies.push(Box::new(CompatShim));

        let materializer = self
            .materializer
            .unwrap_or_else(|| Arc::new(FsMaterializer));
        let registry = Arc::new(VirtualModuleRegistry::with_materializer(
            config.virtual_path(),
            materializer,
        ));

        Ok(Pipeline {
            contexts: ContextFactory::new(&config),
            post: PostRewrite::new(&config),
            primitive: self.primitive.unwrap_or_else(|| Arc::new(FsResolver::new())),
            strategies,
            registry,
            path_aliases,
            config,
        })
    }
}

/// Resolves specifiers for one project and pipeline configuration.
///
/// Holds no per-request state; share it across threads freely.
pub struct Pipeline {
    config: PipelineConfig,
    contexts: ContextFactory,
    strategies: Vec<Box<dyn Strategy>>,
    primitive: Arc<dyn PrimitiveResolver>,
    registry: Arc<VirtualModuleRegistry>,
    path_aliases: Option<Arc<PathAliasResolver>>,
    post: PostRewrite,
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("project_root", &self.config.project_root)
            .field("strategies", &self.strategy_names())
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}

impl Pipeline {
    /// Pipeline with the default collaborators.
    ///
    /// # Errors
    /// See [`PipelineBuilder::build`].
    pub fn new(config: PipelineConfig) -> Result<Self, ResolveError> {
        PipelineBuilder::new(config).build()
    }

    #[must_use]
    pub fn builder(config: PipelineConfig) -> PipelineBuilder {
        PipelineBuilder::new(config)
    }

    #[must_use]
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    #[must_use]
    pub fn registry(&self) -> &VirtualModuleRegistry {
        &self.registry
    }

    /// Path-alias holder, when tsconfig paths are enabled.
    #[must_use]
    pub fn path_aliases(&self) -> Option<&Arc<PathAliasResolver>> {
        self.path_aliases.as_ref()
    }

    /// Names of the strategies, in the order they run.
    #[must_use]
    pub fn strategy_names(&self) -> Vec<&'static str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }

    /// Start reloading path aliases on tsconfig changes.
    ///
    /// Returns `Ok(None)` unless tsconfig paths and watching are both
    /// enabled and this is not an export build.
    ///
    /// # Errors
    /// See [`PathAliasWatcher::start`].
    pub fn watch_path_aliases(
        &self,
        exporting: bool,
    ) -> Result<Option<PathAliasWatcher>, WatchError> {
        if !self.config.watch || exporting {
            return Ok(None);
        }
        match &self.path_aliases {
            Some(resolver) => PathAliasWatcher::start(Arc::clone(resolver)).map(Some),
            None => Ok(None),
        }
    }

    /// Resolve one request.
    ///
    /// # Errors
    /// [`ResolveError::NotFound`] / [`ResolveError::PathNotFound`] when the
    /// specifier resolves to nothing; other variants for configuration,
    /// redirect loops and I/O failures.
    pub fn resolve(&self, request: &ResolutionRequest) -> Result<Resolution, ResolveError> {
        self.resolve_at(request, 0)
    }

    /// Resolve, turning ordinary misses into `Ok(None)`.
    ///
    /// # Errors
    /// Every error other than a miss.
    pub fn optional_resolve(
        &self,
        request: &ResolutionRequest,
    ) -> Result<Option<Resolution>, ResolveError> {
        self.optional_resolve_at(request, 0)
    }

    /// Resolve `request` with `specifier` substituted, one redirect deeper.
    ///
    /// # Errors
    /// See [`Pipeline::resolve`].
    pub fn redirect(
        &self,
        request: &ResolutionRequest,
        specifier: impl Into<String>,
        depth: usize,
    ) -> Result<Resolution, ResolveError> {
        self.resolve_at(&request.redirect(specifier), depth + 1)
    }

    pub(crate) fn resolve_at(
        &self,
        request: &ResolutionRequest,
        depth: usize,
    ) -> Result<Resolution, ResolveError> {
        if depth > MAX_REDIRECT_DEPTH {
            return Err(ResolveError::RedirectLoop {
                specifier: request.specifier.clone(),
                from: request.requesting_file.clone(),
                depth,
            });
        }

        for strategy in &self.strategies {
            if let Some(resolution) = strategy.resolve(self, request, depth)? {
                trace!(
                    strategy = strategy.name(),
                    specifier = %request.specifier,
                    resolution = %resolution,
                    "Resolved by strategy"
                );
                return Ok(resolution);
            }
        }

        self.fallback(request)
    }

    pub(crate) fn optional_resolve_at(
        &self,
        request: &ResolutionRequest,
        depth: usize,
    ) -> Result<Option<Resolution>, ResolveError> {
        swallow_miss(self.resolve_at(request, depth))
    }

    /// Primitive resolution followed by the post-resolution rewrites.
    ///
    /// # Errors
    /// See [`Pipeline::resolve`].
    pub fn fallback(&self, request: &ResolutionRequest) -> Result<Resolution, ResolveError> {
        let ctx = self.contexts.for_request(request);
        let resolution = match self.primitive.resolve(&ctx, request) {
            Ok(resolution) => resolution,
            Err(e) => {
                debug!(
                    specifier = %request.specifier,
                    from = %request.requesting_file.display(),
                    error = %e,
                    "Primitive resolution failed"
                );
                return Err(e);
            }
        };

        let resolution = match resolution {
            Resolution::SourceFile {
                path,
                kind: SourceKind::Module,
            } if self.registry.owns(&path) => {
                Resolution::source_file_of(path, SourceKind::Generated)
            }
            other => other,
        };

        self.post.apply(request, resolution, &self.registry)
    }

    pub(crate) fn optional_fallback(
        &self,
        request: &ResolutionRequest,
    ) -> Result<Option<Resolution>, ResolveError> {
        swallow_miss(self.fallback(request))
    }
}

fn swallow_miss(result: Result<Resolution, ResolveError>) -> Result<Option<Resolution>, ResolveError> {
    match result {
        Ok(resolution) => Ok(Some(resolution)),
        Err(e) if e.is_resolution_miss() => Ok(None),
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ResolutionContext;
    use crate::request::Platform;
    use std::path::PathBuf;

    /// Resolves every specifier to `/virtual/<specifier>.js`, except `missing`.
    struct EchoResolver;

    impl PrimitiveResolver for EchoResolver {
        fn resolve(
            &self,
            _ctx: &ResolutionContext,
            request: &ResolutionRequest,
        ) -> Result<Resolution, ResolveError> {
            if request.specifier == "missing" {
                return Err(ResolveError::not_found(request, "echo miss"));
            }
            Ok(Resolution::source_file(PathBuf::from(format!(
                "/virtual/{}.js",
                request.specifier
            ))))
        }
    }

    fn pipeline(config: PipelineConfig) -> Pipeline {
        Pipeline::builder(config.with_tsconfig_paths(false))
            .with_primitive(Arc::new(EchoResolver))
            .build()
            .unwrap()
    }

    #[test]
    fn test_strategy_order() {
        let p = Pipeline::builder(PipelineConfig::new("/nonexistent"))
            .with_primitive(Arc::new(EchoResolver))
            .build()
            .unwrap();
        assert_eq!(
            p.strategy_names(),
            vec!["dev-prod-skip", "path-alias", "node-builtins", "externals", "alias", "compat"]
        );

        let p = pipeline(PipelineConfig::new("/nonexistent"));
        assert!(!p.strategy_names().contains(&"path-alias"));
    }

    #[test]
    fn test_fallback_to_primitive() {
        let p = pipeline(PipelineConfig::new("/app"));
        let req = ResolutionRequest::new("lodash", "/app/a.js", Platform::Ios);
        assert_eq!(
            p.resolve(&req).unwrap(),
            Resolution::source_file("/virtual/lodash.js")
        );
    }

    #[test]
    fn test_optional_resolve_swallows_misses_only() {
        let p = pipeline(PipelineConfig::new("/app"));
        let req = ResolutionRequest::new("missing", "/app/a.js", Platform::Ios);
        assert!(p.resolve(&req).unwrap_err().is_resolution_miss());
        assert_eq!(p.optional_resolve(&req).unwrap(), None);
    }

    #[test]
    fn test_alias_loop_is_bounded() {
        let config = PipelineConfig::new("/app")
            .with_alias(Platform::Ios, "a", "b")
            .with_alias(Platform::Ios, "b", "a");
        let p = pipeline(config);
        let req = ResolutionRequest::new("a", "/app/x.js", Platform::Ios);
        let err = p.resolve(&req).unwrap_err();
        assert!(matches!(err, ResolveError::RedirectLoop { .. }));
        assert!(!err.is_resolution_miss());
    }

    #[test]
    fn test_compat_redirect_on_native_only() {
        let p = pipeline(PipelineConfig::new("/app"));
        let ios = ResolutionRequest::new("@firebase/auth", "/app/x.js", Platform::Ios);
        assert_eq!(
            p.resolve(&ios).unwrap().path().unwrap(),
            PathBuf::from("/virtual/@firebase/auth/dist/rn/index.js.js")
        );
        let web = ResolutionRequest::new("@firebase/auth", "/app/x.js", Platform::Web);
        assert_eq!(
            p.resolve(&web).unwrap().path().unwrap(),
            PathBuf::from("/virtual/@firebase/auth.js")
        );
    }

    #[test]
    fn test_misconfigured_external_fails_build() {
        let config = PipelineConfig::new("/app").with_external(crate::config::ExternalRuleConfig {
            pattern: "^x$".into(),
            replace: "inline".into(),
            environments: vec![],
            client_boundary: false,
            dev_only: true,
        });
        let err = Pipeline::builder(config.with_tsconfig_paths(false))
            .build()
            .unwrap_err();
        assert!(matches!(err, ResolveError::MisconfiguredExternal { .. }));
    }

    #[test]
    fn test_watch_not_started_when_disabled_or_exporting() {
        let p = pipeline(PipelineConfig::new("/app"));
        assert!(p.watch_path_aliases(false).unwrap().is_none());

        let p = pipeline(PipelineConfig::new("/app").with_watch(true));
        assert!(p.watch_path_aliases(true).unwrap().is_none());
        // tsconfig paths are disabled in `pipeline`
        assert!(p.watch_path_aliases(false).unwrap().is_none());
    }
}
