//! Single-specifier resolution against the file system.
//!
//! The pipeline treats this as an opaque primitive behind [`PrimitiveResolver`].
//! [`FsResolver`] is the default implementation:
//! - Relative specifiers: `./`, `../`
//! - Absolute filesystem specifiers
//! - Bare specifiers with `node_modules` lookup
//! - `#`-prefixed specifiers through the nearest `package.json` imports field
//! - Platform-suffixed probing: `foo.ios.js`, `foo.native.js`, `foo.js`
//! - Asset extensions resolve to [`Resolution::Asset`]
//! - Directory resolution (`package.json` exports / main fields, `index.*`)

pub mod exports;

use crate::context::ResolutionContext;
use crate::error::ResolveError;
use crate::request::ResolutionRequest;
use crate::resolution::Resolution;
use dashmap::DashMap;
use fastresolve_util::fs::read_to_string_lossy;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::trace;

/// Maximum number of tried paths to record.
const MAX_TRIED_PATHS: usize = 20;

/// The underlying resolution algorithm the pipeline falls back to.
pub trait PrimitiveResolver: Send + Sync {
    /// Resolve `request.specifier` from `request.requesting_file`.
    ///
    /// Misses must be reported as [`ResolveError::NotFound`] (bare
    /// specifiers) or [`ResolveError::PathNotFound`] (paths) so callers can
    /// tell them apart from real faults.
    fn resolve(
        &self,
        ctx: &ResolutionContext,
        request: &ResolutionRequest,
    ) -> Result<Resolution, ResolveError>;
}

/// Candidate paths tried during one resolution (capped).
#[derive(Debug, Default)]
struct Tried(Vec<PathBuf>);

impl Tried {
    fn add(&mut self, path: &Path) {
        if self.0.len() < MAX_TRIED_PATHS {
            self.0.push(path.to_path_buf());
        }
    }

    fn summary(&self) -> String {
        match self.0.last() {
            Some(last) => format!(
                "no matching file ({} candidates tried, last {})",
                self.0.len(),
                last.display()
            ),
            None => "no matching file".to_string(),
        }
    }
}

/// File-system resolver with a `package.json` cache.
#[derive(Debug, Default)]
pub struct FsResolver {
    pkg_json_cache: DashMap<PathBuf, Option<Arc<Value>>>,
}

impl FsResolver {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop cached `package.json` contents.
    pub fn clear_cache(&self) {
        self.pkg_json_cache.clear();
    }

    fn read_pkg_json(&self, path: &Path) -> Option<Arc<Value>> {
        if let Some(cached) = self.pkg_json_cache.get(path) {
            return cached.clone();
        }
        let value = read_to_string_lossy(path)
            .ok()
            .and_then(|content| serde_json::from_str::<Value>(&content).ok())
            .map(Arc::new);
        self.pkg_json_cache.insert(path.to_path_buf(), value.clone());
        value
    }

    fn resolve_path(
        &self,
        ctx: &ResolutionContext,
        base: &Path,
        tried: &mut Tried,
    ) -> Option<Resolution> {
        if let Some(resolution) = try_asset(ctx, base) {
            return Some(resolution);
        }
        if let Some(file) = try_file(ctx, base, tried) {
            return Some(Resolution::source_file(file));
        }
        if base.is_dir() {
            return self.resolve_directory(ctx, base, tried);
        }
        None
    }

    /// `package.json` main fields, then `index.*`.
    fn resolve_directory(
        &self,
        ctx: &ResolutionContext,
        dir: &Path,
        tried: &mut Tried,
    ) -> Option<Resolution> {
        let pkg_json_path = dir.join("package.json");
        tried.add(&pkg_json_path);

        if let Some(pkg_json) = self.read_pkg_json(&pkg_json_path) {
            for field in &ctx.main_fields {
                let Some(main) = pkg_json.get(field).and_then(Value::as_str) else {
                    continue;
                };
                let main_path = dir.join(main);
                if let Some(file) = try_file(ctx, &main_path, tried) {
                    return Some(Resolution::source_file(file));
                }
                if let Some(file) = try_file(ctx, &main_path.join("index"), tried) {
                    return Some(Resolution::source_file(file));
                }
            }
        }

        try_file(ctx, &dir.join("index"), tried).map(Resolution::source_file)
    }

    fn resolve_package(
        &self,
        ctx: &ResolutionContext,
        pkg_dir: &Path,
        subpath: Option<&str>,
        tried: &mut Tried,
    ) -> Option<Resolution> {
        if ctx.enable_package_exports {
            let pkg_json_path = pkg_dir.join("package.json");
            if let Some(pkg_json) = self.read_pkg_json(&pkg_json_path) {
                if exports::has_exports(&pkg_json) {
                    let exports_subpath = subpath.map(|s| format!("./{s}"));
                    match exports::resolve_exports(
                        &pkg_json,
                        exports_subpath.as_deref(),
                        &ctx.condition_names,
                    ) {
                        Some(target) => {
                            let target_path = pkg_dir.join(target.trim_start_matches("./"));
                            if let Some(resolution) = self.resolve_path(ctx, &target_path, tried)
                            {
                                return Some(resolution);
                            }
                        }
                        None => {
                            trace!(
                                package = %pkg_dir.display(),
                                subpath = subpath.unwrap_or("."),
                                "Subpath not exported, falling back to file resolution"
                            );
                        }
                    }
                }
            }
        }

        match subpath {
            Some(sub) => self.resolve_path(ctx, &pkg_dir.join(sub), tried),
            None => self.resolve_directory(ctx, pkg_dir, tried),
        }
    }

    fn resolve_bare(
        &self,
        ctx: &ResolutionContext,
        request: &ResolutionRequest,
        tried: &mut Tried,
    ) -> Result<Resolution, ResolveError> {
        let (pkg_name, subpath) = parse_bare_specifier(&request.specifier);
        let mut current = Some(request.origin_dir());

        while let Some(dir) = current {
            let pkg_dir = dir.join("node_modules").join(pkg_name);
            tried.add(&pkg_dir);

            if pkg_dir.is_dir() {
                if let Some(resolution) = self.resolve_package(ctx, &pkg_dir, subpath, tried) {
                    return Ok(resolution);
                }
            }
            current = dir.parent();
        }

        Err(ResolveError::not_found(
            request,
            format!("package '{pkg_name}' not found in any node_modules"),
        ))
    }

    fn resolve_hash_import(
        &self,
        ctx: &ResolutionContext,
        request: &ResolutionRequest,
        tried: &mut Tried,
    ) -> Result<Resolution, ResolveError> {
        let mut current = Some(request.origin_dir());

        while let Some(dir) = current {
            let pkg_json_path = dir.join("package.json");
            if let Some(pkg_json) = self.read_pkg_json(&pkg_json_path) {
                tried.add(&pkg_json_path);
                if let Some(target) =
                    exports::resolve_imports_map(&pkg_json, &request.specifier, &ctx.condition_names)
                {
                    let target_path = dir.join(target.trim_start_matches("./"));
                    if let Some(resolution) = self.resolve_path(ctx, &target_path, tried) {
                        return Ok(resolution);
                    }
                }
                break;
            }
            current = dir.parent();
        }

        Err(ResolveError::not_found(request, "no matching package imports entry"))
    }
}

impl PrimitiveResolver for FsResolver {
    fn resolve(
        &self,
        ctx: &ResolutionContext,
        request: &ResolutionRequest,
    ) -> Result<Resolution, ResolveError> {
        let spec = request.specifier.as_str();
        let mut tried = Tried::default();

        if spec.is_empty() {
            return Err(ResolveError::path_not_found(request, "empty specifier"));
        }
        if spec.contains("://") || spec.starts_with("node:") || spec.starts_with("data:") {
            return Err(ResolveError::not_found(request, "unsupported scheme"));
        }
        if spec.starts_with('#') {
            return self.resolve_hash_import(ctx, request, &mut tried);
        }

        if is_relative(spec) || is_absolute_path(spec) {
            let base = if is_relative(spec) {
                path_clean::clean(request.origin_dir().join(spec))
            } else {
                PathBuf::from(spec)
            };
            return self
                .resolve_path(ctx, &base, &mut tried)
                .ok_or_else(|| ResolveError::path_not_found(request, tried.summary()));
        }

        self.resolve_bare(ctx, request, &mut tried)
    }
}

fn is_relative(spec: &str) -> bool {
    spec == "." || spec == ".." || spec.starts_with("./") || spec.starts_with("../")
}

/// Unix absolute, Windows drive (`C:\`, `C:/`) or UNC path.
pub(crate) fn is_absolute_path(spec: &str) -> bool {
    if spec.starts_with('/') || spec.starts_with("\\\\") {
        return true;
    }
    let bytes = spec.as_bytes();
    bytes.len() >= 3
        && bytes[0].is_ascii_alphabetic()
        && bytes[1] == b':'
        && (bytes[2] == b'\\' || bytes[2] == b'/')
}

/// `"lodash/fp"` gives `("lodash", Some("fp"))`, `"@scope/pkg/sub"` gives
/// `("@scope/pkg", Some("sub"))`.
pub(crate) fn parse_bare_specifier(spec: &str) -> (&str, Option<&str>) {
    let split_at = if spec.starts_with('@') {
        spec.match_indices('/').nth(1).map(|(i, _)| i)
    } else {
        spec.find('/')
    };
    match split_at {
        Some(i) => (&spec[..i], Some(&spec[i + 1..]).filter(|s| !s.is_empty())),
        None => (spec, None),
    }
}

fn canonical(path: &Path) -> PathBuf {
    dunce::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

fn try_asset(ctx: &ResolutionContext, base: &Path) -> Option<Resolution> {
    let ext = base.extension()?.to_str()?;
    if ctx.asset_exts.iter().any(|a| a == ext) && base.is_file() {
        return Some(Resolution::Asset {
            path: canonical(base),
        });
    }
    None
}

/// Exact path, then for every source extension:
/// `<base>.<platform>.<ext>`, `<base>.native.<ext>`, `<base>.<ext>`.
fn try_file(ctx: &ResolutionContext, base: &Path, tried: &mut Tried) -> Option<PathBuf> {
    if base.is_file() {
        return Some(canonical(base));
    }

    let base_str = base.to_string_lossy();
    let platform = ctx.platform.as_str();

    for ext in &ctx.source_exts {
        let mut candidates = Vec::with_capacity(3);
        if ctx.platform != crate::request::Platform::None {
            candidates.push(format!("{base_str}.{platform}.{ext}"));
        }
        if ctx.prefer_native_platform {
            candidates.push(format!("{base_str}.native.{ext}"));
        }
        candidates.push(format!("{base_str}.{ext}"));

        for candidate in candidates {
            let candidate = PathBuf::from(candidate);
            tried.add(&candidate);
            if candidate.is_file() {
                return Some(canonical(&candidate));
            }
        }
    }
    None
}
