//! Rewrites applied to files the primitive resolver found inside
//! `node_modules`.
//!
//! On web, native-only modules are rejected, the two asset registries are
//! unified, and static shims replace dependency files. Elsewhere, server
//! bundles skip `InitializeCore` and canary overrides replace dependency
//! files.

use crate::config::PipelineConfig;
use crate::error::ResolveError;
use crate::request::{Environment, Platform, ResolutionRequest};
use crate::resolution::{Resolution, SourceKind};
use crate::virtual_modules::VirtualModuleRegistry;
use fastresolve_util::fs::{normalize_slashes, strip_node_modules_prefix};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Single asset registry shared by `react-native-web` and React Native code.
pub const ASSET_REGISTRY_SRC: &str = "const assets=[];function registerAsset(asset){return assets.push(asset);}function getAssetByID(assetId){return assets[assetId-1];}module.exports={registerAsset,getAssetByID};";

/// Modules that only exist on native platforms.
const NATIVE_ONLY_MODULES: &[&str] = &["react-native/Libraries/Utilities/codegenNativeCommands"];

/// Asset registry files replaced by [`ASSET_REGISTRY_SRC`] on web.
const ASSET_REGISTRY_FILES: &[&str] = &[
    "react-native-web/dist/modules/AssetRegistry/index.js",
    "@react-native/assets-registry/registry.js",
];

const INITIALIZE_CORE: &str = "react-native/Libraries/Core/InitializeCore.js";

/// Post-resolution rewrites of one pipeline.
#[derive(Debug, Clone)]
pub struct PostRewrite {
    shims_dir: PathBuf,
    canary_dir: PathBuf,
    react_canary: bool,
}

impl PostRewrite {
    #[must_use]
    pub fn new(config: &PipelineConfig) -> Self {
        Self {
            shims_dir: config.shims_path(),
            canary_dir: config.canary_path(),
            react_canary: config.react_canary,
        }
    }

    /// Rewrite `resolution`, or return it unchanged.
    ///
    /// # Errors
    /// [`ResolveError::NativeOnly`] for native-only modules on web, and
    /// registry errors when declaring the unified asset registry.
    pub fn apply(
        &self,
        request: &ResolutionRequest,
        resolution: Resolution,
        registry: &VirtualModuleRegistry,
    ) -> Result<Resolution, ResolveError> {
        let Resolution::SourceFile { path, .. } = &resolution else {
            return Ok(resolution);
        };
        let normalized = normalize_slashes(&path.to_string_lossy());
        let Some(relative) = strip_node_modules_prefix(&normalized) else {
            return Ok(resolution);
        };

        if request.platform == Platform::Web {
            if NATIVE_ONLY_MODULES.contains(&request.specifier.as_str()) {
                return Err(ResolveError::NativeOnly {
                    specifier: request.specifier.clone(),
                    from: request.requesting_file.clone(),
                });
            }

            if ASSET_REGISTRY_FILES.iter().any(|f| normalized.ends_with(f)) {
                let registry_path = registry.declare(ASSET_REGISTRY_SRC)?;
                debug!(from = %normalized, to = %registry_path.display(), "Unified asset registry");
                return Ok(Resolution::source_file_of(registry_path, SourceKind::Generated));
            }

            if let Some(shim) = existing_file(&self.shims_dir, &relative) {
                debug!(module = %relative, shim = %shim.display(), "Using web shim");
                return Ok(Resolution::source_file_of(shim, SourceKind::Shim));
            }
            return Ok(resolution);
        }

        if request.environment.is_server() && normalized.ends_with(INITIALIZE_CORE) {
            return Ok(Resolution::Empty);
        }

        if self.react_canary && request.environment != Environment::ReactServer {
            if let Some(canary) = existing_file(&self.canary_dir, &relative) {
                debug!(module = %relative, canary = %canary.display(), "Using canary override");
                return Ok(Resolution::source_file_of(canary, SourceKind::Canary));
            }
        }

        Ok(resolution)
    }
}

fn existing_file(dir: &Path, relative: &str) -> Option<PathBuf> {
    let candidate = dir.join(relative);
    candidate
        .is_file()
        .then(|| dunce::canonicalize(&candidate).unwrap_or(candidate))
}
