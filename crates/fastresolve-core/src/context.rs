//! Per-request resolution context handed to the primitive resolver.
//!
//! The base context comes from the pipeline config. Each request gets a copy
//! adjusted for its environment and platform: server bundles resolve like
//! Node (package exports, `node`/`require` conditions, `mjs` after `js`),
//! client bundles prefer browser or react-native entry points.

use crate::config::PipelineConfig;
use crate::request::{Environment, Platform, ResolutionRequest};

/// Options the primitive resolver probes with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolutionContext {
    pub platform: Platform,
    pub environment: Environment,
    /// `package.json` fields consulted for a package entry, in order.
    pub main_fields: Vec<String>,
    /// Active conditions for `package.json` exports.
    pub condition_names: Vec<String>,
    /// Source extensions without leading dots, in probe order.
    pub source_exts: Vec<String>,
    /// Asset extensions without leading dots.
    pub asset_exts: Vec<String>,
    /// Consult the `exports` field of packages.
    pub enable_package_exports: bool,
    /// Probe `.native.*` files on iOS and Android.
    pub prefer_native_platform: bool,
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(ToString::to_string).collect()
}

/// Reorder extensions so `mjs` sorts after `js`, as Node does.
///
/// `["ts", "mjs", "js", "json"]` becomes `["ts", "js", "mjs", "json"]`.
#[must_use]
pub fn nodejs_source_exts(exts: &[String]) -> Vec<String> {
    let mut out: Vec<String> = exts.iter().filter(|e| *e != "mjs").cloned().collect();
    if exts.iter().any(|e| e == "mjs") {
        let pos = out.iter().position(|e| e == "js").map_or(out.len(), |i| i + 1);
        out.insert(pos, "mjs".to_string());
    }
    out
}

/// Builds request contexts from one pipeline config.
#[derive(Debug, Clone)]
pub struct ContextFactory {
    source_exts: Vec<String>,
    nodejs_exts: Vec<String>,
    asset_exts: Vec<String>,
}

impl ContextFactory {
    #[must_use]
    pub fn new(config: &PipelineConfig) -> Self {
        Self {
            source_exts: config.source_exts.clone(),
            nodejs_exts: nodejs_source_exts(&config.source_exts),
            asset_exts: config.asset_exts.clone(),
        }
    }

    /// Context for a single request.
    #[must_use]
    pub fn for_request(&self, request: &ResolutionRequest) -> ResolutionContext {
        let platform = request.platform;
        let environment = request.environment;

        if environment.is_server() {
            let react_server = environment == Environment::ReactServer;
            let main_fields = match (react_server, platform == Platform::Web) {
                (true, true) => strings(&["module", "main"]),
                (true, false) => strings(&["react-native", "module", "main"]),
                (false, true) => strings(&["main", "module"]),
                (false, false) => strings(&["react-native", "main", "module"]),
            };
            let condition_names = if react_server {
                strings(&["node", "require", "react-server", "workerd"])
            } else {
                strings(&["node", "require"])
            };
            return ResolutionContext {
                platform,
                environment,
                main_fields,
                condition_names,
                source_exts: self.nodejs_exts.clone(),
                asset_exts: self.asset_exts.clone(),
                enable_package_exports: true,
                prefer_native_platform: platform.is_native(),
            };
        }

        let (main_fields, condition_names) = match platform {
            Platform::Web => (
                strings(&["browser", "module", "main"]),
                strings(&["require", "import", "browser"]),
            ),
            Platform::Ios | Platform::Android => (
                strings(&["react-native", "browser", "main"]),
                strings(&["require", "import", "react-native"]),
            ),
            Platform::None => (
                strings(&["module", "main"]),
                strings(&["require", "import"]),
            ),
        };

        ResolutionContext {
            platform,
            environment,
            main_fields,
            condition_names,
            source_exts: self.source_exts.clone(),
            asset_exts: self.asset_exts.clone(),
            enable_package_exports: false,
            prefer_native_platform: platform.is_native(),
        }
    }
}
