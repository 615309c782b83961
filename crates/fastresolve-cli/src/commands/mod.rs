pub mod batch;
pub mod resolve;
pub mod version;

use fastresolve_core::{Pipeline, PipelineConfig};
use miette::{IntoDiagnostic, Result};
use std::path::Path;

/// Load `fastresolve.json` from `cwd`, or defaults rooted there.
pub fn load_config(cwd: &Path) -> Result<PipelineConfig> {
    let root = dunce::canonicalize(cwd).into_diagnostic()?;
    PipelineConfig::load(&root).into_diagnostic()
}

pub fn load_pipeline(cwd: &Path) -> Result<Pipeline> {
    Pipeline::new(load_config(cwd)?).into_diagnostic()
}
