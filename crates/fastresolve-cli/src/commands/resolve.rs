//! `fastresolve resolve`: resolve a single specifier.

use super::load_pipeline;
use fastresolve_core::{Platform, Resolution, ResolutionRequest, ResolveError, ResolverOptions};
use miette::{IntoDiagnostic, Result};
use serde::Serialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct ResolveArgs {
    pub specifier: String,
    pub from: PathBuf,
    pub platform: Platform,
    pub options: ResolverOptions,
}

/// One line of output. Shared with `batch`.
#[derive(Debug, Serialize)]
pub struct ResolveOutput {
    pub specifier: String,
    pub from: PathBuf,
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolution: Option<Resolution>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ResolveOutput {
    pub fn new(request: &ResolutionRequest, result: Result<Resolution, ResolveError>) -> Self {
        let (resolution, error) = match result {
            Ok(resolution) => (Some(resolution), None),
            Err(e) => (None, Some(e.to_string())),
        };
        Self {
            specifier: request.specifier.clone(),
            from: request.requesting_file.clone(),
            ok: error.is_none(),
            resolution,
            error,
        }
    }
}

/// Absolute requesting file, relative paths taken against the project root.
pub fn absolute_from(root: &Path, from: &Path) -> PathBuf {
    if from.is_absolute() {
        from.to_path_buf()
    } else {
        root.join(from)
    }
}

pub fn run(cwd: &Path, args: &ResolveArgs, json: bool) -> Result<()> {
    let pipeline = load_pipeline(cwd)?;
    let root = pipeline.config().project_root.clone();

    let request = ResolutionRequest::from_options(
        args.specifier.as_str(),
        absolute_from(&root, &args.from),
        args.platform,
        &args.options,
    );

    let result = pipeline.resolve(&request);

    if json {
        let output = ResolveOutput::new(&request, result);
        let ok = output.ok;
        println!("{}", serde_json::to_string_pretty(&output).into_diagnostic()?);
        if !ok {
            std::process::exit(1);
        }
        return Ok(());
    }

    let resolution = result.into_diagnostic()?;
    println!("{resolution}");
    Ok(())
}
