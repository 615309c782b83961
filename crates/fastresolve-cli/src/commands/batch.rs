//! `fastresolve batch`: resolve requests streamed on stdin.
//!
//! Each input line is `<specifier>`, `<specifier>\t<from>` or
//! `<specifier>\t<from>\t<options>`, where `<options>` is the host bundler's
//! options bag as JSON (`{"environment":"node","clientboundary":true}`). Keys
//! it sets override the command-line flags for that line. Each output line is
//! one JSON object. With `--watch`, path aliases are reloaded when
//! the project's tsconfig/jsconfig changes between requests.

use super::load_config;
use super::resolve::{absolute_from, ResolveOutput};
use fastresolve_core::{run_exit_hooks, Pipeline, Platform, ResolutionRequest, ResolverOptions};
use miette::{IntoDiagnostic, Result};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::signal;
use tracing::{debug, info};

#[derive(Debug, Clone)]
pub struct BatchArgs {
    pub platform: Platform,
    pub options: ResolverOptions,
    pub watch: bool,
}

/// Output for a line that could not be parsed.
#[derive(Debug, Serialize)]
struct LineError<'a> {
    line: &'a str,
    ok: bool,
    error: String,
}

pub fn run(cwd: &Path, args: &BatchArgs) -> Result<()> {
    let rt = tokio::runtime::Runtime::new().into_diagnostic()?;
    let result = rt.block_on(run_async(cwd, args));
    run_exit_hooks();
    result
}

async fn run_async(cwd: &Path, args: &BatchArgs) -> Result<()> {
    let mut config = load_config(cwd)?;
    if args.watch {
        config = config.with_watch(true);
    }
    let pipeline = Pipeline::new(config).into_diagnostic()?;

    // Held until the loop ends; dropping it stops the watch
    let watcher = pipeline
        .watch_path_aliases(args.options.exporting)
        .into_diagnostic()?;
    if watcher.is_some() {
        info!("Watching path aliases for changes");
    }

    let root = pipeline.config().project_root.clone();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    let ctrl_c = signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line.into_diagnostic()? else {
                    debug!("stdin closed");
                    break;
                };
                let mut encoded = match parse_line(&line, &root, args) {
                    Ok(Some(request)) => {
                        let output = ResolveOutput::new(&request, pipeline.resolve(&request));
                        serde_json::to_string(&output).into_diagnostic()?
                    }
                    Ok(None) => continue,
                    Err(error) => {
                        let output = LineError { line: &line, ok: false, error };
                        serde_json::to_string(&output).into_diagnostic()?
                    }
                };
                encoded.push('\n');
                stdout.write_all(encoded.as_bytes()).await.into_diagnostic()?;
                stdout.flush().await.into_diagnostic()?;
            }
            _ = &mut ctrl_c => {
                info!("Interrupted");
                break;
            }
        }
    }

    Ok(())
}

/// Parse one input line. Blank lines and `#` comments give `Ok(None)`.
fn parse_line(
    line: &str,
    root: &Path,
    args: &BatchArgs,
) -> std::result::Result<Option<ResolutionRequest>, String> {
    let line = line.trim_end_matches(['\r', '\n']);
    if line.trim().is_empty() || line.starts_with('#') {
        return Ok(None);
    }

    let mut fields = line.splitn(3, '\t');
    let specifier = fields.next().unwrap_or_default();
    let from = fields
        .next()
        .filter(|f| !f.is_empty())
        .map_or_else(|| PathBuf::from("index.js"), PathBuf::from);
    let options = match fields.next() {
        Some(json) => merge_options(&args.options, json)?,
        None => args.options.clone(),
    };

    Ok(Some(ResolutionRequest::from_options(
        specifier,
        absolute_from(root, &from),
        args.platform,
        &options,
    )))
}

/// Per-line options on top of the command-line ones.
fn merge_options(base: &ResolverOptions, json: &str) -> std::result::Result<ResolverOptions, String> {
    let line: ResolverOptions =
        serde_json::from_str(json).map_err(|e| format!("invalid resolver options: {e}"))?;
    Ok(ResolverOptions {
        environment: line.environment.or(base.environment),
        exporting: line.exporting || base.exporting,
        client_boundary: line.client_boundary || base.client_boundary,
        extra: line.extra,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use fastresolve_core::Environment;

    fn args() -> BatchArgs {
        BatchArgs {
            platform: Platform::Web,
            options: ResolverOptions {
                environment: Some(Environment::Client),
                ..ResolverOptions::default()
            },
            watch: false,
        }
    }

    #[test]
    fn test_parse_line() {
        let root = Path::new("/app");
        let req = parse_line("react\tsrc/App.js", root, &args()).unwrap().unwrap();
        assert_eq!(req.specifier, "react");
        assert_eq!(req.requesting_file, PathBuf::from("/app/src/App.js"));
        assert_eq!(req.platform, Platform::Web);
        assert_eq!(req.environment, Environment::Client);
        assert!(!req.client_boundary);

        let req = parse_line("./a", root, &args()).unwrap().unwrap();
        assert_eq!(req.requesting_file, PathBuf::from("/app/index.js"));

        assert!(parse_line("", root, &args()).unwrap().is_none());
        assert!(parse_line("# comment", root, &args()).unwrap().is_none());
    }

    #[test]
    fn test_parse_line_with_options_bag() {
        let root = Path::new("/app");
        let req = parse_line(
            "react\tsrc/App.js\t{\"environment\":\"node\",\"clientboundary\":true,\"custom\":1}",
            root,
            &args(),
        )
        .unwrap()
        .unwrap();
        assert_eq!(req.environment, Environment::Node);
        assert!(req.client_boundary);
        assert!(!req.is_export_build);

        let req = parse_line("react\tsrc/App.js\t{\"exporting\":true}", root, &args())
            .unwrap()
            .unwrap();
        assert_eq!(req.environment, Environment::Client);
        assert!(req.is_export_build);

        let err = parse_line("react\tsrc/App.js\t{nope", root, &args()).unwrap_err();
        assert!(err.starts_with("invalid resolver options"));
    }

    #[test]
    fn test_client_boundary_flag_applies_to_every_line() {
        let mut args = args();
        args.options.client_boundary = true;
        let req = parse_line("react", Path::new("/app"), &args).unwrap().unwrap();
        assert!(req.client_boundary);
    }
}
