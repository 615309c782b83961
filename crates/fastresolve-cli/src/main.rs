#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::struct_excessive_bools)]
#![allow(clippy::needless_pass_by_value)]
#![allow(clippy::too_many_lines)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::doc_markdown)]

mod commands;
mod logging;

use clap::Parser;
use fastresolve_core::{Environment, Platform, ResolverOptions};
use miette::Result;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "fastresolve")]
#[command(author, version, about = "Multi-platform JavaScript module resolution", long_about = None)]
struct Cli {
    /// Increase logging verbosity (-v for INFO, -vv for DEBUG, -vvv for TRACE)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Emit JSON formatted output (stable, machine-readable)
    #[arg(long, global = true)]
    json: bool,

    /// Override the project root
    #[arg(long, global = true, value_name = "PATH")]
    cwd: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

/// Target flags shared by `resolve` and `batch`.
#[derive(clap::Args, Debug, Clone)]
struct TargetArgs {
    /// Target platform (ios, android, web, none)
    #[arg(long, short, default_value = "none")]
    platform: Platform,

    /// Target environment (client, node, react-server)
    #[arg(long, short, default_value = "none")]
    environment: Environment,

    /// Resolve for a production export instead of the dev server
    #[arg(long)]
    exporting: bool,

    /// The import crosses the client/server boundary
    #[arg(long)]
    client_boundary: bool,
}

impl TargetArgs {
    /// The options bag a host bundler would pass along with each request.
    fn options(&self) -> ResolverOptions {
        ResolverOptions {
            environment: Some(self.environment),
            exporting: self.exporting,
            client_boundary: self.client_boundary,
            ..ResolverOptions::default()
        }
    }
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Print version information
    Version,

    /// Resolve one specifier
    Resolve {
        /// Module specifier as written in the import
        specifier: String,

        /// File containing the import, relative to the project root
        #[arg(long, value_name = "FILE", default_value = "index.js")]
        from: PathBuf,

        #[command(flatten)]
        target: TargetArgs,
    },

    /// Resolve `<specifier>\t<from>[\t<options json>]` lines read from stdin, one JSON result per line
    Batch {
        #[command(flatten)]
        target: TargetArgs,

        /// Reload tsconfig/jsconfig path aliases when they change
        #[arg(long)]
        watch: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let cwd = cli
        .cwd
        .or_else(|| std::env::current_dir().ok())
        .unwrap_or_else(|| PathBuf::from("."));

    logging::init(cli.verbose, cli.json);

    match cli.command {
        Some(Commands::Resolve {
            specifier,
            from,
            target,
        }) => commands::resolve::run(
            &cwd,
            &commands::resolve::ResolveArgs {
                specifier,
                from,
                platform: target.platform,
                options: target.options(),
            },
            cli.json,
        ),
        Some(Commands::Batch { target, watch }) => commands::batch::run(
            &cwd,
            &commands::batch::BatchArgs {
                platform: target.platform,
                options: target.options(),
                watch,
            },
        ),
        Some(Commands::Version) | None => commands::version::run(),
    }
}
