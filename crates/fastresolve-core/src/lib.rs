#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::too_many_lines)]
#![allow(clippy::needless_pass_by_value)]
#![allow(clippy::return_self_not_must_use)]

//! Multi-platform module resolution.
//!
//! [`Pipeline`] decides what a module specifier refers to for a given
//! requesting file, platform and environment: a source file, an asset, a
//! generated stub, an external provided at runtime, or an empty module.

pub mod alias;
pub mod config;
pub mod context;
pub mod error;
pub mod externals;
pub mod lifecycle;
pub mod path_alias;
pub mod pipeline;
pub mod primitive;
pub mod request;
pub mod resolution;
pub mod shims;
pub mod version;
pub mod virtual_modules;

pub use config::{ExternalRuleConfig, PipelineConfig};
pub use context::{ContextFactory, ResolutionContext};
pub use error::{ConfigError, ResolveError};
pub use lifecycle::{install_exit_hook, remove_exit_hook, run_exit_hooks};
pub use path_alias::watch::{PathAliasWatcher, WatchError};
pub use path_alias::{PathAliasConfig, PathAliasResolver};
pub use pipeline::{Pipeline, PipelineBuilder, MAX_REDIRECT_DEPTH};
pub use primitive::{FsResolver, PrimitiveResolver};
pub use request::{Environment, Platform, ResolutionRequest, ResolverOptions};
pub use resolution::{Resolution, SourceKind};
pub use version::VERSION;
pub use virtual_modules::{FsMaterializer, Materialize, VirtualModuleRegistry};
