//! The decision produced by the pipeline.

use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};

/// How a source file came to be the answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    /// A file found by normal resolution.
    #[default]
    Module,
    /// A stub materialized by the virtual module registry.
    Generated,
    /// A static web shim substituted for a dependency file.
    Shim,
    /// An override from the canary runtime directory.
    Canary,
}

/// Outcome of resolving one specifier.
///
/// Exactly one variant; consumers dispatch on the tag alone.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Resolution {
    /// Absolute path to a source file.
    SourceFile { path: PathBuf, kind: SourceKind },
    /// Absolute path to an asset (image, font, ...).
    Asset { path: PathBuf },
    /// Resolve to an empty module.
    Empty,
    /// Left out of the bundle; required from Node at runtime.
    NodeExternal {
        #[serde(rename = "originalName")]
        original_name: String,
    },
    /// Left out of the bundle; looked up lazily at runtime.
    WeakExternal {
        #[serde(rename = "originalName")]
        original_name: String,
    },
}

impl Resolution {
    #[must_use]
    pub fn source_file(path: impl Into<PathBuf>) -> Self {
        Self::SourceFile {
            path: path.into(),
            kind: SourceKind::Module,
        }
    }

    #[must_use]
    pub fn source_file_of(path: impl Into<PathBuf>, kind: SourceKind) -> Self {
        Self::SourceFile {
            path: path.into(),
            kind,
        }
    }

    /// File path for `SourceFile` and `Asset`.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        match self {
            Self::SourceFile { path, .. } | Self::Asset { path } => Some(path),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }

    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::SourceFile { .. } => "sourceFile",
            Self::Asset { .. } => "asset",
            Self::Empty => "empty",
            Self::NodeExternal { .. } => "nodeExternal",
            Self::WeakExternal { .. } => "weakExternal",
        }
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SourceFile { path, kind } => {
                write!(f, "sourceFile({kind:?}) {}", path.display())
            }
            Self::Asset { path } => write!(f, "asset {}", path.display()),
            Self::Empty => write!(f, "empty"),
            Self::NodeExternal { original_name } => write!(f, "node external '{original_name}'"),
            Self::WeakExternal { original_name } => write!(f, "weak external '{original_name}'"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serializes_with_type_tag() {
        let json = serde_json::to_value(Resolution::source_file("/app/a.js")).unwrap();
        assert_eq!(json["type"], "sourceFile");
        assert_eq!(json["path"], "/app/a.js");
        assert_eq!(json["kind"], "module");

        let json = serde_json::to_value(Resolution::NodeExternal {
            original_name: "os".into(),
        })
        .unwrap();
        assert_eq!(json["type"], "nodeExternal");
        assert_eq!(json["originalName"], "os");

        let json = serde_json::to_value(Resolution::Empty).unwrap();
        assert_eq!(json["type"], "empty");
    }

    #[test]
    fn test_path_only_for_files() {
        assert!(Resolution::source_file("/a.js").path().is_some());
        assert!(Resolution::Asset {
            path: "/a.png".into()
        }
        .path()
        .is_some());
        assert!(Resolution::Empty.path().is_none());
    }
}
