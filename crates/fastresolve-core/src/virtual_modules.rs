//! Content-addressed registry of generated modules.
//!
//! Stubs live at `<virtual_dir>/<hash>/index.js`, where `hash` is the BLAKE3
//! content hash. The path is a pure function of the contents, so the same
//! stub declared from any requester, in any process, lands at the same path.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use fastresolve_util::fs::write_if_changed;
use fastresolve_util::hash::content_hash;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

use crate::error::ResolveError;

/// File name of every materialized stub.
pub const STUB_FILE: &str = "index.js";

/// Writes a declared module where the bundler can read it.
pub trait Materialize: Send + Sync {
    /// Make `contents` readable at `path`.
    ///
    /// # Errors
    /// Returns an error if the module could not be written.
    fn materialize(&self, path: &Path, contents: &str) -> io::Result<()>;
}

/// Writes stubs to disk, leaving identical existing files untouched.
#[derive(Debug, Default, Clone, Copy)]
pub struct FsMaterializer;

impl Materialize for FsMaterializer {
    fn materialize(&self, path: &Path, contents: &str) -> io::Result<()> {
        let written = write_if_changed(path, contents.as_bytes())?;
        debug!(path = %path.display(), written, "Materialized virtual module");
        Ok(())
    }
}

/// Process-wide map from content hash to materialized path.
pub struct VirtualModuleRegistry {
    root: PathBuf,
    entries: DashMap<String, PathBuf>,
    materializer: Arc<dyn Materialize>,
}

impl std::fmt::Debug for VirtualModuleRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VirtualModuleRegistry")
            .field("root", &self.root)
            .field("entries", &self.entries.len())
            .finish_non_exhaustive()
    }
}

impl VirtualModuleRegistry {
    /// Registry writing under `root` with the file-system materializer.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self::with_materializer(root, Arc::new(FsMaterializer))
    }

    #[must_use]
    pub fn with_materializer(root: impl Into<PathBuf>, materializer: Arc<dyn Materialize>) -> Self {
        Self {
            root: root.into(),
            entries: DashMap::new(),
            materializer,
        }
    }

    /// Directory holding all stubs.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path a stub with this content hash lives at.
    #[must_use]
    pub fn path_for_hash(&self, hash: &str) -> PathBuf {
        self.root.join(hash).join(STUB_FILE)
    }

    /// Register `contents` and return the absolute path of its stub.
    ///
    /// The first declaration of a given content materializes it; later ones,
    /// including concurrent ones, return the same path without writing.
    ///
    /// # Errors
    /// Returns [`ResolveError::VirtualModule`] if materialization fails. The
    /// entry is not recorded in that case, so a later call retries.
    pub fn declare(&self, contents: &str) -> Result<PathBuf, ResolveError> {
        let hash = content_hash(contents);

        if let Some(existing) = self.entries.get(&hash) {
            return Ok(existing.clone());
        }

        match self.entries.entry(hash) {
            Entry::Occupied(entry) => Ok(entry.get().clone()),
            Entry::Vacant(entry) => {
                let path = self.path_for_hash(entry.key());
                self.materializer
                    .materialize(&path, contents)
                    .map_err(|source| ResolveError::VirtualModule {
                        path: path.clone(),
                        source,
                    })?;
                entry.insert(path.clone());
                Ok(path)
            }
        }
    }

    /// Whether `path` lies inside the registry directory.
    #[must_use]
    pub fn owns(&self, path: &Path) -> bool {
        path.starts_with(&self.root)
            || dunce::canonicalize(&self.root).is_ok_and(|root| path.starts_with(root))
    }

    /// Number of distinct stubs declared.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
