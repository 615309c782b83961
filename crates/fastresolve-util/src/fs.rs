use std::fs;
use std::io::{self, Write};
use std::path::{Component, Path, PathBuf};
use tempfile::NamedTempFile;

/// Read a file to string, replacing invalid UTF-8 sequences with the replacement character.
///
/// # Errors
/// Returns an error if the file cannot be read.
pub fn read_to_string_lossy(path: &Path) -> io::Result<String> {
    let bytes = fs::read(path)?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// Atomically write bytes to a file by writing to a temp file then renaming.
///
/// The file will either have the old contents or the new contents, never a
/// partial write. Each call gets its own uniquely named temp file, so
/// concurrent writers to the same path never share one.
///
/// # Errors
/// Returns an error if the write or rename fails.
pub fn atomic_write(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let parent = path.parent().unwrap_or(Path::new("."));

    // Same directory keeps the rename on one filesystem
    let mut temp = NamedTempFile::new_in(parent)?;
    temp.write_all(bytes)?;
    temp.as_file().sync_all()?;
    temp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// Write `bytes` to `path` unless the file already holds exactly those bytes.
///
/// Creates parent directories as needed. Returns `true` when the file was
/// written. Leaving identical files untouched keeps their mtime stable, so
/// watchers and mtime-keyed caches downstream do not see a change.
///
/// A failed write is not an error when `path` ends up holding `bytes`
/// anyway, as when another writer raced us to the same content.
///
/// # Errors
/// Returns an error if the directory cannot be created or the write fails.
pub fn write_if_changed(path: &Path, bytes: &[u8]) -> io::Result<bool> {
    if holds(path, bytes) {
        return Ok(false);
    }

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    match atomic_write(path, bytes) {
        Ok(()) => Ok(true),
        Err(_) if holds(path, bytes) => Ok(false),
        Err(e) => Err(e),
    }
}

fn holds(path: &Path, bytes: &[u8]) -> bool {
    fs::read(path).is_ok_and(|existing| existing == bytes)
}

/// Convert backslashes to forward slashes.
#[must_use]
pub fn normalize_slashes(path: &str) -> String {
    path.replace('\\', "/")
}

/// The portion of `path` after the last `node_modules/` segment.
///
/// `"/app/node_modules/a/node_modules/b/index.js"` gives `"b/index.js"`.
#[must_use]
pub fn strip_node_modules_prefix(path: &str) -> Option<String> {
    let normal = normalize_slashes(path);
    let marker = "node_modules/";
    let idx = normal.rfind(marker)?;
    Some(normal[idx + marker.len()..].to_string())
}

/// Build a relative import specifier that reaches `target` from `from_dir`.
///
/// Always uses forward slashes and always starts with `./` or `../`, so the
/// result is never mistaken for a bare package name.
#[must_use]
pub fn relative_specifier(from_dir: &Path, target: &Path) -> String {
    let from: Vec<Component<'_>> = from_dir.components().collect();
    let to: Vec<Component<'_>> = target.components().collect();

    let common = from
        .iter()
        .zip(to.iter())
        .take_while(|(a, b)| a == b)
        .count();

    let mut rel = PathBuf::new();
    for _ in common..from.len() {
        rel.push("..");
    }
    for component in &to[common..] {
        rel.push(component.as_os_str());
    }

    let rel = normalize_slashes(&rel.to_string_lossy());
    if rel.starts_with("../") || rel == ".." {
        rel
    } else {
        format!("./{rel}")
    }
}
