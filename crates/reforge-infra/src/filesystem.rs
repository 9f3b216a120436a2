//! Filesystem helpers: data directory layout, source file loading and
//! relative-path safety checks shared by the sink and validation tools.

use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};

use anyhow::{Context, bail};

/// Resolve the data directory: `REFORGE_DATA_DIR`, else `~/.reforge`, else
/// `./.reforge` when no home directory is known.
pub fn resolve_data_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("REFORGE_DATA_DIR") {
        if !dir.trim().is_empty() {
            return PathBuf::from(dir);
        }
    }
    dirs::home_dir()
        .map(|home| home.join(".reforge"))
        .unwrap_or_else(|| PathBuf::from(".reforge"))
}

/// Default location for committed output: `{data_dir}/output`.
pub fn default_output_dir(data_dir: &Path) -> PathBuf {
    data_dir.join("output")
}

/// Whether `path` is a relative path naming something inside whatever
/// directory it is joined onto. `.` alone names the directory itself and is
/// refused.
pub fn is_safe_relative(path: &str) -> bool {
    normalize_relative(path).is_some()
}

/// Canonical key for a relative file path: `.` segments dropped, forward
/// slashes. `None` when the path is absolute, climbs with `..`, or names no
/// file at all.
pub fn normalize_relative(path: &str) -> Option<String> {
    let mut parts = Vec::new();
    for component in Path::new(path).components() {
        match component {
            Component::Normal(part) => parts.push(part.to_string_lossy()),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => return None,
        }
    }
    if parts.is_empty() {
        None
    } else {
        Some(parts.join("/"))
    }
}

/// Read the given files into a path -> content map keyed by the path as
/// given (forward slashes).
pub async fn read_files(paths: &[PathBuf]) -> anyhow::Result<BTreeMap<String, String>> {
    let mut files = BTreeMap::new();
    for path in paths {
        let raw = path.to_string_lossy().replace('\\', "/");
        let Some(key) = normalize_relative(&raw) else {
            bail!("file paths must be relative and stay inside the working directory: {raw}");
        };
        if files.contains_key(&key) {
            bail!("file given more than once: {key}");
        }
        let content = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("failed to read {}", path.display()))?;
        files.insert(key, content);
    }
    Ok(files)
}
