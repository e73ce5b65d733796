//! QG-013: Artifact writing: atomic, and skipped when content is unchanged.

use super::error::{GenResult, GenerationError};
use super::fingerprint::{hash_file, hash_string};
use std::path::{Path, PathBuf};

/// Derive the artifact path for one schema.
pub fn artifact_path(out_dir: &Path, out_file: &str, extension: &str) -> PathBuf {
    out_dir.join(format!("{}.{}", out_file, extension))
}

/// Write `contents` to `path` atomically (temp file + rename).
///
/// Returns `false` when the file already holds exactly `contents`, in which
/// case nothing is touched.
pub fn write_artifact(path: &Path, contents: &str) -> GenResult<bool> {
    if path.is_file() {
        if let Ok(existing) = hash_file(path) {
            if existing == hash_string(contents) {
                return Ok(false);
            }
        }
    }

    let fail = |source: std::io::Error| GenerationError::Write {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).map_err(fail)?;
        }
    }

    let mut tmp_name = path.file_name().unwrap_or_default().to_os_string();
    tmp_name.push(".tmp");
    let tmp_path = path.with_file_name(tmp_name);
    std::fs::write(&tmp_path, contents).map_err(fail)?;
    if let Err(e) = std::fs::rename(&tmp_path, path) {
        let _ = std::fs::remove_file(&tmp_path);
        return Err(fail(e));
    }
    Ok(true)
}
