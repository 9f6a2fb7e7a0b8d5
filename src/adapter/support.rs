//! Shared precondition checks for adapter implementations.
//!
//! These are blocking filesystem calls; run them from `spawn_blocking` when
//! the adapter is otherwise async.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use uuid::Uuid;

use crate::error::ErrorEnvelope;

/// Prefix Word uses for owner/lock files next to an open document.
const LOCK_FILE_PREFIX: &str = "~$";

/// Check that the input exists, and optionally that it is a file.
pub fn validate_input_path(path: &str, must_be_file: bool) -> Result<PathBuf, ErrorEnvelope> {
    let p = PathBuf::from(path);
    if !p.exists() {
        return Err(ErrorEnvelope::invalid_input(format!("path does not exist: {path}")));
    }
    if must_be_file && p.is_dir() {
        return Err(ErrorEnvelope::invalid_input(format!(
            "expected a file but got a directory: {path}"
        )));
    }
    Ok(p)
}

fn is_docx(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("docx"))
}

/// Reject anything that is not a `.docx` file (case-insensitive).
pub fn validate_docx(path: &Path) -> Result<(), ErrorEnvelope> {
    if !is_docx(path) {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        return Err(ErrorEnvelope::unsupported_format(format!("not a .docx file: {name}")));
    }
    Ok(())
}

/// Resolve the output directory, create it, and make sure it is writable.
pub fn ensure_output_dir(output_dir: Option<&str>, fallback: &Path) -> Result<PathBuf, ErrorEnvelope> {
    let dir = match output_dir {
        Some(d) if !d.is_empty() => PathBuf::from(d),
        _ => fallback.to_path_buf(),
    };

    fs::create_dir_all(&dir).map_err(|e| output_dir_error(&dir, e))?;

    let probe = dir.join(format!(".write-probe-{}", Uuid::new_v4().simple()));
    fs::File::create(&probe).map_err(|e| output_dir_error(&dir, e))?;
    if let Err(e) = fs::remove_file(&probe) {
        tracing::debug!(path = %probe.display(), error = %e, "Failed to remove write probe");
    }
    Ok(dir)
}

fn output_dir_error(dir: &Path, err: io::Error) -> ErrorEnvelope {
    if err.kind() == io::ErrorKind::PermissionDenied {
        ErrorEnvelope::permission_denied(format!("output directory is not writable: {}", dir.display()))
    } else {
        ErrorEnvelope::invalid_input(format!("cannot prepare output directory: {}", dir.display()))
            .with_detail(err.to_string())
    }
}

/// List the `.docx` files directly inside `directory`, skipping lock files,
/// sorted case-insensitively by file name.
pub fn collect_docx_files(directory: &Path) -> Result<Vec<PathBuf>, ErrorEnvelope> {
    let entries = fs::read_dir(directory).map_err(|e| {
        ErrorEnvelope::invalid_input(format!("cannot read directory: {}", directory.display()))
            .with_detail(e.to_string())
    })?;

    let mut files: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.is_file() && is_docx(path))
        .filter(|path| {
            !path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with(LOCK_FILE_PREFIX))
        })
        .collect();

    files.sort_by_key(|p| {
        p.file_name()
            .map(|n| n.to_string_lossy().to_lowercase())
            .unwrap_or_default()
    });
    Ok(files)
}
