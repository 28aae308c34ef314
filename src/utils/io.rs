//! File I/O primitives with consistent error handling.

use crate::error::{Error, Result};
use std::fs;
use std::io::ErrorKind;
use std::path::Path;

/// Read a configuration file, mapping failures to config errors.
pub fn read_config(path: &Path) -> Result<String> {
    fs::read_to_string(path).map_err(|e| match e.kind() {
        ErrorKind::NotFound => Error::config_not_found(path.display().to_string()),
        _ => Error::config_read_failed(path.display().to_string(), e.to_string()),
    })
}

/// Read file contents with standardized error handling.
pub fn read_file(path: &Path, operation: &str) -> Result<String> {
    fs::read_to_string(path)
        .map_err(|e| Error::internal_io(e.to_string(), Some(format!("{} {}", operation, path.display()))))
}

/// Write content to a file, creating parent directories as needed.
pub fn write_file(path: &Path, content: &str, operation: &str) -> Result<()> {
    ensure_parent(path, operation)?;
    fs::write(path, content)
        .map_err(|e| Error::internal_io(e.to_string(), Some(format!("{} {}", operation, path.display()))))
}

/// Copy a single file, creating parent directories as needed.
pub fn copy_file(from: &Path, to: &Path, operation: &str) -> Result<()> {
    ensure_parent(to, operation)?;
    fs::copy(from, to).map(|_| ()).map_err(|e| {
        Error::internal_io(
            e.to_string(),
            Some(format!("{} {} -> {}", operation, from.display(), to.display())),
        )
    })
}

/// Remove a file or directory tree. Missing paths are not an error.
pub fn remove_path(path: &Path, operation: &str) -> Result<bool> {
    let result = if path.is_dir() {
        fs::remove_dir_all(path)
    } else if path.exists() {
        fs::remove_file(path)
    } else {
        return Ok(false);
    };

    result
        .map(|_| true)
        .map_err(|e| Error::internal_io(e.to_string(), Some(format!("{} {}", operation, path.display()))))
}

fn ensure_parent(path: &Path, operation: &str) -> Result<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => fs::create_dir_all(parent).map_err(|e| {
            Error::internal_io(
                e.to_string(),
                Some(format!("{} (create {})", operation, parent.display())),
            )
        }),
        _ => Ok(()),
    }
}
