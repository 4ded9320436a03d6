//! Filesystem security policy enforcement.
//!
//! Caller-supplied file names end up as paths inside a per-invocation
//! workspace. Everything here makes sure such a name can only ever address a
//! location below the workspace root.

use crate::{Error, Result};
use std::path::{Component, Path, PathBuf};

/// Normalizes a caller-supplied file name into a relative path.
///
/// Rejects empty names, absolute paths (including Windows drive prefixes on
/// any OS) and any `..` component that would climb above the starting point.
pub fn normalize_relative(input_path: &str) -> Result<PathBuf> {
    if input_path.len() >= 2
        && input_path.as_bytes()[1] == b':'
        && input_path.as_bytes()[0].is_ascii_alphabetic()
    {
        return Err(Error::SecurityViolation(format!(
            "Absolute paths are not allowed in sandbox: {}",
            input_path
        )));
    }

    let mut normalized = PathBuf::new();
    for component in Path::new(input_path).components() {
        match component {
            Component::Normal(c) => normalized.push(c),
            Component::ParentDir => {
                if !normalized.pop() {
                    return Err(Error::SecurityViolation(format!(
                        "Path traversal detected in path: {}",
                        input_path
                    )));
                }
            }
            Component::RootDir | Component::Prefix(_) => {
                return Err(Error::SecurityViolation(format!(
                    "Absolute paths are not allowed in sandbox: {}",
                    input_path
                )));
            }
            Component::CurDir => {}
        }
    }

    if normalized.as_os_str().is_empty() {
        return Err(Error::SecurityViolation(format!(
            "File name does not name a file: '{}'",
            input_path
        )));
    }

    Ok(normalized)
}

/// Resolves `input_path` to an absolute location under `root`.
pub fn resolve_in_root(root: &Path, input_path: &str) -> Result<PathBuf> {
    let relative = normalize_relative(input_path)?;
    let full_path = root.join(&relative);

    // join() with a normalized relative path cannot escape, but a later
    // change to normalize_relative must not silently break that.
    if !full_path.starts_with(root) {
        return Err(Error::SecurityViolation(format!(
            "Access denied: path {} is outside of root {}",
            input_path,
            root.display()
        )));
    }

    Ok(full_path)
}
