//! Per-invocation scratch directories.

use std::path::{Path, PathBuf};
use tempfile::TempDir;

use sandbox_mcp_core::fs_policy;
use sandbox_mcp_core::{Error, Result};

/// Uniquely named directory that exists for exactly one execution.
///
/// The directory is removed when the workspace is dropped, so an execution
/// that is cancelled mid-flight still cleans up after itself.
#[derive(Debug)]
pub struct Workspace {
    dir: TempDir,
}

impl Workspace {
    /// Create `<root>/<prefix><random>`.
    pub async fn create(root: &Path, prefix: &str) -> Result<Self> {
        tokio::fs::create_dir_all(root).await.map_err(|e| {
            Error::staging(format!(
                "cannot create workspace root {}: {}",
                root.display(),
                e
            ))
        })?;

        let parent = root.to_path_buf();
        let prefix = prefix.to_string();
        let dir = tokio::task::spawn_blocking(move || {
            tempfile::Builder::new().prefix(&prefix).tempdir_in(&parent)
        })
        .await
        .map_err(|e| Error::internal(format!("workspace creation task failed: {}", e)))?
        .map_err(|e| {
            Error::staging(format!(
                "cannot create workspace under {}: {}",
                root.display(),
                e
            ))
        })?;

        tracing::debug!(path = %dir.path().display(), "Workspace created");
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Write `content` to `name` inside the workspace with permission bits `mode`.
    ///
    /// Names that would land outside the workspace are rejected before
    /// anything touches the disk.
    pub async fn write_file(&self, name: &str, content: &str, mode: u32) -> Result<PathBuf> {
        let path = fs_policy::resolve_in_root(self.path(), name)?;

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                Error::staging(format!("cannot create directory for '{}': {}", name, e))
            })?;
        }
        tokio::fs::write(&path, content)
            .await
            .map_err(|e| Error::staging(format!("cannot write '{}': {}", name, e)))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            tokio::fs::set_permissions(&path, std::fs::Permissions::from_mode(mode))
                .await
                .map_err(|e| Error::staging(format!("cannot set mode on '{}': {}", name, e)))?;
        }
        #[cfg(not(unix))]
        let _ = mode;

        Ok(path)
    }

    /// Remove the directory now, reporting failures instead of ignoring them.
    pub fn close(self) -> std::io::Result<()> {
        self.dir.close()
    }
}
