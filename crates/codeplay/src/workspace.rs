//! Per-session scratch directories
//!
//! Each session gets one directory under the configured root. It holds the
//! current run's source file and, for compiled languages, its build artifact.

use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, instrument, warn};

/// Errors that occur while managing a workspace
#[derive(Debug, Error)]
pub enum WorkspaceError {
    #[error("invalid path: {0}")]
    InvalidPath(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Creates per-session workspaces under a common root
#[derive(Debug, Clone)]
pub struct WorkspaceManager {
    root: PathBuf,
}

impl WorkspaceManager {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Return the session's workspace, creating it if absent
    #[instrument(skip(self))]
    pub async fn prepare(&self, session_id: &str) -> Result<Workspace, WorkspaceError> {
        validate_name(session_id)?;
        if session_id.contains('/') || session_id.contains('\\') {
            return Err(WorkspaceError::InvalidPath(format!(
                "session id must be a single path component: {session_id}"
            )));
        }

        let path = self.root.join(session_id);
        tokio::fs::create_dir_all(&path).await?;
        debug!(?path, "workspace ready");

        Ok(Workspace { path })
    }
}

/// A session's scratch directory
#[derive(Debug, Clone)]
pub struct Workspace {
    path: PathBuf,
}

impl Workspace {
    /// Path to the workspace directory
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Get the path to a file inside the workspace
    ///
    /// Returns an error if the name contains path traversal attempts.
    pub fn file_path(&self, name: &str) -> Result<PathBuf, WorkspaceError> {
        validate_name(name)?;
        Ok(self.path.join(name))
    }

    /// Write a source file, replacing any previous content
    #[instrument(skip(self, content))]
    pub async fn write_source(&self, name: &str, content: &[u8]) -> Result<PathBuf, WorkspaceError> {
        let path = self.file_path(name)?;

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        tokio::fs::write(&path, content).await?;
        debug!(?path, len = content.len(), "wrote source file");
        Ok(path)
    }

    /// Check if a file exists in the workspace
    pub async fn file_exists(&self, name: &str) -> Result<bool, WorkspaceError> {
        let path = self.file_path(name)?;
        Ok(tokio::fs::try_exists(&path).await.unwrap_or(false))
    }

    /// Remove everything left by earlier runs
    #[instrument(skip(self), fields(path = %self.path.display()))]
    pub async fn reset(&self) -> Result<(), WorkspaceError> {
        match tokio::fs::remove_dir_all(&self.path).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        tokio::fs::create_dir_all(&self.path).await?;
        Ok(())
    }

    /// Delete the workspace
    ///
    /// Best-effort: a failure is logged and reported as `false`, never
    /// propagated.
    #[instrument(skip(self), fields(path = %self.path.display()))]
    pub async fn cleanup(&self) -> bool {
        match tokio::fs::remove_dir_all(&self.path).await {
            Ok(()) => {
                debug!("workspace removed");
                true
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => true,
            Err(e) => {
                warn!(error = %e, "failed to remove workspace");
                false
            }
        }
    }
}

fn validate_name(name: &str) -> Result<(), WorkspaceError> {
    let path = Path::new(name);
    if name.is_empty()
        || name.contains("..")
        || name.starts_with('/')
        || name.starts_with('\\')
        || path.is_absolute()
    {
        return Err(WorkspaceError::InvalidPath(format!(
            "path traversal not allowed: {name}"
        )));
    }
    Ok(())
}
