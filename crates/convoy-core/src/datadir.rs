//! Scoped data directories
//!
//! Each scope owns a directory for its on-disk state; child scopes live in
//! namespaced subdirectories created on demand.

use std::path::{Path, PathBuf};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DataDirError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid scope name: {0:?}")]
    InvalidName(String),
}

/// Handle to a scope's data directory.
#[derive(Debug, Clone)]
pub struct DataDir {
    root: PathBuf,
}

impl DataDir {
    /// Open (creating if necessary) the directory at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Result<Self, DataDirError> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Child directory for a project scope.
    pub fn project(&self, name: &str) -> Result<DataDir, DataDirError> {
        self.child("project", name)
    }

    /// Child directory for a target scope.
    pub fn target(&self, name: &str) -> Result<DataDir, DataDirError> {
        self.child("target", name)
    }

    fn child(&self, namespace: &str, name: &str) -> Result<DataDir, DataDirError> {
        if name.is_empty() || name.contains('/') || name.contains('\\') {
            return Err(DataDirError::InvalidName(name.to_string()));
        }
        DataDir::new(self.root.join(namespace).join(name))
    }
}
