// src/capture/store_fs.rs
use std::fs;
use std::path::{Path, PathBuf};

use crate::core::{CaptureError, CaptureResult};

/// Writes artifacts below a fixed root directory.
#[derive(Debug, Clone)]
pub struct LocalStore {
    root: PathBuf,
}

impl LocalStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Creates missing parents, writes `bytes` and returns the absolute path.
    /// An existing file with the same name is replaced.
    pub fn store(&self, relative: &Path, bytes: &[u8]) -> CaptureResult<PathBuf> {
        let path = self.root.join(relative);

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| CaptureError::local_write(parent.display().to_string(), e))?;
        }

        fs::write(&path, bytes).map_err(|e| CaptureError::local_write(path.display().to_string(), e))?;
        Ok(path)
    }
}
