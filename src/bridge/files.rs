//! Staging directory for received files.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::info;

use crate::common::{BridgeError, BridgeResult};

/// Writes accepted file transfers under a fixed directory, keyed by file name.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Path a file with this name is stored at.
    ///
    /// Only the final path component of `file_name` is used, so a sender
    /// cannot write outside the staging directory. Existing files are
    /// overwritten.
    pub fn path_for(&self, file_name: &str) -> PathBuf {
        let name = Path::new(file_name)
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "unnamed".into());
        self.dir.join(name)
    }

    pub fn save(&self, file_name: &str, data: &[u8]) -> BridgeResult<PathBuf> {
        let path = self.path_for(file_name);
        let staging_err = |source| BridgeError::Staging {
            path: path.display().to_string(),
            source,
        };

        fs::create_dir_all(&self.dir).map_err(staging_err)?;
        fs::write(&path, data).map_err(staging_err)?;

        info!(path = %path.display(), bytes = data.len(), "Stored received file");
        Ok(path)
    }
}
