use crate::core::{Result, UpgradeTestError};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

/// Hand-off directory carrying one instance's data into the next
///
/// Holds at most one generation: `replace_with` always clears before
/// copying, never merges.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagingArea {
    path: PathBuf,
}

impl StagingArea {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_populated(&self) -> bool {
        self.path.is_dir()
    }

    /// Remove the staged directory. A missing directory only logs a
    /// warning and returns `Ok(false)`.
    pub async fn clear(&self) -> Result<bool> {
        match tokio::fs::remove_dir_all(&self.path).await {
            Ok(()) => {
                debug!("Cleared staging directory {}", self.path.display());
                Ok(true)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                warn!(
                    "Can't remove non-existing staging directory {}",
                    self.path.display()
                );
                Ok(false)
            }
            Err(e) => Err(UpgradeTestError::Staging(format!(
                "Failed to clear '{}': {}",
                self.path.display(),
                e
            ))),
        }
    }

    /// Replace the staged contents with a copy of `source`.
    ///
    /// Returns the number of files copied.
    pub async fn replace_with(&self, source: &Path) -> Result<u64> {
        if !source.is_dir() {
            return Err(UpgradeTestError::Staging(format!(
                "Data directory '{}' does not exist",
                source.display()
            )));
        }

        self.clear().await?;

        let source = source.to_path_buf();
        let dest = self.path.clone();
        let copied = tokio::task::spawn_blocking(move || copy_tree(&source, &dest))
            .await
            .map_err(|e| UpgradeTestError::Staging(format!("Copy task failed: {}", e)))??;

        debug!("Staged {} files into {}", copied, self.path.display());
        Ok(copied)
    }
}

/// Recursive copy of `source` into a new directory `dest`.
///
/// Symlinks are followed; sockets and other special files are skipped.
pub fn copy_tree(source: &Path, dest: &Path) -> Result<u64> {
    let staging_err = |path: &Path, e: std::io::Error| {
        UpgradeTestError::Staging(format!("Failed to copy '{}': {}", path.display(), e))
    };

    let mut copied = 0;
    for entry in WalkDir::new(source).follow_links(true) {
        let entry = entry?;
        let relative = entry
            .path()
            .strip_prefix(source)
            .map_err(|e| UpgradeTestError::Staging(e.to_string()))?;
        let target = dest.join(relative);

        let file_type = entry.file_type();
        if file_type.is_dir() {
            fs::create_dir_all(&target).map_err(|e| staging_err(&target, e))?;
        } else if file_type.is_file() {
            fs::copy(entry.path(), &target).map_err(|e| staging_err(entry.path(), e))?;
            copied += 1;
        } else {
            debug!("Skipping special file {}", entry.path().display());
        }
    }

    Ok(copied)
}
