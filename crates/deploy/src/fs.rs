//! File system utils.

use std::fs::File;
use std::path::Path;

use anyhow::Context;
use fs2::FileExt;

/// Name of the lock file guarding a state directory.
const LOCK_FILENAME: &str = ".lock";

pub struct FsHandler;

impl FsHandler {
    /// Create a state directory if it doesn't exist.
    pub fn create_state_directory(path: &Path) -> anyhow::Result<()> {
        std::fs::create_dir_all(path).with_context(|| {
            format!(
                "Failed to create state directory {}. Ensure you have write permissions.",
                path.display()
            )
        })?;
        tracing::debug!("Created state directory: {}", path.display());
        Ok(())
    }

    /// Take an exclusive lock on a state directory.
    ///
    /// The lock is released when the returned file is dropped.
    pub fn lock_directory(path: &Path) -> anyhow::Result<File> {
        let lock_path = path.join(LOCK_FILENAME);
        let file = File::create(&lock_path)
            .with_context(|| format!("Failed to create lock file {}", lock_path.display()))?;

        file.try_lock_exclusive().with_context(|| {
            format!(
                "State directory {} is locked by another deployment",
                path.display()
            )
        })?;

        Ok(file)
    }

    /// Write `contents` to `path` through a temporary file and a rename, so readers never
    /// observe a half-written file.
    pub fn write_atomic(path: &Path, contents: &[u8]) -> anyhow::Result<()> {
        let file_name = path
            .file_name()
            .context("Target path must have a file name")?
            .to_string_lossy();
        let tmp_path = path.with_file_name(format!(".{}.tmp", file_name));

        std::fs::write(&tmp_path, contents)
            .with_context(|| format!("Failed to write {}", tmp_path.display()))?;
        std::fs::rename(&tmp_path, path).with_context(|| {
            format!(
                "Failed to move {} to {}",
                tmp_path.display(),
                path.display()
            )
        })?;

        Ok(())
    }
}
